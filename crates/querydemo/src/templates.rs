//! Named SQL queries with typed parameters.
//!
//! Parameters are rendered as SQL literals rather than bound as placeholders
//! so the same text runs unchanged against the in-memory session and against
//! Postgres.

use std::fmt;

use chrono::NaiveDate;
use datafusion::prelude::SessionContext;
use tablebridge::Table;
use tracing::debug;

use crate::errors::{Result, TransformError};
use crate::session::collect_table;

/// Name the customer fixture is bound under.
pub const CUSTOMERS: &str = "customers";
/// Name the order fixture is bound under.
pub const ORDERS: &str = "orders";

/// A value substituted into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
    Ident(String),
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryParam::Int(v) => write!(f, "{v}"),
            QueryParam::Float(v) if v.is_finite() => write!(f, "{v:?}"),
            // Spelled so both DataFusion and Postgres parse the cast.
            QueryParam::Float(v) => {
                let special = if v.is_nan() {
                    "NaN"
                } else if v.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                write!(f, "CAST('{special}' AS DOUBLE PRECISION)")
            }
            QueryParam::Date(d) => write!(f, "DATE '{}'", d.format("%Y-%m-%d")),
            QueryParam::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            QueryParam::Ident(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
        }
    }
}

/// The fixed set of demonstration queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryTemplate {
    /// `limit` rows of `table` ordered by `order_by`.
    FirstRows {
        table: String,
        order_by: String,
        limit: u64,
    },
    /// Row count and average amount per category, largest first.
    CategorySummary { table: String },
    CustomersOlderThan { min_age: i64 },
    CustomerOrders,
    CustomerSpending,
    /// Customers whose orders sum past `threshold`, via an IN subquery.
    CustomersSpendingOver { threshold: f64 },
    /// Same result as [`QueryTemplate::CustomersSpendingOver`], via a join.
    CustomersSpendingOverJoined { threshold: f64 },
    OrdersSince { since: NaiveDate },
}

impl QueryTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            QueryTemplate::FirstRows { .. } => "first_rows",
            QueryTemplate::CategorySummary { .. } => "category_summary",
            QueryTemplate::CustomersOlderThan { .. } => "customers_older_than",
            QueryTemplate::CustomerOrders => "customer_orders",
            QueryTemplate::CustomerSpending => "customer_spending",
            QueryTemplate::CustomersSpendingOver { .. } => "customers_spending_over",
            QueryTemplate::CustomersSpendingOverJoined { .. } => {
                "customers_spending_over_joined"
            }
            QueryTemplate::OrdersSince { .. } => "orders_since",
        }
    }

    /// Human readable heading for printed results.
    pub fn title(&self) -> String {
        match self {
            QueryTemplate::FirstRows {
                table,
                order_by,
                limit,
            } => format!("First {limit} rows of {table} ordered by {order_by}"),
            QueryTemplate::CategorySummary { table } => format!("Category summary of {table}"),
            QueryTemplate::CustomersOlderThan { min_age } => {
                format!("Customers older than {min_age}, ordered by age")
            }
            QueryTemplate::CustomerOrders => "Join customers with their orders".to_string(),
            QueryTemplate::CustomerSpending => {
                "Customer order counts and total spending".to_string()
            }
            QueryTemplate::CustomersSpendingOver { threshold } => {
                format!("Customers who spent more than {threshold}")
            }
            QueryTemplate::CustomersSpendingOverJoined { threshold } => {
                format!("Customers who spent more than {threshold} (join)")
            }
            QueryTemplate::OrdersSince { since } => {
                format!("Orders from {} and later", since.format("%Y-%m-%d"))
            }
        }
    }

    /// Tables that must be bound before the query can run.
    pub fn required_tables(&self) -> Vec<String> {
        match self {
            QueryTemplate::FirstRows { table, .. } | QueryTemplate::CategorySummary { table } => {
                vec![table.clone()]
            }
            QueryTemplate::CustomersOlderThan { .. } => vec![CUSTOMERS.to_string()],
            _ => vec![CUSTOMERS.to_string(), ORDERS.to_string()],
        }
    }

    pub fn render(&self) -> String {
        match self {
            QueryTemplate::FirstRows {
                table,
                order_by,
                limit,
            } => format!(
                "SELECT * FROM {} ORDER BY {} LIMIT {}",
                QueryParam::Ident(table.clone()),
                QueryParam::Ident(order_by.clone()),
                limit
            ),
            QueryTemplate::CategorySummary { table } => format!(
                "SELECT category, COUNT(*) AS \"count\", AVG(amount) AS avg_amount \
                 FROM {} GROUP BY category ORDER BY \"count\" DESC, category",
                QueryParam::Ident(table.clone())
            ),
            QueryTemplate::CustomersOlderThan { min_age } => format!(
                "SELECT name, email, age FROM {CUSTOMERS} WHERE age > {} ORDER BY age DESC",
                QueryParam::Int(*min_age)
            ),
            QueryTemplate::CustomerOrders => format!(
                "SELECT c.name, o.order_id, o.order_date, o.amount \
                 FROM {CUSTOMERS} c JOIN {ORDERS} o ON c.customer_id = o.customer_id \
                 ORDER BY o.order_date"
            ),
            // Every selected column must be grouped.
            QueryTemplate::CustomerSpending => format!(
                "SELECT c.name, COUNT(o.order_id) AS order_count, SUM(o.amount) AS total_spent \
                 FROM {CUSTOMERS} c JOIN {ORDERS} o ON c.customer_id = o.customer_id \
                 GROUP BY c.customer_id, c.name ORDER BY total_spent DESC"
            ),
            QueryTemplate::CustomersSpendingOver { threshold } => format!(
                "SELECT name, age FROM {CUSTOMERS} WHERE customer_id IN (\
                 SELECT customer_id FROM {ORDERS} GROUP BY customer_id \
                 HAVING SUM(amount) > {}) ORDER BY name",
                QueryParam::Float(*threshold)
            ),
            QueryTemplate::CustomersSpendingOverJoined { threshold } => format!(
                "SELECT c.name, c.age \
                 FROM {CUSTOMERS} c JOIN {ORDERS} o ON c.customer_id = o.customer_id \
                 GROUP BY c.customer_id, c.name, c.age \
                 HAVING SUM(o.amount) > {} ORDER BY c.name",
                QueryParam::Float(*threshold)
            ),
            QueryTemplate::OrdersSince { since } => format!(
                "SELECT c.name, o.order_date, o.amount \
                 FROM {CUSTOMERS} c JOIN {ORDERS} o ON c.customer_id = o.customer_id \
                 WHERE o.order_date >= {} ORDER BY o.order_date",
                QueryParam::Date(*since)
            ),
        }
    }

    /// Run against the tables bound in `ctx`.
    pub async fn execute(&self, ctx: &SessionContext) -> Result<Table> {
        for table in self.required_tables() {
            if !ctx.table_exist(table.as_str())? {
                return Err(TransformError::UnboundTable(table));
            }
        }
        let sql = self.render();
        debug!(template = self.name(), %sql, "executing query template");
        let df = ctx.sql(&sql).await?;
        collect_table(df).await
    }
}

impl fmt::Display for QueryTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::array::{Array, StringArray};
    use datafusion::arrow::compute::concat_batches;
    use rstest::rstest;

    use super::*;
    use crate::fixtures;
    use crate::session::{bind_table, create_session};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fixture_session() -> SessionContext {
        let ctx = create_session();
        bind_table(&ctx, CUSTOMERS, &fixtures::customers().unwrap()).unwrap();
        bind_table(&ctx, ORDERS, &fixtures::orders().unwrap()).unwrap();
        ctx
    }

    fn strings(table: &Table, column: &str) -> Vec<String> {
        let batch = concat_batches(table.schema(), table.batches()).unwrap();
        let arr = batch.column_by_name(column).unwrap();
        let arr = arr.as_any().downcast_ref::<StringArray>().unwrap();
        (0..arr.len()).map(|i| arr.value(i).to_string()).collect()
    }

    #[rstest]
    #[case::int(QueryParam::Int(-30), "-30")]
    #[case::float(QueryParam::Float(200.0), "200.0")]
    #[case::fraction(QueryParam::Float(12.5), "12.5")]
    #[case::nan(QueryParam::Float(f64::NAN), "CAST('NaN' AS DOUBLE PRECISION)")]
    #[case::neg_inf(
        QueryParam::Float(f64::NEG_INFINITY),
        "CAST('-Infinity' AS DOUBLE PRECISION)"
    )]
    #[case::date(QueryParam::Date(date(2023, 3, 15)), "DATE '2023-03-15'")]
    #[case::text(QueryParam::Text("O'Brien".to_string()), "'O''Brien'")]
    #[case::ident(QueryParam::Ident("sample_data".to_string()), "\"sample_data\"")]
    #[case::ident_quote(QueryParam::Ident("a\"b".to_string()), "\"a\"\"b\"")]
    fn render_param(#[case] param: QueryParam, #[case] expected: &str) {
        assert_eq!(expected, param.to_string());
    }

    #[rstest]
    #[case::first_rows(
        QueryTemplate::FirstRows { table: "df".to_string(), order_by: "id".to_string(), limit: 5 },
        vec!["df"]
    )]
    #[case::older(QueryTemplate::CustomersOlderThan { min_age: 30 }, vec!["customers"])]
    #[case::joined(QueryTemplate::CustomerOrders, vec!["customers", "orders"])]
    fn required_tables(#[case] template: QueryTemplate, #[case] expected: Vec<&str>) {
        assert_eq!(expected, template.required_tables());
    }

    #[test]
    fn first_rows_sql() {
        let template = QueryTemplate::FirstRows {
            table: "sample_data".to_string(),
            order_by: "id".to_string(),
            limit: 3,
        };
        assert_eq!(
            "SELECT * FROM \"sample_data\" ORDER BY \"id\" LIMIT 3",
            template.render()
        );
    }

    #[tokio::test]
    async fn unbound_table_fails_before_planning() {
        let ctx = create_session();
        bind_table(&ctx, CUSTOMERS, &fixtures::customers().unwrap()).unwrap();

        let err = QueryTemplate::CustomerOrders
            .execute(&ctx)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, TransformError::UnboundTable(name) if name == ORDERS),
            "{err}"
        );
    }

    #[tokio::test]
    async fn customers_older_than_30() {
        let out = QueryTemplate::CustomersOlderThan { min_age: 30 }
            .execute(&fixture_session())
            .await
            .unwrap();
        assert_eq!(
            vec!["William Wilson", "Michael Brown", "John Smith", "Olivia Davis"],
            strings(&out, "name")
        );
    }

    #[tokio::test]
    async fn spending_ordered_by_total() {
        let out = QueryTemplate::CustomerSpending
            .execute(&fixture_session())
            .await
            .unwrap();
        assert_eq!(
            vec!["name", "order_count", "total_spent"],
            out.column_names()
        );
        assert_eq!(
            vec![
                "William Wilson",
                "Michael Brown",
                "Olivia Davis",
                "John Smith",
                "Emma Johnson"
            ],
            strings(&out, "name")
        );
    }

    #[tokio::test]
    async fn subquery_and_join_agree() {
        let ctx = fixture_session();
        let sub = QueryTemplate::CustomersSpendingOver { threshold: 200.0 }
            .execute(&ctx)
            .await
            .unwrap();
        let joined = QueryTemplate::CustomersSpendingOverJoined { threshold: 200.0 }
            .execute(&ctx)
            .await
            .unwrap();

        let expected = vec!["Michael Brown", "Olivia Davis", "William Wilson"];
        assert_eq!(expected, strings(&sub, "name"));
        assert_eq!(strings(&sub, "name"), strings(&joined, "name"));
        assert_eq!(sub.column_names(), joined.column_names());
    }

    #[tokio::test]
    async fn orders_since_march_15() {
        let out = QueryTemplate::OrdersSince {
            since: date(2023, 3, 15),
        }
        .execute(&fixture_session())
        .await
        .unwrap();
        assert_eq!(7, out.num_rows());
        assert_eq!("John Smith", strings(&out, "name")[0]);
    }

    #[tokio::test]
    async fn category_summary_over_sample() {
        use tablebridge::{DefaultData, FixedSample};

        let ctx = create_session();
        bind_table(&ctx, "sample_data", &FixedSample.default_table().unwrap()).unwrap();
        let out = QueryTemplate::CategorySummary {
            table: "sample_data".to_string(),
        }
        .execute(&ctx)
        .await
        .unwrap();
        assert_eq!(vec!["category", "count", "avg_amount"], out.column_names());
        assert_eq!(vec!["A", "B", "C", "D"], strings(&out, "category"));
    }
}
