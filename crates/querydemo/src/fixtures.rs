//! Small customer and order tables the query templates run against.

use std::sync::Arc;

use chrono::NaiveDate;
use datafusion::arrow::array::{Date32Array, Float64Array, Int64Array, StringArray};
use datafusion::arrow::datatypes::{DataType, Date32Type, Field, Schema};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::record_batch::RecordBatch;
use tablebridge::Table;

const CUSTOMER_NAMES: [&str; 5] = [
    "John Smith",
    "Emma Johnson",
    "Michael Brown",
    "Olivia Davis",
    "William Wilson",
];
const CUSTOMER_EMAILS: [&str; 5] = [
    "john@example.com",
    "emma@example.com",
    "michael@example.com",
    "olivia@example.com",
    "william@example.com",
];
const CUSTOMER_AGES: [i64; 5] = [35, 28, 42, 31, 45];
const SIGNUP_DATES: [(i32, u32, u32); 5] = [
    (2023, 1, 15),
    (2023, 2, 20),
    (2023, 1, 5),
    (2023, 3, 10),
    (2023, 2, 1),
];

const ORDER_CUSTOMERS: [i64; 10] = [1, 2, 3, 1, 4, 2, 5, 3, 4, 5];
const ORDER_DATES: [(i32, u32, u32); 10] = [
    (2023, 3, 1),
    (2023, 3, 5),
    (2023, 3, 10),
    (2023, 3, 15),
    (2023, 3, 20),
    (2023, 3, 25),
    (2023, 4, 1),
    (2023, 4, 5),
    (2023, 4, 10),
    (2023, 4, 15),
];
const ORDER_AMOUNTS: [f64; 10] = [
    120.50, 85.20, 200.00, 65.75, 150.30, 95.60, 180.20, 110.40, 75.90, 220.10,
];

fn dates(ymd: &[(i32, u32, u32)]) -> Result<Date32Array, ArrowError> {
    let days = ymd
        .iter()
        .map(|&(y, m, d)| {
            NaiveDate::from_ymd_opt(y, m, d)
                .map(Date32Type::from_naive_date)
                .ok_or_else(|| ArrowError::ComputeError(format!("invalid date {y}-{m}-{d}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Date32Array::from(days))
}

/// Five customers: `customer_id`, `name`, `email`, `age`, `signup_date`.
pub fn customers() -> Result<Table, ArrowError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("customer_id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("email", DataType::Utf8, false),
        Field::new("age", DataType::Int64, false),
        Field::new("signup_date", DataType::Date32, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(1..=5)),
            Arc::new(StringArray::from(CUSTOMER_NAMES.to_vec())),
            Arc::new(StringArray::from(CUSTOMER_EMAILS.to_vec())),
            Arc::new(Int64Array::from(CUSTOMER_AGES.to_vec())),
            Arc::new(dates(&SIGNUP_DATES)?),
        ],
    )?;
    Table::try_new(schema, vec![batch])
}

/// Ten orders: `order_id`, `customer_id`, `order_date`, `amount`.
pub fn orders() -> Result<Table, ArrowError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("order_id", DataType::Int64, false),
        Field::new("customer_id", DataType::Int64, false),
        Field::new("order_date", DataType::Date32, false),
        Field::new("amount", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(101..=110)),
            Arc::new(Int64Array::from(ORDER_CUSTOMERS.to_vec())),
            Arc::new(dates(&ORDER_DATES)?),
            Arc::new(Float64Array::from(ORDER_AMOUNTS.to_vec())),
        ],
    )?;
    Table::try_new(schema, vec![batch])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_shapes() {
        let customers = customers().unwrap();
        assert_eq!(5, customers.num_rows());
        assert_eq!(
            vec!["customer_id", "name", "email", "age", "signup_date"],
            customers.column_names()
        );

        let orders = orders().unwrap();
        assert_eq!(10, orders.num_rows());
        assert_eq!(
            vec!["order_id", "customer_id", "order_date", "amount"],
            orders.column_names()
        );
    }

    #[test]
    fn every_order_has_a_customer() {
        assert!(ORDER_CUSTOMERS.iter().all(|id| (1..=5).contains(id)));
    }
}
