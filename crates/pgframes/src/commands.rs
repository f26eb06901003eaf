use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Subcommand;
use datafusion::prelude::SessionContext;
use querydemo::templates::{CUSTOMERS, ORDERS};
use querydemo::{bind_table, create_session, fixtures, QueryTemplate, TransformDemo};
use tablebridge::postgres::{JdbcOptions, PostgresDbConnection, PostgresStore};
use tablebridge::{
    DatabaseConfig, FixedSample, MemoryStore, ReadSource, SampleLoader, Table, TableStore,
    WritePolicy,
};
use tokio::runtime::{Builder, Runtime};

use crate::output::Printer;

/// Name the sample is stored and bound under.
pub const SAMPLE_TABLE: &str = "sample_data";

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Commands {
    /// Write the sample CSV to Postgres, read it back, and query it.
    Roundtrip,
    /// Run the dataframe transformations over the sample. Needs no database.
    Transform,
    /// Run the SQL examples over fixed tables, then over the stored sample.
    Sql,
}

impl Commands {
    pub fn run(self) -> Result<()> {
        let label = match self {
            Commands::Roundtrip => "roundtrip",
            Commands::Transform => "transform",
            Commands::Sql => "sql",
        };
        let runtime = build_runtime(label)?;
        runtime.block_on(async move {
            let mut out = Printer::stdout();
            match self {
                Commands::Roundtrip => roundtrip(&mut out).await,
                Commands::Transform => transform(&mut out, SampleLoader::default()).await,
                Commands::Sql => sql(&mut out).await,
            }
        })
    }
}

async fn connect(conf: &DatabaseConfig) -> Result<PostgresStore> {
    let conn = PostgresDbConnection::from(conf);
    let store = PostgresStore::connect(&conn)
        .await
        .with_context(|| format!("failed to connect to {}", conn.redacted_connection_string()))?;
    Ok(store)
}

/// Bind `table` for queries, reporting a failure instead of returning it.
fn bind_or_report<W: Write>(
    out: &mut Printer<W>,
    ctx: &SessionContext,
    name: &str,
    table: &Table,
) -> io::Result<bool> {
    match bind_table(ctx, name, table) {
        Ok(()) => Ok(true),
        Err(e) => {
            out.report(&format!("Error binding '{name}'"), &e)?;
            Ok(false)
        }
    }
}

/// Run `template` and print its result under `title`.
async fn print_template<W: Write>(
    out: &mut Printer<W>,
    ctx: &SessionContext,
    title: &str,
    template: &QueryTemplate,
) -> io::Result<Option<Table>> {
    match template.execute(ctx).await {
        Ok(table) => {
            out.table(title, &table)?;
            Ok(Some(table))
        }
        Err(e) => {
            out.report(&format!("Error running {template}"), &e)?;
            Ok(None)
        }
    }
}

async fn roundtrip<W: Write>(out: &mut Printer<W>) -> Result<()> {
    let store = connect(&DatabaseConfig::default()).await?;

    let ctx = create_session();
    let loader = SampleLoader::default();
    let sample = match loader.load(&ctx).await {
        Ok(sample) => sample,
        Err(e) => {
            out.report("Error loading sample data", &e)?;
            return Ok(());
        }
    };
    out.line(format!(
        "Successfully loaded sample data from {}",
        loader.path().display()
    ))?;

    match store.write(SAMPLE_TABLE, &sample, WritePolicy::Replace).await {
        Ok(rows) => out.line(format!("Wrote {rows} rows to '{SAMPLE_TABLE}'"))?,
        Err(e) => out.report("Error writing to PostgreSQL", &e)?,
    }

    match store.read(&ReadSource::table(SAMPLE_TABLE)).await {
        Ok(table) => out.table("First 5 rows from database", &table.head(5))?,
        Err(e) => out.report("Error reading from PostgreSQL", &e)?,
    }

    let template = QueryTemplate::FirstRows {
        table: SAMPLE_TABLE.to_string(),
        order_by: "id".to_string(),
        limit: 3,
    };
    match store.read(&ReadSource::query(template.render())).await {
        Ok(table) => out.table("Custom query results", &table)?,
        Err(e) => out.report("Error reading from PostgreSQL", &e)?,
    }
    Ok(())
}

async fn transform<W: Write>(out: &mut Printer<W>, loader: SampleLoader) -> Result<()> {
    let ctx = create_session();
    let sample = loader.with_fallback(FixedSample).load(&ctx).await?;

    let demo = TransformDemo::new(ctx.clone(), sample.clone());
    out.section("DataFrame Schema")?;
    out.line(demo.schema_string())?;
    for step in demo.run().await {
        match step.output {
            Ok(table) => out.table(step.title, &table)?,
            Err(e) => {
                let context = format!(
                    "{} failed, adjust the transformations to the data's columns",
                    step.title
                );
                out.report(&context, &e)?
            }
        }
    }

    if bind_or_report(out, &ctx, SAMPLE_TABLE, &sample)? {
        let first_rows = QueryTemplate::FirstRows {
            table: SAMPLE_TABLE.to_string(),
            order_by: "id".to_string(),
            limit: 5,
        };
        print_template(out, &ctx, &first_rows.title(), &first_rows).await?;

        let summary_query = QueryTemplate::CategorySummary {
            table: SAMPLE_TABLE.to_string(),
        };
        let summary = print_template(out, &ctx, &summary_query.title(), &summary_query).await?;

        if let Some(summary) = summary {
            let store = MemoryStore::new();
            match store
                .write("category_summary", &summary, WritePolicy::Replace)
                .await
            {
                Ok(rows) => out.line(format!("Wrote {rows} rows to 'category_summary'"))?,
                Err(e) => out.report("Error writing category summary", &e)?,
            }
            match store.read(&ReadSource::table("category_summary")).await {
                Ok(table) => out.table("Category summary read back", &table)?,
                Err(e) => out.report("Error reading category summary", &e)?,
            }
        }
    }

    let jdbc = JdbcOptions::from_config(&DatabaseConfig::default());
    out.section("JDBC options")?;
    for (key, value) in jdbc.redacted_options(Some(SAMPLE_TABLE)) {
        out.line(format!("  {key}: {value}"))?;
    }
    Ok(())
}

async fn sql<W: Write>(out: &mut Printer<W>) -> Result<()> {
    let ctx = create_session();
    let customers = fixtures::customers()?;
    let orders = fixtures::orders()?;
    bind_or_report(out, &ctx, CUSTOMERS, &customers)?;
    bind_or_report(out, &ctx, ORDERS, &orders)?;
    out.table("Customers DataFrame", &customers.head(5))?;
    out.table("Orders DataFrame", &orders.head(5))?;

    let since = NaiveDate::from_ymd_opt(2023, 3, 15).context("invalid cutoff date")?;
    let templates = [
        QueryTemplate::CustomersOlderThan { min_age: 30 },
        QueryTemplate::CustomerOrders,
        QueryTemplate::CustomerSpending,
        QueryTemplate::CustomersSpendingOver { threshold: 200.0 },
        QueryTemplate::CustomersSpendingOverJoined { threshold: 200.0 },
        QueryTemplate::OrdersSince { since },
    ];
    for (idx, template) in templates.iter().enumerate() {
        let title = format!("Example {}: {}", idx + 1, template.title());
        print_template(out, &ctx, &title, template).await?;
    }

    let store = connect(&DatabaseConfig::default()).await?;
    match store.read(&ReadSource::table(SAMPLE_TABLE)).await {
        Ok(df) => {
            out.table("DataFrame from PostgreSQL", &df.head(5))?;
            if bind_or_report(out, &ctx, "df", &df)? {
                let template = QueryTemplate::FirstRows {
                    table: "df".to_string(),
                    order_by: "id".to_string(),
                    limit: 5,
                };
                print_template(out, &ctx, "SQL query on DataFrame from database", &template)
                    .await?;
            }
        }
        Err(e) => out.report("Error reading from PostgreSQL", &e)?,
    }
    Ok(())
}

fn build_runtime(thread_label: &'static str) -> Result<Runtime> {
    let runtime = Builder::new_multi_thread()
        .thread_name_fn(move || {
            static THREAD_ID: AtomicU64 = AtomicU64::new(0);
            let id = THREAD_ID.fetch_add(1, Ordering::Relaxed);
            format!("{}-thread-{}", thread_label, id)
        })
        .enable_all()
        .build()?;

    Ok(runtime)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_transform(loader: SampleLoader) -> String {
        let mut out = Printer::new(Vec::new());
        transform(&mut out, loader).await.unwrap();
        String::from_utf8(out.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn transform_runs_offline() {
        let text = run_transform(SampleLoader::new("does/not/exist.csv")).await;
        for heading in [
            "DataFrame Schema:",
            "Filtering data:",
            "Aggregating data:",
            "Category summary of sample_data:",
            "Category summary read back:",
            "JDBC options:",
        ] {
            assert!(text.contains(heading), "missing {heading}");
        }
        assert!(text.contains("  password: ***"));
        assert!(!text.contains("password: postgres"));
    }

    #[tokio::test]
    async fn transform_reports_missing_columns() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,price").unwrap();
        writeln!(file, "1,5.0").unwrap();
        file.flush().unwrap();

        let text = run_transform(SampleLoader::new(file.path())).await;
        assert!(text.contains("Aggregating data failed"), "{text}");
        assert!(text.contains("Missing column 'category'"), "{text}");
        // Later steps still run.
        assert!(text.contains("First 5 rows of sample_data ordered by id:"), "{text}");
        assert!(text.contains("Error running category_summary"), "{text}");
        assert!(text.contains("JDBC options:"), "{text}");
    }
}
