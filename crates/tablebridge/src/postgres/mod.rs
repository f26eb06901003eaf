pub mod convert;

use std::fmt;

use async_trait::async_trait;
use futures::pin_mut;
use tokio::sync::Mutex;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type as PgType};
use tokio_postgres::{Client, GenericClient, NoTls};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::errors::{ConnectionError, ReadError, WriteError};
use crate::store::{ReadSource, TableStore, WritePolicy};
use crate::table::Table;
use convert::{arrow_to_pg_type, pg_type_ddl, row_values, rows_to_batch, schema_from_columns};

/// How to reach a Postgres instance.
#[derive(Debug, Clone)]
pub enum PostgresDbConnection {
    ConnectionString(String),
    Parameters {
        host: String,
        port: Option<u16>,
        user: String,
        password: Option<String>,
        database: String,
    },
}

impl PostgresDbConnection {
    /// `postgresql://` URL for this connection.
    pub fn connection_string(&self) -> String {
        self.url(false)
    }

    /// Same as `connection_string` with any password masked, for logs and
    /// error messages.
    pub fn redacted_connection_string(&self) -> String {
        self.url(true)
    }

    fn url(&self, redact: bool) -> String {
        match self {
            Self::ConnectionString(s) if redact => mask_password(s),
            Self::ConnectionString(s) => s.clone(),
            Self::Parameters {
                host,
                port,
                user,
                password,
                database,
            } => {
                let password = match password {
                    Some(_) if redact => ":***".to_string(),
                    Some(password) => format!(":{password}"),
                    None => String::new(),
                };
                let port = port.map(|p| format!(":{p}")).unwrap_or_default();
                format!("postgresql://{user}{password}@{host}{port}/{database}")
            }
        }
    }

    /// Driver configuration. Parameters are passed through as-is so
    /// credentials never need URL escaping.
    pub fn config(&self) -> Result<tokio_postgres::Config, ConnectionError> {
        match self {
            Self::ConnectionString(s) => Ok(s.parse()?),
            Self::Parameters {
                host,
                port,
                user,
                password,
                database,
            } => {
                let mut conf = tokio_postgres::Config::new();
                conf.host(host).user(user).dbname(database);
                if let Some(port) = port {
                    conf.port(*port);
                }
                if let Some(password) = password {
                    conf.password(password);
                }
                Ok(conf)
            }
        }
    }
}

impl From<&DatabaseConfig> for PostgresDbConnection {
    fn from(conf: &DatabaseConfig) -> Self {
        PostgresDbConnection::Parameters {
            host: conf.host.clone(),
            port: Some(conf.port),
            user: conf.user.clone(),
            password: Some(conf.password.clone()),
            database: conf.database.clone(),
        }
    }
}

/// Mask the password in a URL or `key=value` connection string.
fn mask_password(conn_str: &str) -> String {
    if let Some((scheme, rest)) = conn_str.split_once("://") {
        return match rest.rsplit_once('@') {
            Some((creds, addr)) => match creds.split_once(':') {
                Some((user, _)) => format!("{scheme}://{user}:***@{addr}"),
                None => conn_str.to_string(),
            },
            None => conn_str.to_string(),
        };
    }
    conn_str
        .split_whitespace()
        .map(|pair| match pair.split_once('=') {
            Some(("password", _)) => "password=***".to_string(),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Options a distributed engine's JDBC bridge needs to reach the same
/// database.
#[derive(Clone, PartialEq, Eq)]
pub struct JdbcOptions {
    url: String,
    user: String,
    password: String,
}

impl JdbcOptions {
    pub const DRIVER: &'static str = "org.postgresql.Driver";

    pub fn from_config(conf: &DatabaseConfig) -> Self {
        JdbcOptions {
            url: format!(
                "jdbc:postgresql://{}:{}/{}",
                conf.host, conf.port, conf.database
            ),
            user: conf.user.clone(),
            password: conf.password.clone(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ordered reader/writer options, optionally targeting a table.
    pub fn options(&self, table: Option<&str>) -> Vec<(&'static str, String)> {
        let mut opts = vec![("url", self.url.clone())];
        if let Some(table) = table {
            opts.push(("dbtable", table.to_string()));
        }
        opts.push(("user", self.user.clone()));
        opts.push(("password", self.password.clone()));
        opts.push(("driver", Self::DRIVER.to_string()));
        opts
    }

    /// Same as `options` with the password masked, for display.
    pub fn redacted_options(&self, table: Option<&str>) -> Vec<(&'static str, String)> {
        self.options(table)
            .into_iter()
            .map(|(k, v)| if k == "password" { (k, "***".to_string()) } else { (k, v) })
            .collect()
    }
}

impl fmt::Debug for JdbcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JdbcOptions")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Quote an identifier for use in generated SQL.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn create_table_sql(name: &str, table: &Table, if_not_exists: bool) -> Result<String, WriteError> {
    let columns = table
        .schema()
        .fields()
        .iter()
        .map(|f| {
            let typ = arrow_to_pg_type(f.name(), f.data_type())?;
            Ok(format!("{} {}", quote_ident(f.name()), pg_type_ddl(&typ)))
        })
        .collect::<Result<Vec<_>, WriteError>>()?;

    Ok(format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        quote_ident(name),
        columns.join(", ")
    ))
}

fn copy_in_sql(name: &str, table: &Table) -> String {
    let columns = table
        .schema()
        .fields()
        .iter()
        .map(|f| quote_ident(f.name()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "COPY {} ({}) FROM STDIN (FORMAT binary)",
        quote_ident(name),
        columns
    )
}

/// A connection to a Postgres database.
#[derive(Debug)]
pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    /// Connect and check the connection with a trivial query.
    pub async fn connect(conn: &PostgresDbConnection) -> Result<Self, ConnectionError> {
        let conf = conn.config()?;
        let (client, connection) = conf.connect(NoTls).await?;

        tokio::runtime::Handle::try_current()
            .map_err(|_| ConnectionError::MissingRuntime)?
            .spawn(async move {
                if let Err(e) = connection.await {
                    debug!(%e, "postgres connection errored");
                }
            });

        client.simple_query("SELECT 1").await?;
        info!(conn = %conn.redacted_connection_string(), "connected to postgres");

        Ok(PostgresStore {
            client: Mutex::new(client),
        })
    }

    async fn table_exists(
        client: &impl GenericClient,
        name: &str,
    ) -> Result<bool, tokio_postgres::Error> {
        let row = client
            .query_one(
                "
                SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = current_schema() AND table_name = $1
                )
                ",
                &[&name],
            )
            .await?;
        row.try_get(0)
    }
}

#[async_trait]
impl TableStore for PostgresStore {
    async fn read(&self, source: &ReadSource) -> Result<Table, ReadError> {
        let client = self.client.lock().await;

        let sql = match source {
            ReadSource::Table(name) => {
                if !Self::table_exists(&*client, name).await? {
                    return Err(ReadError::TableNotFound(name.clone()));
                }
                format!("SELECT * FROM {}", quote_ident(name))
            }
            ReadSource::Query(sql) => sql.clone(),
        };
        debug!(%sql, "reading from postgres");

        let stmt = client.prepare(&sql).await?;
        let schema = schema_from_columns(stmt.columns())?;
        let rows = client.query(&stmt, &[]).await?;
        let batch = rows_to_batch(schema.clone(), &rows)?;
        let table = Table::try_new(schema, vec![batch])?;

        info!(%source, rows = table.num_rows(), "read from postgres");
        Ok(table)
    }

    async fn write(
        &self,
        name: &str,
        table: &Table,
        policy: WritePolicy,
    ) -> Result<u64, WriteError> {
        let types = table
            .schema()
            .fields()
            .iter()
            .map(|f| arrow_to_pg_type(f.name(), f.data_type()))
            .collect::<Result<Vec<PgType>, _>>()?;

        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        match policy {
            WritePolicy::Fail => {
                if Self::table_exists(&tx, name).await? {
                    return Err(WriteError::TableExists(name.to_string()));
                }
                tx.batch_execute(&create_table_sql(name, table, false)?)
                    .await?;
            }
            WritePolicy::Replace => {
                tx.batch_execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))
                    .await?;
                tx.batch_execute(&create_table_sql(name, table, false)?)
                    .await?;
            }
            WritePolicy::Append => {
                tx.batch_execute(&create_table_sql(name, table, true)?)
                    .await?;
            }
        }

        let copy = copy_in_sql(name, table);
        debug!(%copy, "copying rows into postgres");
        let sink = tx.copy_in(&copy).await?;
        let writer = BinaryCopyInWriter::new(sink, &types);
        pin_mut!(writer);

        for batch in table.batches() {
            for row in 0..batch.num_rows() {
                let values = row_values(table.schema().fields(), batch.columns(), row)?;
                let refs: Vec<&(dyn ToSql + Sync)> = values
                    .iter()
                    .map(|v| v.as_ref() as &(dyn ToSql + Sync))
                    .collect();
                writer.as_mut().write(&refs).await?;
            }
        }
        let rows = writer.finish().await?;
        tx.commit().await?;

        info!(table = %name, %policy, rows, "wrote to postgres");
        Ok(rows)
    }
}
