use std::future::Future;
use std::pin::Pin;

use pg_escape::quote_identifier;
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use ripple_api::{Batch, BatchSink, Record, SinkError, Stored};

/// Rows per INSERT statement. Two bind parameters per row keeps a full chunk
/// well under the protocol limit of 65 535 parameters.
pub const INSERT_CHUNK_SIZE: usize = 16_384;

// ═══════════════════════════════════════════════════════════════
//  PostgresSinkConfig
// ═══════════════════════════════════════════════════════════════

fn default_table() -> String {
    "noises".into()
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PostgresSinkConfig {
    /// libpq-style connection string or `postgres://` URL.
    pub dsn: String,
    /// Target table, optionally schema-qualified (`schema.table`).
    #[serde(default = "default_table")]
    pub table: String,
    /// Run `CREATE TABLE IF NOT EXISTS` during init.
    #[serde(default)]
    pub create_table: bool,
}

// ═══════════════════════════════════════════════════════════════
//  PostgresSink
// ═══════════════════════════════════════════════════════════════

/// Batch sink writing `(noise, time)` rows into one table.
///
/// Все pipeline'ы делят один `Client`; mutex сериализует транзакции, так что
/// batch'и разных соединений не перемешиваются внутри одной транзакции.
pub struct PostgresSink {
    config: PostgresSinkConfig,
    /// Quoted, ready to splice into SQL.
    table: String,
    client: Mutex<Option<Client>>,
}

impl PostgresSink {
    pub fn new(config: PostgresSinkConfig) -> Result<Self, SinkError> {
        let table = quote_table(&config.table)?;
        Ok(Self {
            config,
            table,
            client: Mutex::new(None),
        })
    }

    async fn connect(&self) -> Result<Client, SinkError> {
        let pg: tokio_postgres::Config = self
            .config
            .dsn
            .parse()
            .map_err(|e| SinkError::config(format!("invalid dsn: {e}")))?;
        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| SinkError::connect(format!("connection failed: {e}")))?;

        let table = self.config.table.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(table = %table, error = %e, "postgres connection error");
            }
        });

        Ok(client)
    }
}

impl BatchSink for PostgresSink {
    fn name(&self) -> &str {
        "postgres"
    }

    fn init(&self) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        Box::pin(async {
            let client = self.connect().await?;

            if self.config.create_table {
                let sql = create_table_statement(&self.table);
                client
                    .batch_execute(&sql)
                    .await
                    .map_err(|e| map_pg_error(e).with_context(format!("create table {}", self.table)))?;
            }

            client
                .query_one("SELECT 1", &[])
                .await
                .map_err(|e| map_pg_error(e).with_context("connection test"))?;

            tracing::info!(table = %self.table, create_table = self.config.create_table, "postgres sink connected");
            *self.client.lock().await = Some(client);
            Ok(())
        })
    }

    fn persist<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = Result<Stored, SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let mut guard = self.client.lock().await;
            let client = guard
                .as_mut()
                .ok_or_else(|| SinkError::closed("postgres sink used before init"))?;
            if client.is_closed() {
                return Err(SinkError::closed("postgres connection is closed"));
            }

            let tx = client.transaction().await.map_err(map_pg_error)?;
            for (i, chunk) in batch.records().chunks(INSERT_CHUNK_SIZE).enumerate() {
                let sql = insert_statement(&self.table, chunk.len());
                let params = bind_params(chunk);
                tx.execute(sql.as_str(), &params).await.map_err(|e| {
                    let first = i * INSERT_CHUNK_SIZE;
                    map_pg_error(e).with_context(format!(
                        "insert into {} rows {}-{}",
                        self.table,
                        first,
                        first + chunk.len()
                    ))
                })?;
            }
            tx.commit().await.map_err(|e| map_pg_error(e).with_context("commit"))?;

            tracing::debug!(table = %self.table, window = batch.window(), rows = batch.len(), "batch committed");
            Ok(Stored {
                count: batch.len(),
                target: self.config.table.clone(),
            })
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  SQL helpers
// ═══════════════════════════════════════════════════════════════

/// Quote `table` or `schema.table` as SQL identifiers.
fn quote_table(table: &str) -> Result<String, SinkError> {
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(SinkError::config(format!("invalid table name '{table}'")));
    }
    Ok(parts
        .iter()
        .map(|p| quote_identifier(p))
        .collect::<Vec<_>>()
        .join("."))
}

fn create_table_statement(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} (noise REAL NOT NULL, time BIGINT NOT NULL)")
}

/// `INSERT INTO t (noise, time) VALUES ($1, $2), ($3, $4), ...` for `rows` rows.
fn insert_statement(table: &str, rows: usize) -> String {
    let header = format!("INSERT INTO {table} (noise, time) VALUES ");
    let mut sql = String::with_capacity(header.len() + rows * 16);
    sql.push_str(&header);
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        let p = row * 2 + 1;
        sql.push_str(&format!("(${}, ${})", p, p + 1));
    }
    sql
}

fn bind_params(rows: &[Record]) -> Vec<&(dyn ToSql + Sync)> {
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(rows.len() * 2);
    for r in rows {
        params.push(&r.value);
        params.push(&r.timestamp);
    }
    params
}

fn map_pg_error(e: tokio_postgres::Error) -> SinkError {
    if e.is_closed() {
        SinkError::closed(e.to_string())
    } else if let Some(db) = e.as_db_error() {
        SinkError::query(format!("{} ({})", db.message(), db.code().code()))
    } else {
        SinkError::connect(e.to_string())
    }
}
