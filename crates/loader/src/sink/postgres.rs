//! Postgres — `tokio-postgres` backed sink writing one multi-row INSERT per page.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use super::{PageSink, SinkError, SinkFuture};
use crate::batch::LogPage;
use crate::conf::StoreConfig;
use crate::parser::LogRecord;

/// Postgres caps bind parameters per statement at `u16::MAX`.
pub const MAX_ROWS_PER_STATEMENT: usize = u16::MAX as usize / LogRecord::COLUMNS.len();

pub struct PostgresSink {
    config: StoreConfig,
    client: Mutex<Option<Arc<Client>>>,
}

impl PostgresSink {
    /// Connect eagerly so bad credentials fail at startup rather than on the
    /// first page.
    pub async fn connect(config: StoreConfig) -> Result<Self, SinkError> {
        let sink = Self {
            config,
            client: Mutex::new(None),
        };
        sink.client().await?;
        Ok(sink)
    }

    /// Live client, reconnecting if the previous connection has closed.
    async fn client(&self) -> Result<Arc<Client>, SinkError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            if !client.is_closed() {
                return Ok(Arc::clone(client));
            }
            info!(store = %self.describe(), "store connection closed, reconnecting");
        }

        let (client, connection) = self
            .config
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| SinkError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("Store connection error: {}", e);
            }
        });

        let client = Arc::new(client);
        *guard = Some(Arc::clone(&client));
        Ok(client)
    }

    async fn insert(&self, page: &LogPage) -> Result<u64, SinkError> {
        if page.is_empty() {
            return Ok(0);
        }
        if page.len() > MAX_ROWS_PER_STATEMENT {
            return Err(SinkError::Write(format!(
                "page of {} rows exceeds the {} row statement limit",
                page.len(),
                MAX_ROWS_PER_STATEMENT
            )));
        }

        let sql = insert_statement(&self.config.table, page.len());
        let params: Vec<&(dyn ToSql + Sync)> = page
            .records()
            .iter()
            .flat_map(LogRecord::values)
            .map(|value| value as &(dyn ToSql + Sync))
            .collect();

        let client = self.client().await?;
        debug!(rows = page.len(), params = params.len(), "executing bulk insert");
        Ok(client.execute(sql.as_str(), &params).await?)
    }
}

impl PageSink for PostgresSink {
    fn write_page<'a>(&'a self, page: &'a LogPage) -> SinkFuture<'a> {
        Box::pin(self.insert(page))
    }

    fn describe(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{} table={}",
            self.config.username, self.config.host, self.config.port, self.config.database, self.config.table
        )
    }
}

/// Quote an identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `INSERT INTO "table" (cols...) VALUES ($1, ...), ...` for `rows` records.
pub fn insert_statement(table: &str, rows: usize) -> String {
    let width = LogRecord::COLUMNS.len();
    let columns = LogRecord::COLUMNS
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("INSERT INTO {} ({}) VALUES ", quote_ident(table), columns);
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..width {
            if col > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&format!("${}", row * width + col + 1));
        }
        sql.push(')');
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_single_row() {
        let sql = insert_statement("iis_logs", 1);
        assert!(sql.starts_with("INSERT INTO \"iis_logs\" (\"date_time\", \"local_ip\", \"method\""));
        assert!(sql.contains("\"remoteIp\", \"userAgent\", \"refer\""));
        assert!(sql.ends_with("VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"));
    }

    #[test]
    fn test_insert_statement_numbers_placeholders_across_rows() {
        let sql = insert_statement("iis_logs", 3);
        assert_eq!(sql.matches('(').count(), 4);
        assert!(sql.contains("($15, $16,"));
        assert!(sql.ends_with("$41, $42)"));
        assert!(!sql.contains("$43"));
    }

    #[test]
    fn test_table_name_quoted() {
        let sql = insert_statement("odd\"name", 1);
        assert!(sql.starts_with("INSERT INTO \"odd\"\"name\" ("));
    }

    #[test]
    fn test_row_limit_fits_parameter_cap() {
        assert_eq!(MAX_ROWS_PER_STATEMENT, 4681);
        assert!(MAX_ROWS_PER_STATEMENT * LogRecord::COLUMNS.len() <= u16::MAX as usize);
        assert!(MAX_ROWS_PER_STATEMENT >= crate::batch::DEFAULT_PAGE_SIZE);
    }
}
