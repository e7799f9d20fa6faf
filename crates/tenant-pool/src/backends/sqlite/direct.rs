//! Unpooled SQLite source.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::warn;

use crate::error::{ConnectionError, ConnectionResult, PoolError};
use crate::source::{ConnectionSource, LogWriter, LogWriterSlot, LoginTimeout};

use super::{AttachedDatabase, SqliteConnection, SqlitePoolConfig};

/// Opens a new SQLite connection for every acquisition.
///
/// There is no pool behind this source, so it is not a
/// [`ManagedPool`](crate::source::ManagedPool) and shutdown through a
/// wrapping source does nothing. The login timeout starts at the configured
/// connection timeout and is used as the busy timeout of each new connection.
pub struct SqliteDirectSource {
    name: String,
    path: String,
    attached: Arc<[AttachedDatabase]>,
    login_timeout: LoginTimeout,
    log_writer: LogWriterSlot,
}

impl Debug for SqliteDirectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDirectSource")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("attached", &self.attached)
            .finish_non_exhaustive()
    }
}

impl SqliteDirectSource {
    /// Creates a source from the same configuration the pool uses.
    ///
    /// Pool sizing options are ignored.
    pub fn new(config: SqlitePoolConfig) -> Self {
        Self {
            name: config.name,
            path: config.path,
            attached: config.attached.into(),
            login_timeout: LoginTimeout::new(Duration::from_millis(config.connection_timeout_ms)),
            log_writer: LogWriterSlot::default(),
        }
    }

    fn open(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.login_timeout.get())?;
        Ok(conn)
    }
}

#[async_trait]
impl ConnectionSource for SqliteDirectSource {
    type Connection = SqliteConnection;

    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> ConnectionResult<SqliteConnection> {
        match self.open() {
            Ok(conn) => Ok(SqliteConnection::direct(conn, self.attached.clone())),
            Err(e) => {
                warn!(source = %self.name, error = %e, "SQLite open failed");
                self.log_writer
                    .write_line(&format!("{}: open failed: {}", self.name, e));
                Err(PoolError::ConnectionFailed {
                    pool_name: self.name.clone(),
                    message: e.to_string(),
                }
                .into())
            }
        }
    }

    async fn acquire_with_credentials(
        &self,
        _user: &str,
        _password: &str,
    ) -> ConnectionResult<SqliteConnection> {
        Err(ConnectionError::unsupported(
            "credential-based acquisition",
            self.name(),
        ))
    }

    fn login_timeout(&self) -> Duration {
        self.login_timeout.get()
    }

    fn set_login_timeout(&self, timeout: Duration) {
        self.login_timeout.set(timeout);
    }

    fn log_writer(&self) -> Option<LogWriter> {
        self.log_writer.get()
    }

    fn set_log_writer(&self, writer: Option<LogWriter>) {
        self.log_writer.set(writer);
    }

    fn wrapped(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TenantConnection;

    #[tokio::test]
    async fn test_direct_connections_are_independent() {
        let source = SqliteDirectSource::new(
            SqlitePoolConfig::in_memory().with_attached("schema_acme", ":memory:"),
        );

        let mut a = source.acquire().await.unwrap();
        a.set_schema("schema_acme").await.unwrap();
        a.execute_batch("CREATE TABLE schema_acme.t (x INTEGER)").unwrap();

        // A fresh in-memory connection does not see the other one's tables.
        let mut b = source.acquire().await.unwrap();
        assert_eq!(b.schema(), None);
        b.set_schema("schema_acme").await.unwrap();
        let count: i64 = b
            .query_row(
                "SELECT COUNT(*) FROM schema_acme.sqlite_master WHERE name = 't'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_login_timeout_starts_at_connection_timeout() {
        let source = SqliteDirectSource::new(
            SqlitePoolConfig::in_memory().with_connection_timeout(Duration::from_millis(750)),
        );
        assert_eq!(source.login_timeout(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_direct_source_is_not_managed() {
        let source = SqliteDirectSource::new(SqlitePoolConfig::in_memory());
        assert!(source.as_managed().is_none());
        assert!(source.parent_logger().is_err());
    }

    #[tokio::test]
    async fn test_open_failure_is_connection_failed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no/such/dir/db.sqlite");
        let source = SqliteDirectSource::new(SqlitePoolConfig::file(missing));

        let err = source.acquire().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Pool(PoolError::ConnectionFailed { .. })
        ));
    }
}
