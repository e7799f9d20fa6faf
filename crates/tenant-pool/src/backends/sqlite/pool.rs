//! r2d2-backed SQLite pool.

use std::any::Any;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, ConnectionResult, PoolError};
use crate::source::{
    ConnectionSource, Lifecycle, LogWriter, LogWriterSlot, LoginTimeout, ManagedPool, PoolStats,
};

use super::SqliteConnection;

/// A tenant database, attached under its schema name when a connection is
/// tagged for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedDatabase {
    /// Schema name the database is attached under.
    pub name: String,

    /// Database file path, or `:memory:`.
    pub path: String,
}

/// Configuration for the SQLite pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlitePoolConfig {
    /// Name used in logs and errors.
    #[serde(default = "default_name")]
    pub name: String,

    /// Main database file path, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Tenant databases, one per schema name.
    #[serde(default)]
    pub attached: Vec<AttachedDatabase>,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Checkout timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_name() -> String {
    "sqlite".to_string()
}

fn default_path() -> String {
    ":memory:".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            path: default_path(),
            attached: Vec::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_foreign_keys: true,
        }
    }
}

impl SqlitePoolConfig {
    /// Configuration for an in-memory main database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Configuration for a file-based main database.
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    /// Registers the database at `path` as the tenant schema `name`.
    pub fn with_attached(mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        self.attached.push(AttachedDatabase {
            name: name.into(),
            path: path.as_ref().to_string_lossy().into_owned(),
        });
        self
    }

    /// Sets the name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the maximum pool size.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the number of idle connections kept open.
    pub fn with_min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the checkout timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// A pooled SQLite connection source.
///
/// Checkout waits up to the login timeout for a free connection. Shutting the
/// pool down rejects later checkouts; connections already handed out stay
/// usable until dropped.
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
    config: SqlitePoolConfig,
    databases: Arc<[AttachedDatabase]>,
    login_timeout: LoginTimeout,
    log_writer: LogWriterSlot,
    lifecycle: Lifecycle,
}

impl Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool")
            .field("config", &self.config)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl SqlitePool {
    /// Creates an in-memory pool without attached databases.
    pub fn in_memory() -> ConnectionResult<Self> {
        Self::new(SqlitePoolConfig::in_memory())
    }

    /// Creates a pool with the given configuration.
    pub fn new(config: SqlitePoolConfig) -> ConnectionResult<Self> {
        let manager = if config.is_memory() {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(&config.path)
        };

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
        let enable_foreign_keys = config.enable_foreign_keys;
        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            if enable_foreign_keys {
                conn.execute_batch("PRAGMA foreign_keys = ON")?;
            }
            Ok(())
        });

        let timeout = Duration::from_millis(config.connection_timeout_ms);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections.min(config.max_connections)))
            .connection_timeout(timeout)
            .build(manager)
            .map_err(|e| PoolError::ConnectionFailed {
                pool_name: config.name.clone(),
                message: e.to_string(),
            })?;

        info!(
            pool = %config.name,
            path = %config.path,
            tenant_databases = config.attached.len(),
            max_connections = config.max_connections,
            "SQLite pool ready"
        );

        Ok(Self {
            pool,
            login_timeout: LoginTimeout::new(timeout),
            databases: config.attached.clone().into(),
            config,
            log_writer: LogWriterSlot::default(),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &SqlitePoolConfig {
        &self.config
    }

    /// Returns the tenant schema names connections can be tagged with.
    pub fn attached_schemas(&self) -> impl Iterator<Item = &str> {
        self.config.attached.iter().map(|db| db.name.as_str())
    }
}

#[async_trait]
impl ConnectionSource for SqlitePool {
    type Connection = SqliteConnection;

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn acquire(&self) -> ConnectionResult<SqliteConnection> {
        self.lifecycle.ensure_open()?;

        let timeout = self.login_timeout.get();
        let conn = match self.pool.get_timeout(timeout) {
            Ok(conn) => conn,
            Err(e) => {
                let message = format!("{}: checkout failed after {:?}: {}", self.config.name, timeout, e);
                warn!(pool = %self.config.name, error = %e, "SQLite checkout failed");
                self.log_writer.write_line(&message);
                return Err(
                    PoolError::from_r2d2(&self.config.name, timeout.as_millis() as u64, &e).into(),
                );
            }
        };

        SqliteConnection::pooled(conn, self.databases.clone()).map_err(|e| {
            warn!(pool = %self.config.name, error = %e, "Failed to reset SQLite connection");
            PoolError::Internal {
                pool_name: self.config.name.clone(),
                message: format!("failed to reset connection: {}", e),
                source: Some(Box::new(e)),
            }
            .into()
        })
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

    fn as_managed(&self) -> Option<&dyn ManagedPool> {
        Some(self)
    }
}

impl ManagedPool for SqlitePool {
    fn shutdown(&self, deregister_driver: bool) {
        if !self.lifecycle.close() {
            debug!(pool = %self.config.name, "SQLite pool already shut down");
            return;
        }
        // Idle connections close when the last handle to the pool drops.
        info!(pool = %self.config.name, deregister_driver, "SQLite pool shut down");
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

impl PoolStats for SqlitePool {
    fn active_connections(&self) -> u32 {
        let state = self.pool.state();
        state.connections - state.idle_connections
    }

    fn idle_connections(&self) -> u32 {
        self.pool.state().idle_connections
    }

    fn max_connections(&self) -> u32 {
        self.pool.max_size()
    }
}
