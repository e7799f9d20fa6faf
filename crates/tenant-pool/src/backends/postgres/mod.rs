//! PostgreSQL connection source.
//!
//! Uses a deadpool-postgres pool. Tenant schemas are selected with
//! `SET search_path`; connections are recycled with `DISCARD ALL` so a
//! returned connection never carries a previous tenant's schema.
//!
//! PostgreSQL cannot switch databases on a live connection, so setting the
//! catalog only succeeds for the database the pool already points at. Use the
//! `db` tenant mode with one pool per database instead.
//!
//! # Example
//!
//! ```no_run
//! use helios_tenant_pool::backends::postgres::{PgPool, PgPoolConfig};
//! use helios_tenant_pool::source::{ConnectionSource, TenantConnection};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::new(PgPoolConfig {
//!     host: "localhost".to_string(),
//!     dbname: "helios".to_string(),
//!     ..Default::default()
//! })?;
//!
//! let mut conn = pool.acquire().await?;
//! conn.set_schema("tenant_acme").await?;
//! conn.batch_execute("SELECT 1").await?;
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::fmt::Debug;
use std::ops::Deref;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, RecyclingMethod, Runtime, Timeouts};
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, ConnectionResult, PoolError};
use crate::source::{
    ConnectionSource, Lifecycle, LogWriter, LogWriterSlot, LoginTimeout, ManagedPool, PoolStats,
    TenantConnection,
};
use crate::strategy::{SchemaScope, escape_identifier};

/// Configuration for the PostgreSQL pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgPoolConfig {
    /// Name used in logs and errors.
    #[serde(default = "default_name")]
    pub name: String,

    /// PostgreSQL host.
    #[serde(default = "default_host")]
    pub host: String,

    /// PostgreSQL port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    #[serde(default = "default_dbname")]
    pub dbname: String,

    /// Database user.
    #[serde(default = "default_user")]
    pub user: String,

    /// Database password.
    #[serde(default)]
    pub password: Option<String>,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Checkout and connect timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_name() -> String {
    "postgres".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "helios".to_string()
}

fn default_user() -> String {
    "helios".to_string()
}

fn default_max_connections() -> usize {
    10
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

impl Default for PgPoolConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: default_user(),
            password: None,
            max_connections: default_max_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

/// Builds the statement that points a session at `schema`.
pub(crate) fn search_path_sql(schema: &str) -> String {
    format!("SET search_path TO {}", escape_identifier(schema))
}

enum PgClient {
    Pooled(Object),
    Direct(Client),
}

/// A PostgreSQL connection tagged with its tenant schema.
///
/// Dereferences to the underlying [`tokio_postgres::Client`].
pub struct PgConnection {
    client: PgClient,
    schema: Option<String>,
    catalog: Option<String>,
}

impl Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("pooled", &matches!(self.client, PgClient::Pooled(_)))
            .field("schema", &self.schema)
            .field("catalog", &self.catalog)
            .finish()
    }
}

impl PgConnection {
    fn new(client: PgClient) -> Self {
        Self {
            client,
            schema: None,
            catalog: None,
        }
    }

    fn driver_error(scope: SchemaScope, name: &str, err: tokio_postgres::Error) -> ConnectionError {
        ConnectionError::SchemaApplication {
            scope,
            name: name.to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl Deref for PgConnection {
    type Target = Client;

    fn deref(&self) -> &Client {
        match &self.client {
            PgClient::Pooled(obj) => &***obj,
            PgClient::Direct(client) => client,
        }
    }
}

#[async_trait]
impl TenantConnection for PgConnection {
    async fn set_schema(&mut self, schema: &str) -> ConnectionResult<()> {
        // search_path accepts unknown schemas silently, so check first.
        let exists = self
            .query_opt("SELECT 1 FROM pg_namespace WHERE nspname = $1", &[&schema])
            .await
            .map_err(|e| Self::driver_error(SchemaScope::Schema, schema, e))?
            .is_some();
        if !exists {
            return Err(ConnectionError::schema_application(
                SchemaScope::Schema,
                schema,
                "schema does not exist",
            ));
        }

        self.batch_execute(&search_path_sql(schema))
            .await
            .map_err(|e| Self::driver_error(SchemaScope::Schema, schema, e))?;
        self.schema = Some(schema.to_string());
        Ok(())
    }

    async fn set_catalog(&mut self, catalog: &str) -> ConnectionResult<()> {
        let row = self
            .query_one("SELECT current_database()", &[])
            .await
            .map_err(|e| Self::driver_error(SchemaScope::Catalog, catalog, e))?;
        let current: String = row.get(0);
        if current != catalog {
            return Err(ConnectionError::schema_application(
                SchemaScope::Catalog,
                catalog,
                format!("connection is bound to database '{}'", current),
            ));
        }
        self.catalog = Some(catalog.to_string());
        Ok(())
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }
}

/// A pooled PostgreSQL connection source.
pub struct PgPool {
    pool: Pool,
    config: PgPoolConfig,
    login_timeout: LoginTimeout,
    log_writer: LogWriterSlot,
    lifecycle: Lifecycle,
}

impl Debug for PgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPool")
            .field("name", &self.config.name)
            .field("host", &self.config.host)
            .field("dbname", &self.config.dbname)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl PgPool {
    /// Creates a pool. Connections are opened lazily on first checkout.
    pub fn new(config: PgPoolConfig) -> ConnectionResult<Self> {
        let timeout = Duration::from_millis(config.connection_timeout_ms);

        let mut cfg = Config::new();
        cfg.host = Some(config.host.clone());
        cfg.port = Some(config.port);
        cfg.dbname = Some(config.dbname.clone());
        cfg.user = Some(config.user.clone());
        cfg.password = config.password.clone();
        cfg.connect_timeout = Some(timeout);
        let mut manager = ManagerConfig::default();
        manager.recycling_method = RecyclingMethod::Clean;
        cfg.manager = Some(manager);

        let pool = cfg
            .builder(NoTls)
            .map_err(|e| PoolError::Internal {
                pool_name: config.name.clone(),
                message: format!("Failed to create pool builder: {}", e),
                source: None,
            })?
            .max_size(config.max_connections)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(timeout))
            .build()
            .map_err(|e| PoolError::ConnectionFailed {
                pool_name: config.name.clone(),
                message: e.to_string(),
            })?;

        info!(
            pool = %config.name,
            host = %config.host,
            dbname = %config.dbname,
            max_connections = config.max_connections,
            "PostgreSQL pool ready"
        );

        Ok(Self {
            pool,
            login_timeout: LoginTimeout::new(timeout),
            config,
            log_writer: LogWriterSlot::default(),
            lifecycle: Lifecycle::new(),
        })
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &PgPoolConfig {
        &self.config
    }

    fn checkout_failed(&self, message: &str) {
        warn!(pool = %self.config.name, error = %message, "PostgreSQL checkout failed");
        self.log_writer
            .write_line(&format!("{}: checkout failed: {}", self.config.name, message));
    }
}

#[async_trait]
impl ConnectionSource for PgPool {
    type Connection = PgConnection;

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn acquire(&self) -> ConnectionResult<PgConnection> {
        self.lifecycle.ensure_open()?;

        let timeout = self.login_timeout.get();
        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(timeout);
        timeouts.create = Some(timeout);

        match self.pool.timeout_get(&timeouts).await {
            Ok(obj) => Ok(PgConnection::new(PgClient::Pooled(obj))),
            Err(deadpool_postgres::PoolError::Closed) => Err(ConnectionError::Closed),
            Err(deadpool_postgres::PoolError::Timeout(kind)) => {
                self.checkout_failed(&format!("timed out ({:?})", kind));
                Err(PoolError::Exhausted {
                    pool_name: self.config.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into())
            }
            Err(e) => {
                self.checkout_failed(&e.to_string());
                Err(PoolError::from(e).into())
            }
        }
    }

    async fn acquire_with_credentials(
        &self,
        user: &str,
        password: &str,
    ) -> ConnectionResult<PgConnection> {
        self.lifecycle.ensure_open()?;

        let mut cfg = tokio_postgres::Config::new();
        cfg.host(&self.config.host)
            .port(self.config.port)
            .dbname(&self.config.dbname)
            .user(user)
            .password(password)
            .connect_timeout(self.login_timeout.get());

        let (client, connection) = cfg.connect(NoTls).await.map_err(|e| {
            self.checkout_failed(&e.to_string());
            PoolError::ConnectionFailed {
                pool_name: self.config.name.clone(),
                message: e.to_string(),
            }
        })?;

        let pool_name = self.config.name.clone();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(pool = %pool_name, error = %e, "Direct PostgreSQL connection closed with error");
            }
        });

        debug!(pool = %self.config.name, user, "Opened direct PostgreSQL connection");
        Ok(PgConnection::new(PgClient::Direct(client)))
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

impl ManagedPool for PgPool {
    fn shutdown(&self, deregister_driver: bool) {
        if !self.lifecycle.close() {
            debug!(pool = %self.config.name, "PostgreSQL pool already shut down");
            return;
        }
        self.pool.close();
        info!(pool = %self.config.name, deregister_driver, "PostgreSQL pool shut down");
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

impl PoolStats for PgPool {
    fn active_connections(&self) -> u32 {
        let status = self.pool.status();
        status.size.saturating_sub(status.available) as u32
    }

    fn idle_connections(&self) -> u32 {
        self.pool.status().available as u32
    }

    fn max_connections(&self) -> u32 {
        self.pool.status().max_size as u32
    }
}
