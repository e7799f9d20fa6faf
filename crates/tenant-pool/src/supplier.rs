//! Per-mode connection supplier.
//!
//! [`DataSourceSupplier`] is the front door the persistence layer talks to.
//! It is assembled once at startup from a [`TenantMode`] and the components
//! that mode needs, and from then on hands out connections:
//!
//! - `none` and `partition` share one pool and pass connections through
//! - `schema` and `catalog` share one pool and tag every connection through
//!   a [`TenantScopedSource`]
//! - `db` looks up a separate pool per tenant through a
//!   [`TenantDataSourceProvider`]
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use helios_tenant_pool::backends::sqlite::{SqlitePool, SqlitePoolConfig};
//! use helios_tenant_pool::source::ManagedPool;
//! use helios_tenant_pool::strategy::{MappedSchemaResolver, TenantMode};
//! use helios_tenant_pool::supplier::DataSourceSupplier;
//! use helios_tenant_pool::tenant::{ScopedTenantProvider, TenantId};
//!
//! let pool = SqlitePool::new(SqlitePoolConfig::in_memory().with_attached("schema_acme", ":memory:"))?;
//! let supplier = DataSourceSupplier::from_mode(TenantMode::Schema)
//!     .pool(pool)
//!     .tenant_provider(Arc::new(ScopedTenantProvider))
//!     .schema_resolver(Arc::new(MappedSchemaResolver::new().with_mapping("acme", "schema_acme")))
//!     .build()?;
//!
//! let conn = supplier.connection_for_tenant(&TenantId::new("acme")).await?;
//! drop(conn);
//! supplier.shutdown(false);
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{ConfigError, ConnectionResult, TenantError};
use crate::source::{
    ConnectionSource, Lifecycle, LogWriter, LogWriterSlot, LoginTimeout, ManagedPool, SourceState,
    TenantScopedSource,
};
use crate::strategy::{SchemaScope, TenantDataSourceProvider, TenantMode, TenantSchemaProvider};
use crate::tenant::{CurrentTenantProvider, TenantId};

/// Default column name used to partition shared tables by tenant.
pub const DEFAULT_PARTITION_COLUMN: &str = "tenant_id";

/// Hands out connections according to the configured [`TenantMode`].
#[derive(Debug)]
pub enum DataSourceSupplier<S: ConnectionSource> {
    /// `none` and `partition`: one shared pool, connections passed through.
    Shared(SharedSource<S>),
    /// `schema` and `catalog`: one shared pool, connections tagged per tenant.
    Scoped(TenantScopedSource<S>),
    /// `db`: one pool per tenant.
    PerTenant(PerTenantSource<S>),
}

impl<S: ConnectionSource> DataSourceSupplier<S> {
    /// Starts assembling a supplier for `mode`.
    pub fn from_mode(mode: TenantMode) -> DataSourceSupplierBuilder<S> {
        DataSourceSupplierBuilder::new(mode)
    }

    /// Returns the tenancy mode this supplier serves.
    pub fn mode(&self) -> TenantMode {
        match self {
            DataSourceSupplier::Shared(source) => source.mode,
            DataSourceSupplier::Scoped(source) => match source.scope() {
                SchemaScope::Schema => TenantMode::Schema,
                SchemaScope::Catalog => TenantMode::Catalog,
            },
            DataSourceSupplier::PerTenant(_) => TenantMode::Db,
        }
    }

    /// Returns the tenant column for `partition` mode.
    pub fn partition_column(&self) -> Option<&str> {
        match self {
            DataSourceSupplier::Shared(source) => source.partition_column.as_deref(),
            _ => None,
        }
    }

    /// Returns the supplier as its data source.
    pub fn data_source(&self) -> &Self {
        self
    }

    /// Acquires a connection for the tenant of the calling context.
    pub async fn connection(&self) -> ConnectionResult<S::Connection> {
        match self {
            DataSourceSupplier::Shared(source) => source.connection().await,
            DataSourceSupplier::Scoped(source) => source.connection().await,
            DataSourceSupplier::PerTenant(source) => source.connection().await,
        }
    }

    /// Acquires a connection for an explicit tenant.
    pub async fn connection_for_tenant(&self, tenant_id: &TenantId) -> ConnectionResult<S::Connection> {
        match self {
            DataSourceSupplier::Shared(source) => source.connection_for_tenant(tenant_id).await,
            DataSourceSupplier::Scoped(source) => source.connection_for_tenant(tenant_id).await,
            DataSourceSupplier::PerTenant(source) => source.connection_for_tenant(tenant_id).await,
        }
    }

    fn as_source(&self) -> &dyn ConnectionSource<Connection = S::Connection> {
        match self {
            DataSourceSupplier::Shared(source) => source,
            DataSourceSupplier::Scoped(source) => source,
            DataSourceSupplier::PerTenant(source) => source,
        }
    }

    fn as_pool(&self) -> &dyn ManagedPool {
        match self {
            DataSourceSupplier::Shared(source) => source,
            DataSourceSupplier::Scoped(source) => source,
            DataSourceSupplier::PerTenant(source) => source,
        }
    }
}

#[async_trait]
impl<S: ConnectionSource> ConnectionSource for DataSourceSupplier<S> {
    type Connection = S::Connection;

    fn name(&self) -> &str {
        self.as_source().name()
    }

    async fn acquire(&self) -> ConnectionResult<Self::Connection> {
        self.connection().await
    }

    async fn acquire_with_credentials(
        &self,
        user: &str,
        password: &str,
    ) -> ConnectionResult<Self::Connection> {
        self.as_source().acquire_with_credentials(user, password).await
    }

    fn login_timeout(&self) -> Duration {
        self.as_source().login_timeout()
    }

    fn set_login_timeout(&self, timeout: Duration) {
        self.as_source().set_login_timeout(timeout);
    }

    fn log_writer(&self) -> Option<LogWriter> {
        self.as_source().log_writer()
    }

    fn set_log_writer(&self, writer: Option<LogWriter>) {
        self.as_source().set_log_writer(writer);
    }

    fn parent_logger(&self) -> ConnectionResult<&str> {
        self.as_source().parent_logger()
    }

    fn wrapped(&self) -> &dyn Any {
        self.as_source().wrapped()
    }

    fn as_managed(&self) -> Option<&dyn ManagedPool> {
        Some(self)
    }
}

impl<S: ConnectionSource> ManagedPool for DataSourceSupplier<S> {
    fn shutdown(&self, deregister_driver: bool) {
        self.as_pool().shutdown(deregister_driver);
    }

    fn is_closed(&self) -> bool {
        self.as_pool().is_closed()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`DataSourceSupplier`], checking the mode has what it needs.
pub struct DataSourceSupplierBuilder<S: ConnectionSource> {
    mode: TenantMode,
    pool: Option<S>,
    tenant_provider: Option<Arc<dyn CurrentTenantProvider>>,
    schema_resolver: Option<Arc<dyn TenantSchemaProvider>>,
    data_source_provider: Option<Arc<dyn TenantDataSourceProvider<S>>>,
    partition_column: String,
    name: Option<String>,
}

impl<S: ConnectionSource> DataSourceSupplierBuilder<S> {
    fn new(mode: TenantMode) -> Self {
        Self {
            mode,
            pool: None,
            tenant_provider: None,
            schema_resolver: None,
            data_source_provider: None,
            partition_column: DEFAULT_PARTITION_COLUMN.to_string(),
            name: None,
        }
    }

    /// Sets the shared pool (every mode except `db`).
    pub fn pool(mut self, pool: S) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Sets the provider of the ambient tenant.
    pub fn tenant_provider(mut self, provider: Arc<dyn CurrentTenantProvider>) -> Self {
        self.tenant_provider = Some(provider);
        self
    }

    /// Sets the tenant to schema resolver (`schema` and `catalog` modes).
    pub fn schema_resolver(mut self, resolver: Arc<dyn TenantSchemaProvider>) -> Self {
        self.schema_resolver = Some(resolver);
        self
    }

    /// Sets the per-tenant pool lookup (`db` mode).
    pub fn data_source_provider(mut self, provider: Arc<dyn TenantDataSourceProvider<S>>) -> Self {
        self.data_source_provider = Some(provider);
        self
    }

    /// Sets the tenant column name (`partition` mode).
    pub fn partition_column(mut self, column: impl Into<String>) -> Self {
        self.partition_column = column.into();
        self
    }

    /// Sets the name reported by a `db` mode supplier.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the supplier.
    pub fn build(self) -> Result<DataSourceSupplier<S>, ConfigError> {
        let mode = self.mode;
        let missing = |component: &'static str| ConfigError::MissingComponent {
            mode: mode.to_string(),
            component,
        };

        let supplier = match mode {
            TenantMode::None | TenantMode::Partition => {
                let inner = self.pool.ok_or_else(|| missing("pool"))?;
                let partition_column = if mode == TenantMode::Partition {
                    if self.partition_column.trim().is_empty() {
                        return Err(ConfigError::Invalid {
                            errors: vec!["partition column must not be empty".to_string()],
                        });
                    }
                    Some(self.partition_column)
                } else {
                    None
                };
                DataSourceSupplier::Shared(SharedSource {
                    inner,
                    mode,
                    partition_column,
                    lifecycle: Lifecycle::new(),
                })
            }
            TenantMode::Schema | TenantMode::Catalog => {
                let inner = self.pool.ok_or_else(|| missing("pool"))?;
                let tenant_provider = self
                    .tenant_provider
                    .ok_or_else(|| missing("current tenant provider"))?;
                let schema_resolver = self
                    .schema_resolver
                    .ok_or_else(|| missing("schema resolver"))?;
                let scope = mode.scope().unwrap_or_default();
                DataSourceSupplier::Scoped(
                    TenantScopedSource::new(inner, tenant_provider, schema_resolver).with_scope(scope),
                )
            }
            TenantMode::Db => {
                let provider = self
                    .data_source_provider
                    .ok_or_else(|| missing("tenant data source provider"))?;
                let tenant_provider = self
                    .tenant_provider
                    .ok_or_else(|| missing("current tenant provider"))?;
                if self.pool.is_some() {
                    debug!("Ignoring shared pool in db tenant mode");
                }
                DataSourceSupplier::PerTenant(PerTenantSource::new(
                    self.name.unwrap_or_else(|| "per-tenant".to_string()),
                    provider,
                    tenant_provider,
                ))
            }
        };

        info!(mode = %mode, source = supplier.name(), "Data source supplier ready");
        Ok(supplier)
    }
}

// ============================================================================
// Shared pass-through source
// ============================================================================

/// A shared pool handed out unchanged (`none` and `partition` modes).
///
/// The tenant is not consulted: in `partition` mode the query layer adds the
/// tenant predicate on [`DataSourceSupplier::partition_column`].
#[derive(Debug)]
pub struct SharedSource<S: ConnectionSource> {
    inner: S,
    mode: TenantMode,
    partition_column: Option<String>,
    lifecycle: Lifecycle,
}

impl<S: ConnectionSource> SharedSource<S> {
    /// Returns the wrapped pool.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns whether the source is open or closed.
    pub fn state(&self) -> SourceState {
        self.lifecycle.state()
    }

    async fn connection(&self) -> ConnectionResult<S::Connection> {
        self.lifecycle.ensure_open()?;
        self.inner.acquire().await
    }

    async fn connection_for_tenant(&self, _tenant_id: &TenantId) -> ConnectionResult<S::Connection> {
        self.connection().await
    }
}

#[async_trait]
impl<S: ConnectionSource> ConnectionSource for SharedSource<S> {
    type Connection = S::Connection;

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn acquire(&self) -> ConnectionResult<Self::Connection> {
        self.connection().await
    }

    async fn acquire_with_credentials(
        &self,
        user: &str,
        password: &str,
    ) -> ConnectionResult<Self::Connection> {
        self.lifecycle.ensure_open()?;
        self.inner.acquire_with_credentials(user, password).await
    }

    fn login_timeout(&self) -> Duration {
        self.inner.login_timeout()
    }

    fn set_login_timeout(&self, timeout: Duration) {
        self.inner.set_login_timeout(timeout);
    }

    fn log_writer(&self) -> Option<LogWriter> {
        self.inner.log_writer()
    }

    fn set_log_writer(&self, writer: Option<LogWriter>) {
        self.inner.set_log_writer(writer);
    }

    fn parent_logger(&self) -> ConnectionResult<&str> {
        self.inner.parent_logger()
    }

    fn wrapped(&self) -> &dyn Any {
        self.inner.wrapped()
    }

    fn as_managed(&self) -> Option<&dyn ManagedPool> {
        Some(self)
    }
}

impl<S: ConnectionSource> ManagedPool for SharedSource<S> {
    fn shutdown(&self, deregister_driver: bool) {
        if !self.lifecycle.close() {
            debug!(source = self.inner.name(), "Shared source already shut down");
            return;
        }
        if let Some(pool) = self.inner.as_managed() {
            info!(source = self.inner.name(), deregister_driver, "Shutting down shared pool");
            pool.shutdown(deregister_driver);
        }
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

// ============================================================================
// Database-per-tenant source
// ============================================================================

/// Routes each tenant to its own pool (`db` mode).
///
/// Connections are not tagged; the pool already points at the tenant's
/// database. Login timeout and log writer settings are pushed to every pool
/// the provider knows about.
pub struct PerTenantSource<S: ConnectionSource> {
    name: String,
    provider: Arc<dyn TenantDataSourceProvider<S>>,
    tenant_provider: Arc<dyn CurrentTenantProvider>,
    login_timeout: LoginTimeout,
    log_writer: LogWriterSlot,
    lifecycle: Lifecycle,
}

impl<S: ConnectionSource> Debug for PerTenantSource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerTenantSource")
            .field("name", &self.name)
            .field("pools", &self.provider.data_sources().len())
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl<S: ConnectionSource> PerTenantSource<S> {
    /// Creates a source over the given per-tenant pools.
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn TenantDataSourceProvider<S>>,
        tenant_provider: Arc<dyn CurrentTenantProvider>,
    ) -> Self {
        let login_timeout = provider
            .data_sources()
            .first()
            .map(|pool| pool.login_timeout())
            .unwrap_or(Duration::from_secs(30));
        Self {
            name: name.into(),
            provider,
            tenant_provider,
            login_timeout: LoginTimeout::new(login_timeout),
            log_writer: LogWriterSlot::default(),
            lifecycle: Lifecycle::new(),
        }
    }

    /// Returns whether the source is open or closed.
    pub fn state(&self) -> SourceState {
        self.lifecycle.state()
    }

    async fn connection(&self) -> ConnectionResult<S::Connection> {
        self.lifecycle.ensure_open()?;
        let tenant_id = self.tenant_provider.current_id().ok_or(TenantError::Missing)?;
        self.connection_for_tenant(&tenant_id).await
    }

    async fn connection_for_tenant(&self, tenant_id: &TenantId) -> ConnectionResult<S::Connection> {
        self.lifecycle.ensure_open()?;
        let pool = self
            .provider
            .data_source(tenant_id)
            .ok_or_else(|| TenantError::NoDataSource {
                tenant_id: tenant_id.clone(),
            })?;
        let conn = pool.acquire().await?;
        debug!(tenant = %tenant_id, source = pool.name(), "Acquired tenant database connection");
        Ok(conn)
    }
}

#[async_trait]
impl<S: ConnectionSource> ConnectionSource for PerTenantSource<S> {
    type Connection = S::Connection;

    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> ConnectionResult<Self::Connection> {
        self.connection().await
    }

    async fn acquire_with_credentials(
        &self,
        user: &str,
        password: &str,
    ) -> ConnectionResult<Self::Connection> {
        self.lifecycle.ensure_open()?;
        let tenant_id = self.tenant_provider.current_id().ok_or(TenantError::Missing)?;
        let pool = self
            .provider
            .data_source(&tenant_id)
            .ok_or(TenantError::NoDataSource { tenant_id })?;
        pool.acquire_with_credentials(user, password).await
    }

    fn login_timeout(&self) -> Duration {
        self.login_timeout.get()
    }

    fn set_login_timeout(&self, timeout: Duration) {
        self.login_timeout.set(timeout);
        for pool in self.provider.data_sources() {
            pool.set_login_timeout(timeout);
        }
    }

    fn log_writer(&self) -> Option<LogWriter> {
        self.log_writer.get()
    }

    fn set_log_writer(&self, writer: Option<LogWriter>) {
        self.log_writer.set(writer.clone());
        for pool in self.provider.data_sources() {
            pool.set_log_writer(writer.clone());
        }
    }

    fn wrapped(&self) -> &dyn Any {
        self
    }

    fn as_managed(&self) -> Option<&dyn ManagedPool> {
        Some(self)
    }
}

impl<S: ConnectionSource> ManagedPool for PerTenantSource<S> {
    fn shutdown(&self, deregister_driver: bool) {
        if !self.lifecycle.close() {
            debug!(source = %self.name, "Per-tenant source already shut down");
            return;
        }
        let pools = self.provider.data_sources();
        info!(source = %self.name, pools = pools.len(), deregister_driver, "Shutting down tenant pools");
        for pool in pools {
            if let Some(managed) = pool.as_managed() {
                managed.shutdown(deregister_driver);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}
