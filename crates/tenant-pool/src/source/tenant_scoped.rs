//! Tenant-scoped connection source.
//!
//! Wraps a shared pool and tags every acquired connection with the schema (or
//! catalog) of the tenant it is acquired for.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{ConnectionResult, TenantError};
use crate::strategy::{SchemaScope, TenantSchemaProvider};
use crate::tenant::{CurrentTenantProvider, TenantId};

use super::{ConnectionSource, Lifecycle, LogWriter, ManagedPool, SourceState};

/// A connection source that sets the tenant's schema on every connection.
///
/// # Acquisition
///
/// For each acquisition the source:
///
/// 1. Takes the tenant (explicit, or from the [`CurrentTenantProvider`])
/// 2. Resolves its schema through the [`TenantSchemaProvider`], exactly once
/// 3. Acquires a raw connection from the wrapped pool
/// 4. Applies the schema (or catalog) to it
///
/// The connection only reaches the caller after step 4 succeeds. If step 4
/// fails, or the acquiring future is dropped while it runs, the raw connection
/// is dropped and therefore returned to the pool. Tenants without a schema
/// fail at step 2 with [`TenantError::NoMapping`] before any pool access.
///
/// # Pass-through
///
/// Credential-based acquisition, login timeout, log writer, parent logger and
/// capability unwrap queries go straight to the wrapped pool.
///
/// # Example
///
/// ```no_run
/// # #[cfg(feature = "sqlite")]
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
///
/// use helios_tenant_pool::backends::sqlite::{SqlitePool, SqlitePoolConfig};
/// use helios_tenant_pool::source::{TenantConnection, TenantScopedSource};
/// use helios_tenant_pool::strategy::MappedSchemaResolver;
/// use helios_tenant_pool::tenant::{ScopedTenantProvider, TenantId};
///
/// let pool = SqlitePool::new(
///     SqlitePoolConfig::in_memory()
///         .with_attached("schema_acme", ":memory:")
///         .with_attached("schema_globex", ":memory:"),
/// )?;
/// let resolver = MappedSchemaResolver::new()
///     .with_mapping("acme", "schema_acme")
///     .with_mapping("globex", "schema_globex");
/// let source = TenantScopedSource::new(pool, Arc::new(ScopedTenantProvider), Arc::new(resolver));
///
/// let conn = source.connection_for_tenant(&TenantId::new("acme")).await?;
/// assert_eq!(conn.schema(), Some("schema_acme"));
/// # Ok(())
/// # }
/// ```
pub struct TenantScopedSource<S: ConnectionSource> {
    inner: S,
    tenant_provider: Arc<dyn CurrentTenantProvider>,
    schema_resolver: Arc<dyn TenantSchemaProvider>,
    scope: SchemaScope,
    lifecycle: Lifecycle,
}

impl<S: ConnectionSource> Debug for TenantScopedSource<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantScopedSource")
            .field("inner", &self.inner)
            .field("scope", &self.scope)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl<S: ConnectionSource> TenantScopedSource<S> {
    /// Wraps `inner`, tagging connections with the tenant's schema.
    pub fn new(
        inner: S,
        tenant_provider: Arc<dyn CurrentTenantProvider>,
        schema_resolver: Arc<dyn TenantSchemaProvider>,
    ) -> Self {
        Self {
            inner,
            tenant_provider,
            schema_resolver,
            scope: SchemaScope::Schema,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Selects whether the resolved name is applied as schema or catalog.
    pub fn with_scope(mut self, scope: SchemaScope) -> Self {
        self.scope = scope;
        self
    }

    /// Returns the scope resolved names are applied to.
    pub fn scope(&self) -> SchemaScope {
        self.scope
    }

    /// Returns the wrapped pool.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns whether the source is open or closed.
    pub fn state(&self) -> SourceState {
        self.lifecycle.state()
    }

    /// Returns this source as a generic connection source handle.
    pub fn data_source(&self) -> &Self {
        self
    }

    /// Acquires a connection for the tenant of the calling context.
    ///
    /// Equivalent to `connection_for_tenant(provider.current_id())`; fails with
    /// [`TenantError::Missing`] when the provider has no tenant.
    pub async fn connection(&self) -> ConnectionResult<S::Connection> {
        self.lifecycle.ensure_open()?;
        let tenant_id = self.tenant_provider.current_id().ok_or(TenantError::Missing)?;
        self.connection_for_tenant(&tenant_id).await
    }

    /// Acquires a connection tagged with the schema of `tenant_id`.
    pub async fn connection_for_tenant(&self, tenant_id: &TenantId) -> ConnectionResult<S::Connection> {
        self.lifecycle.ensure_open()?;

        let schema = self
            .schema_resolver
            .schema(tenant_id)
            .ok_or_else(|| TenantError::NoMapping {
                tenant_id: tenant_id.clone(),
            })?;

        let mut conn = self.inner.acquire().await?;

        // Dropping `conn` on the error path hands it back to the pool.
        if let Err(err) = self.scope.apply(&mut conn, &schema).await {
            warn!(
                tenant = %tenant_id,
                scope = %self.scope,
                name = %schema,
                error = %err,
                "Releasing connection after failed tenant tagging"
            );
            return Err(err);
        }

        debug!(
            tenant = %tenant_id,
            scope = %self.scope,
            name = %schema,
            source = self.inner.name(),
            "Acquired tenant connection"
        );
        Ok(conn)
    }
}

#[async_trait]
impl<S: ConnectionSource> ConnectionSource for TenantScopedSource<S> {
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

impl<S: ConnectionSource> ManagedPool for TenantScopedSource<S> {
    fn shutdown(&self, deregister_driver: bool) {
        if !self.lifecycle.close() {
            debug!(source = self.inner.name(), "Tenant source already shut down");
            return;
        }

        match self.inner.as_managed() {
            Some(pool) => {
                info!(
                    source = self.inner.name(),
                    deregister_driver, "Shutting down tenant source pool"
                );
                pool.shutdown(deregister_driver);
            }
            None => {
                debug!(
                    source = self.inner.name(),
                    "Wrapped source is not managed; nothing to shut down"
                );
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}
