//! Connection source abstraction.
//!
//! [`ConnectionSource`] is the capability surface shared by plain pools and by
//! the tenant-routing decorator, so the two compose and substitute freely:
//! a [`TenantScopedSource`] wraps any source and is itself a source.
//!
//! The surface mirrors what callers expect from a generic data source:
//!
//! - default and credential-based acquisition
//! - login timeout and log writer accessors
//! - capability unwrap queries through [`ConnectionSourceExt`]
//! - an optional parent logger, unsupported unless a source provides one
//!
//! Sources that own physical resources also implement [`ManagedPool`], which
//! is how shutdown reaches them.

mod lifecycle;
mod metadata;
mod tenant_scoped;

pub use lifecycle::{Lifecycle, SourceState};
pub use metadata::{LogWriter, LogWriterSlot, LoginTimeout};
pub use tenant_scoped::TenantScopedSource;

use std::any::Any;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ConnectionError, ConnectionResult};
use crate::strategy::SchemaScope;

/// A live connection that can be pointed at a schema or catalog.
///
/// Connections are returned to their pool when dropped.
#[async_trait]
pub trait TenantConnection: Send + 'static {
    /// Sets the active schema.
    async fn set_schema(&mut self, schema: &str) -> ConnectionResult<()>;

    /// Sets the active catalog.
    async fn set_catalog(&mut self, catalog: &str) -> ConnectionResult<()>;

    /// Returns the active schema, if one was set.
    fn schema(&self) -> Option<&str>;

    /// Returns the active catalog, if one was set.
    fn catalog(&self) -> Option<&str>;
}

impl SchemaScope {
    /// Applies `name` to the connection attribute this scope selects.
    pub async fn apply<C: TenantConnection>(&self, conn: &mut C, name: &str) -> ConnectionResult<()> {
        match self {
            SchemaScope::Schema => conn.set_schema(name).await,
            SchemaScope::Catalog => conn.set_catalog(name).await,
        }
    }

    /// Reads the connection attribute this scope selects.
    pub fn current<'a, C: TenantConnection>(&self, conn: &'a C) -> Option<&'a str> {
        match self {
            SchemaScope::Schema => conn.schema(),
            SchemaScope::Catalog => conn.catalog(),
        }
    }
}

/// Anything that hands out connections.
///
/// Implemented by the concrete pools in [`crate::backends`], by
/// [`TenantScopedSource`] and by [`crate::supplier::DataSourceSupplier`].
#[async_trait]
pub trait ConnectionSource: Send + Sync + Debug + 'static {
    /// The connection type handed out.
    type Connection: TenantConnection;

    /// Returns a human-readable name for this source.
    fn name(&self) -> &str;

    /// Acquires a connection.
    async fn acquire(&self) -> ConnectionResult<Self::Connection>;

    /// Acquires a connection authenticated with explicit credentials.
    async fn acquire_with_credentials(
        &self,
        user: &str,
        password: &str,
    ) -> ConnectionResult<Self::Connection>;

    /// Returns how long acquisition waits for a connection.
    fn login_timeout(&self) -> Duration;

    /// Sets how long acquisition waits for a connection.
    fn set_login_timeout(&self, timeout: Duration);

    /// Returns the log writer, if one is set.
    fn log_writer(&self) -> Option<LogWriter>;

    /// Sets or clears the log writer.
    fn set_log_writer(&self, writer: Option<LogWriter>);

    /// Returns the name of the parent logger.
    fn parent_logger(&self) -> ConnectionResult<&str> {
        Err(ConnectionError::unsupported("parent logger", self.name()))
    }

    /// Returns the innermost value for capability unwrap queries.
    fn wrapped(&self) -> &dyn Any;

    /// Returns the shutdown handle if this source owns managed resources.
    fn as_managed(&self) -> Option<&dyn ManagedPool> {
        None
    }
}

/// Capability unwrap queries on any [`ConnectionSource`].
pub trait ConnectionSourceExt: ConnectionSource {
    /// Returns `true` if this source is, or wraps, a `T`.
    fn is_wrapper_for<T: Any>(&self) -> bool {
        self.wrapped().is::<T>()
    }

    /// Returns the wrapped `T`.
    fn unwrap_source<T: Any>(&self) -> ConnectionResult<&T> {
        self.wrapped()
            .downcast_ref::<T>()
            .ok_or(ConnectionError::NotAWrapper {
                type_name: std::any::type_name::<T>(),
            })
    }
}

impl<S: ConnectionSource + ?Sized> ConnectionSourceExt for S {}

/// A source that owns resources needing an explicit shutdown.
pub trait ManagedPool: Send + Sync {
    /// Shuts the source down. Calls after the first are no-ops.
    fn shutdown(&self, deregister_driver: bool);

    /// Returns `true` once the source has been shut down.
    fn is_closed(&self) -> bool;
}

/// Pool occupancy statistics.
pub trait PoolStats {
    /// Returns the number of connections checked out.
    fn active_connections(&self) -> u32;

    /// Returns the number of idle connections.
    fn idle_connections(&self) -> u32;

    /// Returns the maximum pool size.
    fn max_connections(&self) -> u32;
}
