//! Helios Tenant Connection Pool
//!
//! This crate provides tenant-aware connection provisioning: a thin layer over
//! a shared connection pool that tags every acquired connection with the
//! schema (or catalog) belonging to the tenant the connection is acquired for.
//!
//! # Features
//!
//! - **Tenant tagging**: Connections arrive with the tenant's schema already set
//! - **Pluggable lookup**: Current-tenant providers and schema resolvers are traits
//! - **Tenancy modes**: None, partition, schema, catalog and database-per-tenant
//! - **Pass-through metadata**: Login timeout, log writer and capability unwrap
//!   go straight to the underlying pool
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! helios-tenant-pool = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! Available backend features:
//! - `sqlite` (default) - r2d2 pool over rusqlite; schemas are attached databases
//! - `postgres` - deadpool-postgres pool; schemas set through `search_path`
//!
//! # Architecture
//!
//! - [`tenant`] - Tenant identifiers and current-tenant providers
//! - [`strategy`] - Tenancy modes and schema resolvers
//! - [`source`] - The connection source abstraction and the tenant-scoped decorator
//! - [`supplier`] - Per-mode front door
//! - [`config`] - Serializable tenancy configuration
//! - [`backends`] - Concrete pools
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use helios_tenant_pool::backends::sqlite::{SqlitePool, SqlitePoolConfig};
//! use helios_tenant_pool::config::TenancyConfig;
//! use helios_tenant_pool::strategy::TenantMode;
//! use helios_tenant_pool::{DataSourceSupplier, ScopedTenantProvider, TenantConnection, TenantId};
//!
//! let config = TenancyConfig::new(TenantMode::Schema)
//!     .with_schema("acme", "schema_acme")
//!     .with_schema("globex", "schema_globex");
//!
//! let pool = SqlitePool::new(
//!     SqlitePoolConfig::file("./data/shared.db")
//!         .with_attached("schema_acme", "./data/acme.db")
//!         .with_attached("schema_globex", "./data/globex.db"),
//! )?;
//!
//! let supplier = DataSourceSupplier::from_mode(config.mode)
//!     .pool(pool)
//!     .tenant_provider(Arc::new(ScopedTenantProvider))
//!     .schema_resolver(config.schema_resolver()?)
//!     .build()?;
//!
//! // At the request entry point, bind the tenant for the request's lifetime.
//! let conn = ScopedTenantProvider::scope(TenantId::new("acme"), supplier.connection()).await?;
//! assert_eq!(conn.schema(), Some("schema_acme"));
//! # Ok(())
//! # }
//! ```
//!
//! # Failure Semantics
//!
//! A connection is only handed out once its schema has been applied. If the
//! tenant has no mapping, acquisition fails before the pool is touched; if the
//! driver rejects the schema, the raw connection goes back to the pool and the
//! error is returned. Pool errors (exhaustion, connectivity) pass through
//! unchanged.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod error;
pub mod source;
pub mod strategy;
pub mod supplier;
pub mod tenant;

// Re-export commonly used types at crate root
pub use error::{ConfigError, ConnectionError, ConnectionResult, PoolError, TenantError};
pub use tenant::{CurrentTenantProvider, FixedTenantProvider, ScopedTenantProvider, TenantId};

// Re-export the connection source abstraction
pub use source::{
    ConnectionSource, ConnectionSourceExt, ManagedPool, PoolStats, TenantConnection,
    TenantScopedSource,
};

// Re-export tenancy modes and resolvers
pub use strategy::{
    CachingSchemaResolver, IsolationLevel, MappedSchemaResolver, PrefixSchemaResolver,
    SchemaPerTenantConfig, SchemaScope, StaticDataSourceProvider, TenantDataSourceProvider,
    TenantMode, TenantSchemaProvider,
};

pub use config::TenancyConfig;
pub use supplier::DataSourceSupplier;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
