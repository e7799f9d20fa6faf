//! Tenancy modes and schema resolution.
//!
//! The [`TenantMode`] selects how a shared pool serves multiple tenants:
//!
//! | Mode | Isolation | Connection handling |
//! |------|-----------|---------------------|
//! | `none` | None | Plain pass-through |
//! | `partition` | Logical | Pass-through; the query layer filters on a tenant column |
//! | `schema` | Schema | Shared pool, schema set on every acquired connection |
//! | `catalog` | Schema | Shared pool, catalog set on every acquired connection |
//! | `db` | Physical | One pool per tenant, picked by a data source provider |
//!
//! Schema and catalog modes rely on a [`TenantSchemaProvider`] to turn a
//! tenant into a schema name:
//!
//! - [`MappedSchemaResolver`] - Static tenant to schema map
//! - [`PrefixSchemaResolver`] - `{prefix}{normalized tenant id}`
//! - [`CachingSchemaResolver`] - Memoizes another resolver
//!
//! # Example
//!
//! ```
//! use helios_tenant_pool::strategy::{MappedSchemaResolver, TenantMode, TenantSchemaProvider};
//! use helios_tenant_pool::tenant::TenantId;
//!
//! let resolver = MappedSchemaResolver::new()
//!     .with_mapping("acme", "schema_acme")
//!     .with_mapping("globex", "schema_globex");
//!
//! assert_eq!(resolver.schema(&TenantId::new("acme")).as_deref(), Some("schema_acme"));
//! assert_eq!(resolver.schema(&TenantId::new("unknown")), None);
//! assert!(TenantMode::Schema.tags_connections());
//! ```

mod database_per_tenant;
mod mapped;
mod schema_per_tenant;

pub use database_per_tenant::{StaticDataSourceProvider, TenantDataSourceProvider};
pub use mapped::{CachingSchemaResolver, MappedSchemaResolver};
pub use schema_per_tenant::{PrefixSchemaResolver, SchemaPerTenantConfig};
pub(crate) use schema_per_tenant::{default_max_schema_length, default_schema_pattern};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// The tenancy mode in effect for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenantMode {
    /// Single-tenant; connections are handed out unchanged.
    #[default]
    None,

    /// A separate pool per tenant.
    Db,

    /// Shared pool; every connection gets the tenant's schema.
    Schema,

    /// Shared pool; every connection gets the tenant's catalog.
    Catalog,

    /// Shared tables filtered by a tenant column in the query layer.
    Partition,
}

impl TenantMode {
    /// Returns `true` if acquisitions need a tenant to be known.
    pub fn requires_tenant(&self) -> bool {
        !matches!(self, TenantMode::None)
    }

    /// Returns `true` if acquired connections are tagged with a schema or catalog.
    pub fn tags_connections(&self) -> bool {
        self.scope().is_some()
    }

    /// Returns the scope applied to connections, for schema and catalog modes.
    pub fn scope(&self) -> Option<SchemaScope> {
        match self {
            TenantMode::Schema => Some(SchemaScope::Schema),
            TenantMode::Catalog => Some(SchemaScope::Catalog),
            _ => None,
        }
    }

    /// Returns the isolation level this mode provides.
    pub fn isolation_level(&self) -> IsolationLevel {
        match self {
            TenantMode::None => IsolationLevel::None,
            TenantMode::Partition => IsolationLevel::Logical,
            TenantMode::Schema | TenantMode::Catalog => IsolationLevel::Schema,
            TenantMode::Db => IsolationLevel::Physical,
        }
    }

    /// Returns true if this mode serves every tenant from one pool.
    pub fn uses_shared_pool(&self) -> bool {
        !matches!(self, TenantMode::Db)
    }
}

impl fmt::Display for TenantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantMode::None => write!(f, "none"),
            TenantMode::Db => write!(f, "db"),
            TenantMode::Schema => write!(f, "schema"),
            TenantMode::Catalog => write!(f, "catalog"),
            TenantMode::Partition => write!(f, "partition"),
        }
    }
}

impl FromStr for TenantMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(TenantMode::None),
            "db" | "database" => Ok(TenantMode::Db),
            "schema" => Ok(TenantMode::Schema),
            "catalog" => Ok(TenantMode::Catalog),
            "partition" => Ok(TenantMode::Partition),
            other => Err(format!(
                "unknown tenant mode '{}' (expected none, db, schema, catalog or partition)",
                other
            )),
        }
    }
}

/// Level of tenant isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// No tenant isolation.
    None,
    /// Logical isolation via a tenant column.
    Logical,
    /// Schema-level isolation.
    Schema,
    /// Physical isolation via separate databases.
    Physical,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::None => write!(f, "none"),
            IsolationLevel::Logical => write!(f, "logical"),
            IsolationLevel::Schema => write!(f, "schema"),
            IsolationLevel::Physical => write!(f, "physical"),
        }
    }
}

/// Which connection attribute a resolved name is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchemaScope {
    /// The active schema (PostgreSQL `search_path`, SQLite attached database).
    #[default]
    Schema,
    /// The active catalog.
    Catalog,
}

impl fmt::Display for SchemaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaScope::Schema => write!(f, "schema"),
            SchemaScope::Catalog => write!(f, "catalog"),
        }
    }
}

/// Maps a tenant to the schema or catalog that holds its data.
///
/// Called exactly once per tagged acquisition, concurrently from many tasks.
/// Implementations should be pure; any cache needs its own synchronization.
/// Returning `None` means the tenant has no mapping and the acquisition fails.
pub trait TenantSchemaProvider: Send + Sync {
    /// Returns the schema name for the tenant, if one exists.
    fn schema(&self, tenant_id: &TenantId) -> Option<String>;
}

impl<F> TenantSchemaProvider for F
where
    F: Fn(&TenantId) -> Option<String> + Send + Sync,
{
    fn schema(&self, tenant_id: &TenantId) -> Option<String> {
        self(tenant_id)
    }
}

/// Quotes an SQL identifier (schema name, database alias).
pub fn escape_identifier(id: &str) -> String {
    format!("\"{}\"", id.replace('"', "\"\""))
}
