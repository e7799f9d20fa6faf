//! Error types for tenant-aware connection provisioning.
//!
//! Errors follow a small hierarchy: [`ConnectionError`] is returned by every
//! acquisition path and wraps the pool, tenant and configuration categories.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::strategy::SchemaScope;
use crate::tenant::TenantId;

/// The primary error type for connection acquisition.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Errors raised by the underlying pool, propagated unchanged.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Tenant resolution errors.
    #[error(transparent)]
    Tenant(#[from] TenantError),

    /// The driver rejected the resolved schema or catalog name.
    #[error("failed to apply {scope} '{name}': {message}")]
    SchemaApplication {
        scope: SchemaScope,
        name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The capability is not available on this connection source.
    #[error("{feature} not supported by {source_name}")]
    Unsupported {
        feature: String,
        source_name: String,
    },

    /// The connection source has been shut down.
    #[error("connection source is closed")]
    Closed,

    /// Capability unwrap requested for a type the source does not wrap.
    #[error("connection source does not wrap {type_name}")]
    NotAWrapper { type_name: &'static str },
}

impl ConnectionError {
    /// Builds a schema application error without an underlying source.
    pub fn schema_application(
        scope: SchemaScope,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ConnectionError::SchemaApplication {
            scope,
            name: name.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Builds an unsupported-capability error.
    pub fn unsupported(feature: impl Into<String>, source_name: impl Into<String>) -> Self {
        ConnectionError::Unsupported {
            feature: feature.into(),
            source_name: source_name.into(),
        }
    }

    /// Returns `true` if no tenant or no schema could be determined.
    pub fn is_unresolved_tenant(&self) -> bool {
        matches!(self, ConnectionError::Tenant(_))
    }

    /// Returns `true` if the driver rejected the schema or catalog.
    pub fn is_schema_application(&self) -> bool {
        matches!(self, ConnectionError::SchemaApplication { .. })
    }
}

/// Errors raised by the underlying pool during acquisition.
#[derive(Error, Debug)]
pub enum PoolError {
    /// No connection became available within the checkout timeout.
    #[error("connection pool exhausted for {pool_name} after {timeout_ms}ms")]
    Exhausted { pool_name: String, timeout_ms: u64 },

    /// A new physical connection could not be established.
    #[error("connection failed to {pool_name}: {message}")]
    ConnectionFailed { pool_name: String, message: String },

    /// Internal pool error.
    #[error("internal error in {pool_name}: {message}")]
    Internal {
        pool_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Errors raised while determining which tenant, and which schema, applies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TenantError {
    /// No tenant in the ambient context and none supplied explicitly.
    #[error("no current tenant and no tenant id supplied")]
    Missing,

    /// The schema resolver has no mapping for the tenant.
    #[error("no schema mapping for tenant {tenant_id}")]
    NoMapping { tenant_id: TenantId },

    /// The tenant data source provider has no pool for the tenant.
    #[error("no data source for tenant {tenant_id}")]
    NoDataSource { tenant_id: TenantId },
}

/// Errors raised while assembling a supplier from configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A component required by the tenancy mode was not provided.
    #[error("tenant mode {mode} requires a {component}")]
    MissingComponent {
        mode: String,
        component: &'static str,
    },

    /// The configuration failed validation.
    #[error("invalid tenancy configuration: {}", .errors.join("; "))]
    Invalid { errors: Vec<String> },
}

/// Result type alias for connection acquisition.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[cfg(feature = "sqlite")]
impl PoolError {
    /// Classifies an r2d2 checkout failure.
    ///
    /// r2d2 reports every failure as a timeout and appends the last
    /// connection error, if one occurred while waiting. That error means the
    /// pool could not connect; its absence means every connection was busy.
    pub(crate) fn from_r2d2(pool_name: &str, timeout_ms: u64, err: &r2d2::Error) -> Self {
        let text = err.to_string();
        let cause = text
            .strip_prefix("timed out waiting for connection")
            .and_then(|rest| rest.strip_prefix(": "));

        match cause {
            Some(message) => PoolError::ConnectionFailed {
                pool_name: pool_name.to_string(),
                message: message.to_string(),
            },
            None => PoolError::Exhausted {
                pool_name: pool_name.to_string(),
                timeout_ms,
            },
        }
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for PoolError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(e) => PoolError::ConnectionFailed {
                pool_name: "postgres".to_string(),
                message: e.to_string(),
            },
            other => PoolError::Internal {
                pool_name: "postgres".to_string(),
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}
