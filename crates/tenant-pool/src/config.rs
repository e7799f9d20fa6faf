//! Tenancy configuration.
//!
//! [`TenancyConfig`] is the serializable description of how a server splits
//! its data between tenants. It is usually embedded in a larger server
//! configuration and turned into a [`crate::supplier::DataSourceSupplier`] at
//! startup.
//!
//! # Example
//!
//! ```
//! use helios_tenant_pool::config::TenancyConfig;
//! use helios_tenant_pool::strategy::TenantMode;
//! use helios_tenant_pool::tenant::TenantId;
//!
//! let config = TenancyConfig::new(TenantMode::Schema)
//!     .with_schema("acme", "schema_acme")
//!     .with_schema_prefix("tenant_");
//! assert!(config.validate().is_ok());
//!
//! let resolver = config.schema_resolver().unwrap();
//! assert_eq!(resolver.schema(&TenantId::new("acme")).as_deref(), Some("schema_acme"));
//! assert_eq!(resolver.schema(&TenantId::new("globex")).as_deref(), Some("tenant_globex"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::strategy::{
    MappedSchemaResolver, PrefixSchemaResolver, SchemaPerTenantConfig, TenantMode,
    TenantSchemaProvider, default_max_schema_length, default_schema_pattern,
};
use crate::supplier::DEFAULT_PARTITION_COLUMN;

/// How a server separates tenant data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// The tenancy mode.
    #[serde(default)]
    pub mode: TenantMode,

    /// Tenant column for `partition` mode.
    #[serde(default = "default_partition_column")]
    pub partition_column: String,

    /// Explicit tenant to schema (or catalog) names.
    #[serde(default)]
    pub schemas: BTreeMap<String, String>,

    /// Prefix for derived names, used for tenants missing from `schemas`.
    #[serde(default)]
    pub schema_prefix: Option<String>,

    /// Maximum schema name length.
    #[serde(default = "default_max_schema_length")]
    pub max_schema_length: usize,

    /// Pattern every schema name must match.
    #[serde(default = "default_schema_pattern")]
    pub schema_pattern: String,
}

fn default_partition_column() -> String {
    DEFAULT_PARTITION_COLUMN.to_string()
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            mode: TenantMode::default(),
            partition_column: default_partition_column(),
            schemas: BTreeMap::new(),
            schema_prefix: None,
            max_schema_length: default_max_schema_length(),
            schema_pattern: default_schema_pattern(),
        }
    }
}

impl TenancyConfig {
    /// Creates a configuration for `mode` with defaults.
    pub fn new(mode: TenantMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Adds an explicit tenant to schema mapping.
    pub fn with_schema(mut self, tenant_id: impl Into<String>, schema: impl Into<String>) -> Self {
        self.schemas.insert(tenant_id.into(), schema.into());
        self
    }

    /// Derives names for unmapped tenants from `prefix`.
    pub fn with_schema_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.schema_prefix = Some(prefix.into());
        self
    }

    /// Sets the tenant column for `partition` mode.
    pub fn with_partition_column(mut self, column: impl Into<String>) -> Self {
        self.partition_column = column.into();
        self
    }

    /// Sets the maximum schema name length.
    pub fn with_max_schema_length(mut self, max: usize) -> Self {
        self.max_schema_length = max;
        self
    }

    /// Sets the pattern schema names must match.
    pub fn with_schema_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.schema_pattern = pattern.into();
        self
    }

    /// Validates the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let pattern = match regex::Regex::new(&self.schema_pattern) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                errors.push(format!("schema_pattern '{}' is invalid: {}", self.schema_pattern, e));
                None
            }
        };

        if self.max_schema_length == 0 {
            errors.push("max_schema_length must be greater than 0".to_string());
        }

        match self.mode {
            TenantMode::Schema | TenantMode::Catalog => {
                if self.schemas.is_empty() && self.schema_prefix.is_none() {
                    errors.push(format!(
                        "tenant mode {} needs schemas or a schema_prefix",
                        self.mode
                    ));
                }
            }
            TenantMode::Partition => {
                if self.partition_column.trim().is_empty() {
                    errors.push("partition_column must not be empty".to_string());
                }
            }
            TenantMode::None | TenantMode::Db => {}
        }

        for (tenant, schema) in &self.schemas {
            if tenant.is_empty() {
                errors.push(format!("schema '{}' is mapped from an empty tenant id", schema));
            }
            if schema.len() > self.max_schema_length {
                errors.push(format!(
                    "schema '{}' for tenant '{}' exceeds {} characters",
                    schema, tenant, self.max_schema_length
                ));
            }
            if let Some(pattern) = &pattern {
                if !pattern.is_match(schema) {
                    errors.push(format!(
                        "schema '{}' for tenant '{}' does not match pattern {}",
                        schema, tenant, self.schema_pattern
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Builds the resolver described by `schemas` and `schema_prefix`.
    ///
    /// Explicit mappings win; unmapped tenants fall back to prefix-derived
    /// names when a prefix is configured.
    pub fn schema_resolver(&self) -> Result<Arc<dyn TenantSchemaProvider>, ConfigError> {
        self.validate()
            .map_err(|errors| ConfigError::Invalid { errors })?;

        let mut resolver: MappedSchemaResolver = self
            .schemas
            .iter()
            .map(|(tenant, schema)| (tenant.as_str(), schema.as_str()))
            .collect();

        if let Some(prefix) = &self.schema_prefix {
            let prefixed = PrefixSchemaResolver::new(
                SchemaPerTenantConfig::new()
                    .with_prefix(prefix.clone())
                    .with_max_schema_length(self.max_schema_length)
                    .with_schema_pattern(self.schema_pattern.clone()),
            )
            .map_err(|e| ConfigError::Invalid {
                errors: vec![e.to_string()],
            })?;
            resolver = resolver.with_fallback(Arc::new(prefixed));
        }

        Ok(Arc::new(resolver))
    }
}
