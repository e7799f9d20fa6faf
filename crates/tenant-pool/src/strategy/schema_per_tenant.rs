//! Prefix-derived schema names.
//!
//! Each tenant gets a schema named `{prefix}{normalized tenant id}`. Names
//! that do not fit the database's identifier rules are treated as unmapped
//! rather than passed on to the driver.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tenant::TenantId;

use super::TenantSchemaProvider;

/// Configuration for prefix-derived schema names.
///
/// # Example
///
/// ```
/// use helios_tenant_pool::strategy::SchemaPerTenantConfig;
///
/// let config = SchemaPerTenantConfig::new()
///     .with_prefix("org_")
///     .with_max_schema_length(30);
/// assert_eq!(config.schema_prefix, "org_");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaPerTenantConfig {
    /// Prefix for tenant schema names.
    ///
    /// The full schema name is `{prefix}{tenant_id}`.
    #[serde(default = "default_schema_prefix")]
    pub schema_prefix: String,

    /// Maximum schema name length (PostgreSQL limit is 63).
    #[serde(default = "default_max_schema_length")]
    pub max_schema_length: usize,

    /// Pattern every derived schema name must match.
    #[serde(default = "default_schema_pattern")]
    pub schema_pattern: String,
}

fn default_schema_prefix() -> String {
    "tenant_".to_string()
}

pub(crate) fn default_max_schema_length() -> usize {
    63 // PostgreSQL identifier limit
}

pub(crate) fn default_schema_pattern() -> String {
    r"^[a-z][a-z0-9_]*$".to_string()
}

impl Default for SchemaPerTenantConfig {
    fn default() -> Self {
        Self {
            schema_prefix: default_schema_prefix(),
            max_schema_length: default_max_schema_length(),
            schema_pattern: default_schema_pattern(),
        }
    }
}

impl SchemaPerTenantConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the schema prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.schema_prefix = prefix.into();
        self
    }

    /// Sets the maximum schema name length.
    pub fn with_max_schema_length(mut self, max: usize) -> Self {
        self.max_schema_length = max;
        self
    }

    /// Sets the pattern derived names must match.
    pub fn with_schema_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.schema_pattern = pattern.into();
        self
    }
}

/// Resolves tenants to `{prefix}{normalized tenant id}`.
///
/// # Schema Naming
///
/// Tenant IDs are converted to schema names by:
/// - Prefixing with the configured prefix (default: `tenant_`)
/// - Converting to lowercase
/// - Replacing `/` and `-` with underscores
/// - Removing every other non-alphanumeric character
///
/// The result must match the configured pattern and length limit, otherwise
/// the tenant is reported as having no schema.
#[derive(Debug, Clone)]
pub struct PrefixSchemaResolver {
    config: SchemaPerTenantConfig,
    schema_pattern: regex::Regex,
}

impl PrefixSchemaResolver {
    /// Creates a resolver with the given configuration.
    pub fn new(config: SchemaPerTenantConfig) -> Result<Self, regex::Error> {
        let schema_pattern = regex::Regex::new(&config.schema_pattern)?;
        Ok(Self {
            config,
            schema_pattern,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SchemaPerTenantConfig {
        &self.config
    }

    /// Converts a tenant ID to a schema name without validating it.
    pub fn tenant_to_schema(&self, tenant_id: &TenantId) -> String {
        let normalized = self.normalize_tenant_id(tenant_id.as_str());
        format!("{}{}", self.config.schema_prefix, normalized)
    }

    /// Normalizes a tenant ID to a valid schema name component.
    fn normalize_tenant_id(&self, id: &str) -> String {
        id.to_lowercase()
            .replace(['/', '-'], "_")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect()
    }

    /// Returns `true` if a schema name satisfies the length and pattern rules.
    pub fn is_valid_schema_name(&self, schema: &str) -> bool {
        schema.len() <= self.config.max_schema_length && self.schema_pattern.is_match(schema)
    }
}

impl TenantSchemaProvider for PrefixSchemaResolver {
    fn schema(&self, tenant_id: &TenantId) -> Option<String> {
        let schema = self.tenant_to_schema(tenant_id);
        if self.is_valid_schema_name(&schema) {
            Some(schema)
        } else {
            debug!(tenant = %tenant_id, schema = %schema, "Derived schema name rejected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PrefixSchemaResolver {
        PrefixSchemaResolver::new(SchemaPerTenantConfig::default()).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = SchemaPerTenantConfig::default();
        assert_eq!(config.schema_prefix, "tenant_");
        assert_eq!(config.max_schema_length, 63);
    }

    #[test]
    fn test_config_builder() {
        let config = SchemaPerTenantConfig::new()
            .with_prefix("org_")
            .with_max_schema_length(16)
            .with_schema_pattern("^org_[a-z]+$");

        assert_eq!(config.schema_prefix, "org_");
        assert_eq!(config.max_schema_length, 16);
        assert_eq!(config.schema_pattern, "^org_[a-z]+$");
    }

    #[test]
    fn test_tenant_to_schema() {
        let resolver = resolver();

        assert_eq!(resolver.tenant_to_schema(&TenantId::new("acme")), "tenant_acme");
        assert_eq!(
            resolver.tenant_to_schema(&TenantId::new("Acme-Corp")),
            "tenant_acme_corp"
        );
        assert_eq!(
            resolver.tenant_to_schema(&TenantId::new("acme/research")),
            "tenant_acme_research"
        );
    }

    #[test]
    fn test_resolves_valid_names() {
        let resolver = resolver();
        assert_eq!(
            resolver.schema(&TenantId::new("globex")),
            Some("tenant_globex".to_string())
        );
    }

    #[test]
    fn test_rejects_overlong_names() {
        let resolver = PrefixSchemaResolver::new(
            SchemaPerTenantConfig::new().with_max_schema_length(10),
        )
        .unwrap();
        assert_eq!(resolver.schema(&TenantId::new("a-very-long-tenant")), None);
    }

    #[test]
    fn test_rejects_pattern_mismatch() {
        let resolver =
            PrefixSchemaResolver::new(SchemaPerTenantConfig::new().with_prefix("")).unwrap();
        // Leading digit is not a valid schema name under the default pattern.
        assert_eq!(resolver.schema(&TenantId::new("42")), None);
        assert_eq!(resolver.schema(&TenantId::new("t42")), Some("t42".to_string()));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let result =
            PrefixSchemaResolver::new(SchemaPerTenantConfig::new().with_schema_pattern("("));
        assert!(result.is_err());
    }
}
