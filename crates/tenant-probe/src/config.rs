//! Probe configuration.
//!
//! Every option can be given on the command line or through the environment.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TENANT_PROBE_BACKEND` | sqlite | Backend (sqlite, postgres) |
//! | `TENANT_PROBE_DATABASE` | :memory: | SQLite main database path |
//! | `TENANT_PROBE_ATTACH` | | `NAME=PATH` databases, comma-separated |
//! | `TENANT_PROBE_PG_HOST` | localhost | PostgreSQL host |
//! | `TENANT_PROBE_PG_PORT` | 5432 | PostgreSQL port |
//! | `TENANT_PROBE_PG_DBNAME` | helios | PostgreSQL database |
//! | `TENANT_PROBE_PG_USER` | helios | PostgreSQL user |
//! | `TENANT_PROBE_PG_PASSWORD` | | PostgreSQL password |
//! | `TENANT_PROBE_TENANT_MODE` | schema | none, db, schema, catalog, partition |
//! | `TENANT_PROBE_SCHEMA_MAP` | | `TENANT=SCHEMA` pairs, comma-separated |
//! | `TENANT_PROBE_SCHEMA_PREFIX` | | Prefix for derived schema names |
//! | `TENANT_PROBE_PARTITION_COLUMN` | tenant_id | Tenant column in partition mode |
//! | `TENANT_PROBE_MAX_CONNECTIONS` | 4 | Pool size |
//! | `TENANT_PROBE_CONNECTION_TIMEOUT` | 5s | Checkout timeout |
//! | `TENANT_PROBE_DEFAULT_TENANT` | | Tenant of the calling context |
//! | `TENANT_PROBE_LOG_LEVEL` | info | Log level |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use helios_tenant_pool::config::TenancyConfig;
use helios_tenant_pool::strategy::TenantMode;

/// Database backend the probe connects to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProbeBackend {
    /// r2d2 pool over rusqlite.
    Sqlite,
    /// deadpool-postgres pool.
    Postgres,
}

impl fmt::Display for ProbeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeBackend::Sqlite => write!(f, "sqlite"),
            ProbeBackend::Postgres => write!(f, "postgres"),
        }
    }
}

/// A `KEY=VALUE` pair from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl FromStr for Pair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => Ok(Pair {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
        }
    }
}

/// Acquires one connection per tenant and reports how each was tagged.
#[derive(Debug, Clone, Parser)]
#[command(name = "tenant-probe")]
#[command(about = "Probe tenant-aware connection provisioning")]
pub struct ProbeConfig {
    /// Database backend.
    #[arg(long, env = "TENANT_PROBE_BACKEND", value_enum, default_value = "sqlite")]
    pub backend: ProbeBackend,

    /// SQLite main database path.
    #[arg(long, env = "TENANT_PROBE_DATABASE", default_value = ":memory:")]
    pub database: String,

    /// Databases as NAME=PATH. Attached as schemas in shared modes; one pool
    /// per tenant NAME in db mode (PATH is the PostgreSQL database name there).
    #[arg(long = "attach", env = "TENANT_PROBE_ATTACH", value_delimiter = ',')]
    pub attach: Vec<Pair>,

    /// PostgreSQL host.
    #[arg(long, env = "TENANT_PROBE_PG_HOST", default_value = "localhost")]
    pub pg_host: String,

    /// PostgreSQL port.
    #[arg(long, env = "TENANT_PROBE_PG_PORT", default_value = "5432")]
    pub pg_port: u16,

    /// PostgreSQL database.
    #[arg(long, env = "TENANT_PROBE_PG_DBNAME", default_value = "helios")]
    pub pg_dbname: String,

    /// PostgreSQL user.
    #[arg(long, env = "TENANT_PROBE_PG_USER", default_value = "helios")]
    pub pg_user: String,

    /// PostgreSQL password.
    #[arg(long, env = "TENANT_PROBE_PG_PASSWORD")]
    pub pg_password: Option<String>,

    /// Tenancy mode (none, db, schema, catalog, partition).
    #[arg(long, env = "TENANT_PROBE_TENANT_MODE", default_value = "schema")]
    pub tenant_mode: TenantMode,

    /// Explicit TENANT=SCHEMA mappings.
    #[arg(long = "schema-map", env = "TENANT_PROBE_SCHEMA_MAP", value_delimiter = ',')]
    pub schema_map: Vec<Pair>,

    /// Prefix for schema names of tenants missing from the map.
    #[arg(long, env = "TENANT_PROBE_SCHEMA_PREFIX")]
    pub schema_prefix: Option<String>,

    /// Tenant column in partition mode.
    #[arg(long, env = "TENANT_PROBE_PARTITION_COLUMN", default_value = "tenant_id")]
    pub partition_column: String,

    /// Pool size.
    #[arg(long, env = "TENANT_PROBE_MAX_CONNECTIONS", default_value = "4")]
    pub max_connections: u32,

    /// Checkout timeout (e.g. 500ms, 5s).
    #[arg(
        long,
        env = "TENANT_PROBE_CONNECTION_TIMEOUT",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub connection_timeout: Duration,

    /// Tenant of the calling context, used when no tenants are listed.
    #[arg(long, env = "TENANT_PROBE_DEFAULT_TENANT")]
    pub default_tenant: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "TENANT_PROBE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Tenants to acquire connections for.
    pub tenants: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            backend: ProbeBackend::Sqlite,
            database: ":memory:".to_string(),
            attach: Vec::new(),
            pg_host: "localhost".to_string(),
            pg_port: 5432,
            pg_dbname: "helios".to_string(),
            pg_user: "helios".to_string(),
            pg_password: None,
            tenant_mode: TenantMode::Schema,
            schema_map: Vec::new(),
            schema_prefix: None,
            partition_column: "tenant_id".to_string(),
            max_connections: 4,
            connection_timeout: Duration::from_secs(5),
            default_tenant: None,
            log_level: "info".to_string(),
            tenants: Vec::new(),
        }
    }
}

impl ProbeConfig {
    /// Builds the tenancy configuration described by the options.
    pub fn tenancy(&self) -> TenancyConfig {
        let mut config = TenancyConfig::new(self.tenant_mode)
            .with_partition_column(self.partition_column.clone());
        for pair in &self.schema_map {
            config = config.with_schema(pair.key.clone(), pair.value.clone());
        }
        if let Some(prefix) = &self.schema_prefix {
            config = config.with_schema_prefix(prefix.clone());
        }
        config
    }

    /// Returns the tenants to probe. `None` means the calling context's tenant.
    pub fn probe_targets(&self) -> Vec<Option<String>> {
        if self.tenants.is_empty() {
            vec![None]
        } else {
            self.tenants.iter().cloned().map(Some).collect()
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_connections == 0 {
            errors.push("Max connections cannot be 0".to_string());
        }

        if self.connection_timeout.is_zero() {
            errors.push("Connection timeout cannot be 0".to_string());
        }

        if self.tenant_mode == TenantMode::Db && self.attach.is_empty() {
            errors.push("Db mode needs at least one --attach TENANT=PATH".to_string());
        }

        if self.tenant_mode.requires_tenant()
            && self.tenants.is_empty()
            && self.default_tenant.is_none()
        {
            errors.push("Tenant mode requires a tenant: list tenants or set --default-tenant".to_string());
        }

        if let Err(tenancy_errors) = self.tenancy().validate() {
            errors.extend(tenancy_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration for testing.
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            tenant_mode: TenantMode::Schema,
            schema_map: vec![
                Pair {
                    key: "acme".to_string(),
                    value: "schema_acme".to_string(),
                },
                Pair {
                    key: "globex".to_string(),
                    value: "schema_globex".to_string(),
                },
            ],
            attach: vec![
                Pair {
                    key: "schema_acme".to_string(),
                    value: ":memory:".to_string(),
                },
                Pair {
                    key: "schema_globex".to_string(),
                    value: ":memory:".to_string(),
                },
            ],
            connection_timeout: Duration::from_secs(1),
            log_level: "debug".to_string(),
            tenants: vec!["acme".to_string(), "globex".to_string()],
            ..Default::default()
        }
    }
}

/// Initializes tracing with the given level.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tenant_probe={0},helios_tenant_pool={0}",
            level
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProbeConfig::default();
        assert_eq!(config.backend, ProbeBackend::Sqlite);
        assert_eq!(config.database, ":memory:");
        assert_eq!(config.tenant_mode, TenantMode::Schema);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_command_line() {
        let config = ProbeConfig::try_parse_from([
            "tenant-probe",
            "--tenant-mode",
            "catalog",
            "--attach",
            "schema_acme=acme.db,schema_globex=globex.db",
            "--schema-map",
            "acme=schema_acme",
            "--schema-prefix",
            "schema_",
            "--connection-timeout",
            "250ms",
            "acme",
            "globex",
        ])
        .unwrap();

        assert_eq!(config.tenant_mode, TenantMode::Catalog);
        assert_eq!(config.attach.len(), 2);
        assert_eq!(config.attach[1].key, "schema_globex");
        assert_eq!(config.attach[1].value, "globex.db");
        assert_eq!(config.connection_timeout, Duration::from_millis(250));
        assert_eq!(config.tenants, vec!["acme", "globex"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_bad_pair_and_mode() {
        assert!(ProbeConfig::try_parse_from(["tenant-probe", "--attach", "acme.db"]).is_err());
        assert!(ProbeConfig::try_parse_from(["tenant-probe", "--tenant-mode", "shard"]).is_err());
    }

    #[test]
    fn test_tenancy_from_options() {
        let config = ProbeConfig::for_testing();
        let tenancy = config.tenancy();

        assert_eq!(tenancy.mode, TenantMode::Schema);
        assert_eq!(tenancy.schemas.get("acme").map(String::as_str), Some("schema_acme"));
        assert_eq!(tenancy.partition_column, "tenant_id");
    }

    #[test]
    fn test_probe_targets() {
        let config = ProbeConfig::for_testing();
        assert_eq!(
            config.probe_targets(),
            vec![Some("acme".to_string()), Some("globex".to_string())]
        );

        let config = ProbeConfig {
            default_tenant: Some("acme".to_string()),
            tenants: Vec::new(),
            ..ProbeConfig::for_testing()
        };
        assert_eq!(config.probe_targets(), vec![None]);
    }

    #[test]
    fn test_validate_valid() {
        assert!(ProbeConfig::for_testing().validate().is_ok());
        let config = ProbeConfig {
            tenant_mode: TenantMode::None,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid() {
        let config = ProbeConfig {
            max_connections: 0,
            connection_timeout: Duration::ZERO,
            tenants: Vec::new(),
            ..ProbeConfig::for_testing()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);

        let config = ProbeConfig {
            tenant_mode: TenantMode::Db,
            attach: Vec::new(),
            ..ProbeConfig::for_testing()
        };
        assert!(config.validate().is_err());

        let config = ProbeConfig {
            partition_column: String::new(),
            tenant_mode: TenantMode::Partition,
            ..ProbeConfig::for_testing()
        };
        assert!(config.validate().is_err());
    }
}
