//! Tenant probe
//!
//! Builds a tenant-aware data source from the command line, acquires one
//! connection per listed tenant and prints the schema and catalog each
//! connection was tagged with.

mod config;

use std::sync::Arc;

use clap::Parser;
use helios_tenant_pool::source::{ConnectionSource, ConnectionSourceExt, ManagedPool, PoolStats};
use helios_tenant_pool::strategy::{StaticDataSourceProvider, TenantMode};
use helios_tenant_pool::tenant::{CurrentTenantProvider, FixedTenantProvider, ScopedTenantProvider};
use helios_tenant_pool::{DataSourceSupplier, TenantConnection, TenantId};
use tracing::{info, warn};

use crate::config::{Pair, ProbeBackend, ProbeConfig, init_logging};

#[cfg(feature = "sqlite")]
use helios_tenant_pool::backends::sqlite::{SqlitePool, SqlitePoolConfig};

#[cfg(feature = "postgres")]
use helios_tenant_pool::backends::postgres::{PgPool, PgPoolConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ProbeConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        backend = %config.backend,
        tenant_mode = %config.tenant_mode,
        isolation = %config.tenant_mode.isolation_level(),
        tenants = config.tenants.len(),
        "Starting tenant probe"
    );

    match config.backend {
        ProbeBackend::Sqlite => probe_sqlite(&config).await,
        ProbeBackend::Postgres => probe_postgres(&config).await,
    }
}

fn tenant_provider(config: &ProbeConfig) -> Arc<dyn CurrentTenantProvider> {
    match &config.default_tenant {
        Some(tenant) => Arc::new(FixedTenantProvider::new(tenant.as_str())),
        None => Arc::new(ScopedTenantProvider),
    }
}

/// Builds the supplier for the configured mode.
///
/// `shared` creates the single pool of the shared modes; `per_tenant` creates
/// the pool for one `--attach` entry in db mode.
fn build_supplier<S, F, G>(
    config: &ProbeConfig,
    shared: F,
    per_tenant: G,
) -> anyhow::Result<DataSourceSupplier<S>>
where
    S: ConnectionSource,
    F: FnOnce() -> anyhow::Result<S>,
    G: Fn(&Pair) -> anyhow::Result<S>,
{
    let tenancy = config.tenancy();
    let mut builder =
        DataSourceSupplier::from_mode(tenancy.mode).tenant_provider(tenant_provider(config));

    match tenancy.mode {
        TenantMode::Db => {
            let mut provider = StaticDataSourceProvider::new();
            for pair in &config.attach {
                provider = provider.with_data_source(pair.key.as_str(), per_tenant(pair)?);
            }
            builder = builder
                .data_source_provider(Arc::new(provider))
                .name("tenant-probe");
        }
        TenantMode::Partition => {
            builder = builder
                .pool(shared()?)
                .partition_column(tenancy.partition_column.clone());
        }
        TenantMode::Schema | TenantMode::Catalog => {
            builder = builder
                .pool(shared()?)
                .schema_resolver(tenancy.schema_resolver()?);
        }
        TenantMode::None => {
            builder = builder.pool(shared()?);
        }
    }

    Ok(builder.build()?)
}

/// Acquires a connection per target, prints the result and shuts down.
async fn run<S>(config: &ProbeConfig, supplier: DataSourceSupplier<S>) -> anyhow::Result<()>
where
    S: ConnectionSource + PoolStats,
{
    if let Some(column) = supplier.partition_column() {
        println!("partition column: {}", column);
    }

    let targets = config.probe_targets();
    let mut failures = 0;
    for target in &targets {
        let label = target
            .as_deref()
            .or(config.default_tenant.as_deref())
            .unwrap_or("-");
        let result = match target {
            Some(tenant) => supplier.connection_for_tenant(&TenantId::new(tenant.as_str())).await,
            None => supplier.connection().await,
        };

        match result {
            Ok(conn) => println!(
                "{}\tschema={}\tcatalog={}",
                label,
                conn.schema().unwrap_or("-"),
                conn.catalog().unwrap_or("-")
            ),
            Err(e) => {
                failures += 1;
                warn!(tenant = %label, error = %e, "Acquisition failed");
                println!("{}\terror: {}", label, e);
            }
        }
    }

    if let Ok(pool) = supplier.unwrap_source::<S>() {
        println!(
            "pool {}: active={} idle={} max={}",
            pool.name(),
            pool.active_connections(),
            pool.idle_connections(),
            pool.max_connections()
        );
    }

    supplier.shutdown(false);

    if failures > 0 {
        anyhow::bail!("{} of {} acquisitions failed", failures, targets.len());
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn probe_sqlite(config: &ProbeConfig) -> anyhow::Result<()> {
    let supplier = build_supplier(
        config,
        || {
            let mut pool_config = SqlitePoolConfig::file(&config.database)
                .with_max_connections(config.max_connections)
                .with_connection_timeout(config.connection_timeout);
            for pair in &config.attach {
                pool_config = pool_config.with_attached(pair.key.clone(), &pair.value);
            }
            Ok(SqlitePool::new(pool_config)?)
        },
        |pair| {
            let pool_config = SqlitePoolConfig::file(&pair.value)
                .with_name(pair.key.clone())
                .with_max_connections(config.max_connections)
                .with_connection_timeout(config.connection_timeout);
            Ok(SqlitePool::new(pool_config)?)
        },
    )?;
    run(config, supplier).await
}

/// Fallback when the sqlite feature is not enabled.
#[cfg(not(feature = "sqlite"))]
async fn probe_sqlite(_config: &ProbeConfig) -> anyhow::Result<()> {
    anyhow::bail!(
        "The sqlite backend requires the 'sqlite' feature. \
         Build with: cargo build -p helios-tenant-probe --features sqlite"
    )
}

#[cfg(feature = "postgres")]
async fn probe_postgres(config: &ProbeConfig) -> anyhow::Result<()> {
    let pool_config = |name: &str, dbname: &str| PgPoolConfig {
        name: name.to_string(),
        host: config.pg_host.clone(),
        port: config.pg_port,
        dbname: dbname.to_string(),
        user: config.pg_user.clone(),
        password: config.pg_password.clone(),
        max_connections: config.max_connections as usize,
        connection_timeout_ms: config.connection_timeout.as_millis() as u64,
    };

    let supplier = build_supplier(
        config,
        || Ok(PgPool::new(pool_config("postgres", &config.pg_dbname))?),
        |pair| Ok(PgPool::new(pool_config(&pair.key, &pair.value))?),
    )?;
    run(config, supplier).await
}

/// Fallback when the postgres feature is not enabled.
#[cfg(not(feature = "postgres"))]
async fn probe_postgres(_config: &ProbeConfig) -> anyhow::Result<()> {
    anyhow::bail!(
        "The postgres backend requires the 'postgres' feature. \
         Build with: cargo build -p helios-tenant-probe --features postgres"
    )
}
