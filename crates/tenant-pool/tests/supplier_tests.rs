//! Tests for the per-mode data source supplier.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use helios_tenant_pool::config::TenancyConfig;
use helios_tenant_pool::error::{ConfigError, ConnectionError, TenantError};
use helios_tenant_pool::source::{
    ConnectionSource, ConnectionSourceExt, ManagedPool, TenantConnection,
};
use helios_tenant_pool::strategy::{
    StaticDataSourceProvider, TenantDataSourceProvider, TenantMode,
};
use helios_tenant_pool::supplier::DataSourceSupplier;
use helios_tenant_pool::tenant::{FixedTenantProvider, ScopedTenantProvider, TenantId};

use common::*;

// ============================================================================
// Shared Pool Modes
// ============================================================================

#[tokio::test]
async fn test_none_mode_passes_connections_through() {
    let supplier = DataSourceSupplier::from_mode(TenantMode::None)
        .pool(acme_globex_pool())
        .build()
        .unwrap();

    assert_eq!(supplier.mode(), TenantMode::None);
    assert_eq!(supplier.partition_column(), None);

    let conn = supplier.connection().await.unwrap();
    assert_eq!(conn.schema(), None);
    let conn = supplier
        .connection_for_tenant(&TenantId::new("acme"))
        .await
        .unwrap();
    assert_eq!(conn.schema(), None);
}

#[tokio::test]
async fn test_partition_mode_exposes_column() {
    let supplier = DataSourceSupplier::from_mode(TenantMode::Partition)
        .pool(acme_globex_pool())
        .build()
        .unwrap();
    assert_eq!(supplier.partition_column(), Some("tenant_id"));

    let supplier = DataSourceSupplier::from_mode(TenantMode::Partition)
        .pool(acme_globex_pool())
        .partition_column("org_id")
        .build()
        .unwrap();
    assert_eq!(supplier.mode(), TenantMode::Partition);
    assert_eq!(supplier.partition_column(), Some("org_id"));

    let conn = supplier.connection().await.unwrap();
    assert_eq!(conn.schema(), None);
}

#[test]
fn test_partition_mode_rejects_empty_column() {
    let result = DataSourceSupplier::from_mode(TenantMode::Partition)
        .pool(acme_globex_pool())
        .partition_column("")
        .build();
    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
}

#[tokio::test]
async fn test_schema_mode_tags_connections() {
    let resolver = Arc::new(CountingResolver::new(acme_globex_mapping()));
    let supplier = DataSourceSupplier::from_mode(TenantMode::Schema)
        .pool(acme_globex_pool())
        .tenant_provider(Arc::new(ScopedTenantProvider))
        .schema_resolver(resolver.clone())
        .build()
        .unwrap();

    assert_eq!(supplier.mode(), TenantMode::Schema);
    let conn = ScopedTenantProvider::scope(TenantId::new("globex"), supplier.connection())
        .await
        .unwrap();
    assert_eq!(conn.schema(), Some("schema_globex"));
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test]
async fn test_catalog_mode_tags_catalog() {
    let supplier = DataSourceSupplier::from_mode(TenantMode::Catalog)
        .pool(acme_globex_pool())
        .tenant_provider(Arc::new(FixedTenantProvider::new("acme")))
        .schema_resolver(Arc::new(acme_globex_mapping()))
        .build()
        .unwrap();

    assert_eq!(supplier.mode(), TenantMode::Catalog);
    let conn = supplier.acquire().await.unwrap();
    assert_eq!(conn.catalog(), Some("schema_acme"));
    assert_eq!(conn.schema(), None);
}

#[test]
fn test_schema_mode_requires_resolver() {
    let result = DataSourceSupplier::from_mode(TenantMode::Schema)
        .pool(acme_globex_pool())
        .tenant_provider(Arc::new(ScopedTenantProvider))
        .build();

    match result {
        Err(ConfigError::MissingComponent { mode, component }) => {
            assert_eq!(mode, "schema");
            assert_eq!(component, "schema resolver");
        }
        other => panic!("expected MissingComponent, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_shared_modes_require_pool() {
    let result = DataSourceSupplier::<FakePool>::from_mode(TenantMode::None).build();
    assert!(matches!(
        result,
        Err(ConfigError::MissingComponent {
            component: "pool",
            ..
        })
    ));
}

#[tokio::test]
async fn test_supplier_from_tenancy_config() {
    let config = TenancyConfig::new(TenantMode::Schema)
        .with_schema("acme", "schema_acme")
        .with_schema_prefix("schema_");
    let supplier = DataSourceSupplier::from_mode(config.mode)
        .pool(acme_globex_pool())
        .tenant_provider(Arc::new(ScopedTenantProvider))
        .schema_resolver(config.schema_resolver().unwrap())
        .build()
        .unwrap();

    // Mapped explicitly.
    let acme = supplier
        .connection_for_tenant(&TenantId::new("acme"))
        .await
        .unwrap();
    assert_eq!(acme.schema(), Some("schema_acme"));

    // Derived from the prefix.
    let globex = supplier
        .connection_for_tenant(&TenantId::new("globex"))
        .await
        .unwrap();
    assert_eq!(globex.schema(), Some("schema_globex"));
}

#[tokio::test]
async fn test_shared_supplier_shutdown() {
    let pool = acme_globex_pool();
    let state = pool.state();
    let supplier = DataSourceSupplier::from_mode(TenantMode::None)
        .pool(pool)
        .build()
        .unwrap();

    supplier.shutdown(false);
    supplier.shutdown(false);

    assert!(supplier.is_closed());
    assert_eq!(state.shutdowns.load(Ordering::SeqCst), 1);
    assert!(matches!(
        supplier.connection().await,
        Err(ConnectionError::Closed)
    ));
}

#[tokio::test]
async fn test_scoped_supplier_unwraps_to_pool() {
    let supplier = DataSourceSupplier::from_mode(TenantMode::Schema)
        .pool(acme_globex_pool())
        .tenant_provider(Arc::new(ScopedTenantProvider))
        .schema_resolver(Arc::new(acme_globex_mapping()))
        .build()
        .unwrap();

    let data_source = supplier.data_source();
    assert!(data_source.is_wrapper_for::<FakePool>());
    assert!(data_source.parent_logger().is_err());
}

// ============================================================================
// Database per Tenant
// ============================================================================

fn per_tenant_provider() -> (StaticDataSourceProvider<FakePool>, Arc<FakePool>) {
    let shared = Arc::new(FakePool::new("shared"));
    let provider = StaticDataSourceProvider::new()
        .with_data_source("acme", FakePool::new("acme_db"))
        .with_shared_data_source("globex", shared.clone())
        .with_shared_data_source("initech", shared.clone());
    (provider, shared)
}

#[test]
fn test_static_provider_deduplicates_pools() {
    let (provider, _) = per_tenant_provider();

    assert_eq!(provider.len(), 3);
    assert_eq!(provider.data_sources().len(), 2);
    assert_eq!(
        provider
            .data_source(&TenantId::new("acme"))
            .map(|pool| pool.name().to_string()),
        Some("acme_db".to_string())
    );
    assert!(provider.data_source(&TenantId::new("unknown")).is_none());
}

#[tokio::test]
async fn test_db_mode_routes_to_tenant_pool() {
    let (provider, shared) = per_tenant_provider();
    let supplier = DataSourceSupplier::from_mode(TenantMode::Db)
        .data_source_provider(Arc::new(provider))
        .tenant_provider(Arc::new(ScopedTenantProvider))
        .name("tenants")
        .build()
        .unwrap();

    assert_eq!(supplier.mode(), TenantMode::Db);
    assert_eq!(supplier.name(), "tenants");

    let acme = supplier
        .connection_for_tenant(&TenantId::new("acme"))
        .await
        .unwrap();
    assert_eq!(acme.pool_name, "acme_db");
    assert_eq!(acme.schema(), None);

    let globex = ScopedTenantProvider::scope(TenantId::new("globex"), supplier.connection())
        .await
        .unwrap();
    assert_eq!(globex.pool_name, "shared");
    assert_eq!(shared.outstanding(), 1);
}

#[tokio::test]
async fn test_db_mode_unknown_tenant() {
    let (provider, _) = per_tenant_provider();
    let supplier = DataSourceSupplier::from_mode(TenantMode::Db)
        .data_source_provider(Arc::new(provider))
        .tenant_provider(Arc::new(ScopedTenantProvider))
        .build()
        .unwrap();

    let err = supplier
        .connection_for_tenant(&TenantId::new("unknown"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Tenant(TenantError::NoDataSource { .. })
    ));

    let err = supplier.connection().await.unwrap_err();
    assert!(matches!(err, ConnectionError::Tenant(TenantError::Missing)));
}

#[tokio::test]
async fn test_db_mode_propagates_metadata_and_shutdown() {
    let (provider, shared) = per_tenant_provider();
    let provider = Arc::new(provider);
    let supplier = DataSourceSupplier::from_mode(TenantMode::Db)
        .data_source_provider(provider.clone())
        .tenant_provider(Arc::new(ScopedTenantProvider))
        .build()
        .unwrap();

    supplier.set_login_timeout(Duration::from_millis(1500));
    assert_eq!(supplier.login_timeout(), Duration::from_millis(1500));
    for pool in provider.data_sources() {
        assert_eq!(pool.login_timeout(), Duration::from_millis(1500));
    }

    supplier.shutdown(true);
    supplier.shutdown(true);

    for pool in provider.data_sources() {
        assert_eq!(pool.shutdowns(), 1);
    }
    assert_eq!(shared.shutdowns(), 1);
    assert!(supplier.is_closed());
}

#[test]
fn test_db_mode_requires_provider() {
    let result = DataSourceSupplier::<FakePool>::from_mode(TenantMode::Db)
        .tenant_provider(Arc::new(ScopedTenantProvider))
        .build();
    assert!(matches!(
        result,
        Err(ConfigError::MissingComponent {
            component: "tenant data source provider",
            ..
        })
    ));
}
