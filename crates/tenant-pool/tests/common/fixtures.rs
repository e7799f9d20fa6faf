//! Resolvers and sources shared across tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use helios_tenant_pool::source::TenantScopedSource;
use helios_tenant_pool::strategy::{MappedSchemaResolver, TenantSchemaProvider};
use helios_tenant_pool::tenant::{CurrentTenantProvider, TenantId};

use super::FakePool;

/// Wraps a resolver and counts how often it is consulted.
#[derive(Debug, Default)]
pub struct CountingResolver {
    inner: MappedSchemaResolver,
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new(inner: MappedSchemaResolver) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TenantSchemaProvider for CountingResolver {
    fn schema(&self, tenant_id: &TenantId) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.schema(tenant_id)
    }
}

/// acme -> schema_acme, globex -> schema_globex.
pub fn acme_globex_mapping() -> MappedSchemaResolver {
    MappedSchemaResolver::new()
        .with_mapping("acme", "schema_acme")
        .with_mapping("globex", "schema_globex")
}

/// A fake pool that knows both fixture schemas.
pub fn acme_globex_pool() -> FakePool {
    FakePool::new("fake").with_schemas(&["schema_acme", "schema_globex"])
}

/// A tenant-scoped source over `pool` with a counting acme/globex resolver.
pub fn scoped_source(
    pool: FakePool,
    tenant_provider: Arc<dyn CurrentTenantProvider>,
) -> (TenantScopedSource<FakePool>, Arc<CountingResolver>) {
    let resolver = Arc::new(CountingResolver::new(acme_globex_mapping()));
    let source = TenantScopedSource::new(pool, tenant_provider, resolver.clone());
    (source, resolver)
}
