//! Map-backed and caching schema resolvers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::tenant::TenantId;

use super::TenantSchemaProvider;

/// Resolves tenants through a static tenant to schema map.
///
/// Tenants missing from the map fall through to the optional fallback
/// resolver; without one they have no schema.
#[derive(Clone, Default)]
pub struct MappedSchemaResolver {
    schemas: HashMap<TenantId, String>,
    fallback: Option<Arc<dyn TenantSchemaProvider>>,
}

impl std::fmt::Debug for MappedSchemaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedSchemaResolver")
            .field("schemas", &self.schemas)
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl MappedSchemaResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tenant to schema mapping.
    pub fn with_mapping(mut self, tenant_id: impl Into<TenantId>, schema: impl Into<String>) -> Self {
        self.schemas.insert(tenant_id.into(), schema.into());
        self
    }

    /// Sets the resolver consulted for tenants missing from the map.
    pub fn with_fallback(mut self, fallback: Arc<dyn TenantSchemaProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Returns the number of explicit mappings.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns `true` if there are no explicit mappings.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl<T, S> FromIterator<(T, S)> for MappedSchemaResolver
where
    T: Into<TenantId>,
    S: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (T, S)>>(iter: I) -> Self {
        Self {
            schemas: iter
                .into_iter()
                .map(|(tenant, schema)| (tenant.into(), schema.into()))
                .collect(),
            fallback: None,
        }
    }
}

impl TenantSchemaProvider for MappedSchemaResolver {
    fn schema(&self, tenant_id: &TenantId) -> Option<String> {
        match self.schemas.get(tenant_id) {
            Some(schema) => Some(schema.clone()),
            None => self.fallback.as_ref()?.schema(tenant_id),
        }
    }
}

/// Memoizes the answers of another resolver.
///
/// Both hits and misses are cached. The cache sits behind its own lock so the
/// provisioning layer can keep calling the resolver without synchronization.
pub struct CachingSchemaResolver<R> {
    inner: R,
    cache: RwLock<HashMap<TenantId, Option<String>>>,
}

impl<R: TenantSchemaProvider> CachingSchemaResolver<R> {
    /// Wraps `inner` with an empty cache.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Drops the cached entry for one tenant.
    pub fn invalidate(&self, tenant_id: &TenantId) {
        self.cache.write().remove(tenant_id);
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Returns the number of cached entries.
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

impl<R: TenantSchemaProvider> TenantSchemaProvider for CachingSchemaResolver<R> {
    fn schema(&self, tenant_id: &TenantId) -> Option<String> {
        if let Some(cached) = self.cache.read().get(tenant_id) {
            return cached.clone();
        }

        let resolved = self.inner.schema(tenant_id);
        self.cache
            .write()
            .entry(tenant_id.clone())
            .or_insert_with(|| resolved.clone());
        resolved
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_mapped_resolver() {
        let resolver = MappedSchemaResolver::new()
            .with_mapping("acme", "schema_acme")
            .with_mapping("globex", "schema_globex");

        assert_eq!(resolver.len(), 2);
        assert_eq!(
            resolver.schema(&TenantId::new("acme")),
            Some("schema_acme".to_string())
        );
        assert_eq!(
            resolver.schema(&TenantId::new("globex")),
            Some("schema_globex".to_string())
        );
        assert_eq!(resolver.schema(&TenantId::new("unknown")), None);
    }

    #[test]
    fn test_mapped_resolver_fallback() {
        let fallback = |tenant: &TenantId| Some(format!("tenant_{}", tenant));
        let resolver = MappedSchemaResolver::new()
            .with_mapping("acme", "schema_acme")
            .with_fallback(Arc::new(fallback));

        assert_eq!(
            resolver.schema(&TenantId::new("acme")),
            Some("schema_acme".to_string())
        );
        assert_eq!(
            resolver.schema(&TenantId::new("initech")),
            Some("tenant_initech".to_string())
        );
    }

    #[test]
    fn test_mapped_resolver_from_iter() {
        let resolver: MappedSchemaResolver = [("a", "sa"), ("b", "sb")].into_iter().collect();
        assert_eq!(resolver.schema(&TenantId::new("b")), Some("sb".to_string()));
    }

    #[test]
    fn test_caching_resolver_calls_inner_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let inner = move |tenant: &TenantId| {
            counter.fetch_add(1, Ordering::SeqCst);
            (tenant.as_str() != "unknown").then(|| format!("s_{}", tenant))
        };
        let resolver = CachingSchemaResolver::new(inner);

        for _ in 0..3 {
            assert_eq!(
                resolver.schema(&TenantId::new("acme")),
                Some("s_acme".to_string())
            );
            assert_eq!(resolver.schema(&TenantId::new("unknown")), None);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cached_len(), 2);

        resolver.invalidate(&TenantId::new("acme"));
        resolver.schema(&TenantId::new("acme"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        resolver.clear();
        assert_eq!(resolver.cached_len(), 0);
    }
}
