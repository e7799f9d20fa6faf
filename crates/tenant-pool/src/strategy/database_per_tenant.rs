//! Database-per-tenant pool lookup.
//!
//! In this mode each tenant has a completely separate database and pool, so
//! connections are never tagged. A [`TenantDataSourceProvider`] picks the
//! pool for a tenant.

use std::collections::HashMap;
use std::sync::Arc;

use crate::source::ConnectionSource;
use crate::tenant::TenantId;

/// Supplies the pool that serves a tenant.
pub trait TenantDataSourceProvider<S: ConnectionSource>: Send + Sync {
    /// Returns the pool for the tenant, if it has one.
    fn data_source(&self, tenant_id: &TenantId) -> Option<Arc<S>>;

    /// Returns every pool this provider hands out, for shutdown.
    fn data_sources(&self) -> Vec<Arc<S>>;
}

/// A provider backed by a fixed tenant to pool map.
pub struct StaticDataSourceProvider<S> {
    pools: HashMap<TenantId, Arc<S>>,
}

impl<S> Default for StaticDataSourceProvider<S> {
    fn default() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }
}

impl<S: ConnectionSource> StaticDataSourceProvider<S> {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the pool for a tenant.
    pub fn with_data_source(mut self, tenant_id: impl Into<TenantId>, pool: S) -> Self {
        self.pools.insert(tenant_id.into(), Arc::new(pool));
        self
    }

    /// Registers an already shared pool for a tenant.
    pub fn with_shared_data_source(mut self, tenant_id: impl Into<TenantId>, pool: Arc<S>) -> Self {
        self.pools.insert(tenant_id.into(), pool);
        self
    }

    /// Returns the number of registered tenants.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns `true` if no tenant is registered.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<S: ConnectionSource> TenantDataSourceProvider<S> for StaticDataSourceProvider<S> {
    fn data_source(&self, tenant_id: &TenantId) -> Option<Arc<S>> {
        self.pools.get(tenant_id).cloned()
    }

    fn data_sources(&self) -> Vec<Arc<S>> {
        let mut unique: Vec<Arc<S>> = Vec::with_capacity(self.pools.len());
        for pool in self.pools.values() {
            if !unique.iter().any(|seen| Arc::ptr_eq(seen, pool)) {
                unique.push(pool.clone());
            }
        }
        unique
    }
}
