//! Current-tenant lookup.
//!
//! A [`CurrentTenantProvider`] answers "which tenant is the caller acting
//! for?". Deep call paths should pass a [`TenantId`] explicitly; the ambient
//! [`ScopedTenantProvider`] is meant for the request entry point only, where a
//! tenant is bound once for the lifetime of the request future.

use std::future::Future;

use super::id::TenantId;

tokio::task_local! {
    static CURRENT_TENANT: TenantId;
}

/// Supplies the tenant associated with the calling execution context.
///
/// Implementations must be cheap and safe to call from any number of
/// concurrent callers. Any internal state needs its own synchronization.
pub trait CurrentTenantProvider: Send + Sync {
    /// Returns the current tenant, or `None` if no tenant is bound.
    fn current_id(&self) -> Option<TenantId>;
}

impl<F> CurrentTenantProvider for F
where
    F: Fn() -> Option<TenantId> + Send + Sync,
{
    fn current_id(&self) -> Option<TenantId> {
        self()
    }
}

/// A provider that always reports the same tenant.
///
/// Useful for background jobs pinned to one tenant and for tests.
#[derive(Debug, Clone)]
pub struct FixedTenantProvider {
    tenant_id: TenantId,
}

impl FixedTenantProvider {
    /// Creates a provider that always returns `tenant_id`.
    pub fn new(tenant_id: impl Into<TenantId>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
        }
    }
}

impl CurrentTenantProvider for FixedTenantProvider {
    fn current_id(&self) -> Option<TenantId> {
        Some(self.tenant_id.clone())
    }
}

/// Task-local tenant binding for request entry points.
///
/// The tenant is bound with [`ScopedTenantProvider::scope`] (async) or
/// [`ScopedTenantProvider::sync_scope`] (blocking) and is visible to every
/// lookup made while the scoped future or closure runs.
///
/// ```
/// use helios_tenant_pool::tenant::{CurrentTenantProvider, ScopedTenantProvider, TenantId};
///
/// let provider = ScopedTenantProvider;
/// assert_eq!(provider.current_id(), None);
///
/// let seen = ScopedTenantProvider::sync_scope(TenantId::new("acme"), || provider.current_id());
/// assert_eq!(seen, Some(TenantId::new("acme")));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopedTenantProvider;

impl ScopedTenantProvider {
    /// Runs `future` with `tenant_id` bound as the current tenant.
    pub async fn scope<F>(tenant_id: TenantId, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_TENANT.scope(tenant_id, future).await
    }

    /// Runs `f` with `tenant_id` bound as the current tenant.
    pub fn sync_scope<F, R>(tenant_id: TenantId, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT_TENANT.sync_scope(tenant_id, f)
    }
}

impl CurrentTenantProvider for ScopedTenantProvider {
    fn current_id(&self) -> Option<TenantId> {
        CURRENT_TENANT.try_with(|tenant| tenant.clone()).ok()
    }
}
