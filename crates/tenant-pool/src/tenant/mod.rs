//! Tenant identity for connection provisioning.
//!
//! # Core Types
//!
//! - [`TenantId`] - Opaque tenant identifier
//! - [`CurrentTenantProvider`] - Looks up the tenant of the calling context
//! - [`FixedTenantProvider`] - Always reports one tenant
//! - [`ScopedTenantProvider`] - Task-local binding for request entry points
//!
//! # Examples
//!
//! ```
//! use helios_tenant_pool::tenant::{CurrentTenantProvider, FixedTenantProvider, TenantId};
//!
//! let provider = FixedTenantProvider::new("acme");
//! assert_eq!(provider.current_id(), Some(TenantId::new("acme")));
//! ```

mod context;
mod id;

pub use context::{CurrentTenantProvider, FixedTenantProvider, ScopedTenantProvider};
pub use id::TenantId;
