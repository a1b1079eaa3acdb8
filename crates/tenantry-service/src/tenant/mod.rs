//! Tenant resolution and the request-scoped tenant context.

pub mod context;
pub mod middleware;
pub mod resolver;

pub use context::{current, current_tenant_id, TenantContext, TenantSource};
pub use middleware::{admin_tenant, public_tenant, Pipeline};
pub use resolver::{Resolved, TenantResolver};
