//! Audit trail for admin mutations.

use serde_json::Value;

use tenantry_core::AuditLog;
use tenantry_store::DataAccess;

use crate::extract::AdminCtx;

/// Product created.
pub const PRODUCT_CREATE: &str = "PRODUCT_CREATE";
/// Product updated.
pub const PRODUCT_UPDATE: &str = "PRODUCT_UPDATE";
/// Product deleted.
pub const PRODUCT_DELETE: &str = "PRODUCT_DELETE";
/// Member added.
pub const MEMBERSHIP_CREATE: &str = "MEMBERSHIP_CREATE";
/// Member capabilities changed.
pub const MEMBERSHIP_UPDATE: &str = "MEMBERSHIP_UPDATE";
/// Member removed.
pub const MEMBERSHIP_DELETE: &str = "MEMBERSHIP_DELETE";

/// Write one audit entry through the actor's tenant handle.
///
/// The diff is redacted on the way in. A failed write is logged and
/// swallowed; the mutation it describes has already happened.
pub fn record(ctx: &AdminCtx, action: &str, entity_type: &str, entity_id: impl ToString, diff: &Value) {
    let entry = AuditLog::new(ctx.tenant_id, Some(ctx.user_id()), action)
        .entity(entity_type, entity_id)
        .client(Some(ctx.meta.ip.clone()), ctx.meta.user_agent.clone())
        .with_diff(diff);

    if let Err(e) = ctx.db.create(&entry) {
        tracing::error!(
            tenant_id = %ctx.tenant_id,
            action,
            error = %e,
            "Failed to write audit log"
        );
    }
}
