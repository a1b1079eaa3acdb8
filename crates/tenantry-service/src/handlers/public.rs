//! Anonymous host-resolved routes.

use serde_json::json;

use crate::error::ApiError;
use crate::extract::PublicTenant;
use crate::response::Envelope;

/// `GET /api/public/ping` - which tenant this host serves.
pub async fn ping(PublicTenant(ctx): PublicTenant) -> Result<Envelope, ApiError> {
    Envelope::ok(&json!({
        "tenant_id": ctx.tenant_id,
        "source": ctx.source,
    }))
}
