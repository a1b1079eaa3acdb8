//! Tenant context establishment for the public and admin pipelines.
//!
//! Resolution order, first match wins:
//!
//! 1. host (`X-Forwarded-Host`, then `Host`) through the resolver
//! 2. the `tenant_id` cookie, admin pipeline only
//! 3. outside production: `X-Test-Tenant-Id` / `X-Tenant-Id`, then `?__tenant=`
//!
//! A host hit always wins over the cookie. On the admin pipeline a stale or
//! missing cookie is refreshed to the host-resolved tenant.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::header::{COOKIE, HOST, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use tenantry_core::{TenantId, TENANT_COOKIE, TENANT_COOKIE_MAX_AGE_SECS};

use super::context::{self, TenantContext, TenantSource};
use crate::error::ApiError;
use crate::state::AppState;

const FORWARDED_HOST: &str = "x-forwarded-host";
const TEST_TENANT_HEADERS: [&str; 2] = ["x-test-tenant-id", "x-tenant-id"];
const TEST_TENANT_QUERY: &str = "__tenant";

/// Which fallbacks a pipeline permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// Anonymous routes: host evidence only.
    Public,
    /// Authenticated admin routes: cookie fallback allowed.
    Admin,
}

/// Outcome of [`establish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Established {
    /// The context to bind.
    pub context: TenantContext,
    /// Cookie to send back, when the host-resolved tenant differs from it.
    pub refresh_cookie: Option<TenantId>,
}

/// Work out the tenant for one request.
///
/// # Errors
///
/// Returns `ApiError::Internal` if the domain lookup fails.
pub fn establish(state: &AppState, headers: &HeaderMap, uri: &Uri, pipeline: Pipeline) -> Result<Established, ApiError> {
    let production = state.config.is_production();
    let cookie_tenant = read_cookie(headers, TENANT_COOKIE).and_then(|v| v.parse::<TenantId>().ok());

    let resolved = state
        .resolver
        .resolve(request_host(headers), !production)
        .map_err(|e| ApiError::Internal(format!("tenant resolution failed: {e}")))?;

    if let Some(hit) = resolved {
        let refresh_cookie =
            (pipeline == Pipeline::Admin && cookie_tenant != Some(hit.tenant_id)).then_some(hit.tenant_id);
        return Ok(Established {
            context: TenantContext::bound(hit.tenant_id, TenantSource::Host),
            refresh_cookie,
        });
    }

    if pipeline == Pipeline::Admin {
        if let Some(tenant) = cookie_tenant {
            return Ok(Established {
                context: TenantContext::bound(tenant, TenantSource::Cookie),
                refresh_cookie: None,
            });
        }
    }

    let context = if production {
        TenantContext::none()
    } else {
        test_override(headers, uri).unwrap_or(TenantContext::none())
    };
    Ok(Established {
        context,
        refresh_cookie: None,
    })
}

/// Public pipeline middleware.
pub async fn public_tenant(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    run(&state, req, next, Pipeline::Public).await
}

/// Admin pipeline middleware.
pub async fn admin_tenant(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    run(&state, req, next, Pipeline::Admin).await
}

async fn run(state: &AppState, req: Request, next: Next, pipeline: Pipeline) -> Response {
    let established = match establish(state, req.headers(), req.uri(), pipeline) {
        Ok(e) => e,
        Err(err) => return err.into_response(),
    };
    tracing::debug!(
        tenant_id = ?established.context.tenant_id,
        source = ?established.context.source,
        ?pipeline,
        "Tenant context established"
    );

    let mut response = context::scope(established.context, next.run(req)).await;
    if let Some(tenant) = established.refresh_cookie {
        if let Ok(cookie) = tenant_cookie(tenant, state.config.is_production()) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
    }
    response
}

/// The host a request was addressed to, preferring the proxy header.
fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(FORWARDED_HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| tenantry_core::normalize_host(Some(v)).is_some())
        .or_else(|| headers.get(HOST).and_then(|v| v.to_str().ok()))
}

fn test_override(headers: &HeaderMap, uri: &Uri) -> Option<TenantContext> {
    let from_header = TEST_TENANT_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<TenantId>().ok());
    if let Some(tenant) = from_header {
        return Some(TenantContext::bound(tenant, TenantSource::Header));
    }

    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params
        .get(TEST_TENANT_QUERY)
        .and_then(|v| v.parse::<TenantId>().ok())
        .map(|tenant| TenantContext::bound(tenant, TenantSource::Query))
}

/// Read one cookie from the `Cookie` headers.
#[must_use]
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// The `Set-Cookie` value selecting `tenant`.
///
/// # Errors
///
/// Returns `ApiError::Internal` if the value is not a valid header.
pub fn tenant_cookie(tenant: TenantId, secure: bool) -> Result<HeaderValue, ApiError> {
    let mut cookie =
        format!("{TENANT_COOKIE}={tenant}; Path=/; Max-Age={TENANT_COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_named_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("a=1; tenant_id=abc ; b=2"));
        assert_eq!(read_cookie(&headers, "tenant_id"), Some("abc"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn cookie_attributes() {
        let t = TenantId::generate();
        let plain = tenant_cookie(t, false).unwrap();
        let plain = plain.to_str().unwrap();
        assert!(plain.starts_with(&format!("tenant_id={t};")));
        assert!(plain.contains("HttpOnly"));
        assert!(plain.contains("SameSite=Lax"));
        assert!(plain.contains("Max-Age=604800"));
        assert!(!plain.contains("Secure"));
        assert!(tenant_cookie(t, true).unwrap().to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn query_override_is_parsed() {
        let t = TenantId::generate();
        let uri: Uri = format!("/api/admin/products?x=1&__tenant={t}").parse().unwrap();
        let ctx = test_override(&HeaderMap::new(), &uri).unwrap();
        assert_eq!(ctx, TenantContext::bound(t, TenantSource::Query));
    }

    #[test]
    fn query_override_is_percent_decoded() {
        let t = TenantId::generate();
        let encoded = t.to_string().replace('-', "%2D");
        let uri: Uri = format!("/api/admin/products?__tenant={encoded}&q=a%26b").parse().unwrap();
        assert_eq!(test_override(&HeaderMap::new(), &uri), Some(TenantContext::bound(t, TenantSource::Query)));
    }

    #[test]
    fn header_override_beats_query() {
        let (h, q) = (TenantId::generate(), TenantId::generate());
        let mut headers = HeaderMap::new();
        headers.insert("x-tenant-id", HeaderValue::from_str(&h.to_string()).unwrap());
        let uri: Uri = format!("/x?__tenant={q}").parse().unwrap();
        assert_eq!(test_override(&headers, &uri).unwrap().source, TenantSource::Header);
    }
}
