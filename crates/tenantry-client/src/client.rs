//! Tenantry HTTP client implementation.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;

use tenantry_core::{MembershipId, Product, ProductId, PublicProduct};

use crate::error::ClientError;
use crate::types::{
    AddMember, ApiErrorResponse, Caps, CapsUpdate, Catalog, Envelope, ListParams, Member, NewProduct, Page, Ping,
    ProductChanges, Versioned,
};

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Tenantry admin API client.
///
/// Every mutation carries a fresh `Idempotency-Key`. Retries of the same
/// logical call resend that key, so a write the server already applied is
/// replayed instead of repeated.
#[derive(Debug, Clone)]
pub struct AdminClient {
    client: Client,
    base_url: String,
    token: String,
    tenant_host: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl AdminClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the service (e.g., `"http://tenantry:8080"`)
    /// * `token` - Bearer token of the acting user
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, token, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        token: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Configuration("base_url is empty".into()));
        }

        let client = Client::builder().timeout(options.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            token: token.into(),
            tenant_host: options.tenant_host,
            max_retries: options.max_retries,
            retry_backoff: options.retry_backoff,
        })
    }

    /// Which tenant the host resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when no tenant is bound.
    pub async fn ping(&self) -> Result<Ping, ClientError> {
        self.read("/api/public/ping", None).await
    }

    // ------------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------------

    /// List products of the bound tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_products(&self, params: &ListParams) -> Result<Page<Product>, ClientError> {
        self.read("/api/admin/products", Some(params)).await
    }

    /// Fetch one product.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] for unknown or foreign ids.
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ClientError> {
        self.read(&format!("/api/admin/products/{id}"), None).await
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, ClientError> {
        self.mutate(Method::POST, "/api/admin/products", Some(product)).await
    }

    /// Apply `changes` if the product is still at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::VersionConflict`] when someone else got there first.
    pub async fn update_product(
        &self,
        id: ProductId,
        expected_version: i64,
        changes: ProductChanges,
    ) -> Result<Product, ClientError> {
        let body = Versioned {
            expected_version,
            body: changes,
        };
        self.mutate(Method::PATCH, &format!("/api/admin/products/{id}"), Some(&body))
            .await
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn delete_product(&self, id: ProductId) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .mutate(Method::DELETE, &format!("/api/admin/products/{id}"), None::<&()>)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------------

    /// List members of the bound tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_members(&self, params: &ListParams) -> Result<Page<Member>, ClientError> {
        self.read("/api/admin/members", Some(params)).await
    }

    /// Attach an existing user, by email.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] when no user has that email.
    pub async fn add_member(&self, email: &str, caps: Caps) -> Result<Member, ClientError> {
        self.mutate(Method::POST, "/api/admin/members", Some(&AddMember { email, caps }))
            .await
    }

    /// Change capability flags under optimistic concurrency.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn update_member_caps(
        &self,
        id: MembershipId,
        expected_version: i64,
        caps: Caps,
    ) -> Result<Member, ClientError> {
        let body = CapsUpdate { expected_version, caps };
        self.mutate(Method::PATCH, &format!("/api/admin/members/{id}"), Some(&body))
            .await
    }

    /// Remove a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn remove_member(&self, id: MembershipId) -> Result<(), ClientError> {
        let _: IgnoredAny = self
            .mutate(Method::DELETE, &format!("/api/admin/members/{id}"), None::<&()>)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Storefront
    // ------------------------------------------------------------------------

    /// Active products of the tenant with `slug`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] for unknown slugs.
    pub async fn storefront_products(&self, slug: &str, params: &ListParams) -> Result<Catalog, ClientError> {
        self.read(&format!("/api/storefront/tenants/{slug}/products"), Some(params))
            .await
    }

    /// One active product of the tenant with `slug`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotFound`] for unknown or inactive SKUs.
    pub async fn storefront_product(&self, slug: &str, sku: &str) -> Result<PublicProduct, ClientError> {
        #[derive(serde::Deserialize)]
        struct Item {
            product: PublicProduct,
        }
        let item: Item = self
            .read(&format!("/api/storefront/tenants/{slug}/products/{sku}"), None)
            .await?;
        Ok(item.product)
    }

    // ------------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------------

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token);
        match &self.tenant_host {
            Some(host) => builder.header("x-forwarded-host", host),
            None => builder,
        }
    }

    async fn read<T: DeserializeOwned>(&self, path: &str, params: Option<&ListParams>) -> Result<T, ClientError> {
        let mut builder = self.request(Method::GET, path);
        if let Some(params) = params {
            builder = builder.query(params);
        }
        let response = builder.send().await?;
        handle_response(response).await
    }

    /// Send a mutation, retrying retryable failures with the same key.
    async fn mutate<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let key = uuid::Uuid::new_v4().to_string();
        let mut attempt: u32 = 0;

        loop {
            let mut builder = self.request(method.clone(), path).header(IDEMPOTENCY_HEADER, &key);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let result = match builder.send().await {
                Ok(response) => handle_response(response).await,
                Err(e) => Err(ClientError::from(e)),
            };

            match result {
                Err(err) if attempt < self.max_retries && err.is_retryable() => {
                    attempt += 1;
                    let delay = self.retry_backoff * attempt;
                    tracing::warn!(%method, path, attempt, error = %err, ?delay, "Retrying with the same idempotency key");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// Handle API response and convert errors.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();

    if status.is_success() {
        let envelope: Envelope<T> = response.json().await?;
        return Ok(envelope.data);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    // Try to parse error response
    let error_body: Result<ApiErrorResponse, _> = response.json().await;

    match error_body {
        Ok(api_error) => Err(match api_error.code.as_str() {
            "version_conflict" => ClientError::VersionConflict {
                expected: api_error.expected_version.unwrap_or_default(),
                current: api_error.current_version.unwrap_or_default(),
            },
            "not_found" => ClientError::NotFound(api_error.error),
            "rate_limited" => ClientError::RateLimited {
                retry_after: retry_after.unwrap_or(1),
            },
            "request_in_progress" => ClientError::InProgress,
            "invalid_input" => ClientError::Validation {
                issues: api_error.issues.unwrap_or_default(),
            },
            code => ClientError::Api {
                code: code.to_string(),
                message: api_error.error,
                status: status.as_u16(),
            },
        }),
        Err(_) if status == StatusCode::TOO_MANY_REQUESTS => Err(ClientError::RateLimited {
            retry_after: retry_after.unwrap_or(1),
        }),
        Err(_) => Err(ClientError::Api {
            code: "unknown".to_string(),
            message: format!("HTTP {status}"),
            status: status.as_u16(),
        }),
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Per-request timeout (default: 30s).
    pub timeout: Duration,
    /// Sent as `X-Forwarded-Host` so the service binds this tenant.
    pub tenant_host: Option<String>,
    /// Extra attempts for retryable mutation failures (default: 2).
    pub max_retries: u32,
    /// Linear backoff step between attempts (default: 200ms).
    pub retry_backoff: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            tenant_host: None,
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl ClientOptions {
    /// Create options bound to a tenant host.
    #[must_use]
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            tenant_host: Some(host.into()),
            ..Self::default()
        }
    }
}
