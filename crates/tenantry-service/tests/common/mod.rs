//! Common test utilities for tenantry integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::{TestRequest, TestServer};

use tenantry_core::{Product, TenantId};
use tenantry_service::auth::issue_token;
use tenantry_service::config::Environment;
use tenantry_service::{create_router, seed_demo, AppState, DemoSeed, ServiceConfig};
use tenantry_store::{DataAccess, Filter, MemoryStore, Page, TenantDb};

pub const ACME_HOST: &str = "acme.localhost";
pub const GLOBEX_HOST: &str = "globex.localhost";
pub const PENDING_HOST: &str = "pending.acme.localhost";
pub const UNKNOWN_HOST: &str = "nowhere.localhost";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Backing store, for asserting on rows directly.
    pub store: Arc<MemoryStore>,
    /// Seeded tenants, users and products.
    pub seed: DemoSeed,
    /// Bearer token for alice (owner of acme).
    pub alice_token: String,
    /// Bearer token for bob (owner of globex, view-only in acme).
    pub bob_token: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh, seeded store.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Same, with a production configuration.
    pub fn production() -> Self {
        Self::with_config(ServiceConfig {
            environment: Environment::Production,
            ..test_config()
        })
    }

    /// Create a harness around `config`.
    pub fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let secret = config.jwt_secret.clone();

        let state = AppState::new(store.clone(), config);
        let seed = seed_demo(&state).expect("Failed to seed demo data");

        let alice_token = issue_token(&secret, seed.alice.id, 3600).expect("Failed to sign token");
        let bob_token = issue_token(&secret, seed.bob.id, 3600).expect("Failed to sign token");

        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            seed,
            alice_token,
            bob_token,
        }
    }

    /// `Authorization` value for alice.
    pub fn alice_auth(&self) -> String {
        format!("Bearer {}", self.alice_token)
    }

    /// `Authorization` value for bob.
    pub fn bob_auth(&self) -> String {
        format!("Bearer {}", self.bob_token)
    }

    /// Address `request` to `host` as `auth`.
    pub fn on(request: TestRequest, host: &str, auth: &str) -> TestRequest {
        request
            .add_header("x-forwarded-host", host.to_string())
            .add_header("authorization", auth.to_string())
    }

    /// Alice on acme.
    pub fn alice_on_acme(&self, request: TestRequest) -> TestRequest {
        Self::on(request, ACME_HOST, &self.alice_auth())
    }

    /// Guarded handle for `tenant`, bypassing HTTP.
    pub fn tenant_db(&self, tenant: TenantId) -> TenantDb {
        TenantDb::new(self.store.clone(), tenant)
    }

    /// Products stored for acme with `sku`.
    pub fn acme_products_with_sku(&self, sku: &str) -> Vec<Product> {
        self.tenant_db(self.seed.acme.id)
            .find_many(Filter::eq("sku", sku), Page::default())
            .expect("Failed to list products")
    }

    /// A seeded, active acme product.
    pub fn anvil(&self) -> &Product {
        &self.seed.acme_products[0]
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Test configuration with defaults suitable for integration tests.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        environment: Environment::Test,
        jwt_secret: "integration-test-secret".into(),
        ..ServiceConfig::default()
    }
}
