//! Idempotency-Key integration tests.

mod common;

use std::future::IntoFuture;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{TestHarness, GLOBEX_HOST};
use tenantry_core::IdempotencyRecord;
use tenantry_store::{DataAccess, Filter, Page, SystemDb};

fn records_with_key(harness: &TestHarness, key: &str) -> Vec<IdempotencyRecord> {
    SystemDb::new(harness.store.clone())
        .find_many(Filter::eq("key", key), Page::default())
        .unwrap()
}

#[tokio::test]
async fn retried_create_replays_the_first_response() {
    let harness = TestHarness::new();

    let first = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "create-widget-1")
        .json(&json!({ "sku": "WIDGET-1", "name": "Widget", "price_in_pence": 500 }))
        .await;
    assert_eq!(first.status_code(), StatusCode::CREATED);
    assert!(first.headers().get("idempotent-replayed").is_none());

    // Different body, same key: the stored response wins.
    let second = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "create-widget-1")
        .json(&json!({ "sku": "WIDGET-2", "name": "Other", "price_in_pence": 1 }))
        .await;
    assert_eq!(second.status_code(), StatusCode::CREATED);
    assert_eq!(second.headers().get("idempotent-replayed").unwrap(), "true");
    assert_eq!(second.text(), first.text());

    assert_eq!(harness.acme_products_with_sku("WIDGET-1").len(), 1);
    assert!(harness.acme_products_with_sku("WIDGET-2").is_empty());

    let records = records_with_key(&harness, "create-widget-1");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_code, Some(201));
}

#[tokio::test]
async fn requests_without_a_key_are_not_deduplicated() {
    let harness = TestHarness::new();
    let anvil = harness.anvil().clone();
    let path = format!("/api/admin/products/{}", anvil.id);

    harness
        .alice_on_acme(harness.server.patch(&path))
        .json(&json!({ "expected_version": 1, "price_in_pence": 10 }))
        .await
        .assert_status_ok();

    let again = harness
        .alice_on_acme(harness.server.patch(&path))
        .json(&json!({ "expected_version": 1, "price_in_pence": 10 }))
        .await;
    assert_eq!(again.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn replayed_update_does_not_bump_the_version_twice() {
    let harness = TestHarness::new();
    let path = format!("/api/admin/products/{}", harness.anvil().id);
    let body = json!({ "expected_version": 1, "name": "Anvil Mk II" });

    let first = harness
        .alice_on_acme(harness.server.patch(&path))
        .add_header("idempotency-key", "rename-anvil")
        .json(&body)
        .await;
    first.assert_status_ok();

    let second = harness
        .alice_on_acme(harness.server.patch(&path))
        .add_header("idempotency-key", "rename-anvil")
        .json(&body)
        .await;
    second.assert_status_ok();
    assert_eq!(second.headers().get("idempotent-replayed").unwrap(), "true");
    assert_eq!(second.json::<Value>()["data"]["version"], 2);
}

#[tokio::test]
async fn keys_are_scoped_by_path_and_tenant() {
    let harness = TestHarness::new();

    let created = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "shared-key")
        .json(&json!({ "sku": "SCOPE-1", "name": "Scoped", "price_in_pence": 1 }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);

    // Same key on another path is a fresh request.
    let update = harness
        .alice_on_acme(harness.server.patch(&format!("/api/admin/products/{}", harness.anvil().id)))
        .add_header("idempotency-key", "shared-key")
        .json(&json!({ "expected_version": 1, "name": "Scoped Anvil" }))
        .await;
    update.assert_status_ok();
    assert!(update.headers().get("idempotent-replayed").is_none());

    // Same key and path under another tenant is a fresh request too.
    let other = TestHarness::on(harness.server.post("/api/admin/products"), GLOBEX_HOST, &harness.bob_auth())
        .add_header("idempotency-key", "shared-key")
        .json(&json!({ "sku": "SCOPE-1", "name": "Scoped", "price_in_pence": 1 }))
        .await;
    assert_eq!(other.status_code(), StatusCode::CREATED);
    assert!(other.headers().get("idempotent-replayed").is_none());

    assert_eq!(records_with_key(&harness, "shared-key").len(), 3);
}

#[tokio::test]
async fn failed_attempt_leaves_the_key_in_progress() {
    let harness = TestHarness::new();

    let failed = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "dup-sku")
        .json(&json!({ "sku": "ACME-001", "name": "Clash", "price_in_pence": 1 }))
        .await;
    assert_eq!(failed.status_code(), StatusCode::CONFLICT);
    assert_eq!(failed.json::<Value>()["code"], "conflict");

    let retry = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "dup-sku")
        .json(&json!({ "sku": "ACME-009", "name": "Fixed", "price_in_pence": 1 }))
        .await;
    assert_eq!(retry.status_code(), StatusCode::CONFLICT);
    assert_eq!(retry.json::<Value>()["code"], "request_in_progress");
    assert!(harness.acme_products_with_sku("ACME-009").is_empty());

    let records = records_with_key(&harness, "dup-sku");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_code, None);
}

#[tokio::test]
async fn rejected_validation_does_not_consume_the_key() {
    let harness = TestHarness::new();

    let invalid = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "fix-and-retry")
        .json(&json!({ "sku": "OK-1", "name": "", "price_in_pence": 1 }))
        .await;
    assert_eq!(invalid.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

    let fixed = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "fix-and-retry")
        .json(&json!({ "sku": "OK-1", "name": "Valid", "price_in_pence": 1 }))
        .await;
    assert_eq!(fixed.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn overlong_key_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "k".repeat(201))
        .json(&json!({ "sku": "LONG-1", "name": "Long", "price_in_pence": 1 }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"], "Idempotency-Key too long");
    assert!(harness.acme_products_with_sku("LONG-1").is_empty());
}

#[tokio::test]
async fn concurrent_duplicates_create_one_row() {
    let harness = TestHarness::new();
    let body = json!({ "sku": "RACE-1", "name": "Race", "price_in_pence": 1 });

    let a = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "race")
        .json(&body);
    let b = harness
        .alice_on_acme(harness.server.post("/api/admin/products"))
        .add_header("idempotency-key", "race")
        .json(&body);

    let (a, b) = futures::future::join(a.into_future(), b.into_future()).await;

    let statuses = [a.status_code(), b.status_code()];
    assert!(statuses.contains(&StatusCode::CREATED));
    assert!(statuses
        .iter()
        .all(|s| *s == StatusCode::CREATED || *s == StatusCode::CONFLICT));
    assert_eq!(harness.acme_products_with_sku("RACE-1").len(), 1);
    assert_eq!(records_with_key(&harness, "race").len(), 1);
}
