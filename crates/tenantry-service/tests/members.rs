//! Membership administration integration tests.

mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{TestHarness, ACME_HOST};
use tenantry_core::{AuditLog, Membership, User, UserId};
use tenantry_store::{DataAccess, Filter, Page, Patch, SystemDb};

fn acme_membership_of(harness: &TestHarness, user: UserId) -> Membership {
    harness
        .tenant_db(harness.seed.acme.id)
        .find_first(Filter::eq("user_id", user))
        .unwrap()
        .expect("membership")
}

/// Lets bob administer acme members without making him an owner.
fn grant_bob_member_admin(harness: &TestHarness) {
    let updated = harness
        .tenant_db(harness.seed.acme.id)
        .update_many::<Membership>(
            Filter::eq("user_id", harness.seed.bob.id),
            Patch::new().set("can_manage_members", true),
        )
        .unwrap();
    assert_eq!(updated, 1);
}

#[tokio::test]
async fn list_joins_emails() {
    let harness = TestHarness::new();

    let response = harness.alice_on_acme(harness.server.get("/api/admin/members")).await;

    response.assert_status_ok();
    let body: Value = response.json();
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let emails: Vec<&str> = items.iter().filter_map(|m| m["email"].as_str()).collect();
    assert!(emails.contains(&"alice@acme.test"));
    assert!(emails.contains(&"bob@globex.test"));
}

#[tokio::test]
async fn view_only_member_cannot_list_members() {
    let harness = TestHarness::new();

    let response = TestHarness::on(harness.server.get("/api/admin/members"), ACME_HOST, &harness.bob_auth()).await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn add_existing_user_by_email() {
    let harness = TestHarness::new();
    SystemDb::new(harness.store.clone())
        .create(&User::new("carol@acme.test", Some("Carol".into())))
        .unwrap();

    let response = harness
        .alice_on_acme(harness.server.post("/api/admin/members"))
        .json(&json!({ "email": "  Carol@Acme.TEST ", "caps": { "can_manage_products": true } }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["data"]["email"], "carol@acme.test");
    assert_eq!(body["data"]["can_manage_products"], true);
    assert_eq!(body["data"]["is_owner"], false);
    assert_eq!(body["data"]["tenant_id"], harness.seed.acme.id.to_string());
}

#[tokio::test]
async fn adding_twice_conflicts() {
    let harness = TestHarness::new();

    let response = harness
        .alice_on_acme(harness.server.post("/api/admin/members"))
        .json(&json!({ "email": "bob@globex.test" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["error"], "User is already a member of this tenant");
}

#[tokio::test]
async fn unknown_email_is_not_found() {
    let harness = TestHarness::new();

    let response = harness
        .alice_on_acme(harness.server.post("/api/admin/members"))
        .json(&json!({ "email": "nobody@nowhere.test" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(response.json::<Value>()["error"], "User not found");
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .alice_on_acme(harness.server.post("/api/admin/members"))
        .json(&json!({ "email": "not-an-email" }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn last_owner_cannot_be_demoted_or_removed() {
    let harness = TestHarness::new();
    let alice = acme_membership_of(&harness, harness.seed.alice.id);
    let path = format!("/api/admin/members/{}", alice.id);

    let demote = harness
        .alice_on_acme(harness.server.patch(&path))
        .json(&json!({ "expected_version": alice.version, "caps": { "is_owner": false } }))
        .await;
    assert_eq!(demote.status_code(), StatusCode::CONFLICT);
    assert_eq!(demote.json::<Value>()["error"], "Cannot remove the last owner");

    let remove = harness.alice_on_acme(harness.server.delete(&path)).await;
    assert_eq!(remove.status_code(), StatusCode::CONFLICT);

    assert!(acme_membership_of(&harness, harness.seed.alice.id).is_owner);
}

#[tokio::test]
async fn second_owner_allows_demotion() {
    let harness = TestHarness::new();
    let bob = acme_membership_of(&harness, harness.seed.bob.id);

    let promote = harness
        .alice_on_acme(harness.server.patch(&format!("/api/admin/members/{}", bob.id)))
        .json(&json!({ "expected_version": bob.version, "caps": { "is_owner": true } }))
        .await;
    promote.assert_status_ok();
    assert_eq!(promote.json::<Value>()["data"]["version"], bob.version + 1);

    let alice = acme_membership_of(&harness, harness.seed.alice.id);
    let demote = harness
        .alice_on_acme(harness.server.patch(&format!("/api/admin/members/{}", alice.id)))
        .json(&json!({ "expected_version": alice.version, "caps": { "is_owner": false } }))
        .await;
    demote.assert_status_ok();
    assert_eq!(demote.json::<Value>()["data"]["is_owner"], false);
}

#[tokio::test]
async fn only_owners_touch_ownership() {
    let harness = TestHarness::new();
    grant_bob_member_admin(&harness);
    let bob = acme_membership_of(&harness, harness.seed.bob.id);
    let alice = acme_membership_of(&harness, harness.seed.alice.id);

    let self_promote = TestHarness::on(
        harness.server.patch(&format!("/api/admin/members/{}", bob.id)),
        ACME_HOST,
        &harness.bob_auth(),
    )
    .json(&json!({ "expected_version": bob.version, "caps": { "is_owner": true } }))
    .await;
    assert_eq!(self_promote.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(self_promote.json::<Value>()["error"], "Only owners can modify is_owner");

    let remove_owner = TestHarness::on(
        harness.server.delete(&format!("/api/admin/members/{}", alice.id)),
        ACME_HOST,
        &harness.bob_auth(),
    )
    .await;
    assert_eq!(remove_owner.status_code(), StatusCode::FORBIDDEN);

    // Non-ownership flags are fine for a member admin.
    let grant = TestHarness::on(
        harness.server.patch(&format!("/api/admin/members/{}", bob.id)),
        ACME_HOST,
        &harness.bob_auth(),
    )
    .json(&json!({ "expected_version": bob.version, "caps": { "can_manage_products": true } }))
    .await;
    grant.assert_status_ok();
}

#[tokio::test]
async fn empty_caps_update_is_rejected() {
    let harness = TestHarness::new();
    let bob = acme_membership_of(&harness, harness.seed.bob.id);

    let response = harness
        .alice_on_acme(harness.server.patch(&format!("/api/admin/members/{}", bob.id)))
        .json(&json!({ "expected_version": bob.version, "caps": {} }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn removing_a_member_is_audited() {
    let harness = TestHarness::new();
    let bob = acme_membership_of(&harness, harness.seed.bob.id);

    let response = harness
        .alice_on_acme(harness.server.delete(&format!("/api/admin/members/{}", bob.id)))
        .await;
    response.assert_status_ok();

    let logs: Vec<AuditLog> = harness
        .tenant_db(harness.seed.acme.id)
        .find_many(Filter::eq("action", "MEMBERSHIP_DELETE"), Page::default())
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entity_id, Some(bob.id.to_string()));

    // bob can no longer reach the acme admin surface.
    let list = TestHarness::on(harness.server.get("/api/admin/products"), ACME_HOST, &harness.bob_auth()).await;
    assert_eq!(list.status_code(), StatusCode::FORBIDDEN);
}
