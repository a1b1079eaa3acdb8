//! Tenant isolation integration tests.

use std::sync::Arc;

use serde_json::json;
use tenantry_core::{AuditLog, Membership, Product, TenantId, UserId};
use tenantry_store::{
    Aggregate, DataAccess, Filter, GuardReason, MemoryStore, Page, Patch, StoreError, Store,
    TenantDb, UniqueKey,
};

struct TwoTenants {
    a: TenantDb,
    b: TenantDb,
    b_product: Product,
}

fn setup() -> TwoTenants {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let (ta, tb) = (TenantId::generate(), TenantId::generate());
    let a = TenantDb::new(Arc::clone(&store), ta);
    let b = TenantDb::new(store, tb);

    a.create(&Product::new(ta, "SHARED", "A's widget", 100)).unwrap();
    let b_product = b.create(&Product::new(tb, "SHARED", "B's widget", 200)).unwrap();
    b.create(&Product::new(tb, "B-ONLY", "B's gadget", 300)).unwrap();

    TwoTenants { a, b, b_product }
}

// ============================================================================
// Reads
// ============================================================================

#[test]
fn list_never_returns_foreign_rows() {
    let t = setup();

    let filters = [
        Filter::All,
        Filter::eq("tenant_id", t.b.tenant_id()),
        Filter::eq("id", t.b_product.id),
        Filter::Or(vec![Filter::eq("sku", "B-ONLY"), Filter::eq("tenant_id", t.b.tenant_id())]),
        Filter::contains("name", "B's"),
    ];

    for filter in filters {
        let rows: Vec<Product> = t.a.find_many(filter.clone(), Page::default()).unwrap();
        assert!(
            rows.iter().all(|p| p.tenant_id == t.a.tenant_id()),
            "filter {filter:?} leaked a foreign row"
        );
    }
}

#[test]
fn first_count_and_aggregate_are_scoped() {
    let t = setup();

    let found: Option<Product> = t.a.find_first(Filter::eq("id", t.b_product.id)).unwrap();
    assert!(found.is_none());

    assert_eq!(t.a.count::<Product>(Filter::All).unwrap(), 1);
    assert_eq!(t.b.count::<Product>(Filter::All).unwrap(), 2);

    let total = t.a.aggregate::<Product>(Filter::All, Aggregate::Sum("price_in_pence".into())).unwrap();
    assert_eq!(total, json!(100));
}

// ============================================================================
// Writes
// ============================================================================

#[test]
fn update_and_delete_many_cannot_touch_foreign_rows() {
    let t = setup();

    let updated = t
        .a
        .update_many::<Product>(Filter::eq("id", t.b_product.id), Patch::new().set("name", "pwned"))
        .unwrap();
    assert_eq!(updated, 0);

    let deleted = t.a.delete_many::<Product>(Filter::eq("sku", "B-ONLY")).unwrap();
    assert_eq!(deleted, 0);

    let still: Product = t.b.find_first(Filter::eq("id", t.b_product.id)).unwrap().unwrap();
    assert_eq!(still.name, "B's widget");
    assert_eq!(t.b.count::<Product>(Filter::All).unwrap(), 2);
}

#[test]
fn create_with_foreign_tenant_is_a_guard_violation() {
    let t = setup();
    let foreign = Product::new(t.b.tenant_id(), "X", "smuggled", 1);

    let err = t.a.create(&foreign).unwrap_err();
    assert!(matches!(
        err,
        StoreError::GuardViolation(ref v) if v.reason == GuardReason::TenantMismatch
    ));
    assert_eq!(t.b.count::<Product>(Filter::eq("sku", "X")).unwrap(), 0);
}

#[test]
fn create_through_relation_lands_in_bound_tenant() {
    let t = setup();
    let data = json!({
        "sku": "REL",
        "name": "via relation",
        "description": null,
        "price_in_pence": 5,
        "currency": "GBP",
        "is_active": true,
        "tenant": {"connect": {"id": t.a.tenant_id().to_string()}}
    });
    let created: Product = t.a.insert(data.as_object().cloned().unwrap()).unwrap();
    assert_eq!(created.tenant_id, t.a.tenant_id());
    assert_eq!(created.version, 1);
}

#[test]
fn same_sku_is_allowed_in_different_tenants_but_not_twice_in_one() {
    let t = setup();
    let dup = Product::new(t.a.tenant_id(), "SHARED", "again", 1);
    let err = t.a.create(&dup).unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }));
}

#[test]
fn memberships_and_audit_logs_are_isolated_too() {
    let t = setup();
    let user = UserId::generate();
    t.b.create(&Membership::owner(t.b.tenant_id(), user)).unwrap();
    t.b.create(&AuditLog::new(t.b.tenant_id(), Some(user), "MEMBER_CREATE")).unwrap();

    assert!(t.a.find_first::<Membership>(Filter::eq("user_id", user)).unwrap().is_none());
    assert_eq!(t.a.count::<AuditLog>(Filter::All).unwrap(), 0);
    assert_eq!(t.b.count::<AuditLog>(Filter::All).unwrap(), 1);
}

#[test]
fn upsert_on_foreign_composite_key_is_rejected() {
    let t = setup();
    let key = UniqueKey::new().field("tenant_id", t.b.tenant_id()).field("sku", "SHARED");
    let err = t
        .a
        .upsert(key, &Product::new(t.a.tenant_id(), "SHARED", "x", 1), Patch::new().set("name", "x"))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::GuardViolation(ref v) if v.reason == GuardReason::TenantMismatch
    ));
}
