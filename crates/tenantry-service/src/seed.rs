//! Demo data.
//!
//! Every write is an upsert on a natural key, so seeding twice leaves the
//! same rows behind. Existing products and memberships are left untouched.

use tenantry_core::{Domain, DomainStatus, Membership, Product, Tenant, User};
use tenantry_store::{DataAccess, Patch, StoreError, SystemDb, TenantDb, UniqueKey};

use crate::state::AppState;

/// What [`seed_demo`] created or found.
#[derive(Debug, Clone)]
pub struct DemoSeed {
    /// `acme` tenant, served on `acme.localhost`.
    pub acme: Tenant,
    /// `globex` tenant, served on `globex.localhost`.
    pub globex: Tenant,
    /// Owner of `acme`.
    pub alice: User,
    /// Owner of `globex`, view-only member of `acme`.
    pub bob: User,
    /// Products seeded into `acme`, including one inactive.
    pub acme_products: Vec<Product>,
    /// Products seeded into `globex`.
    pub globex_products: Vec<Product>,
}

/// Seed the demo tenants, domains, users, memberships and products.
pub fn seed_demo(state: &AppState) -> Result<DemoSeed, StoreError> {
    let sys = state.system_db();

    let acme = upsert_tenant(&sys, "acme", "Acme Corporation")?;
    let globex = upsert_tenant(&sys, "globex", "Globex Inc")?;

    upsert_domain(&sys, "acme.localhost", &acme, true, DomainStatus::Verified)?;
    upsert_domain(&sys, "globex.localhost", &globex, true, DomainStatus::Verified)?;
    upsert_domain(&sys, "pending.acme.localhost", &acme, false, DomainStatus::Pending)?;

    let alice = upsert_user(&sys, "alice@acme.test", "Alice")?;
    let bob = upsert_user(&sys, "bob@globex.test", "Bob")?;

    let acme_db = state.tenant_db(acme.id);
    let globex_db = state.tenant_db(globex.id);

    upsert_membership(&acme_db, Membership::owner(acme.id, alice.id))?;
    upsert_membership(&acme_db, Membership::new(acme.id, bob.id))?;
    upsert_membership(&globex_db, Membership::owner(globex.id, bob.id))?;

    let mut retired = Product::new(acme.id, "ACME-003", "Earthquake Pills", 299);
    retired.is_active = false;
    let acme_products = [
        Product::new(acme.id, "ACME-001", "Anvil", 1999).with_description("Drop-forged, 100 lb"),
        Product::new(acme.id, "ACME-002", "Rocket Skates", 4999).with_description("Fuel not included"),
        retired,
    ]
    .iter()
    .map(|p| upsert_product(&acme_db, p))
    .collect::<Result<Vec<_>, _>>()?;

    let globex_products = [Product::new(globex.id, "GLX-001", "Hammock", 2999)]
        .iter()
        .map(|p| upsert_product(&globex_db, p))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        tenants = 2,
        acme_products = acme_products.len(),
        globex_products = globex_products.len(),
        "Demo data seeded"
    );

    Ok(DemoSeed {
        acme,
        globex,
        alice,
        bob,
        acme_products,
        globex_products,
    })
}

fn upsert_tenant(sys: &SystemDb, slug: &str, name: &str) -> Result<Tenant, StoreError> {
    sys.upsert(
        UniqueKey::new().field("slug", slug),
        &Tenant::new(slug, name),
        Patch::new().set("name", name),
    )
}

fn upsert_domain(
    sys: &SystemDb,
    host: &str,
    tenant: &Tenant,
    is_primary: bool,
    status: DomainStatus,
) -> Result<Domain, StoreError> {
    let domain = Domain::new(host, tenant.id, is_primary, status);
    let patch = Patch::new()
        .set("tenant_id", tenant.id)
        .set("is_primary", is_primary)
        .set("status", serde_json::to_value(status)?);
    sys.upsert(UniqueKey::new().field("host", domain.host.as_str()), &domain, patch)
}

fn upsert_user(sys: &SystemDb, email: &str, name: &str) -> Result<User, StoreError> {
    let user = User::new(email, Some(name.to_string()));
    sys.upsert(UniqueKey::new().field("email", user.email.as_str()), &user, Patch::new())
}

fn upsert_membership(db: &TenantDb, membership: Membership) -> Result<Membership, StoreError> {
    let key = UniqueKey::new()
        .field("tenant_id", membership.tenant_id)
        .field("user_id", membership.user_id);
    db.upsert(key, &membership, Patch::new())
}

fn upsert_product(db: &TenantDb, product: &Product) -> Result<Product, StoreError> {
    let key = UniqueKey::new()
        .field("tenant_id", product.tenant_id)
        .field("sku", product.sku.as_str());
    db.upsert(key, product, Patch::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tenantry_store::{Filter, MemoryStore, Page};

    use crate::config::ServiceConfig;

    #[test]
    fn seeding_twice_is_stable() {
        let state = AppState::new(Arc::new(MemoryStore::new()), ServiceConfig::default());
        let first = seed_demo(&state).unwrap();
        let second = seed_demo(&state).unwrap();

        assert_eq!(first.acme.id, second.acme.id);
        assert_eq!(first.alice.id, second.alice.id);
        assert_eq!(
            first.acme_products.iter().map(|p| p.id).collect::<Vec<_>>(),
            second.acme_products.iter().map(|p| p.id).collect::<Vec<_>>()
        );

        let sys = state.system_db();
        let domains: Vec<Domain> = sys.find_many(Filter::All, Page::default()).unwrap();
        assert_eq!(domains.len(), 3);

        let members: Vec<Membership> = state.tenant_db(first.acme.id).find_many(Filter::All, Page::default()).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members.iter().filter(|m| m.is_owner).count(), 1);
    }

    #[test]
    fn seeded_hosts_resolve() {
        let state = AppState::new(Arc::new(MemoryStore::new()), ServiceConfig::default());
        let seed = seed_demo(&state).unwrap();
        let hit = state.resolver.resolve(Some("globex.localhost"), false).unwrap().unwrap();
        assert_eq!(hit.tenant_id, seed.globex.id);
        assert!(state.resolver.resolve(Some("pending.acme.localhost"), false).unwrap().is_none());
    }
}
