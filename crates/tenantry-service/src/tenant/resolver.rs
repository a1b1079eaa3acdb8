//! Host to tenant resolution with a short-lived cache.

use std::time::Duration;

use moka::sync::Cache;
use tenantry_core::{normalize_host, Domain, TenantId};
use tenantry_store::{DataAccess, Filter, StoreError, SystemDb};

/// A successful host resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Tenant owning the host.
    pub tenant_id: TenantId,
    /// Whether the host is the tenant's primary domain.
    pub is_primary: bool,
}

/// Maps normalized hosts to tenants through the `domains` table.
///
/// Results, negative ones included, are cached per `(host, allow_pending)`
/// and expire on their own after the TTL. Nothing invalidates them early.
#[derive(Debug)]
pub struct TenantResolver {
    db: SystemDb,
    production: bool,
    cache: Cache<(String, bool), Option<Resolved>>,
}

impl TenantResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new(db: SystemDb, production: bool, ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_entries).time_to_live(ttl).build();
        Self { db, production, cache }
    }

    /// Approximate number of cached resolutions, negative ones included.
    #[must_use]
    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Resolve a raw host header value.
    ///
    /// Unnormalizable hosts resolve to nothing without a lookup. Pending
    /// domains resolve only when `allow_pending` is set and the service is
    /// not in production.
    ///
    /// # Errors
    ///
    /// Returns the store error if the domain lookup fails. Failures are not
    /// cached.
    pub fn resolve(&self, raw_host: Option<&str>, allow_pending: bool) -> Result<Option<Resolved>, StoreError> {
        let Some(host) = normalize_host(raw_host) else {
            return Ok(None);
        };

        let key = (host, allow_pending);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let domain: Option<Domain> = self.db.find_first(Filter::eq("host", key.0.as_str()))?;
        let resolved = domain
            .filter(|d| d.resolves(allow_pending, self.production))
            .map(|d| Resolved {
                tenant_id: d.tenant_id,
                is_primary: d.is_primary,
            });

        tracing::debug!(host = %key.0, allow_pending, resolved = ?resolved.map(|r| r.tenant_id), "Resolved host");
        self.cache.insert(key, resolved);
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tenantry_core::{DomainStatus, Tenant};
    use tenantry_store::MemoryStore;

    fn seeded() -> (SystemDb, TenantId) {
        let sys = SystemDb::new(Arc::new(MemoryStore::new()));
        let tenant = sys.create(&Tenant::new("acme", "Acme")).unwrap();
        sys.create(&Domain::new("shop.example.test", tenant.id, true, DomainStatus::Verified))
            .unwrap();
        sys.create(&Domain::new("pending.example.test", tenant.id, false, DomainStatus::Pending))
            .unwrap();
        (sys, tenant.id)
    }

    fn setup(production: bool) -> (TenantResolver, SystemDb, TenantId) {
        let (sys, tenant) = seeded();
        let resolver = TenantResolver::new(sys.clone(), production, Duration::from_secs(30), 500);
        (resolver, sys, tenant)
    }

    #[test]
    fn verified_host_resolves_after_normalization() {
        let (resolver, _, tenant) = setup(false);
        let hit = resolver.resolve(Some("WWW.Shop.Example.Test:443, proxy.local"), false).unwrap();
        assert_eq!(
            hit,
            Some(Resolved {
                tenant_id: tenant,
                is_primary: true
            })
        );
    }

    #[test]
    fn pending_needs_opt_in_outside_production() {
        let (resolver, _, tenant) = setup(false);
        assert_eq!(resolver.resolve(Some("pending.example.test"), false).unwrap(), None);
        assert_eq!(
            resolver.resolve(Some("pending.example.test"), true).unwrap().map(|r| r.tenant_id),
            Some(tenant)
        );
    }

    #[test]
    fn pending_never_resolves_in_production() {
        let (resolver, _, _) = setup(true);
        assert_eq!(resolver.resolve(Some("pending.example.test"), true).unwrap(), None);
    }

    #[test]
    fn invalid_and_unknown_hosts_do_not_resolve() {
        let (resolver, _, _) = setup(false);
        assert_eq!(resolver.resolve(None, true).unwrap(), None);
        assert_eq!(resolver.resolve(Some("not a host"), true).unwrap(), None);
        assert_eq!(resolver.resolve(Some("nope.example.test"), true).unwrap(), None);
    }

    #[test]
    fn results_are_cached_until_ttl() {
        let (sys, tenant) = seeded();
        let resolver = TenantResolver::new(sys.clone(), false, Duration::from_millis(200), 500);
        assert_eq!(resolver.resolve(Some("late.example.test"), false).unwrap(), None);

        sys.create(&Domain::new("late.example.test", tenant, false, DomainStatus::Verified))
            .unwrap();
        // Negative result still cached.
        assert_eq!(resolver.resolve(Some("late.example.test"), false).unwrap(), None);

        std::thread::sleep(Duration::from_millis(400));
        assert!(resolver.resolve(Some("late.example.test"), false).unwrap().is_some());
    }

    #[test]
    fn cache_is_keyed_on_pending_opt_in() {
        let (resolver, _, tenant) = setup(false);
        assert_eq!(resolver.resolve(Some("pending.example.test"), false).unwrap(), None);
        assert_eq!(
            resolver.resolve(Some("pending.example.test"), true).unwrap().map(|r| r.tenant_id),
            Some(tenant)
        );
        assert_eq!(resolver.resolve(Some("pending.example.test"), false).unwrap(), None);
    }

    #[test]
    fn cache_size_is_bounded() {
        let (sys, _) = seeded();
        let resolver = TenantResolver::new(sys, false, Duration::from_secs(30), 5);
        for i in 0..50 {
            let host = format!("host-{i}.example.test");
            resolver.resolve(Some(host.as_str()), false).unwrap();
        }
        resolver.cache.run_pending_tasks();
        assert!(resolver.cache.entry_count() <= 5);
    }
}
