//! Service configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Deployment environment, read from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development. Test fallbacks and pending domains are allowed.
    #[default]
    Development,
    /// Automated tests. Same relaxations as development.
    Test,
    /// Production. Host resolution only, verified domains only.
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        })
    }
}

/// Which [`tenantry_store::Store`] the binary opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Process-local in-memory store.
    #[default]
    Memory,
    /// `RocksDB` under `DATA_DIR` (needs the `rocksdb-backend` feature).
    RocksDb,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "rocksdb" | "rocks" => Ok(Self::RocksDb),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::RocksDb => "rocksdb",
        })
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Deployment environment (default: development).
    pub environment: Environment,

    /// Storage backend (default: memory).
    pub store_backend: StoreBackend,

    /// Path to the `RocksDB` data directory (default: "/data/tenantry").
    pub data_dir: String,

    /// HS256 secret for bearer tokens.
    pub jwt_secret: String,

    /// Mutations allowed per client IP per window.
    pub rl_mutation_per_ip: u32,

    /// Mutations allowed per user per window.
    pub rl_mutation_per_user: u32,

    /// Rate limit window length in seconds.
    pub rl_window_seconds: u64,

    /// Tenant resolver cache TTL in seconds.
    pub tenant_cache_ttl_seconds: u64,

    /// Tenant resolver cache capacity.
    pub tenant_cache_max_entries: u64,

    /// Retention of completed idempotency records in hours.
    pub idempotency_ttl_hours: u64,

    /// Retention of pending idempotency records in seconds.
    pub idempotency_pending_ttl_seconds: u64,

    /// How often the retention sweep runs, in seconds.
    pub idempotency_sweep_interval_seconds: u64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Seed the demo tenants on startup.
    pub seed_demo: bool,
}

/// Development-only fallback for `JWT_SECRET`.
pub const DEV_JWT_SECRET: &str = "tenantry-dev-secret";

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            environment: parsed("APP_ENV").unwrap_or(defaults.environment),
            store_backend: parsed("STORE_BACKEND").unwrap_or(defaults.store_backend),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            rl_mutation_per_ip: parsed("RL_MUTATION_PER_IP_PER_MIN").unwrap_or(defaults.rl_mutation_per_ip),
            rl_mutation_per_user: parsed("RL_MUTATION_PER_USER_PER_MIN").unwrap_or(defaults.rl_mutation_per_user),
            rl_window_seconds: parsed("RL_WINDOW_SECONDS").unwrap_or(defaults.rl_window_seconds),
            tenant_cache_ttl_seconds: parsed("TENANT_CACHE_TTL_SECONDS")
                .unwrap_or(defaults.tenant_cache_ttl_seconds),
            tenant_cache_max_entries: parsed("TENANT_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.tenant_cache_max_entries),
            idempotency_ttl_hours: parsed("IDEMPOTENCY_TTL_HOURS").unwrap_or(defaults.idempotency_ttl_hours),
            idempotency_pending_ttl_seconds: parsed("IDEMPOTENCY_PENDING_TTL_SECONDS")
                .unwrap_or(defaults.idempotency_pending_ttl_seconds),
            idempotency_sweep_interval_seconds: parsed("IDEMPOTENCY_SWEEP_INTERVAL_SECONDS")
                .unwrap_or(defaults.idempotency_sweep_interval_seconds),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: parsed("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parsed("REQUEST_TIMEOUT_SECONDS").unwrap_or(defaults.request_timeout_seconds),
            seed_demo: std::env::var("SEED_DEMO").is_ok_and(|v| matches!(v.trim(), "1" | "true" | "yes")),
        }
    }

    /// Whether production restrictions apply.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// The fixed rate limit window.
    #[must_use]
    pub const fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rl_window_seconds)
    }

    /// Tenant resolver cache TTL.
    #[must_use]
    pub const fn tenant_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tenant_cache_ttl_seconds)
    }
}

fn parsed<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            environment: Environment::Development,
            store_backend: StoreBackend::Memory,
            data_dir: "/data/tenantry".into(),
            jwt_secret: DEV_JWT_SECRET.into(),
            rl_mutation_per_ip: 120,
            rl_mutation_per_user: 60,
            rl_window_seconds: 60,
            tenant_cache_ttl_seconds: 30,
            tenant_cache_max_entries: 500,
            idempotency_ttl_hours: 24,
            idempotency_pending_ttl_seconds: 300,
            idempotency_sweep_interval_seconds: 300,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024, // 1MB
            request_timeout_seconds: 30,
            seed_demo: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("PRODUCTION".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ServiceConfig::default();
        assert!(!cfg.is_production());
        assert_eq!(cfg.rl_mutation_per_ip, 120);
        assert_eq!(cfg.rl_mutation_per_user, 60);
        assert_eq!(cfg.tenant_cache_ttl(), Duration::from_secs(30));
        assert_eq!(cfg.tenant_cache_max_entries, 500);
    }
}
