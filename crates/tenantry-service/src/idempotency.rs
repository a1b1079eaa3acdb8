//! Idempotency coordination for mutating requests.
//!
//! Per fingerprint the record moves `absent -> pending -> completed` and
//! nothing on the request path ever moves it back. Reservation relies on the
//! store's unique constraint over the fingerprint, so two instances racing on
//! the same key still produce exactly one winner. Only the retention sweep
//! deletes records.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use tenantry_core::{Fingerprint, IdempotencyRecord};
use tenantry_store::{DataAccess, Filter, Page, Patch, StoreError, SystemDb};

use crate::error::ApiError;
use crate::response::Envelope;

/// Result of [`IdempotencyCoordinator::reserve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    /// No key was sent; run normally.
    NotRequested,
    /// This request owns the fingerprint and must run.
    Reserved(Fingerprint),
    /// A completed result exists; send it back verbatim.
    Replay {
        /// Stored status code.
        status: u16,
        /// Stored body bytes.
        body: String,
    },
    /// Another request with this fingerprint has not finished.
    InProgress,
}

/// Retention windows for the sweep.
#[derive(Debug, Clone, Copy)]
pub struct Retention {
    /// How long completed records are kept.
    pub completed: Duration,
    /// How long pending records are kept.
    pub pending: Duration,
}

/// Reserves, completes and sweeps idempotency records.
#[derive(Debug, Clone)]
pub struct IdempotencyCoordinator {
    db: SystemDb,
}

impl IdempotencyCoordinator {
    /// Create a coordinator over the system handle.
    #[must_use]
    pub const fn new(db: SystemDb) -> Self {
        Self { db }
    }

    /// Claim `fp`, or report what already holds it.
    ///
    /// # Errors
    ///
    /// Returns the store error for anything but the expected unique race.
    pub fn reserve(&self, fp: Option<Fingerprint>) -> Result<Reservation, StoreError> {
        let Some(fp) = fp else {
            return Ok(Reservation::NotRequested);
        };

        match self.db.create(&IdempotencyRecord::pending(&fp)) {
            Ok(_) => {
                tracing::debug!(key = %fp.key, method = %fp.method, path = %fp.path, "Idempotency key reserved");
                Ok(Reservation::Reserved(fp))
            }
            Err(StoreError::UniqueViolation { .. }) => {
                let existing: Option<IdempotencyRecord> = self.db.find_first(fingerprint_filter(&fp))?;
                Ok(match existing.as_ref().and_then(IdempotencyRecord::completed) {
                    Some((status, body)) => {
                        tracing::info!(key = %fp.key, status, "Replaying idempotent response");
                        Reservation::Replay {
                            status,
                            body: body.to_string(),
                        }
                    }
                    None => {
                        tracing::warn!(key = %fp.key, path = %fp.path, "Idempotent request still in progress");
                        Reservation::InProgress
                    }
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Store the outcome of a reserved request. Non-2xx results are ignored
    /// so that a failed attempt stays retryable.
    ///
    /// Returns whether a pending record was completed.
    ///
    /// # Errors
    ///
    /// Returns the store error if the update fails.
    pub fn persist_success(&self, fp: &Fingerprint, status: u16, body: &str) -> Result<bool, StoreError> {
        if !(200..300).contains(&status) {
            return Ok(false);
        }
        let pending = fingerprint_filter(fp).and(Filter::eq("status_code", Value::Null));
        let patch = Patch::new().set("status_code", status).set("response_body", body);
        Ok(self.db.update_many::<IdempotencyRecord>(pending, patch)? > 0)
    }

    /// Run `work` under the idempotency protocol.
    ///
    /// Replays and in-progress collisions return before `work` is polled.
    /// A 2xx result is persisted before it is returned.
    ///
    /// # Errors
    ///
    /// `ApiError::InProgress` on a collision, or whatever `work` returns.
    pub async fn run<F>(&self, fp: Option<Fingerprint>, work: F) -> Result<Envelope, ApiError>
    where
        F: Future<Output = Result<Envelope, ApiError>>,
    {
        let reserved = match self.reserve(fp)? {
            Reservation::Replay { status, body } => return Ok(Envelope::replay(status, body)),
            Reservation::InProgress => return Err(ApiError::InProgress),
            Reservation::Reserved(fp) => Some(fp),
            Reservation::NotRequested => None,
        };

        let envelope = work.await?;
        if let Some(fp) = reserved {
            // The side effect has committed; a failed write here leaves the key
            // pending until the sweep rather than failing the response.
            if let Err(e) = self.persist_success(&fp, envelope.status.as_u16(), &envelope.body) {
                tracing::error!(key = %fp.key, error = %e, "Failed to persist idempotent response");
            }
        }
        Ok(envelope)
    }

    /// Delete records past their retention. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns the store error if listing or deleting fails.
    pub fn sweep(&self, now: DateTime<Utc>, retention: Retention) -> Result<u64, StoreError> {
        let records: Vec<IdempotencyRecord> = self.db.find_many(Filter::All, Page::default())?;
        let expired: Vec<Filter> = records
            .iter()
            .filter(|r| {
                let ttl = if r.completed().is_some() {
                    retention.completed
                } else {
                    retention.pending
                };
                r.created_at + ttl <= now
            })
            .map(|r| Filter::eq("id", r.id))
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }
        let removed = self.db.delete_many::<IdempotencyRecord>(Filter::Or(expired))?;
        tracing::info!(removed, "Swept idempotency records");
        Ok(removed)
    }
}

fn fingerprint_filter(fp: &Fingerprint) -> Filter {
    Filter::eq("key", fp.key.as_str())
        .and(Filter::eq("method", fp.method.as_str()))
        .and(Filter::eq("path", fp.path.as_str()))
        .and(Filter::eq("user_id", fp.user_id.map_or(Value::Null, Value::from)))
        .and(Filter::eq("tenant_id", fp.tenant_id.map_or(Value::Null, Value::from)))
}
