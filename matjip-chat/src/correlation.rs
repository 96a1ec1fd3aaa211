//! Correlation store for pending recommendations.
//!
//! Phase 1 of the recommendation pipeline deposits an analysis verdict here
//! under a fresh opaque token; phase 2 redeems it. Redemption is a single
//! atomic check-and-mark (`take_once`): across any number of concurrent
//! callers exactly one wins, everyone else sees `AlreadyConsumed` or
//! `OwnerMismatch`. Records are process-memory only and are dropped either on
//! successful consumption or by the periodic expiry sweep.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::gateway::Verdict;

/// How long an unconsumed record stays redeemable.
pub const RECORD_TTL: Duration = Duration::from_secs(5 * 60);

/// How often the background sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Why a redemption attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TakeError {
    /// Token is absent, expired or already swept.
    #[error("analysis not found or expired")]
    NotFound,
    /// The record was already redeemed.
    #[error("analysis already consumed")]
    AlreadyConsumed,
    /// The requester is not the user the record was created for.
    #[error("requester does not own this analysis")]
    OwnerMismatch,
}

/// One pending recommendation opportunity.
#[derive(Debug, Clone)]
pub struct CorrelationRecord {
    pub verdict: Verdict,
    pub owner_user_id: String,
    /// Message that triggered the analysis, for traceability.
    pub source_message_id: i64,
    pub created_at: Instant,
    /// Flips false → true exactly once, never back.
    pub consumed: bool,
}

/// Concurrent, time-bounded token → record map.
pub struct CorrelationStore {
    records: DashMap<String, CorrelationRecord>,
    ttl: Duration,
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::with_ttl(RECORD_TTL)
    }

    /// Store with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    /// Store a verdict for later redemption. Returns the fresh token.
    pub fn insert(&self, verdict: Verdict, owner_user_id: &str, source_message_id: i64) -> String {
        let token = Uuid::new_v4().to_string();
        self.records.insert(
            token.clone(),
            CorrelationRecord {
                verdict,
                owner_user_id: owner_user_id.to_string(),
                source_message_id,
                created_at: Instant::now(),
                consumed: false,
            },
        );

        tracing::info!(token = %token, owner = %owner_user_id, source_message_id, "Analysis cached");
        token
    }

    /// Atomically redeem a record.
    ///
    /// The check-and-mark happens under the shard write guard, so concurrent
    /// calls on the same token serialize and exactly one returns the verdict.
    /// An owner mismatch does not consume the record.
    pub fn take_once(&self, token: &str, requester_user_id: &str) -> Result<Verdict, TakeError> {
        let mut entry = self.records.get_mut(token).ok_or(TakeError::NotFound)?;

        if entry.created_at.elapsed() > self.ttl {
            drop(entry);
            self.records.remove(token);
            return Err(TakeError::NotFound);
        }
        if entry.consumed {
            return Err(TakeError::AlreadyConsumed);
        }
        if entry.owner_user_id != requester_user_id {
            return Err(TakeError::OwnerMismatch);
        }

        entry.consumed = true;
        Ok(entry.verdict.clone())
    }

    /// Drop a record after its result has been delivered.
    pub fn remove(&self, token: &str) {
        self.records.remove(token);
    }

    /// Remove every record older than the TTL relative to `now`.
    /// Returns how many were removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| now.duration_since(record.created_at) <= self.ttl);
        let removed = before.saturating_sub(self.records.len());

        if removed > 0 {
            tracing::info!(removed, "Cleaned up expired analysis records");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
