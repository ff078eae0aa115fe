//! In-memory store for broker-issued authorization codes.
//!
//! The store is the only shared mutable state in the broker. Every
//! operation takes the lock for the whole check-then-mutate sequence, so
//! two token-exchange requests racing on the same code cannot both redeem
//! it. Nothing holds the lock across upstream network calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::config::defaults::SWEEP_INTERVAL;
use super::types::{BrokerCode, UpstreamGrant};

/// Keyed store mapping broker codes to their bound request context.
#[derive(Clone, Default)]
pub struct CodeStore {
    codes: Arc<RwLock<HashMap<String, BrokerCode>>>,
}

impl CodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self { codes: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Generate a broker code: two UUIDs, 256 bits, URL-safe.
    #[must_use]
    pub fn generate_code() -> String {
        format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    }

    /// Insert a code. Visible to all subsequent lookups once this returns.
    pub async fn put(&self, code: String, context: BrokerCode) {
        self.codes.write().await.insert(code, context);
    }

    /// Look up a code without consuming it.
    ///
    /// Expired entries are reaped here and reported as absent.
    pub async fn get(&self, code: &str) -> Option<BrokerCode> {
        let mut codes = self.codes.write().await;
        match codes.get(code) {
            Some(entry) if entry.is_expired() => {
                codes.remove(code);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Attach the upstream grant to a stored code.
    ///
    /// The single permitted mutation of a code's context. Returns the
    /// updated context, or `None` if the code is unknown or expired.
    pub async fn attach_upstream(&self, code: &str, grant: UpstreamGrant) -> Option<BrokerCode> {
        let mut codes = self.codes.write().await;
        match codes.get_mut(code) {
            Some(entry) if entry.is_expired() => {
                codes.remove(code);
                None
            }
            Some(entry) => {
                entry.upstream = Some(grant);
                Some(entry.clone())
            }
            None => None,
        }
    }

    /// Atomically take a code out of the store.
    ///
    /// Exactly one caller observes a given code: the expiry check and the
    /// removal happen under one write lock. Expired codes are removed and
    /// reported as absent.
    pub async fn consume(&self, code: &str) -> Option<BrokerCode> {
        let mut codes = self.codes.write().await;
        let entry = codes.remove(code)?;
        if entry.is_expired() {
            return None;
        }
        Some(entry)
    }

    /// Remove a code. Idempotent.
    pub async fn delete(&self, code: &str) {
        self.codes.write().await.remove(code);
    }

    /// Number of live entries (for diagnostics).
    pub async fn len(&self) -> usize {
        self.codes.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.codes.read().await.is_empty()
    }

    /// Start the periodic sweep of expired codes.
    ///
    /// Expiry is also enforced lazily on every lookup; the sweep only
    /// bounds memory held by codes nobody ever redeems.
    pub fn start_sweep_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                self.sweep_expired().await;
            }
        });
    }

    async fn sweep_expired(&self) {
        let now = Instant::now();
        let mut codes = self.codes.write().await;
        let before = codes.len();
        codes.retain(|_, entry| entry.expires_at > now);
        let removed = before - codes.len();
        if removed > 0 {
            tracing::debug!(count = removed, "Swept expired broker codes");
        }
    }
}

impl std::fmt::Debug for CodeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeStore").finish()
    }
}
