//! Keyed store of account windows: account_id → per-account lock.
//!
//! Mutation of one account happens under that account's mutex only; the map
//! itself is sharded, so different accounts never contend beyond a shard lookup.
//! Every admitted transaction publishes a fresh [`AccountSnapshot`] so inspection
//! never has to take an account lock.

use super::{AccountSnapshot, AccountState, FeatureVector};
use crate::config::FeaturesConfig;
use crate::error::ValidationError;
use crate::ingest::Transaction;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use tracing::debug;

type Slot = Arc<Mutex<AccountState>>;

pub struct FeatureDeriver {
    config: FeaturesConfig,
    accounts: DashMap<String, Slot>,
    snapshots: DashMap<String, Arc<AccountSnapshot>>,
}

impl FeatureDeriver {
    pub fn new(config: FeaturesConfig) -> Self {
        Self {
            config,
            accounts: DashMap::new(),
            snapshots: DashMap::new(),
        }
    }

    /// Fold an already-validated transaction into its account and return its features.
    pub fn derive(&self, tx: &Transaction) -> FeatureVector {
        let slot = self.slot(&tx.account_id);
        let mut state = lock(&slot);
        let features = state.admit(tx, &self.config);
        self.publish(&tx.account_id, &state);
        features
    }

    /// Run `admit` against the account's history and derive under the same lock, so
    /// the check and the update see the same state. A rejection leaves the account
    /// untouched.
    pub fn derive_with<F>(
        &self,
        tx: Transaction,
        admit: F,
    ) -> Result<(Transaction, FeatureVector), ValidationError>
    where
        F: FnOnce(Transaction, Option<&AccountState>) -> Result<Transaction, ValidationError>,
    {
        let account_id = tx.account_id.clone();
        let slot = self.slot(&account_id);
        let mut state = lock(&slot);
        let history = (!state.is_fresh()).then_some(&*state);
        let tx = match admit(tx, history) {
            Ok(tx) => tx,
            Err(e) => {
                let fresh = state.is_fresh();
                drop(state);
                if fresh {
                    self.accounts
                        .remove_if(&account_id, |_, s| s.try_lock().is_ok_and(|s| s.is_fresh()));
                }
                return Err(e);
            }
        };
        let features = state.admit(&tx, &self.config);
        self.publish(&account_id, &state);
        Ok((tx, features))
    }

    /// Latest published aggregates for an account. Never blocks on the pipeline.
    pub fn snapshot(&self, account_id: &str) -> Option<Arc<AccountSnapshot>> {
        self.snapshots.get(account_id).map(|s| Arc::clone(s.value()))
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Drop accounts with nothing inside the retention window as of `now`.
    /// Accounts currently being processed are skipped.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> Vec<String> {
        let horizon = super::horizon(now, self.config.retention());
        let mut evicted = Vec::new();
        self.accounts.retain(|id, slot| {
            let keep = match slot.try_lock() {
                Ok(state) => state.last_accepted().is_some_and(|t| t >= horizon),
                Err(TryLockError::WouldBlock) => true,
                Err(TryLockError::Poisoned(p)) => p.into_inner().last_accepted().is_some_and(|t| t >= horizon),
            };
            if !keep {
                evicted.push(id.clone());
            }
            keep
        });
        for id in &evicted {
            self.snapshots.remove(id);
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "evicted idle accounts");
        }
        evicted
    }

    fn slot(&self, account_id: &str) -> Slot {
        if let Some(slot) = self.accounts.get(account_id) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.accounts.entry(account_id.to_string()).or_default().value())
    }

    fn publish(&self, account_id: &str, state: &AccountState) {
        self.snapshots
            .insert(account_id.to_string(), Arc::new(state.snapshot(account_id)));
    }
}

fn lock(slot: &Mutex<AccountState>) -> MutexGuard<'_, AccountState> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}
