//! Wallet storage
//!
//! `WalletStore` keeps one wallet per owner. The owner index is a `DashMap`
//! (its entry API is the uniqueness constraint on owner ids), and each wallet
//! sits behind its own async mutex so that a mutation can hold the wallet for
//! the whole read-validate-write sequence.
//!
//! # Locking
//!
//! - Locks are acquired with a timeout; a timeout surfaces as
//!   `LedgerError::ConcurrencyConflict` and leaves the wallet untouched.
//! - Two wallets are always locked in ascending wallet id order.
//! - Changes are staged on a copy and published with [`WalletStore::commit`]
//!   after [`WalletStore::ensure_current`] has checked the version.
//!
//! Atomicity comes from the lock: every mutation stages and commits while
//! holding the wallet's guard, so the version check cannot fail for a copy
//! taken from that same guard. It only rejects a staged copy that was taken
//! from a different guard or a different wallet.

use crate::config::LedgerConfig;
use crate::types::{EntityKind, LedgerError, OwnerId, SpendingLimits, Wallet, WalletId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Exclusive access to one wallet
pub type WalletGuard = OwnedMutexGuard<Wallet>;

/// Cheap, cloneable pointer to a stored wallet
#[derive(Debug, Clone)]
pub struct WalletHandle {
    id: WalletId,
    owner_id: OwnerId,
    cell: Arc<Mutex<Wallet>>,
}

impl WalletHandle {
    pub fn id(&self) -> WalletId {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

#[derive(Debug)]
pub struct WalletStore {
    /// Owner id to wallet; at most one entry per owner
    wallets: DashMap<OwnerId, WalletHandle>,
    currency: String,
    limits: SpendingLimits,
    lock_timeout: Duration,
}

impl WalletStore {
    pub fn new(
        currency: impl Into<String>,
        limits: SpendingLimits,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            wallets: DashMap::new(),
            currency: currency.into(),
            limits,
            lock_timeout,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(
            config.default_currency.clone(),
            config.default_limits,
            config.lock_timeout,
        )
    }

    /// Create a wallet with zero balance and default limits
    ///
    /// # Errors
    ///
    /// `LedgerError::DuplicateWallet` if the owner already has a wallet.
    pub fn create(&self, owner_id: &str, now: DateTime<Utc>) -> Result<WalletHandle, LedgerError> {
        let mut created = false;
        let handle = self
            .wallets
            .entry(owner_id.to_string())
            .or_insert_with(|| {
                created = true;
                let wallet = Wallet::new(owner_id, self.currency.clone(), self.limits, now);
                WalletHandle {
                    id: wallet.id,
                    owner_id: wallet.owner_id.clone(),
                    cell: Arc::new(Mutex::new(wallet)),
                }
            })
            .value()
            .clone();

        if created {
            info!(owner_id, wallet_id = %handle.id, "Wallet created");
            Ok(handle)
        } else {
            Err(LedgerError::DuplicateWallet {
                owner_id: owner_id.to_string(),
            })
        }
    }

    /// Return the owner's wallet, creating it on first use
    ///
    /// Two concurrent first uses resolve to the same wallet: the losing
    /// create fails with `DuplicateWallet` and is retried as a read.
    pub fn get_or_create(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WalletHandle, LedgerError> {
        if let Some(handle) = self.handle(owner_id) {
            return Ok(handle);
        }

        match self.create(owner_id, now) {
            Err(LedgerError::DuplicateWallet { .. }) => {
                debug!(owner_id, "Lost wallet creation race, reading existing wallet");
                self.require(owner_id, EntityKind::Wallet)
            }
            other => other,
        }
    }

    pub fn handle(&self, owner_id: &str) -> Option<WalletHandle> {
        self.wallets.get(owner_id).map(|entry| entry.value().clone())
    }

    /// Like [`handle`](Self::handle) but failing with `NotFound`
    pub fn require(&self, owner_id: &str, entity: EntityKind) -> Result<WalletHandle, LedgerError> {
        self.handle(owner_id)
            .ok_or_else(|| LedgerError::not_found(entity, owner_id))
    }

    pub fn contains(&self, owner_id: &str) -> bool {
        self.wallets.contains_key(owner_id)
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Acquire exclusive access to a wallet
    ///
    /// # Errors
    ///
    /// `LedgerError::ConcurrencyConflict` if the lock is not obtained within
    /// the configured timeout.
    pub async fn lock(&self, handle: &WalletHandle) -> Result<WalletGuard, LedgerError> {
        tokio::time::timeout(self.lock_timeout, Arc::clone(&handle.cell).lock_owned())
            .await
            .map_err(|_| LedgerError::concurrency_conflict(&handle.owner_id, 1))
    }

    /// Lock two distinct wallets in ascending wallet id order
    ///
    /// Guards are returned in argument order.
    pub async fn lock_pair(
        &self,
        first: &WalletHandle,
        second: &WalletHandle,
    ) -> Result<(WalletGuard, WalletGuard), LedgerError> {
        if first.id <= second.id {
            let a = self.lock(first).await?;
            let b = self.lock(second).await?;
            Ok((a, b))
        } else {
            let b = self.lock(second).await?;
            let a = self.lock(first).await?;
            Ok((a, b))
        }
    }

    /// Copies of every wallet, sorted by owner id
    pub async fn all(&self) -> Result<Vec<Wallet>, LedgerError> {
        let handles: Vec<WalletHandle> = self
            .wallets
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut wallets = Vec::with_capacity(handles.len());
        for handle in handles {
            wallets.push(self.lock(&handle).await?.clone());
        }
        wallets.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));
        Ok(wallets)
    }

    /// Compare-and-set check before publishing staged changes
    ///
    /// # Errors
    ///
    /// `LedgerError::ConcurrencyConflict` if the stored wallet moved on since
    /// `staged` was copied from it.
    pub fn ensure_current(current: &Wallet, staged: &Wallet) -> Result<(), LedgerError> {
        if current.version != staged.version || current.id != staged.id {
            return Err(LedgerError::concurrency_conflict(&current.owner_id, 1));
        }
        Ok(())
    }

    /// Publish staged changes, bumping the version
    ///
    /// Callers run [`ensure_current`](Self::ensure_current) first, before
    /// any other write of the same atomic unit.
    pub fn commit(guard: &mut WalletGuard, mut staged: Wallet, now: DateTime<Utc>) {
        staged.version = guard.version + 1;
        staged.updated_at = now;
        **guard = staged;
    }
}
