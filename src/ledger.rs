//! Virtual-currency ledger
//!
//! Every mutation runs under a per-account lock and is persisted before the
//! lock is released. Transfers take both account locks in id order and
//! write both balances in one RocksDB batch, so they apply all-or-nothing.

use crate::{
    clock::Clock,
    config::LedgerConfig,
    errors::{BotResult, GameError},
    games::types::UserId,
    storage::{encode_json, BatchOp, Storage},
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const ACCOUNT_PREFIX: &str = "account:";

/// Per-user balance record, created lazily on first lookup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub user_id: UserId,
    pub balance: i64,
    /// Reserve that no current command spends
    pub bonus_points: i64,
    pub last_bonus_claim: Option<DateTime<Utc>>,
}

impl Account {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: 0,
            bonus_points: 0,
            last_bonus_claim: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub sender: UserId,
    pub receiver: UserId,
    pub amount: i64,
    pub sender_balance: i64,
    pub receiver_balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusClaim {
    pub amount: i64,
    pub balance: i64,
}

fn account_key(user: UserId) -> Vec<u8> {
    format!("{}{}", ACCOUNT_PREFIX, user).into_bytes()
}

/// Shared handle on one account's mutex; the map entry is pruned once the
/// last holder lets go
struct AccountLock<'a> {
    locks: &'a DashMap<UserId, Arc<Mutex<()>>>,
    user: UserId,
    lock: Arc<Mutex<()>>,
}

impl Deref for AccountLock<'_> {
    type Target = Mutex<()>;

    fn deref(&self) -> &Mutex<()> {
        &self.lock
    }
}

impl Drop for AccountLock<'_> {
    fn drop(&mut self) {
        // two references left: the map's and ours
        self.locks
            .remove_if(&self.user, |_, held| Arc::ptr_eq(held, &self.lock) && Arc::strong_count(held) == 2);
    }
}

pub struct Ledger {
    storage: Storage,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl Ledger {
    pub fn new(storage: Storage, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        Self {
            storage,
            clock,
            config,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, user: UserId) -> AccountLock<'_> {
        AccountLock {
            locks: &self.locks,
            user,
            lock: self.locks.entry(user).or_default().clone(),
        }
    }

    fn guard(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
        // the guarded unit carries no data, so a poisoned lock is still usable
        lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self, user: UserId) -> BotResult<Account> {
        Ok(self
            .storage
            .get_json(&account_key(user))?
            .unwrap_or_else(|| Account::new(user)))
    }

    fn save(&self, account: &Account) -> BotResult<()> {
        self.storage.put_json(&account_key(account.user_id), account)
    }

    /// Current account, creating a zero-balance one if none exists
    pub fn get_balance(&self, user: UserId) -> BotResult<Account> {
        let lock = self.lock_for(user);
        let _guard = Self::guard(&lock);
        if let Some(account) = self.storage.get_json::<Account>(&account_key(user))? {
            return Ok(account);
        }
        let account = Account::new(user);
        self.save(&account)?;
        debug!(user, "Created account");
        Ok(account)
    }

    /// Unconditional balance change; may drive the balance negative
    fn adjust(&self, user: UserId, delta: i64) -> BotResult<Account> {
        let lock = self.lock_for(user);
        let _guard = Self::guard(&lock);
        let mut account = self.load(user)?;
        account.balance = account.balance.saturating_add(delta);
        self.save(&account)?;
        Ok(account)
    }

    /// Subtract `amount` without an overdraft check
    pub fn debit(&self, user: UserId, amount: i64) -> BotResult<Account> {
        self.adjust(user, amount.saturating_neg())
    }

    pub fn credit(&self, user: UserId, amount: i64) -> BotResult<Account> {
        self.adjust(user, amount)
    }

    /// Check-and-debit as one step under the account lock
    pub fn try_debit(&self, user: UserId, amount: i64) -> BotResult<Account> {
        if amount <= 0 {
            return Err(GameError::InvalidAmount("amount must be positive".to_string()).into());
        }
        let lock = self.lock_for(user);
        let _guard = Self::guard(&lock);
        let mut account = self.load(user)?;
        if account.balance < amount {
            return Err(GameError::InsufficientFunds {
                balance: account.balance,
                needed: amount,
            }
            .into());
        }
        account.balance -= amount;
        self.save(&account)?;
        Ok(account)
    }

    pub fn transfer(&self, sender: UserId, receiver: UserId, amount: i64) -> BotResult<TransferReceipt> {
        if amount <= 0 {
            return Err(GameError::InvalidAmount("amount must be positive".to_string()).into());
        }
        if sender == receiver {
            return Err(GameError::SelfTransfer.into());
        }

        // fixed lock order keeps opposite-direction transfers from deadlocking
        let (first, second) = if sender < receiver { (sender, receiver) } else { (receiver, sender) };
        let first_lock = self.lock_for(first);
        let second_lock = self.lock_for(second);
        let _first_guard = Self::guard(&first_lock);
        let _second_guard = Self::guard(&second_lock);

        let mut from = self.load(sender)?;
        let mut to = self.load(receiver)?;
        if from.balance < amount {
            return Err(GameError::InsufficientFunds {
                balance: from.balance,
                needed: amount,
            }
            .into());
        }
        from.balance -= amount;
        to.balance = to.balance.saturating_add(amount);

        self.storage.batch_write(vec![
            BatchOp::Put(account_key(sender), encode_json(&from)?),
            BatchOp::Put(account_key(receiver), encode_json(&to)?),
        ])?;

        info!(sender, receiver, amount, "Transfer applied");
        Ok(TransferReceipt {
            sender,
            receiver,
            amount,
            sender_balance: from.balance,
            receiver_balance: to.balance,
        })
    }

    /// Time left before the account may claim again, if any
    pub fn bonus_cooldown_remaining(&self, account: &Account) -> Option<Duration> {
        let last = account.last_bonus_claim?;
        let ready_at = last + Duration::minutes(self.config.bonus_cooldown_minutes);
        let now = self.clock.now();
        (ready_at > now).then(|| ready_at - now)
    }

    pub fn can_claim_bonus(&self, user: UserId) -> BotResult<bool> {
        let account = self.get_balance(user)?;
        Ok(self.bonus_cooldown_remaining(&account).is_none())
    }

    /// Grant a random bonus if the cooldown has elapsed
    pub fn claim_bonus(&self, user: UserId) -> BotResult<BonusClaim> {
        let lock = self.lock_for(user);
        let _guard = Self::guard(&lock);
        let mut account = self.load(user)?;

        if let Some(remaining) = self.bonus_cooldown_remaining(&account) {
            return Err(GameError::BonusTooEarly {
                remaining_secs: remaining.num_seconds().max(1),
            }
            .into());
        }

        let amount = rand::thread_rng().gen_range(self.config.bonus_min..=self.config.bonus_max);
        account.balance = account.balance.saturating_add(amount);
        account.last_bonus_claim = Some(self.clock.now());
        self.save(&account)?;

        info!(user, amount, "Bonus claimed");
        Ok(BonusClaim {
            amount,
            balance: account.balance,
        })
    }

    /// Richest accounts, highest balance first
    pub fn leaderboard(&self, limit: usize) -> BotResult<Vec<Account>> {
        let mut accounts: Vec<Account> = Vec::new();
        let mut cursor: Option<Vec<u8>> = None;
        loop {
            let rows = self
                .storage
                .scan_prefix(ACCOUNT_PREFIX.as_bytes(), cursor.as_deref(), 512)?;
            let Some((last_key, _)) = rows.last() else {
                break;
            };
            cursor = Some(last_key.clone());
            for (_, value) in &rows {
                accounts.push(serde_json::from_slice(value)?);
            }
            if rows.len() < 512 {
                break;
            }
        }
        accounts.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.user_id.cmp(&b.user_id)));
        accounts.truncate(limit);
        Ok(accounts)
    }
}
