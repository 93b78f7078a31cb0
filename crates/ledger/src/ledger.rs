use crate::account::{Account, AccountId, Balance, LedgerStats, Pool, ReferralInfo};
use crate::error::{LedgerError, Result};
use crate::journal::{self, Journal, LedgerTransaction, TxKind};
use crate::{referral, reset};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Atomic credit operations over the account store.
///
/// Every account lives behind its own mutex, so two concurrent
/// `consume_one` calls on the same account serialize and can never observe
/// the same pre-decrement balance, while mutations on distinct accounts
/// proceed fully in parallel. Operations are O(1) beyond the per-account
/// lock and never block on I/O; durability is delegated to the
/// [`Journal`] writer task.
pub struct Ledger {
    cap: u32,
    referral_bonus: u32,
    accounts: RwLock<HashMap<AccountId, Arc<Mutex<Account>>>>,
    /// referral code -> owning account.
    codes: RwLock<HashMap<String, AccountId>>,
    /// referred id -> referrer id; at most one edge per referred account.
    edges: Mutex<HashMap<AccountId, AccountId>>,
    journal: Journal,
}

impl Ledger {
    /// Load persisted state from `state_dir` and start the journal writer.
    pub async fn open(state_dir: &Path, cap: u32, referral_bonus: u32) -> Result<Self> {
        let loaded = journal::load_accounts(state_dir).await?;
        let journal = Journal::spawn(state_dir, loaded.clone()).await?;

        let mut accounts = HashMap::new();
        let mut codes = HashMap::new();
        let mut edges = HashMap::new();
        for account in loaded {
            codes.insert(account.referral_code.clone(), account.id);
            if let Some(referrer) = account.referred_by {
                edges.insert(account.id, referrer);
            }
            accounts.insert(account.id, Arc::new(Mutex::new(account)));
        }
        log::info!("Ledger opened with {} accounts", accounts.len());

        Ok(Self {
            cap,
            referral_bonus,
            accounts: RwLock::new(accounts),
            codes: RwLock::new(codes),
            edges: Mutex::new(edges),
            journal,
        })
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// Fetch an account, creating it on first contact with a full daily
    /// pool. A valid, non-self referral code on creation records the edge
    /// and credits the referrer's bonus pool exactly once.
    pub fn get_or_create_account(
        &self,
        id: AccountId,
        display_name: &str,
        referral_code: Option<&str>,
    ) -> Account {
        self.get_or_create_account_at(id, display_name, referral_code, today())
    }

    /// Date-injected variant of [`Self::get_or_create_account`].
    pub fn get_or_create_account_at(
        &self,
        id: AccountId,
        display_name: &str,
        referral_code: Option<&str>,
        on: NaiveDate,
    ) -> Account {
        loop {
            if let Some(slot) = self.slot(id) {
                let mut account = lock(&slot);
                self.roll_over(&mut account, on);
                return account.clone();
            }
            if let Some(account) = self.try_create(id, display_name, referral_code, on) {
                return account;
            }
            // Lost the creation race; the account exists now, go read it.
        }
    }

    /// Triggers the lazy reset check, then reads both pools.
    pub fn get_balance(&self, id: AccountId) -> Result<Balance> {
        self.get_balance_at(id, today())
    }

    pub fn get_balance_at(&self, id: AccountId, on: NaiveDate) -> Result<Balance> {
        let slot = self.slot(id).ok_or(LedgerError::NotFound(id))?;
        let mut account = lock(&slot);
        self.roll_over(&mut account, on);
        Ok(Balance::from(&*account))
    }

    pub fn has_credit(&self, id: AccountId) -> bool {
        self.get_balance(id).map(|b| b.total > 0).unwrap_or(false)
    }

    /// Consume one credit, daily pool first. Returns `false` when both
    /// pools are empty (or the account does not exist) with no mutation
    /// and no transaction; that is a normal result, not an error.
    pub fn consume_one(&self, id: AccountId, reason: &str) -> bool {
        self.consume_one_at(id, reason, today())
    }

    pub fn consume_one_at(&self, id: AccountId, reason: &str, on: NaiveDate) -> bool {
        let Some(slot) = self.slot(id) else {
            return false;
        };
        let mut account = lock(&slot);
        self.roll_over(&mut account, on);

        let pool = if account.daily_balance > 0 {
            account.daily_balance -= 1;
            Pool::Daily
        } else if account.bonus_balance > 0 {
            account.bonus_balance -= 1;
            Pool::Bonus
        } else {
            return false;
        };
        account.total_consumed += 1;

        self.journal.record(LedgerTransaction::new(
            id,
            -1,
            TxKind::Consume,
            format!("{reason} ({})", pool.as_str()),
        ));
        self.journal.upsert(account.clone());
        true
    }

    /// Add credits to the named pool, creating the account first when it
    /// does not exist yet (admin grants must succeed for users who never
    /// started a session). Daily grants are not clamped to the cap; the
    /// next reset forces the pool back to exactly the cap.
    pub fn grant(&self, id: AccountId, amount: u32, pool: Pool, note: &str) -> Result<()> {
        self.grant_at(id, amount, pool, note, today())
    }

    pub fn grant_at(
        &self,
        id: AccountId,
        amount: u32,
        pool: Pool,
        note: &str,
        on: NaiveDate,
    ) -> Result<()> {
        self.get_or_create_account_at(id, "", None, on);
        let slot = self.slot(id).ok_or(LedgerError::NotFound(id))?;
        let mut account = lock(&slot);
        match pool {
            Pool::Daily => account.daily_balance = account.daily_balance.saturating_add(amount),
            Pool::Bonus => account.bonus_balance = account.bonus_balance.saturating_add(amount),
        }

        self.journal.record(LedgerTransaction::new(
            id,
            i64::from(amount),
            TxKind::Grant,
            format!("{note} ({})", pool.as_str()),
        ));
        self.journal.upsert(account.clone());
        log::info!("Granted {amount} {} credit(s) to {id}", pool.as_str());
        Ok(())
    }

    /// Resolve a referral code to its owner. Valid only if the code exists
    /// and its owner differs from the candidate account.
    pub fn validate_code(&self, code: &str, candidate: AccountId) -> Option<AccountId> {
        let owner = *read(&self.codes).get(code)?;
        if owner == candidate {
            log::debug!("Rejected self-referral attempt by {candidate}");
            return None;
        }
        Some(owner)
    }

    /// Grant the fixed referral bonus to `referrer` for bringing in
    /// `referred`. Idempotent per pair: re-invocation is a no-op returning
    /// `Ok(false)`. Fails with `NotFound` (no partial mutation) when the
    /// referrer does not exist.
    pub fn credit_referral_bonus(&self, referrer: AccountId, referred: AccountId) -> Result<bool> {
        if referrer == referred {
            return Ok(false);
        }
        let slot = self.slot(referrer).ok_or(LedgerError::NotFound(referrer))?;

        let mut edges = lock(&self.edges);
        if edges.contains_key(&referred) {
            return Ok(false);
        }
        let mut account = lock(&slot);
        account.bonus_balance = account.bonus_balance.saturating_add(self.referral_bonus);
        edges.insert(referred, referrer);

        self.journal.record(LedgerTransaction::new(
            referrer,
            i64::from(self.referral_bonus),
            TxKind::ReferralBonus,
            format!("referral of account {referred}"),
        ));
        self.journal.upsert(account.clone());
        log::info!("Referral bonus: {referrer} referred {referred}");
        Ok(true)
    }

    pub fn referral_info(&self, id: AccountId) -> Result<ReferralInfo> {
        let slot = self.slot(id).ok_or(LedgerError::NotFound(id))?;
        let referral_code = lock(&slot).referral_code.clone();
        let referrals = lock(&self.edges).values().filter(|r| **r == id).count();
        Ok(ReferralInfo {
            referral_code,
            referrals,
        })
    }

    pub fn stats(&self) -> LedgerStats {
        let accounts = read(&self.accounts);
        let mut credits_outstanding = 0u64;
        let mut total_consumed = 0u64;
        for slot in accounts.values() {
            let account = lock(slot);
            credits_outstanding += u64::from(account.available());
            total_consumed += account.total_consumed;
        }
        LedgerStats {
            accounts: accounts.len(),
            credits_outstanding,
            total_consumed,
            referral_edges: lock(&self.edges).len(),
        }
    }

    /// Wait until all pending journal writes have reached disk.
    pub async fn sync(&self) {
        self.journal.sync().await;
    }

    fn slot(&self, id: AccountId) -> Option<Arc<Mutex<Account>>> {
        read(&self.accounts).get(&id).cloned()
    }

    /// Apply the daily reset under the account lock, recording the
    /// transaction when it fires.
    fn roll_over(&self, account: &mut Account, on: NaiveDate) {
        if let Some(delta) = reset::apply(account, on, self.cap) {
            self.journal.record(LedgerTransaction::new(
                account.id,
                delta,
                TxKind::Reset,
                format!("daily pool reset to {}", self.cap),
            ));
            self.journal.upsert(account.clone());
        }
    }

    /// Insert a brand-new account. Returns `None` when another thread won
    /// the creation race.
    fn try_create(
        &self,
        id: AccountId,
        display_name: &str,
        referral_code: Option<&str>,
        on: NaiveDate,
    ) -> Option<Account> {
        let referrer = referral_code.and_then(|code| self.validate_code(code, id));

        let account = {
            let mut accounts = write(&self.accounts);
            if accounts.contains_key(&id) {
                return None;
            }
            let mut codes = write(&self.codes);
            let own_code = referral::generate_code(id, |c| codes.contains_key(c));
            let account = Account::new(id, display_name, self.cap, own_code.clone(), referrer, on);
            codes.insert(own_code, id);
            accounts.insert(id, Arc::new(Mutex::new(account.clone())));
            account
        };

        self.journal.record(LedgerTransaction::new(
            id,
            i64::from(self.cap),
            TxKind::Welcome,
            format!("{} free welcome credits", self.cap),
        ));
        self.journal.upsert(account.clone());
        log::info!("Created account {id}");

        if let Some(referrer) = account.referred_by {
            if let Err(e) = self.credit_referral_bonus(referrer, id) {
                log::warn!("Referral bonus for {referrer} failed: {e}");
            }
        }
        Some(account)
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// Poisoned locks are recovered rather than propagated: a panic while
// holding an account lock leaves a consistent balance (all mutations are
// single-field arithmetic followed by journal sends).
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(rwlock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    rwlock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(rwlock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    rwlock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const CAP: u32 = 2;
    const BONUS: u32 = 1;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn ledger(temp: &TempDir) -> Ledger {
        Ledger::open(temp.path(), CAP, BONUS).await.expect("open")
    }

    #[tokio::test]
    async fn creation_seeds_full_daily_pool() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;

        let account = ledger.get_or_create_account_at(1, "alice", None, date(2026, 1, 1));
        assert_eq!(account.daily_balance, CAP);
        assert_eq!(account.bonus_balance, 0);
        assert!(!account.referral_code.is_empty());

        // Second contact returns the same account, not a fresh one.
        ledger.consume_one_at(1, "search", date(2026, 1, 1));
        let again = ledger.get_or_create_account_at(1, "alice", None, date(2026, 1, 1));
        assert_eq!(again.daily_balance, CAP - 1);
        assert_eq!(again.referral_code, account.referral_code);
    }

    #[tokio::test]
    async fn daily_pool_is_drawn_before_bonus() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        ledger.get_or_create_account_at(1, "", None, on);
        ledger.grant_at(1, 3, Pool::Bonus, "promo", on).unwrap();

        // Drain the daily pool first.
        for _ in 0..CAP {
            assert!(ledger.consume_one_at(1, "search", on));
        }
        let balance = ledger.get_balance_at(1, on).unwrap();
        assert_eq!((balance.daily, balance.bonus), (0, 3));

        // Only then does the bonus pool shrink.
        assert!(ledger.consume_one_at(1, "search", on));
        let balance = ledger.get_balance_at(1, on).unwrap();
        assert_eq!((balance.daily, balance.bonus), (0, 2));
    }

    #[tokio::test]
    async fn consume_conserves_units() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        ledger.get_or_create_account_at(1, "", None, on);
        ledger.grant_at(1, 5, Pool::Bonus, "promo", on).unwrap();
        let before = ledger.get_balance_at(1, on).unwrap().total;

        let mut consumed: u32 = 0;
        while ledger.consume_one_at(1, "search", on) {
            consumed += 1;
        }

        let after = ledger.get_balance_at(1, on).unwrap();
        assert_eq!(consumed, before);
        assert_eq!(after.total, 0);
        let account = ledger.get_or_create_account_at(1, "", None, on);
        assert_eq!(account.total_consumed, u64::from(consumed));
    }

    #[tokio::test]
    async fn empty_pools_are_a_no_op() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        ledger.get_or_create_account_at(1, "", None, on);
        while ledger.consume_one_at(1, "search", on) {}

        let before = ledger.get_or_create_account_at(1, "", None, on);
        assert!(!ledger.consume_one_at(1, "search", on));
        let after = ledger.get_or_create_account_at(1, "", None, on);
        assert_eq!(before, after, "failed consume must not mutate anything");
    }

    #[tokio::test]
    async fn consume_on_unknown_account_is_false() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        assert!(!ledger.consume_one_at(404, "search", date(2026, 1, 1)));
        assert!(ledger.get_balance_at(404, date(2026, 1, 1)).is_err());
    }

    #[tokio::test]
    async fn idle_gap_restores_exactly_cap() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;

        ledger.get_or_create_account_at(1, "", None, date(2026, 1, 1));
        while ledger.consume_one_at(1, "search", date(2026, 1, 1)) {}

        // Ten idle days later the pool is CAP, not 10 * CAP.
        let balance = ledger.get_balance_at(1, date(2026, 1, 11)).unwrap();
        assert_eq!(balance.daily, CAP);
    }

    #[tokio::test]
    async fn over_cap_grant_survives_until_next_reset() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        ledger.get_or_create_account_at(1, "", None, on);
        ledger.grant_at(1, 10, Pool::Daily, "admin top-up", on).unwrap();
        assert_eq!(ledger.get_balance_at(1, on).unwrap().daily, CAP + 10);

        let next_day = ledger.get_balance_at(1, date(2026, 1, 2)).unwrap();
        assert_eq!(next_day.daily, CAP);
    }

    #[tokio::test]
    async fn oversized_grants_saturate_instead_of_wrapping() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        ledger.get_or_create_account_at(1, "", None, on);
        ledger.grant_at(1, u32::MAX, Pool::Bonus, "grant", on).unwrap();
        ledger.grant_at(1, u32::MAX, Pool::Bonus, "grant", on).unwrap();
        ledger.grant_at(1, u32::MAX, Pool::Daily, "grant", on).unwrap();

        let balance = ledger.get_balance_at(1, on).unwrap();
        assert_eq!(balance.bonus, u32::MAX);
        assert_eq!(balance.daily, u32::MAX);
        assert_eq!(balance.total, u32::MAX, "pool sum saturates too");
    }

    #[tokio::test]
    async fn grant_auto_creates_missing_account() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        ledger.grant_at(42, 5, Pool::Bonus, "admin grant", on).unwrap();
        let balance = ledger.get_balance_at(42, on).unwrap();
        assert_eq!(balance.bonus, 5);
        assert_eq!(balance.daily, CAP);
    }

    #[tokio::test]
    async fn referral_bonus_fires_exactly_once() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        let referrer = ledger.get_or_create_account_at(1, "alice", None, on);
        let referred =
            ledger.get_or_create_account_at(2, "bob", Some(&referrer.referral_code), on);
        assert_eq!(referred.referred_by, Some(1));
        assert_eq!(ledger.get_balance_at(1, on).unwrap().bonus, BONUS);

        // Re-invocation for the same pair is a no-op.
        assert!(!ledger.credit_referral_bonus(1, 2).unwrap());
        assert_eq!(ledger.get_balance_at(1, on).unwrap().bonus, BONUS);

        let info = ledger.referral_info(1).unwrap();
        assert_eq!(info.referrals, 1);
    }

    #[tokio::test]
    async fn self_referral_is_rejected_at_validation() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        let account = ledger.get_or_create_account_at(1, "alice", None, on);
        assert_eq!(ledger.validate_code(&account.referral_code, 1), None);
        assert_eq!(ledger.validate_code(&account.referral_code, 2), Some(1));
        assert_eq!(ledger.validate_code("NOSUCHCODE", 2), None);
    }

    #[tokio::test]
    async fn unknown_referral_code_is_ignored_at_creation() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;

        let account =
            ledger.get_or_create_account_at(1, "", Some("NOSUCHCODE"), date(2026, 1, 1));
        assert_eq!(account.referred_by, None);
    }

    #[tokio::test]
    async fn referral_bonus_to_missing_referrer_is_not_found() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;

        let err = ledger.credit_referral_bonus(99, 1).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(99)));
    }

    #[tokio::test]
    async fn stats_aggregate_all_accounts() {
        let temp = TempDir::new().unwrap();
        let ledger = ledger(&temp).await;
        let on = date(2026, 1, 1);

        ledger.get_or_create_account_at(1, "", None, on);
        ledger.get_or_create_account_at(2, "", None, on);
        ledger.consume_one_at(1, "search", on);

        let stats = ledger.stats();
        assert_eq!(stats.accounts, 2);
        assert_eq!(stats.total_consumed, 1);
        assert_eq!(stats.credits_outstanding, u64::from(CAP * 2 - 1));
    }
}
