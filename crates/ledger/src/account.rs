use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// External identity key for an account. Assigned by the transport layer
/// (e.g. a messenger user id) and never reused.
pub type AccountId = i64;

/// Which credit pool a grant targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    /// Resets to the configured cap once per calendar day.
    Daily,
    /// Only changes via explicit grant/consume; never auto-resets.
    Bonus,
}

impl Pool {
    pub const fn as_str(self) -> &'static str {
        match self {
            Pool::Daily => "daily",
            Pool::Bonus => "bonus",
        }
    }
}

/// Durable per-user record. Created lazily on first contact, mutated only
/// through [`crate::Ledger`] operations, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    #[serde(default)]
    pub display_name: String,
    /// May transiently exceed the cap after an admin grant; the next daily
    /// reset forces it back to exactly the cap.
    pub daily_balance: u32,
    pub bonus_balance: u32,
    pub total_consumed: u64,
    /// Globally unique, assigned once at creation.
    pub referral_code: String,
    /// Set once at creation; must reference a pre-existing distinct account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<AccountId>,
    pub last_reset: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        id: AccountId,
        display_name: &str,
        daily_balance: u32,
        referral_code: String,
        referred_by: Option<AccountId>,
        today: NaiveDate,
    ) -> Self {
        Self {
            id,
            display_name: display_name.to_string(),
            daily_balance,
            bonus_balance: 0,
            total_consumed: 0,
            referral_code,
            referred_by,
            last_reset: today,
            created_at: Utc::now(),
        }
    }

    /// Credits currently available across both pools. Saturating: two
    /// near-max pools report `u32::MAX`, they do not wrap.
    pub fn available(&self) -> u32 {
        self.daily_balance.saturating_add(self.bonus_balance)
    }
}

/// Balance view returned to the transport layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balance {
    pub daily: u32,
    pub bonus: u32,
    /// `daily + bonus`.
    pub total: u32,
}

impl From<&Account> for Balance {
    fn from(account: &Account) -> Self {
        Self {
            daily: account.daily_balance,
            bonus: account.bonus_balance,
            total: account.available(),
        }
    }
}

/// Aggregate counters over the whole ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub accounts: usize,
    pub credits_outstanding: u64,
    pub total_consumed: u64,
    pub referral_edges: usize,
}

/// Referral summary for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralInfo {
    pub referral_code: String,
    pub referrals: usize,
}
