//! Daily reset policy.
//!
//! The daily pool rolls over at calendar-day granularity, not a rolling 24h
//! window. The check runs lazily before every balance read or consume, so an
//! account idle for several days self-heals on next contact.

use crate::account::Account;
use chrono::NaiveDate;

/// True iff the two calendar dates differ.
pub fn needs_reset(last_reset: NaiveDate, today: NaiveDate) -> bool {
    last_reset != today
}

/// Roll the daily pool over to `cap` if a new calendar day has started.
///
/// The balance is *set* to the cap, never incremented: an idle period of N
/// days still yields exactly `cap`. Returns the signed delta to record as a
/// `reset` transaction, or `None` when no reset was due.
pub fn apply(account: &mut Account, today: NaiveDate, cap: u32) -> Option<i64> {
    if !needs_reset(account.last_reset, today) {
        return None;
    }

    let delta = i64::from(cap) - i64::from(account.daily_balance);
    account.daily_balance = cap;
    account.last_reset = today;
    Some(delta)
}
