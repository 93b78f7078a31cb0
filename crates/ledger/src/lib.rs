//! # ULP Ledger
//!
//! Per-user credit accounting for the gated corpus search service.
//!
//! Each account carries two consumable pools: a daily pool that rolls over
//! to a fixed cap once per calendar day, and a bonus pool that only changes
//! via explicit grants (admin top-ups, referral incentives) and never
//! auto-resets. All mutations go through [`Ledger`], are serialized per
//! account, and leave a record in an append-only transaction journal.

mod account;
mod error;
mod journal;
mod ledger;
mod referral;
mod reset;

pub use account::{Account, AccountId, Balance, LedgerStats, Pool, ReferralInfo};
pub use error::{LedgerError, Result};
pub use journal::{read_transactions, LedgerTransaction, TxKind};
pub use ledger::Ledger;
pub use reset::needs_reset;
