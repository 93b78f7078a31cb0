//! Durable ledger state.
//!
//! Two artifacts live under the state directory: `accounts.json`, an
//! authoritative snapshot of every account, and `transactions.jsonl`, an
//! append-only audit log with one JSON record per balance change. Both are
//! written by a single background task fed over a channel, so ledger
//! mutations never block on disk I/O. The snapshot is replaced atomically
//! via write-tmp-then-rename.

use crate::account::{Account, AccountId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

const ACCOUNTS_FILE_NAME: &str = "accounts.json";
const TRANSACTIONS_FILE_NAME: &str = "transactions.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Free credits seeded at account creation.
    Welcome,
    Grant,
    Consume,
    Reset,
    ReferralBonus,
}

/// Immutable once written; appended on every balance change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub account: AccountId,
    pub delta: i64,
    pub kind: TxKind,
    pub note: String,
    pub at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(account: AccountId, delta: i64, kind: TxKind, note: impl Into<String>) -> Self {
        Self {
            account,
            delta,
            kind,
            note: note.into(),
            at: Utc::now(),
        }
    }
}

enum Job {
    Record(LedgerTransaction),
    Upsert(Account),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background writer task. Cheap to clone; all senders share
/// one writer.
#[derive(Clone)]
pub struct Journal {
    jobs: mpsc::UnboundedSender<Job>,
}

impl Journal {
    /// Start the writer task. Opens the append log eagerly so permission
    /// problems surface at startup rather than on the first mutation.
    pub async fn spawn(state_dir: &Path, accounts: Vec<Account>) -> Result<Self> {
        tokio::fs::create_dir_all(state_dir).await?;
        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(state_dir.join(TRANSACTIONS_FILE_NAME))
            .await?;

        let writer = Writer {
            accounts_path: state_dir.join(ACCOUNTS_FILE_NAME),
            log,
            snapshot: accounts.into_iter().map(|a| (a.id, a)).collect(),
            snapshot_dirty: false,
        };

        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer.run(rx));
        Ok(Self { jobs })
    }

    pub fn record(&self, tx: LedgerTransaction) {
        if self.jobs.send(Job::Record(tx)).is_err() {
            log::warn!("journal writer is gone; transaction dropped");
        }
    }

    pub fn upsert(&self, account: Account) {
        if self.jobs.send(Job::Upsert(account)).is_err() {
            log::warn!("journal writer is gone; account snapshot dropped");
        }
    }

    /// Wait until everything sent so far has reached disk.
    pub async fn sync(&self) {
        let (ack, done) = oneshot::channel();
        if self.jobs.send(Job::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

struct Writer {
    accounts_path: PathBuf,
    log: tokio::fs::File,
    snapshot: BTreeMap<AccountId, Account>,
    snapshot_dirty: bool,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            let mut acks = Vec::new();
            self.apply(job, &mut acks).await;
            // Drain whatever queued up so a burst of mutations costs one
            // snapshot rewrite, not one per mutation.
            while let Ok(job) = rx.try_recv() {
                self.apply(job, &mut acks).await;
            }

            if let Err(e) = self.log.flush().await {
                log::error!("Failed to flush transaction log: {e}");
            }
            if self.snapshot_dirty {
                match self.write_snapshot().await {
                    Ok(()) => self.snapshot_dirty = false,
                    Err(e) => log::error!("Failed to persist account snapshot: {e}"),
                }
            }
            for ack in acks {
                let _ = ack.send(());
            }
        }
    }

    async fn apply(&mut self, job: Job, acks: &mut Vec<oneshot::Sender<()>>) {
        match job {
            Job::Record(tx) => match serde_json::to_string(&tx) {
                Ok(mut line) => {
                    line.push('\n');
                    if let Err(e) = self.log.write_all(line.as_bytes()).await {
                        log::error!("Failed to append transaction: {e}");
                    }
                }
                Err(e) => log::error!("Unserializable transaction: {e}"),
            },
            Job::Upsert(account) => {
                self.snapshot.insert(account.id, account);
                self.snapshot_dirty = true;
            }
            Job::Flush(ack) => acks.push(ack),
        }
    }

    async fn write_snapshot(&self) -> Result<()> {
        let accounts: Vec<&Account> = self.snapshot.values().collect();
        let bytes = serde_json::to_vec_pretty(&accounts)?;
        let tmp = self.accounts_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.accounts_path).await?;
        Ok(())
    }
}

/// Load the account snapshot, or an empty ledger when none exists yet.
pub async fn load_accounts(state_dir: &Path) -> Result<Vec<Account>> {
    let path = state_dir.join(ACCOUNTS_FILE_NAME);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = tokio::fs::read(&path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Read the full audit log. Intended for inspection and tests, not for
/// balance recovery; the snapshot is authoritative.
pub async fn read_transactions(state_dir: &Path) -> Result<Vec<LedgerTransaction>> {
    let path = state_dir.join(TRANSACTIONS_FILE_NAME);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = tokio::fs::read_to_string(&path).await?;
    let mut out = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(line)?);
    }
    Ok(out)
}
