//! # ULP Service
//!
//! The surface the transport layer (bot, HTTP handler, CLI) talks to: one
//! [`Service`] object wiring the credit ledger, the corpus scanner and the
//! search engine together. Constructed once at process startup and
//! injected; there are no globals.

mod config;
mod error;

pub use config::ServiceConfig;
pub use error::{Result, ServiceError};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use ulp_corpus::{CorpusScanner, CorpusStats};
use ulp_ledger::{Account, AccountId, Balance, Ledger, LedgerStats, Pool, ReferralInfo};
use ulp_query::{SearchEngine, SearchMode, SearchReply};

/// Corpus and ledger counters in one view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub corpus: CorpusStats,
    pub ledger: LedgerStats,
}

pub struct Service {
    ledger: Arc<Ledger>,
    scanner: Arc<CorpusScanner>,
    engine: SearchEngine,
}

impl Service {
    /// Open persisted state and wire the components together.
    pub async fn start(config: ServiceConfig) -> Result<Self> {
        let ledger = Arc::new(
            Ledger::open(&config.state_dir, config.daily_cap, config.referral_bonus).await?,
        );
        let scanner = Arc::new(CorpusScanner::open(&config.corpus_dir)?);
        let engine = SearchEngine::new(Arc::clone(&scanner));
        log::info!(
            "Service started: corpus at {}, state at {}, daily cap {}",
            config.corpus_dir.display(),
            config.state_dir.display(),
            config.daily_cap
        );
        Ok(Self {
            ledger,
            scanner,
            engine,
        })
    }

    // ---- accounts ----

    pub fn get_or_create_account(
        &self,
        id: AccountId,
        display_name: &str,
        referral_code: Option<&str>,
    ) -> Account {
        self.ledger.get_or_create_account(id, display_name, referral_code)
    }

    pub fn get_balance(&self, id: AccountId) -> Result<Balance> {
        Ok(self.ledger.get_balance(id)?)
    }

    pub fn has_credit(&self, id: AccountId) -> bool {
        self.ledger.has_credit(id)
    }

    pub fn consume_one(&self, id: AccountId, reason: &str, query: &str) -> bool {
        self.ledger.consume_one(id, &format!("{reason}: {query}"))
    }

    pub fn grant(
        &self,
        id: AccountId,
        amount: u32,
        pool: Pool,
        actor_id: AccountId,
    ) -> Result<()> {
        Ok(self
            .ledger
            .grant(id, amount, pool, &format!("credits added by admin {actor_id}"))?)
    }

    pub fn referral_info(&self, id: AccountId) -> Result<ReferralInfo> {
        Ok(self.ledger.referral_info(id)?)
    }

    // ---- search ----

    /// Ungated search; the caller is responsible for any crediting.
    pub async fn search(&self, query: &str, mode: SearchMode) -> Result<SearchReply> {
        Ok(self.engine.search(query, mode).await?)
    }

    /// Lazily streamed ungated search; dropping the receiver cancels the
    /// underlying corpus scan.
    pub fn search_stream(&self, query: &str, mode: SearchMode) -> mpsc::Receiver<String> {
        self.engine.stream(query, mode)
    }

    /// Credit-gated search. Returns `None` without scanning when the
    /// account has no credit. Credit is consumed only once the search has
    /// actually produced an answer; a search that fails midway is
    /// delivered as an empty reply and costs nothing.
    pub async fn search_charged(
        &self,
        id: AccountId,
        query: &str,
        mode: SearchMode,
    ) -> Result<Option<SearchReply>> {
        if !self.ledger.has_credit(id) {
            log::debug!("Account {id} has no credit for '{query}'");
            return Ok(None);
        }

        match self.engine.search(query, mode).await {
            Ok(reply) => {
                if !self.consume_one(id, "search", query) {
                    // Concurrent consumption drained the account between
                    // the gate check and here; the answer ships anyway.
                    log::warn!("Account {id} ran out of credit mid-search; not charged");
                }
                Ok(Some(reply))
            }
            Err(e) => {
                log::warn!("Search '{query}' failed, no credit consumed: {e}");
                Ok(Some(SearchReply::empty()))
            }
        }
    }

    // ---- corpus ----

    /// Copy a dump into the corpus directory; visible to searches as soon
    /// as this returns.
    pub async fn ingest_file(&self, path: &Path) -> Result<PathBuf> {
        let scanner = Arc::clone(&self.scanner);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || scanner.ingest_file(&path))
            .await
            .map_err(|e| ServiceError::WorkerError(e.to_string()))?
            .map_err(ServiceError::from)
    }

    /// Walks the whole corpus; runs on the blocking pool.
    pub async fn stats(&self) -> Result<ServiceStats> {
        let scanner = Arc::clone(&self.scanner);
        let corpus = tokio::task::spawn_blocking(move || scanner.stats())
            .await
            .map_err(|e| ServiceError::WorkerError(e.to_string()))?;
        Ok(ServiceStats {
            corpus,
            ledger: self.ledger.stats(),
        })
    }

    /// Flush pending journal writes. Call before process exit.
    pub async fn sync(&self) {
        self.ledger.sync().await;
    }
}
