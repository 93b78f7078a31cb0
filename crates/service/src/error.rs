use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Ledger error: {0}")]
    LedgerError(#[from] ulp_ledger::LedgerError),

    #[error("Corpus error: {0}")]
    CorpusError(#[from] ulp_corpus::CorpusError),

    #[error("Query error: {0}")]
    QueryError(#[from] ulp_query::QueryError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    ConfigError(String),

    #[error("Worker failed: {0}")]
    WorkerError(String),
}
