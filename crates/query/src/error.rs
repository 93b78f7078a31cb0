use thiserror::Error;

pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Corpus error: {0}")]
    CorpusError(#[from] ulp_corpus::CorpusError),

    #[error("Search worker failed: {0}")]
    WorkerError(String),
}
