use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
/// Batch error
pub enum BatchError {
    /// The backing store could not be reached or the page query failed.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    #[error("Transaction: {0}")]
    Transaction(String),

    #[error("Invalid chunk transition: {0}")]
    InvalidChunkTransition(String),

    #[error("Configuration: {0}")]
    Configuration(String),

    /// A job instance was asked to run while one of its runs is still active.
    #[error("Job already running: {0}")]
    JobAlreadyRunning(String),
}
