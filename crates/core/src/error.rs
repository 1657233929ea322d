use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace.
///
/// Variants map directly to the policy in the error handling design: operator
/// errors surface to the control API, per-URL errors are logged and the crawl
/// continues, per-job fatal errors never take down another job or the process.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("fatal: {0}")]
    Fatal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// HTTP status code this error maps to when it reaches the control API.
    pub fn status_code(&self) -> u16 {
        match self {
            CrawlError::InvalidInput(_) => 400,
            CrawlError::NotFound(_) => 404,
            CrawlError::IllegalTransition(_) => 409,
            CrawlError::Network(_) | CrawlError::Timeout(_) | CrawlError::Parse(_) => 502,
            CrawlError::Persistence(_) | CrawlError::Fatal(_) | CrawlError::Other(_) => 500,
        }
    }
}
