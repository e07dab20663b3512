//! Error taxonomy for a round
//!
//! None of these are fatal. Every variant degrades to "no answer this
//! round" at the call site.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Image retrieval failed while fingerprinting
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Expected text was not found in a disclosure message
    #[error("disclosure text did not match: {0}")]
    Parse(String),

    /// Knowledge file could not be read or written
    #[error("knowledge store error at {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// Outbound send to the chat collaborator failed
    #[error("send failed: {0}")]
    Send(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OracleError {
    pub fn fetch(url: &str, reason: impl ToString) -> Self {
        OracleError::Fetch {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        OracleError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type OracleResult<T> = std::result::Result<T, OracleError>;
