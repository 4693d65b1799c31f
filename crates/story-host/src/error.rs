use story_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("document error: {0}")]
    Model(#[from] ModelError),
    #[error("request failed: {0}")]
    Transient(String),
    #[error("invalid resource: {0}")]
    InvalidResource(String),
    #[error("{0} timed out")]
    Timeout(String),
    #[error("session closed")]
    Closed,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostError {
    /// Failures that are shown to the user and leave the document as it was.
    pub fn is_recoverable(&self) -> bool {
        match self {
            HostError::Model(err) => !err.is_defect(),
            HostError::Transient(_) | HostError::InvalidResource(_) | HostError::Timeout(_) => {
                true
            }
            HostError::Closed | HostError::Json(_) => false,
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;
