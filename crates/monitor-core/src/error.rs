use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Outcome source error: {0}")]
    Source(String),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Alert sink error: {0}")]
    Sink(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl MonitorError {
    /// Source and store failures make the tick unclean; sink failures do not.
    pub fn is_collaborator_unreachable(&self) -> bool {
        matches!(
            self,
            MonitorError::Source(_) | MonitorError::Store(_) | MonitorError::Timeout { .. }
        )
    }
}
