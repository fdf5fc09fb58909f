use thiserror::Error;

#[derive(Error, Debug)]
pub enum DossierError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Contract violation: {0}")]
    Contract(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl DossierError {
    /// Timeouts and dropped connections are worth another attempt; everything
    /// else fails the same way twice.
    pub fn is_transient(&self) -> bool {
        matches!(self, DossierError::Timeout(_) | DossierError::Connection(_))
    }

    /// Configuration and contract errors abort the whole investigation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DossierError::Config(_) | DossierError::Contract(_))
    }
}

impl From<serde_json::Error> for DossierError {
    fn from(e: serde_json::Error) -> Self {
        DossierError::MalformedPayload(e.to_string())
    }
}
