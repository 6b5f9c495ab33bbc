use allocledger_core::TrackError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("unknown scenario '{0}' (try `harness list`)")]
    UnknownScenario(String),
    #[error("unknown output format '{0}' (expected plain or json)")]
    UnknownFormat(String),
    #[error("tracker: {0}")]
    Track(#[from] TrackError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
