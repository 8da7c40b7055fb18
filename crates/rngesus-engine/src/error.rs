use thiserror::Error;

/// Failures of the generation backend. Any of these ends the session that
/// hit it; nothing is retried here.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by the generation API, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Malformed stream payload: {0}")]
    MalformedStream(String),

    #[error("No API key configured for the generation backend")]
    MissingApiKey,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Generation backend failed: {0}")]
    Backend(#[from] BackendError),

    /// The parent record is not far enough along to start this session,
    /// e.g. rolling a character before the campaign has any classes.
    #[error("Campaign is incomplete: {0}")]
    IncompleteCampaign(String),

    #[error("Record has not been persisted yet: {0}")]
    Unpersisted(&'static str),
}

pub type Result<T> = std::result::Result<T, EngineError>;
