//! Generation backends: anything that can run a [`Program`] and report the
//! fields it fills in as a stream of cumulative snapshots.

mod openai;

use std::time::Duration;

use futures::stream::BoxStream;

use crate::error::BackendError;
use crate::program::Program;
use crate::request::GenerationRequest;
use crate::schema::PartialOutput;

pub use openai::ChatCompletionBackend;

/// Cumulative snapshots of one generation run. Each item holds every field
/// produced so far, forced echoes included. Dropping the stream cancels the
/// run.
pub type PartialStream = BoxStream<'static, Result<PartialOutput, BackendError>>;

pub trait GenerationBackend: Send + Sync {
    fn generate(&self, program: Program, request: GenerationRequest) -> PartialStream;
}

/// Connection settings for an OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_key: String,
    pub model: String,
    /// Without the trailing `/chat/completions`.
    pub base_url: String,
    /// Upper bound for one HTTP request, streaming included.
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: rngesus_shared::constants::DEFAULT_MODEL.to_string(),
            base_url: rngesus_shared::constants::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
