/// Application name
pub const APP_NAME: &str = "rngesus";

/// Separator between the pitch, story hook and mechanics sections of a
/// campaign description.
pub const DESCRIPTION_SEPARATOR: &str = "\n---\n";

/// Default minimum spacing between streamed updates, in seconds
pub const DEFAULT_UPDATE_FREQUENCY_SECS: f64 = 1.0;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default chat-completion model
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Default OpenAI-compatible API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Conventional attribute score range handed to the model when rolling
pub const MIN_ATTRIBUTE_SCORE: i64 = 1;
pub const MAX_ATTRIBUTE_SCORE: i64 = 20;
