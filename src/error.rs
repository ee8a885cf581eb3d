use thiserror::Error;

/// Failures surfaced by the token store, the telemetry client and the polling aggregator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvoyError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No valid token available. Please initialize the relay with a token first.")]
    Unauthorized,

    #[error("Request failed with status {status}: {body}")]
    FetchFailed { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Operation on a disposed aggregator")]
    Disposed,

    #[error("Live data response carried no meter readings")]
    NoMeterData,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl EnvoyError {
    /// Maximum number of characters of a failed response body kept in `FetchFailed`.
    pub const BODY_EXCERPT_LEN: usize = 100;

    pub fn fetch_failed(status: u16, body: &str) -> Self {
        EnvoyError::FetchFailed {
            status,
            body: body.chars().take(Self::BODY_EXCERPT_LEN).collect(),
        }
    }
}

impl From<reqwest::Error> for EnvoyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EnvoyError::Timeout
        } else if e.is_decode() {
            EnvoyError::Decode(e.to_string())
        } else {
            EnvoyError::Transport(e.to_string())
        }
    }
}

pub type EnvoyResult<T> = std::result::Result<T, EnvoyError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
