use thiserror::Error;

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid source config: {0}")]
    InvalidSource(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Source is disabled: {0}")]
    SourceDisabled(String),

    #[error("Invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("Blocked by robots.txt: {0}")]
    RobotsDisallowed(String),

    #[error("Unexpected status {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Ingest rejected batch (HTTP {status}): {body}")]
    Ingest { status: u16, body: String },

    #[error("Ingest rate limited (HTTP 429): {0}")]
    RateLimited(String),

    #[error("Scrape cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl TributaryError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::Ingest { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, TributaryError>;
