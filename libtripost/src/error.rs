//! Error types for Tripost

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TripostError>;

#[derive(Error, Debug)]
pub enum TripostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl TripostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            TripostError::InvalidInput(_) => 3,
            TripostError::Platform(PlatformError::Authentication(_)) => 2,
            TripostError::Platform(_) => 1,
            TripostError::Config(_) => 1,
            TripostError::Fetch(_) => 1,
            TripostError::Io { .. } => 1,
            TripostError::Image(_) => 1,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TripostError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Media upload failed: {0}")]
    Upload(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

/// Failures retrieving a remote document or image
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid JSON from {url}: {reason}")]
    Json { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to encode image as {format}: {source}")]
    Encode {
        format: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Image task aborted: {0}")]
    Task(String),
}

/// Link-card failures. Never fatal: the post goes out without a card.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Failed to fetch page {url}: {reason}")]
    Page { url: String, reason: String },

    #[error("No Open Graph metadata found at {0}")]
    NoMetadata(String),

    #[error("Open Graph metadata at {0} has no image")]
    MissingImage(String),

    #[error("Card image {url} unusable: {reason}")]
    Image { url: String, reason: String },
}
