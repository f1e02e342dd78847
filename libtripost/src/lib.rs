//! Tripost - post one description to Bluesky, Mastodon or X
//!
//! This library loads a platform-agnostic post (text plus ordered images),
//! normalizes its media, and publishes it through a per-platform adapter.
//! Bluesky posts without images get a link card for their first URL.

pub mod config;
pub mod error;
pub mod imaging;
pub mod linkcard;
pub mod logging;
pub mod platforms;
pub mod poster;
pub mod richtext;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use config::{Config, PlatformKind};
pub use error::{Result, TripostError};
pub use poster::Poster;
pub use source::SourceResolver;
pub use types::{ImageRef, PostDescription, PostOutcome, PostPath};
