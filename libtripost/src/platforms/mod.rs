//! Platform abstraction and implementations
//!
//! Each adapter turns normalized images into platform media references,
//! assembles its own embed type, and submits a single post. The orchestrator
//! in [`crate::poster`] drives the adapters through the [`Platform`] trait and
//! never looks inside `Media` or `Embed`.
//!
//! # Examples
//!
//! ```no_run
//! use libtripost::config::{Config, PlatformConfig, PlatformKind};
//! use libtripost::platforms::{mastodon::MastodonPlatform, Platform};
//! use libtripost::richtext::RichText;
//!
//! # async fn example() -> libtripost::error::Result<()> {
//! let config = Config::from_env(PlatformKind::Mastodon)?;
//! let PlatformConfig::Mastodon(mastodon) = &config.platform else { unreachable!() };
//!
//! let mut platform = MastodonPlatform::from_config(mastodon, &config)?;
//! platform.authenticate().await?;
//!
//! let id = platform.submit(&RichText::plain("Hello, fediverse!"), None).await?;
//! println!("Posted: {}", id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::{PlatformError, Result, TripostError};
use crate::imaging::NormalizeOptions;
use crate::richtext::RichText;
use crate::types::{LinkCard, NormalizedImage};

pub mod bluesky;
pub mod mastodon;
pub mod x;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Most images any supported platform accepts on one post
pub const DEFAULT_MAX_IMAGES: usize = 4;

/// Platform trait for posting one rich post to one service
///
/// `Media` is whatever the platform hands back for an uploaded image (a blob
/// reference, a media id). `Embed` is the attachment the post carries; a post
/// has at most one.
#[async_trait]
pub trait Platform: Send + Sync {
    type Media: Send + 'static;
    type Embed: Send;

    /// Lowercase identifier (e.g., "bluesky")
    fn name(&self) -> &str;

    /// Maximum number of images per post
    fn max_images(&self) -> usize {
        DEFAULT_MAX_IMAGES
    }

    /// How images are resized and encoded before [`Platform::upload_image`]
    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::default()
    }

    /// Establish a session or verify credentials
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Authentication` if the credentials are rejected.
    async fn authenticate(&mut self) -> Result<()>;

    /// Detect rich-text facets for `text`. Platforms that render links
    /// server-side keep the default, which detects nothing.
    async fn detect_facets(&self, text: &str) -> Result<RichText> {
        Ok(RichText::plain(text))
    }

    /// Whether the platform can carry a link-preview card
    fn supports_link_cards(&self) -> bool {
        false
    }

    /// Upload one image and return its media reference
    async fn upload_image(&self, image: NormalizedImage, alt: &str) -> Result<Self::Media>;

    /// Wrap uploaded media, already in post order, into an embed
    fn images_embed(&self, media: Vec<Self::Media>) -> Self::Embed;

    /// Upload the card thumbnail and build a link-card embed
    async fn card_embed(&self, _card: &LinkCard) -> Result<Self::Embed> {
        Err(
            PlatformError::NotImplemented(format!("{} does not support link cards", self.name()))
                .into(),
        )
    }

    /// Create the post and return its platform-specific id
    async fn submit(&self, text: &RichText, embed: Option<Self::Embed>) -> Result<String>;
}

/// Map an HTTP status from a platform API to a `PlatformError`
///
/// `fallback` wraps anything that is not an auth, validation, rate-limit or
/// server error, so uploads report `Upload` and posts report `Posting`.
pub(crate) fn map_http_status(
    platform: &str,
    status: u16,
    message: &str,
    context: &str,
    fallback: fn(String) -> PlatformError,
) -> PlatformError {
    let detail = format!("{} {} failed (HTTP {}): {}", platform, context, status, message);
    match status {
        401 | 403 => PlatformError::Authentication(detail),
        400 | 422 => PlatformError::Validation(detail),
        429 => PlatformError::RateLimit(detail),
        500..=599 => PlatformError::Network(detail),
        _ => fallback(detail),
    }
}

/// Any failure of the login call, network or server side included, is an
/// authentication failure
pub(crate) fn login_failure(platform: &str, error: TripostError) -> TripostError {
    match error {
        TripostError::Platform(PlatformError::Authentication(_)) => error,
        other => PlatformError::Authentication(format!("{} login failed: {}", platform, other)).into(),
    }
}

/// Map a transport-level reqwest error
pub(crate) fn map_transport_error(platform: &str, context: &str, error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Network(format!("{} {} timed out: {}", platform, context, error))
    } else {
        PlatformError::Network(format!("{} {} failed: {}", platform, context, error))
    }
}
