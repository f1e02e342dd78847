//! Mock platform implementation for testing
//!
//! This module provides a configurable mock platform that can simulate
//! successes, failures and slow uploads. It's designed for integration tests
//! of the posting pipeline without credentials or network access. Every call
//! is recorded so tests can check what would have been posted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::imaging::NormalizeOptions;
use crate::platforms::{Platform, DEFAULT_MAX_IMAGES};
use crate::richtext::RichText;
use crate::types::{ImageMimeType, LinkCard, NormalizedImage};

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "mock-bluesky")
    pub name: String,

    pub auth_succeeds: bool,
    pub auth_error: Option<String>,

    /// Uploads fail for images with this alt text; `Some("")` fails every image without alt
    pub fail_upload_for: Option<String>,

    pub post_succeeds: bool,
    pub post_error: Option<String>,

    pub supports_link_cards: bool,
    pub max_images: usize,
    pub max_width: u32,

    /// Per-alt upload latency, to force out-of-order completion
    pub upload_delays: HashMap<String, Duration>,

    pub auth_call_count: Arc<Mutex<usize>>,
    pub upload_call_count: Arc<Mutex<usize>>,
    pub post_call_count: Arc<Mutex<usize>>,

    /// Alt texts in the order their uploads finished
    pub completed_uploads: Arc<Mutex<Vec<String>>>,

    /// Everything passed to `submit`
    pub submissions: Arc<Mutex<Vec<MockSubmission>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            auth_succeeds: true,
            auth_error: None,
            fail_upload_for: None,
            post_succeeds: true,
            post_error: None,
            supports_link_cards: false,
            max_images: DEFAULT_MAX_IMAGES,
            max_width: crate::config::DEFAULT_MAX_WIDTH,
            upload_delays: HashMap::new(),
            auth_call_count: Arc::new(Mutex::new(0)),
            upload_call_count: Arc::new(Mutex::new(0)),
            post_call_count: Arc::new(Mutex::new(0)),
            completed_uploads: Arc::new(Mutex::new(Vec::new())),
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// What an upload handed back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockMedia {
    pub id: String,
    pub alt: String,
    pub mime_type: ImageMimeType,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEmbed {
    Images(Vec<MockMedia>),
    Card {
        uri: String,
        title: String,
        description: String,
        thumb_width: u32,
    },
}

#[derive(Debug, Clone)]
pub struct MockSubmission {
    pub text: RichText,
    pub embed: Option<MockEmbed>,
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
    authenticated: bool,
}

impl MockPlatform {
    /// Create a new mock platform with the given configuration
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            authenticated: false,
        }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform that can carry link cards, like Bluesky
    pub fn with_link_cards(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            supports_link_cards: true,
            ..Default::default()
        })
    }

    /// Create a mock platform that fails authentication
    pub fn auth_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            auth_succeeds: false,
            auth_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock platform that fails posting
    pub fn post_failure(name: &str, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            post_succeeds: false,
            post_error: Some(error.to_string()),
            ..Default::default()
        })
    }

    /// Create a mock platform whose uploads take `delay` for the given alt text
    pub fn with_upload_delays(name: &str, delays: &[(&str, Duration)]) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            upload_delays: delays
                .iter()
                .map(|(alt, delay)| (alt.to_string(), *delay))
                .collect(),
            ..Default::default()
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Get the number of times authenticate was called
    pub fn auth_call_count(&self) -> usize {
        *self.config.auth_call_count.lock().unwrap()
    }

    /// Get the number of times upload_image was called
    pub fn upload_call_count(&self) -> usize {
        *self.config.upload_call_count.lock().unwrap()
    }

    /// Get the number of times submit was called
    pub fn post_call_count(&self) -> usize {
        *self.config.post_call_count.lock().unwrap()
    }

    pub fn completed_uploads(&self) -> Vec<String> {
        self.config.completed_uploads.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.config.submissions.lock().unwrap().clone()
    }

    /// Embed of the most recent submission
    pub fn last_embed(&self) -> Option<MockEmbed> {
        self.submissions().last().and_then(|s| s.embed.clone())
    }
}

#[async_trait]
impl Platform for MockPlatform {
    type Media = MockMedia;
    type Embed = MockEmbed;

    fn name(&self) -> &str {
        &self.config.name
    }

    fn max_images(&self) -> usize {
        self.config.max_images
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::native(self.config.max_width)
    }

    async fn authenticate(&mut self) -> Result<()> {
        *self.config.auth_call_count.lock().unwrap() += 1;

        if self.config.auth_succeeds {
            self.authenticated = true;
            Ok(())
        } else {
            let error_msg = self
                .config
                .auth_error
                .clone()
                .unwrap_or_else(|| "Mock authentication failed".to_string());
            Err(PlatformError::Authentication(error_msg).into())
        }
    }

    async fn detect_facets(&self, text: &str) -> Result<RichText> {
        Ok(RichText::detect_offline(text))
    }

    fn supports_link_cards(&self) -> bool {
        self.config.supports_link_cards
    }

    async fn upload_image(&self, image: NormalizedImage, alt: &str) -> Result<MockMedia> {
        let call = {
            let mut count = self.config.upload_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if let Some(delay) = self.config.upload_delays.get(alt) {
            sleep(*delay).await;
        }

        if self.config.fail_upload_for.as_deref() == Some(alt) {
            return Err(PlatformError::Upload(format!("Mock upload failed for '{}'", alt)).into());
        }

        self.config
            .completed_uploads
            .lock()
            .unwrap()
            .push(alt.to_string());

        Ok(MockMedia {
            id: format!("{}-media-{}", self.config.name, call),
            alt: alt.to_string(),
            mime_type: image.mime_type,
            width: image.width,
            height: image.height,
            size: image.bytes.len(),
        })
    }

    fn images_embed(&self, media: Vec<MockMedia>) -> MockEmbed {
        MockEmbed::Images(media)
    }

    async fn card_embed(&self, card: &LinkCard) -> Result<MockEmbed> {
        if !self.config.supports_link_cards {
            return Err(PlatformError::NotImplemented(format!(
                "{} does not support link cards",
                self.config.name
            ))
            .into());
        }

        Ok(MockEmbed::Card {
            uri: card.site_url.clone(),
            title: card.title.clone(),
            description: card.description.clone(),
            thumb_width: card.image.width,
        })
    }

    async fn submit(&self, text: &RichText, embed: Option<MockEmbed>) -> Result<String> {
        let count = {
            let mut count = self.config.post_call_count.lock().unwrap();
            *count += 1;
            *count
        };

        if !self.authenticated {
            return Err(PlatformError::Authentication(format!(
                "{} is not authenticated",
                self.config.name
            ))
            .into());
        }

        if !self.config.post_succeeds {
            let error_msg = self
                .config
                .post_error
                .clone()
                .unwrap_or_else(|| "Mock posting failed".to_string());
            return Err(PlatformError::Posting(error_msg).into());
        }

        self.config.submissions.lock().unwrap().push(MockSubmission {
            text: text.clone(),
            embed,
        });

        Ok(format!("{}-post-{}", self.config.name, count))
    }
}
