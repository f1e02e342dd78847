//! Mastodon platform implementation
//!
//! Uses the megalodon library behind the narrow [`MastodonApi`] trait, so the
//! temp-file handling around media uploads can be tested without an instance.
//! megalodon uploads media from a file path; each normalized image is written
//! to a scoped temp file under the configured temp directory and removed as
//! soon as the upload call returns.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use megalodon::entities::UploadMedia;
use megalodon::megalodon::{
    PostStatusInputOptions, PostStatusOutput, UploadMediaInputOptions,
};
use megalodon::{Megalodon, SNS};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::{Config, MastodonConfig};
use crate::error::{PlatformError, Result, TripostError};
use crate::imaging::NormalizeOptions;
use crate::platforms::{login_failure, Platform};
use crate::richtext::RichText;
use crate::types::NormalizedImage;

/// The Mastodon REST calls tripost needs
#[async_trait]
pub trait MastodonApi: Send + Sync {
    /// Returns the account's `acct`
    async fn verify_credentials(&self) -> Result<String>;

    /// Upload the file at `path`; returns the media id
    async fn upload_media(&self, path: &Path, description: Option<&str>) -> Result<String>;

    /// Publish a status; returns the status id
    async fn post_status(&self, text: &str, media_ids: Vec<String>) -> Result<String>;
}

/// [`MastodonApi`] backed by a megalodon client
pub struct MegalodonApi {
    client: Box<dyn Megalodon + Send + Sync>,
}

impl MegalodonApi {
    pub fn new(instance_url: String, access_token: String) -> Result<Self> {
        let client = megalodon::generator(SNS::Mastodon, instance_url, Some(access_token), None)
            .map_err(|e| {
                PlatformError::Authentication(format!("Failed to create Mastodon client: {:?}", e))
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MastodonApi for MegalodonApi {
    async fn verify_credentials(&self) -> Result<String> {
        let response = self
            .client
            .verify_account_credentials()
            .await
            .map_err(|e| map_megalodon_error(e, "authenticate", PlatformError::Authentication))?;
        Ok(response.json.acct)
    }

    async fn upload_media(&self, path: &Path, description: Option<&str>) -> Result<String> {
        let options = UploadMediaInputOptions {
            description: description.map(str::to_string),
            ..Default::default()
        };

        let response = self
            .client
            .upload_media(path.to_string_lossy().into_owned(), Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "upload media", PlatformError::Upload))?;

        let id = match response.json {
            UploadMedia::Attachment(attachment) => attachment.id,
            UploadMedia::AsyncAttachment(attachment) => {
                debug!("Mastodon is still processing media {}", attachment.id);
                attachment.id
            }
        };
        Ok(id)
    }

    async fn post_status(&self, text: &str, media_ids: Vec<String>) -> Result<String> {
        let options = PostStatusInputOptions {
            media_ids: (!media_ids.is_empty()).then_some(media_ids),
            ..Default::default()
        };

        let response = self
            .client
            .post_status(text.to_string(), Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "post status", PlatformError::Posting))?;

        let post_id = match response.json {
            PostStatusOutput::Status(status) => status.id,
            PostStatusOutput::ScheduledStatus(scheduled) => scheduled.id,
        };
        Ok(post_id)
    }
}

pub struct MastodonPlatform<A: MastodonApi = MegalodonApi> {
    api: A,
    temp_dir: PathBuf,
    max_width: u32,
}

impl MastodonPlatform<MegalodonApi> {
    pub fn from_config(mastodon: &MastodonConfig, config: &Config) -> Result<Self> {
        // Ensure instance URL has https:// prefix
        let instance_url = if mastodon.instance.starts_with("http://")
            || mastodon.instance.starts_with("https://")
        {
            mastodon.instance.clone()
        } else {
            format!("https://{}", mastodon.instance)
        };

        let api = MegalodonApi::new(
            instance_url,
            mastodon.access_token.expose_secret().to_string(),
        )?;
        Ok(Self::with_api(api, config.temp_dir.clone(), config.max_width))
    }
}

impl<A: MastodonApi> MastodonPlatform<A> {
    pub fn with_api(api: A, temp_dir: PathBuf, max_width: u32) -> Self {
        Self {
            api,
            temp_dir,
            max_width,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

#[async_trait]
impl<A: MastodonApi> Platform for MastodonPlatform<A> {
    type Media = String;
    type Embed = Vec<String>;

    fn name(&self) -> &str {
        "mastodon"
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::native(self.max_width)
    }

    async fn authenticate(&mut self) -> Result<()> {
        let acct = self
            .api
            .verify_credentials()
            .await
            .map_err(|e| login_failure("Mastodon", e))?;
        info!("Verified Mastodon credentials for {}", acct);
        Ok(())
    }

    async fn upload_image(&self, image: NormalizedImage, alt: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| TripostError::io(&self.temp_dir, e))?;

        // Removed on drop, so every early return below cleans up too
        let file = tempfile::Builder::new()
            .prefix("image-")
            .suffix(&format!(".{}", image.mime_type.extension()))
            .tempfile_in(&self.temp_dir)
            .map_err(|e| TripostError::io(&self.temp_dir, e))?;
        let path = file.path().to_path_buf();

        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| TripostError::io(&path, e))?;
        debug!("Wrote {} bytes to {}", image.bytes.len(), path.display());

        let description = (!alt.is_empty()).then_some(alt);
        let uploaded = self.api.upload_media(&path, description).await;

        if let Err(e) = file.close() {
            warn!("Failed to remove temp file {}: {}", path.display(), e);
        }

        uploaded
    }

    fn images_embed(&self, media: Vec<String>) -> Vec<String> {
        media
    }

    async fn submit(&self, text: &RichText, embed: Option<Vec<String>>) -> Result<String> {
        self.api
            .post_status(&text.text, embed.unwrap_or_default())
            .await
    }
}

/// Map megalodon errors to PlatformError
///
/// - HTTP 401/403 → `Authentication`
/// - HTTP 422 → `Validation`
/// - HTTP 429 → `RateLimit`
/// - HTTP 5xx → `Network`
/// - anything else → `fallback`, so uploads and posts keep their own variant
fn map_megalodon_error(
    error: megalodon::error::Error,
    context: &str,
    fallback: fn(String) -> PlatformError,
) -> PlatformError {
    let error_str = error.to_string();
    let error_lower = error_str.to_lowercase();

    match extract_http_status(&error_str) {
        Some(401) | Some(403) => PlatformError::Authentication(format!(
            "Mastodon authentication failed ({}): {}. \
                Suggestion: Verify MASTODON_ACCESS_TOKEN is valid and has not been revoked.",
            context, error_str
        )),
        Some(422) => PlatformError::Validation(format!(
            "Mastodon validation failed ({}): {}",
            context, error_str
        )),
        Some(429) => PlatformError::RateLimit(format!(
            "Mastodon rate limit exceeded ({}): {}",
            context, error_str
        )),
        Some(500..=599) => PlatformError::Network(format!(
            "Mastodon server error ({}): {}",
            context, error_str
        )),
        Some(_) => fallback(format!("Mastodon HTTP error ({}): {}", context, error_str)),
        None => {
            if error_lower.contains("unauthorized") || error_lower.contains("forbidden") {
                PlatformError::Authentication(format!(
                    "Mastodon authentication failed ({}): {}",
                    context, error_str
                ))
            } else if error_lower.contains("timed out")
                || error_lower.contains("connection")
                || error_lower.contains("dns")
            {
                PlatformError::Network(format!("Mastodon error ({}): {}", context, error_str))
            } else {
                fallback(format!("Mastodon error ({}): {}", context, error_str))
            }
        }
    }
}

/// Extract an HTTP status code from an error message
///
/// Looks for patterns like "HTTP 401", "status 403" or a bare "422:".
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code) = after_prefix.get(0..3).and_then(|s| s.parse::<u16>().ok()) {
                if (100..=599).contains(&code) {
                    return Some(code);
                }
            }
        }
    }

    let bytes = error_str.as_bytes();
    for (i, window) in bytes.windows(4).enumerate() {
        let digits = window[..3].iter().all(u8::is_ascii_digit);
        let terminated = window[3] == b':' || window[3] == b' ';
        let standalone = i == 0 || !bytes[i - 1].is_ascii_digit();
        if digits && terminated && standalone {
            if let Some(code) = std::str::from_utf8(&window[..3])
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
            {
                if (100..=599).contains(&code) {
                    return Some(code);
                }
            }
        }
    }

    None
}
