//! X (Twitter) platform implementation
//!
//! Media goes through the v1.1 upload host, posts through API v2. Every
//! request carries an OAuth 1.0a user-context signature from [`oauth`].

pub mod oauth;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::config::{Config, XConfig};
use crate::error::{PlatformError, Result};
use crate::imaging::NormalizeOptions;
use crate::platforms::{login_failure, map_http_status, map_transport_error, Platform};
use crate::richtext::RichText;
use crate::types::NormalizedImage;

use self::oauth::OAuthCredentials;

/// X caps image descriptions at 1000 characters
pub const MAX_ALT_TEXT_CHARS: usize = 1000;

#[derive(Debug, Deserialize)]
struct UploadedMedia {
    media_id_string: String,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
}

pub struct XPlatform {
    client: reqwest::Client,
    credentials: OAuthCredentials,
    api_base: String,
    upload_base: String,
    max_width: u32,
}

impl XPlatform {
    pub fn new(config: &XConfig, timeout: Duration, max_width: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tripost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            credentials: OAuthCredentials::from_config(config),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            max_width,
        })
    }

    pub fn from_config(x: &XConfig, config: &Config) -> Result<Self> {
        Self::new(x, config.http_timeout, config.max_width)
    }

    fn endpoint(base: &str, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", base, path))
            .map_err(|e| PlatformError::Network(format!("Invalid X endpoint {}{}: {}", base, path, e)).into())
    }

    fn signed(&self, method: reqwest::Method, url: Url) -> Result<reqwest::RequestBuilder> {
        let authorization = self.credentials.authorization(method.as_str(), &url)?;
        Ok(self
            .client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, authorization))
    }

    async fn current_user(&self) -> Result<User> {
        let url = Self::endpoint(&self.api_base, "/2/users/me")?;
        let response = self
            .signed(reqwest::Method::GET, url)?
            .send()
            .await
            .map_err(|e| map_transport_error("X", "authenticate", e))?;

        let me: DataEnvelope<User> =
            read_json(response, "authenticate", PlatformError::Authentication).await?;
        Ok(me.data)
    }

    /// Attach alt text to an uploaded image
    async fn create_metadata(&self, media_id: &str, alt: &str) -> Result<()> {
        let url = Self::endpoint(&self.upload_base, "/1.1/media/metadata/create.json")?;
        let alt: String = alt.chars().take(MAX_ALT_TEXT_CHARS).collect();

        let response = self
            .signed(reqwest::Method::POST, url)?
            .json(&serde_json::json!({
                "media_id": media_id,
                "alt_text": { "text": alt },
            }))
            .send()
            .await
            .map_err(|e| map_transport_error("X", "create media metadata", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_x_error(status.as_u16(), &body, "create media metadata", PlatformError::Upload).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for XPlatform {
    type Media = String;
    type Embed = Vec<String>;

    fn name(&self) -> &str {
        "x"
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::native(self.max_width)
    }

    async fn authenticate(&mut self) -> Result<()> {
        let me = self.current_user().await.map_err(|e| login_failure("X", e))?;
        info!("Authenticated with X as @{} ({})", me.username, me.id);
        Ok(())
    }

    async fn upload_image(&self, image: NormalizedImage, alt: &str) -> Result<String> {
        let url = Self::endpoint(&self.upload_base, "/1.1/media/upload.json")?;
        let size = image.bytes.len();
        let part = Part::bytes(image.bytes)
            .file_name(format!("image.{}", image.mime_type.extension()))
            .mime_str(image.mime_type.as_str())
            .map_err(|e| PlatformError::Upload(format!("Invalid media type: {}", e)))?;
        let form = Form::new()
            .text("media_category", "tweet_image")
            .part("media", part);

        let response = self
            .signed(reqwest::Method::POST, url)?
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_transport_error("X", "upload media", e))?;

        let uploaded: UploadedMedia = read_json(response, "upload media", PlatformError::Upload).await?;
        debug!(
            "Uploaded media {} ({} bytes, {})",
            uploaded.media_id_string, size, image.mime_type
        );

        if !alt.is_empty() {
            self.create_metadata(&uploaded.media_id_string, alt).await?;
        }

        Ok(uploaded.media_id_string)
    }

    fn images_embed(&self, media: Vec<String>) -> Vec<String> {
        media
    }

    async fn submit(&self, text: &RichText, embed: Option<Vec<String>>) -> Result<String> {
        let url = Self::endpoint(&self.api_base, "/2/tweets")?;
        let mut body = serde_json::json!({ "text": text.text });
        if let Some(media_ids) = embed.filter(|ids| !ids.is_empty()) {
            body["media"] = serde_json::json!({ "media_ids": media_ids });
        }

        let response = self
            .signed(reqwest::Method::POST, url)?
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("X", "create tweet", e))?;

        let created: DataEnvelope<CreatedTweet> =
            read_json(response, "create tweet", PlatformError::Posting).await?;
        Ok(created.data.id)
    }
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
    fallback: fn(String) -> PlatformError,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(map_x_error(status.as_u16(), &body, context, fallback).into());
    }

    response.json::<T>().await.map_err(|e| {
        fallback(format!("X {} returned an unexpected response: {}", context, e)).into()
    })
}

/// Pull a readable message out of a v2 problem or a v1.1 `errors` array
fn map_x_error(
    status: u16,
    body: &str,
    context: &str,
    fallback: fn(String) -> PlatformError,
) -> PlatformError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("detail")
                .or_else(|| json.pointer("/errors/0/message"))
                .or_else(|| json.get("title"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    map_http_status("X", status, &message, context, fallback)
}
