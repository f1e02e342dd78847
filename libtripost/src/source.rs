//! Source resolution: turn a URL or local path into bytes
//!
//! Used for both the post JSON document and every image it references.
//! Remote sources are fetched with a single GET (no retries). Local sources
//! are read relative to the configured base directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::error::{FetchError, PlatformError, Result, TripostError};
use crate::types::{is_remote, ImageMimeType, PostDescription, ResolvedImage};

/// MIME type assumed when neither the server nor the bytes tell us
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

pub struct SourceResolver {
    client: reqwest::Client,
    base_dir: PathBuf,
}

impl SourceResolver {
    pub fn new(base_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tripost/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_dir: base_dir.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.base_dir.clone(), config.http_timeout)
    }

    /// The shared HTTP client, reused by the link-card scraper
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Where a non-URL source lives on disk
    pub fn local_path(&self, src: &str) -> PathBuf {
        let path = Path::new(src);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Resolve an image source into bytes plus a MIME type
    pub async fn resolve(&self, src: &str) -> Result<ResolvedImage> {
        if is_remote(src) {
            self.fetch_remote(src).await
        } else {
            self.read_local(src).await
        }
    }

    /// GET an image; MIME type comes from the Content-Type header
    pub async fn fetch_remote(&self, url: &str) -> Result<ResolvedImage> {
        let response = self.get(url).await?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(image_mime_essence)
            .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        debug!("Fetched {} ({} bytes, {})", url, bytes.len(), mime_type);

        Ok(ResolvedImage {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }

    /// Read an image from disk; MIME type is sniffed from the bytes, then the extension
    pub async fn read_local(&self, src: &str) -> Result<ResolvedImage> {
        let path = self.local_path(src);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| TripostError::io(&path, e))?;

        let mime_type = sniff_mime(&bytes, &path);
        debug!("Read {} ({} bytes, {})", path.display(), bytes.len(), mime_type);

        Ok(ResolvedImage { bytes, mime_type })
    }

    /// Load and validate the post JSON document
    pub async fn load_post(&self, location: &str) -> Result<PostDescription> {
        let post: PostDescription = if is_remote(location) {
            let body = self
                .get(location)
                .await?
                .text()
                .await
                .map_err(|source| FetchError::Request {
                    url: location.to_string(),
                    source,
                })?;
            serde_json::from_str(&body).map_err(|e| FetchError::Json {
                url: location.to_string(),
                reason: e.to_string(),
            })?
        } else {
            let path = PathBuf::from(shellexpand::tilde(location).to_string());
            let body = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| TripostError::io(&path, e))?;
            serde_json::from_str(&body).map_err(|e| {
                TripostError::InvalidInput(format!(
                    "{} is not a valid post document: {}",
                    path.display(),
                    e
                ))
            })?
        };

        post.validate()?;
        debug!(
            "Loaded post from {} ({} characters, {} images)",
            location,
            post.text.chars().count(),
            post.images.len()
        );

        Ok(post)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        Ok(response)
    }
}

/// Keep only `type/subtype` of an image Content-Type header
fn image_mime_essence(header: &str) -> Option<String> {
    let essence = header.split(';').next()?.trim().to_lowercase();
    if essence.starts_with("image/") && essence.len() > "image/".len() {
        Some(essence)
    } else {
        None
    }
}

/// Determine a MIME type from magic bytes, falling back to the extension, then JPEG
pub fn sniff_mime(bytes: &[u8], path: &Path) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        if let Some(mime) = ImageMimeType::from_image_format(format) {
            return mime.as_str().to_string();
        }
        return format.to_mime_type().to_string();
    }

    path.extension()
        .and_then(|e| e.to_str())
        .and_then(ImageMimeType::from_extension)
        .map(|m| m.as_str())
        .unwrap_or(DEFAULT_IMAGE_MIME)
        .to_string()
}
