//! Core types for Tripost

use serde::{Deserialize, Serialize};

use crate::error::{Result, TripostError};

/// A single platform-agnostic post, as loaded from the post JSON document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostDescription {
    pub text: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

impl PostDescription {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, src: impl Into<String>, alt: impl Into<String>) -> Self {
        self.images.push(ImageRef {
            src: src.into(),
            alt: alt.into(),
        });
        self
    }

    /// Check that every image has something to resolve
    pub fn validate(&self) -> Result<()> {
        if let Some(position) = self.images.iter().position(|i| i.src.trim().is_empty()) {
            return Err(TripostError::InvalidInput(format!(
                "Image {} has an empty src",
                position + 1
            )));
        }
        Ok(())
    }
}

/// Reference to an image: a remote URL or a path relative to the base directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

impl ImageRef {
    pub fn is_remote(&self) -> bool {
        is_remote(&self.src)
    }
}

/// Check if a source string is an HTTP(S) URL
pub fn is_remote(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

/// Raw image bytes with the MIME type declared by the server or sniffed from disk
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// An image resized and re-encoded for upload
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: ImageMimeType,
    pub width: u32,
    pub height: u32,
}

/// Link-preview card built from a page's Open Graph metadata
#[derive(Debug, Clone)]
pub struct LinkCard {
    pub site_url: String,
    pub image_url: String,
    pub mime_type: ImageMimeType,
    pub title: String,
    pub description: String,
    pub image: NormalizedImage,
}

/// Which branch a run took before submitting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostPath {
    Images { count: usize },
    LinkCard { url: String },
    TextOnly,
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostOutcome {
    pub platform: String,
    pub post_id: String,
    pub path: PostPath,
}

/// Supported image MIME types for uploads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        let essence = s.split(';').next().unwrap_or_default().trim();
        match essence.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Gif => image::ImageFormat::Gif,
            Self::WebP => image::ImageFormat::WebP,
        }
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }

    /// Get the typical file extension for this MIME type
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
