//! Bluesky platform implementation
//!
//! Talks XRPC to the configured PDS directly over reqwest:
//!
//! | Step | Endpoint |
//! |---|---|
//! | Login | `com.atproto.server.createSession` |
//! | Mention lookup | `com.atproto.identity.resolveHandle` |
//! | Image / thumbnail | `com.atproto.repo.uploadBlob` |
//! | Post | `com.atproto.repo.createRecord` (`app.bsky.feed.post`) |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info};

use crate::config::{BlueskyConfig, Config};
use crate::error::{PlatformError, Result};
use crate::imaging::NormalizeOptions;
use crate::platforms::{login_failure, map_http_status, map_transport_error, Platform};
use crate::richtext::{detect_entities, EntityKind, Facet, FacetFeature, RichText};
use crate::types::{LinkCard, NormalizedImage};

const POST_COLLECTION: &str = "app.bsky.feed.post";
const IMAGES_EMBED: &str = "app.bsky.embed.images";
const EXTERNAL_EMBED: &str = "app.bsky.embed.external";

/// XRPC error codes that mean the session is unusable
const AUTH_ERROR_CODES: &[&str] = &[
    "AuthenticationRequired",
    "InvalidToken",
    "ExpiredToken",
    "AccountTakedown",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    did: String,
    handle: String,
    access_jwt: String,
}

#[derive(Debug, Deserialize)]
struct XrpcError {
    error: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: String,
}

/// Reference to an uploaded blob, as returned by `uploadBlob`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobRef {
    #[serde(rename = "$type")]
    pub kind: String,
    #[serde(rename = "ref")]
    pub reference: CidLink,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

/// One entry of an `app.bsky.embed.images` embed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlueskyImage {
    pub alt: String,
    pub image: BlobRef,
    pub aspect_ratio: AspectRatio,
}

/// Body of an `app.bsky.embed.external` embed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalCard {
    pub uri: String,
    pub title: String,
    pub description: String,
    pub thumb: BlobRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlueskyEmbed {
    Images(Vec<BlueskyImage>),
    External(ExternalCard),
}

impl Serialize for BlueskyEmbed {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            BlueskyEmbed::Images(images) => {
                map.serialize_entry("$type", IMAGES_EMBED)?;
                map.serialize_entry("images", images)?;
            }
            BlueskyEmbed::External(external) => {
                map.serialize_entry("$type", EXTERNAL_EMBED)?;
                map.serialize_entry("external", external)?;
            }
        }
        map.end()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord<'a> {
    #[serde(rename = "$type")]
    record_type: &'static str,
    text: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    facets: &'a [Facet],
    created_at: String,
    langs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    embed: Option<BlueskyEmbed>,
}

pub struct BlueskyPlatform {
    client: reqwest::Client,
    service: String,
    identifier: String,
    password: SecretString,
    langs: Vec<String>,
    max_width: u32,
    session: Option<Session>,
}

impl BlueskyPlatform {
    /// Create a client for the PDS at `config.service`. Nothing is sent
    /// until [`Platform::authenticate`].
    pub fn new(config: &BlueskyConfig, timeout: Duration, max_width: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tripost/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service: config.service.trim_end_matches('/').to_string(),
            identifier: config.identifier.clone(),
            password: config.password.clone(),
            langs: config.langs.clone(),
            max_width,
            session: None,
        })
    }

    pub fn from_config(bluesky: &BlueskyConfig, config: &Config) -> Result<Self> {
        Self::new(bluesky, config.http_timeout, config.max_width)
    }

    /// DID of the logged-in account, once authenticated
    pub fn did(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.did.as_str())
    }

    fn xrpc_url(&self, nsid: &str) -> String {
        format!("{}/xrpc/{}", self.service, nsid)
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| {
            PlatformError::Authentication(
                "Not authenticated with Bluesky. Call authenticate() first.".to_string(),
            )
            .into()
        })
    }

    async fn create_session(&self) -> Result<Session> {
        debug!("Creating Bluesky session for {}", self.identifier);

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&serde_json::json!({
                "identifier": self.identifier,
                "password": self.password.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| map_transport_error("Bluesky", "create session", e))?;

        read_json(response, "create session", PlatformError::Authentication).await
    }

    /// Look up the DID behind a handle
    pub async fn resolve_handle(&self, handle: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Resolved {
            did: String,
        }

        let mut url = url::Url::parse(&self.xrpc_url("com.atproto.identity.resolveHandle"))
            .map_err(|e| PlatformError::Network(format!("Invalid Bluesky service URL: {}", e)))?;
        url.query_pairs_mut().append_pair("handle", handle);

        let mut request = self.client.get(url);
        if let Some(session) = &self.session {
            request = request.bearer_auth(&session.access_jwt);
        }
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error("Bluesky", "resolve handle", e))?;

        let resolved: Resolved = read_json(response, "resolve handle", PlatformError::Posting).await?;
        Ok(resolved.did)
    }

    /// Upload raw bytes and return the blob reference
    pub async fn upload_blob(&self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef> {
        #[derive(Deserialize)]
        struct Uploaded {
            blob: BlobRef,
        }

        let session = self.session()?;
        let size = bytes.len();
        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| map_transport_error("Bluesky", "upload blob", e))?;

        let uploaded: Uploaded = read_json(response, "upload blob", PlatformError::Upload).await?;
        debug!(
            "Uploaded blob {} ({} bytes, {})",
            uploaded.blob.reference.link, size, mime_type
        );
        Ok(uploaded.blob)
    }
}

#[async_trait]
impl Platform for BlueskyPlatform {
    type Media = BlueskyImage;
    type Embed = BlueskyEmbed;

    fn name(&self) -> &str {
        "bluesky"
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions::native(self.max_width)
    }

    async fn authenticate(&mut self) -> Result<()> {
        let session = self
            .create_session()
            .await
            .map_err(|e| login_failure("Bluesky", e))?;
        info!("Logged in to Bluesky as {} ({})", session.handle, session.did);
        self.session = Some(session);
        Ok(())
    }

    /// Links and tags as-is; mentions only when the handle resolves
    async fn detect_facets(&self, text: &str) -> Result<RichText> {
        let mut facets = Vec::new();
        for entity in detect_entities(text) {
            match &entity.kind {
                EntityKind::Mention(handle) => match self.resolve_handle(handle).await {
                    Ok(did) => facets.push(Facet {
                        index: entity.index,
                        features: vec![FacetFeature::Mention { did }],
                    }),
                    Err(e) => debug!("Dropping mention @{}: {}", handle, e),
                },
                _ => facets.extend(entity.to_facet()),
            }
        }
        Ok(RichText::new(text, facets))
    }

    fn supports_link_cards(&self) -> bool {
        true
    }

    async fn upload_image(&self, image: NormalizedImage, alt: &str) -> Result<BlueskyImage> {
        let aspect_ratio = AspectRatio {
            width: image.width,
            height: image.height,
        };
        let blob = self.upload_blob(image.bytes, image.mime_type.as_str()).await?;

        Ok(BlueskyImage {
            alt: alt.to_string(),
            image: blob,
            aspect_ratio,
        })
    }

    fn images_embed(&self, media: Vec<BlueskyImage>) -> BlueskyEmbed {
        BlueskyEmbed::Images(media)
    }

    async fn card_embed(&self, card: &LinkCard) -> Result<BlueskyEmbed> {
        let thumb = self
            .upload_blob(card.image.bytes.clone(), card.mime_type.as_str())
            .await?;

        Ok(BlueskyEmbed::External(ExternalCard {
            uri: card.site_url.clone(),
            title: card.title.clone(),
            description: card.description.clone(),
            thumb,
        }))
    }

    async fn submit(&self, text: &RichText, embed: Option<BlueskyEmbed>) -> Result<String> {
        #[derive(Deserialize)]
        struct Created {
            uri: String,
        }

        let session = self.session()?;
        let record = PostRecord {
            record_type: POST_COLLECTION,
            text: &text.text,
            facets: &text.facets,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            langs: &self.langs,
            embed,
        };

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&serde_json::json!({
                "repo": session.did,
                "collection": POST_COLLECTION,
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| map_transport_error("Bluesky", "create record", e))?;

        let created: Created = read_json(response, "create record", PlatformError::Posting).await?;
        Ok(created.uri)
    }
}

/// Decode a successful XRPC response, or map its error body
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
    fallback: fn(String) -> PlatformError,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(map_xrpc_error(status.as_u16(), &body, context, fallback).into());
    }

    response.json::<T>().await.map_err(|e| {
        fallback(format!(
            "Bluesky {} returned an unexpected response: {}",
            context, e
        ))
        .into()
    })
}

fn map_xrpc_error(
    status: u16,
    body: &str,
    context: &str,
    fallback: fn(String) -> PlatformError,
) -> PlatformError {
    match serde_json::from_str::<XrpcError>(body) {
        Ok(xrpc) => {
            let message = match &xrpc.message {
                Some(m) => format!("{}: {}", xrpc.error, m),
                None => xrpc.error.clone(),
            };
            if AUTH_ERROR_CODES.contains(&xrpc.error.as_str()) {
                PlatformError::Authentication(format!(
                    "Bluesky {} failed: {}. Check your identifier and app password.",
                    context, message
                ))
            } else {
                map_http_status("Bluesky", status, &message, context, fallback)
            }
        }
        Err(_) => map_http_status("Bluesky", status, body, context, fallback),
    }
}
