//! OAuth 1.0a request signing (HMAC-SHA1) for the X API
//!
//! Only query parameters take part in the signature. Multipart and JSON
//! bodies are never signed, which is what X expects for media upload and v2.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use url::Url;
use uuid::Uuid;

use crate::config::XConfig;
use crate::error::{PlatformError, Result};

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

/// Consumer (API key) and user (access token) credentials
#[derive(Debug, Clone)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: SecretString,
    pub token: String,
    pub token_secret: SecretString,
}

impl OAuthCredentials {
    pub fn from_config(config: &XConfig) -> Self {
        Self {
            consumer_key: config.api_key.clone(),
            consumer_secret: config.api_key_secret.clone(),
            token: config.access_token.clone(),
            token_secret: config.access_token_secret.clone(),
        }
    }

    /// `Authorization` header value for `method url`, with a fresh nonce and timestamp
    pub fn authorization(&self, method: &str, url: &Url) -> Result<String> {
        let nonce = Uuid::new_v4().simple().to_string();
        let timestamp = Utc::now().timestamp().to_string();
        self.authorization_with(method, url, &nonce, &timestamp, &[])
    }

    /// Deterministic form of [`Self::authorization`]. `extra` holds
    /// form-encoded body parameters that must be signed as well.
    pub fn authorization_with(
        &self,
        method: &str,
        url: &Url,
        nonce: &str,
        timestamp: &str,
        extra: &[(&str, &str)],
    ) -> Result<String> {
        let oauth_params = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.token.as_str()),
            ("oauth_version", OAUTH_VERSION),
        ];

        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.extend(
            oauth_params
                .iter()
                .chain(extra.iter())
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );

        let base = signature_base_string(method, url, &params);
        let signature = sign(
            &base,
            self.consumer_secret.expose_secret(),
            self.token_secret.expose_secret(),
        )?;

        let mut header_params: Vec<(&str, &str)> = oauth_params.to_vec();
        header_params.push(("oauth_signature", signature.as_str()));
        header_params.sort();

        let fields: Vec<String> = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect();
        Ok(format!("OAuth {}", fields.join(", ")))
    }
}

/// RFC 3986 encoding: everything but `A-Z a-z 0-9 - . _ ~` is escaped
pub fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// `METHOD&encoded(base url)&encoded(sorted params)`
pub fn signature_base_string(method: &str, url: &Url, params: &[(String, String)]) -> String {
    let mut base_url = url.clone();
    base_url.set_query(None);
    base_url.set_fragment(None);

    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(base_url.as_str()),
        percent_encode(&param_string)
    )
}

/// Base64 HMAC-SHA1 of the base string, keyed by both secrets
pub fn sign(base_string: &str, consumer_secret: &str, token_secret: &str) -> Result<String> {
    let key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let mut mac = HmacSha1::new_from_slice(key.as_bytes())
        .map_err(|e| PlatformError::Authentication(format!("Invalid signing key: {}", e)))?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
