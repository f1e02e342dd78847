//! Configuration management for Tripost
//!
//! Everything is read from the environment exactly once, at process start,
//! into a [`Config`] that is then passed by reference to the poster and the
//! platform adapters. A `.env` file in the working directory is honoured.
//! Only the keys of the platform selected for the run are required.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{ConfigError, Result};

pub const POST_JSON_URL: &str = "POST_JSON_URL";
pub const DEFAULT_MAX_WIDTH: u32 = 800;
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_LANGS: &[&str] = &["ja-JP", "en-US"];
pub const DEFAULT_X_API_BASE: &str = "https://api.twitter.com";
pub const DEFAULT_X_UPLOAD_BASE: &str = "https://upload.twitter.com";

/// The platforms a post can be sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Bluesky,
    Mastodon,
    X,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Bluesky => "bluesky",
            PlatformKind::Mastodon => "mastodon",
            PlatformKind::X => "x",
        }
    }
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bluesky" | "bsky" => Ok(PlatformKind::Bluesky),
            "mastodon" => Ok(PlatformKind::Mastodon),
            "x" | "twitter" => Ok(PlatformKind::X),
            _ => Err(format!(
                "Invalid platform: '{}'. Valid options: bluesky, mastodon, x",
                s
            )),
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Config {
    /// Location of the post JSON document (URL or local path)
    pub post_source: String,
    /// Base directory for relative image paths
    pub base_dir: PathBuf,
    /// Scratch directory for platforms that upload from disk
    pub temp_dir: PathBuf,
    /// Width cap applied by the image normalizer
    pub max_width: u32,
    pub http_timeout: Duration,
    pub platform: PlatformConfig,
}

#[derive(Debug)]
pub enum PlatformConfig {
    Bluesky(BlueskyConfig),
    Mastodon(MastodonConfig),
    X(XConfig),
}

impl PlatformConfig {
    pub fn kind(&self) -> PlatformKind {
        match self {
            PlatformConfig::Bluesky(_) => PlatformKind::Bluesky,
            PlatformConfig::Mastodon(_) => PlatformKind::Mastodon,
            PlatformConfig::X(_) => PlatformKind::X,
        }
    }
}

#[derive(Debug)]
pub struct BlueskyConfig {
    /// PDS base URL (e.g., "https://bsky.social")
    pub service: String,
    pub identifier: String,
    pub password: SecretString,
    pub langs: Vec<String>,
}

#[derive(Debug)]
pub struct MastodonConfig {
    /// Instance base URL (e.g., "https://mastodon.social")
    pub instance: String,
    pub access_token: SecretString,
}

#[derive(Debug)]
pub struct XConfig {
    pub api_key: String,
    pub api_key_secret: SecretString,
    pub access_token: String,
    pub access_token_secret: SecretString,
    pub api_base: String,
    pub upload_base: String,
}

/// Load `.env` into the process environment, if present
///
/// Runs before logging is set up, so that the file can carry
/// `TRIPOST_LOG_*`. Returns the loaded file, or `None` when there is none;
/// the caller reports the outcome once a subscriber exists.
pub fn load_dotenv() -> std::result::Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

impl Config {
    /// Build the configuration for `kind` from the process environment
    pub fn from_env(kind: PlatformKind) -> Result<Self> {
        Self::from_lookup(kind, |key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// Empty values are treated the same as missing ones.
    pub fn from_lookup<F>(kind: PlatformKind, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingField(key.to_string()));

        let post_source = require(POST_JSON_URL)?;

        let base_dir = match get("TRIPOST_BASE_DIR") {
            Some(dir) => PathBuf::from(shellexpand::tilde(&dir).to_string()),
            None => PathBuf::from("."),
        };

        let temp_dir = match get("TRIPOST_TEMP_DIR") {
            Some(dir) => PathBuf::from(shellexpand::tilde(&dir).to_string()),
            None => base_dir.join(".temp"),
        };

        let max_width = match get("TRIPOST_MAX_WIDTH") {
            Some(raw) => parse_max_width(&raw)?,
            None => DEFAULT_MAX_WIDTH,
        };

        let http_timeout = match get("TRIPOST_HTTP_TIMEOUT") {
            Some(raw) => humantime::parse_duration(&raw).map_err(|e| ConfigError::InvalidValue {
                key: "TRIPOST_HTTP_TIMEOUT".to_string(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_HTTP_TIMEOUT,
        };

        let platform = match kind {
            PlatformKind::Bluesky => PlatformConfig::Bluesky(BlueskyConfig {
                service: require("BSKY_SERVICE_URL")?,
                identifier: require("BSKY_IDENTIFIER")?,
                password: SecretString::from(require("BSKY_PASSWORD")?),
                langs: match get("BSKY_LANGS") {
                    Some(raw) => raw
                        .split(',')
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect(),
                    None => DEFAULT_LANGS.iter().map(|l| l.to_string()).collect(),
                },
            }),
            PlatformKind::Mastodon => PlatformConfig::Mastodon(MastodonConfig {
                instance: require("MASTODON_API_URL")?,
                access_token: SecretString::from(require("MASTODON_ACCESS_TOKEN")?),
            }),
            PlatformKind::X => PlatformConfig::X(XConfig {
                api_key: require("X_API_KEY")?,
                api_key_secret: SecretString::from(require("X_API_KEY_SECRET")?),
                access_token: require("X_ACCESS_TOKEN")?,
                access_token_secret: SecretString::from(require("X_ACCESS_TOKEN_SECRET")?),
                api_base: get("X_API_BASE_URL").unwrap_or_else(|| DEFAULT_X_API_BASE.to_string()),
                upload_base: get("X_UPLOAD_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_X_UPLOAD_BASE.to_string()),
            }),
        };

        Ok(Self {
            post_source,
            base_dir,
            temp_dir,
            max_width,
            http_timeout,
            platform,
        })
    }
}

fn parse_max_width(raw: &str) -> Result<u32> {
    let width: u32 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: "TRIPOST_MAX_WIDTH".to_string(),
        reason: format!("'{}' is not a positive integer", raw),
    })?;
    if width == 0 {
        return Err(ConfigError::InvalidValue {
            key: "TRIPOST_MAX_WIDTH".to_string(),
            reason: "must be greater than zero".to_string(),
        }
        .into());
    }
    Ok(width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TripostError;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn missing_field(result: Result<Config>) -> String {
        match result {
            Err(TripostError::Config(ConfigError::MissingField(field))) => field,
            other => panic!("Expected missing field error, got {:?}", other),
        }
    }

    #[test]
    fn test_bluesky_config_with_defaults() {
        let config = Config::from_lookup(
            PlatformKind::Bluesky,
            lookup_from(&[
                ("POST_JSON_URL", "post.json"),
                ("BSKY_SERVICE_URL", "https://bsky.social"),
                ("BSKY_IDENTIFIER", "alice.bsky.social"),
                ("BSKY_PASSWORD", "app-password"),
            ]),
        )
        .unwrap();

        assert_eq!(config.post_source, "post.json");
        assert_eq!(config.base_dir, PathBuf::from("."));
        assert_eq!(config.temp_dir, PathBuf::from(".").join(".temp"));
        assert_eq!(config.max_width, 800);
        assert_eq!(config.http_timeout, Duration::from_secs(60));

        match config.platform {
            PlatformConfig::Bluesky(bsky) => {
                assert_eq!(bsky.service, "https://bsky.social");
                assert_eq!(bsky.identifier, "alice.bsky.social");
                assert_eq!(bsky.password.expose_secret(), "app-password");
                assert_eq!(bsky.langs, vec!["ja-JP", "en-US"]);
            }
            other => panic!("Expected Bluesky config, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_missing_post_location_fails_first() {
        let field = missing_field(Config::from_lookup(PlatformKind::X, lookup_from(&[])));
        assert_eq!(field, "POST_JSON_URL");
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let field = missing_field(Config::from_lookup(
            PlatformKind::Mastodon,
            lookup_from(&[
                ("POST_JSON_URL", "post.json"),
                ("MASTODON_API_URL", "https://mastodon.social"),
                ("MASTODON_ACCESS_TOKEN", "   "),
            ]),
        ));
        assert_eq!(field, "MASTODON_ACCESS_TOKEN");
    }

    #[test]
    fn test_only_selected_platform_keys_are_required() {
        let config = Config::from_lookup(
            PlatformKind::Mastodon,
            lookup_from(&[
                ("POST_JSON_URL", "https://example.com/post.json"),
                ("MASTODON_API_URL", "https://mastodon.social"),
                ("MASTODON_ACCESS_TOKEN", "token"),
            ]),
        )
        .unwrap();
        assert_eq!(config.platform.kind(), PlatformKind::Mastodon);
    }

    #[test]
    fn test_x_requires_all_four_credentials() {
        let field = missing_field(Config::from_lookup(
            PlatformKind::X,
            lookup_from(&[
                ("POST_JSON_URL", "post.json"),
                ("X_API_KEY", "key"),
                ("X_API_KEY_SECRET", "secret"),
                ("X_ACCESS_TOKEN", "token"),
            ]),
        ));
        assert_eq!(field, "X_ACCESS_TOKEN_SECRET");
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_lookup(
            PlatformKind::X,
            lookup_from(&[
                ("POST_JSON_URL", "post.json"),
                ("TRIPOST_BASE_DIR", "/srv/posts"),
                ("TRIPOST_MAX_WIDTH", "640"),
                ("TRIPOST_HTTP_TIMEOUT", "15s"),
                ("X_API_KEY", "key"),
                ("X_API_KEY_SECRET", "secret"),
                ("X_ACCESS_TOKEN", "token"),
                ("X_ACCESS_TOKEN_SECRET", "token-secret"),
                ("X_API_BASE_URL", "http://127.0.0.1:9000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.base_dir, PathBuf::from("/srv/posts"));
        assert_eq!(config.temp_dir, PathBuf::from("/srv/posts/.temp"));
        assert_eq!(config.max_width, 640);
        assert_eq!(config.http_timeout, Duration::from_secs(15));
        match config.platform {
            PlatformConfig::X(x) => {
                assert_eq!(x.api_base, "http://127.0.0.1:9000");
                assert_eq!(x.upload_base, DEFAULT_X_UPLOAD_BASE);
            }
            other => panic!("Expected X config, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_invalid_max_width_rejected() {
        let result = Config::from_lookup(
            PlatformKind::Mastodon,
            lookup_from(&[
                ("POST_JSON_URL", "post.json"),
                ("TRIPOST_MAX_WIDTH", "wide"),
                ("MASTODON_API_URL", "https://mastodon.social"),
                ("MASTODON_ACCESS_TOKEN", "token"),
            ]),
        );
        assert!(matches!(
            result,
            Err(TripostError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_bluesky_langs_parsed_from_list() {
        let config = Config::from_lookup(
            PlatformKind::Bluesky,
            lookup_from(&[
                ("POST_JSON_URL", "post.json"),
                ("BSKY_SERVICE_URL", "https://bsky.social"),
                ("BSKY_IDENTIFIER", "alice.bsky.social"),
                ("BSKY_PASSWORD", "pw"),
                ("BSKY_LANGS", "en, de ,"),
            ]),
        )
        .unwrap();

        match config.platform {
            PlatformConfig::Bluesky(bsky) => assert_eq!(bsky.langs, vec!["en", "de"]),
            other => panic!("Expected Bluesky config, got {:?}", other.kind()),
        }
    }

    #[test]
    fn test_platform_kind_from_str() {
        assert_eq!("bluesky".parse::<PlatformKind>().unwrap(), PlatformKind::Bluesky);
        assert_eq!("BSKY".parse::<PlatformKind>().unwrap(), PlatformKind::Bluesky);
        assert_eq!("Mastodon".parse::<PlatformKind>().unwrap(), PlatformKind::Mastodon);
        assert_eq!("twitter".parse::<PlatformKind>().unwrap(), PlatformKind::X);

        let err = "myspace".parse::<PlatformKind>().unwrap_err();
        assert!(err.contains("Invalid platform: 'myspace'"));
    }

    #[test]
    fn test_platform_kind_display() {
        assert_eq!(PlatformKind::X.to_string(), "x");
        assert_eq!(PlatformKind::Bluesky.to_string(), "bluesky");
    }
}
