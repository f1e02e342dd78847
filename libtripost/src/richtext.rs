//! Rich text facets: link, mention and hashtag spans in post text
//!
//! Offsets are UTF-8 byte offsets into the post text, which is what the AT
//! Protocol expects in `app.bsky.richtext.facet` records. Links are either
//! explicit `http(s)://` URLs or bare domains with a known TLD, which get an
//! `https://` prefix in the facet while the span stays on the text as typed.
//! Mentions come out of
//! [`detect_entities`] as handles, and it is up to the caller to resolve
//! them to DIDs.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_TAG_CHARS: usize = 64;

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\s|\()((https?://\S+)|([a-z][a-z0-9]*(?:\.[a-z0-9]+)+)\S*)")
        .expect("link regex")
});

/// Generic TLDs accepted for bare-domain links; two-letter country codes are always accepted
const GENERIC_TLDS: &[&str] = &[
    "app", "art", "biz", "blog", "cafe", "club", "com", "coop", "design", "dev", "edu", "gov",
    "info", "int", "io", "jobs", "link", "live", "me", "mil", "museum", "name", "net", "news",
    "online", "org", "page", "pro", "shop", "site", "social", "space", "store", "tech", "today",
    "travel", "tv", "xyz", "zone",
];

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s|\()(@[a-zA-Z0-9.-]+)").expect("mention regex"));

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)([#＃][^\s#＃]+)").expect("tag regex"));

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

/// A span found in the text before any network resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub index: ByteSlice,
    pub kind: EntityKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Link(String),
    /// Handle without the leading `@`
    Mention(String),
    /// Tag without the leading `#`
    Tag(String),
}

impl Entity {
    /// Facet for entities that need no lookup; mentions return `None`
    pub fn to_facet(&self) -> Option<Facet> {
        let feature = match &self.kind {
            EntityKind::Link(uri) => FacetFeature::Link { uri: uri.clone() },
            EntityKind::Tag(tag) => FacetFeature::Tag { tag: tag.clone() },
            EntityKind::Mention(_) => return None,
        };
        Some(Facet {
            index: self.index,
            features: vec![feature],
        })
    }
}

/// Post text together with its detected facets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RichText {
    pub text: String,
    pub facets: Vec<Facet>,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            facets: Vec::new(),
        }
    }

    /// Links and tags only; mentions are skipped since they need a DID lookup
    pub fn detect_offline(text: impl Into<String>) -> Self {
        let text = text.into();
        let facets = detect_entities(&text)
            .iter()
            .filter_map(Entity::to_facet)
            .collect();
        Self { text, facets }
    }

    pub fn new(text: impl Into<String>, mut facets: Vec<Facet>) -> Self {
        facets.sort_by_key(|f| f.index.byte_start);
        Self {
            text: text.into(),
            facets,
        }
    }

    /// URI of the first link feature, in text order
    pub fn first_link(&self) -> Option<&str> {
        self.facets
            .iter()
            .flat_map(|f| f.features.iter())
            .find_map(|feature| match feature {
                FacetFeature::Link { uri } => Some(uri.as_str()),
                _ => None,
            })
    }
}

/// Find link, mention and tag spans, sorted by start offset
pub fn detect_entities(text: &str) -> Vec<Entity> {
    let mut entities = Vec::new();

    for cap in LINK_RE.captures_iter(text) {
        let Some(m) = cap.get(1) else { continue };
        let span = trim_link(m.as_str());
        let uri = match cap.get(3) {
            Some(domain) => {
                if !has_known_tld(domain.as_str()) {
                    continue;
                }
                format!("https://{}", span)
            }
            None if span.len() <= "https://".len() => continue,
            None => span.to_string(),
        };
        entities.push(Entity {
            index: ByteSlice {
                byte_start: m.start(),
                byte_end: m.start() + span.len(),
            },
            kind: EntityKind::Link(uri),
        });
    }

    for cap in MENTION_RE.captures_iter(text) {
        let Some(m) = cap.get(1) else { continue };
        let handle = m.as_str()[1..].trim_end_matches(['.', '-']);
        if !is_valid_handle(handle) {
            continue;
        }
        entities.push(Entity {
            index: ByteSlice {
                byte_start: m.start(),
                byte_end: m.start() + 1 + handle.len(),
            },
            kind: EntityKind::Mention(handle.to_lowercase()),
        });
    }

    for cap in TAG_RE.captures_iter(text) {
        let Some(m) = cap.get(1) else { continue };
        let marker_len = m.as_str().chars().next().map(char::len_utf8).unwrap_or(1);
        let tag = m.as_str()[marker_len..].trim_end_matches(|c: char| c.is_ascii_punctuation());
        if tag.is_empty()
            || tag.chars().count() > MAX_TAG_CHARS
            || tag.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        entities.push(Entity {
            index: ByteSlice {
                byte_start: m.start(),
                byte_end: m.start() + marker_len + tag.len(),
            },
            kind: EntityKind::Tag(tag.to_string()),
        });
    }

    entities.sort_by_key(|e| e.index.byte_start);
    entities
}

/// Drop trailing sentence punctuation and an unbalanced closing paren
fn trim_link(raw: &str) -> &str {
    let mut uri = raw;
    loop {
        let trimmed = uri.trim_end_matches(['.', ',', ';', ':', '!', '?', '"', '\'']);
        let trimmed = if trimmed.ends_with(')') && !trimmed.contains('(') {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };
        if trimmed.len() == uri.len() {
            return uri;
        }
        uri = trimmed;
    }
}

fn has_known_tld(domain: &str) -> bool {
    let Some(tld) = domain.rsplit('.').next().map(str::to_ascii_lowercase) else {
        return false;
    };
    if tld.len() == 2 {
        return tld.chars().all(|c| c.is_ascii_alphabetic());
    }
    GENERIC_TLDS.contains(&tld.as_str())
}

fn is_valid_handle(handle: &str) -> bool {
    let labels: Vec<&str> = handle.split('.').collect();
    if labels.len() < 2 || handle.len() > 253 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty() && label.len() <= 63 && !label.starts_with('-') && !label.ends_with('-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.chars().next().is_some_and(|c| c.is_ascii_alphabetic()));
    labels_ok && tld_ok
}
