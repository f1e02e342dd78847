//! Link-card builder: Open Graph metadata plus a thumbnail for the first link
//!
//! Every failure here is a [`ScrapeError`]. Callers treat it as "no card" and
//! post the text alone.

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::ScrapeError;
use crate::imaging::{normalize_blocking, NormalizeOptions};
use crate::source::SourceResolver;
use crate::types::LinkCard;

/// Metadata pulled from a page's `<head>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenGraph {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absolute image URL
    pub image: Option<String>,
}

impl OpenGraph {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.image.is_none()
    }
}

/// Parse Open Graph tags, falling back to Twitter card tags, `<title>` and
/// `meta[name=description]`. Relative image URLs are resolved against `page_url`.
pub fn parse_open_graph(html: &str, page_url: &Url) -> OpenGraph {
    let document = Html::parse_document(html);

    let meta = |attr: &str, key: &str| -> Option<String> {
        let selector = Selector::parse(&format!(r#"meta[{}="{}"]"#, attr, key)).ok()?;
        document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(str::to_string)
    };

    let title = meta("property", "og:title")
        .or_else(|| meta("name", "twitter:title"))
        .or_else(|| {
            let selector = Selector::parse("title").ok()?;
            document
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        });

    let description = meta("property", "og:description")
        .or_else(|| meta("name", "twitter:description"))
        .or_else(|| meta("name", "description"));

    let image = meta("property", "og:image")
        .or_else(|| meta("property", "og:image:url"))
        .or_else(|| meta("name", "twitter:image"))
        .and_then(|raw| page_url.join(&raw).ok())
        .map(String::from);

    OpenGraph {
        title,
        description,
        image,
    }
}

pub struct LinkCardBuilder<'a> {
    resolver: &'a SourceResolver,
    max_width: u32,
}

impl<'a> LinkCardBuilder<'a> {
    pub fn new(resolver: &'a SourceResolver, max_width: u32) -> Self {
        Self {
            resolver,
            max_width,
        }
    }

    /// Scrape `site_url` and fetch its preview image as a thumbnail
    pub async fn build(&self, site_url: &str) -> Result<LinkCard, ScrapeError> {
        let page_url = Url::parse(site_url).map_err(|e| ScrapeError::Page {
            url: site_url.to_string(),
            reason: e.to_string(),
        })?;

        let html = self.fetch_page(site_url).await?;
        let og = parse_open_graph(&html, &page_url);
        if og.is_empty() {
            return Err(ScrapeError::NoMetadata(site_url.to_string()));
        }
        let image_url = og
            .image
            .clone()
            .ok_or_else(|| ScrapeError::MissingImage(site_url.to_string()))?;

        debug!("Open Graph for {}: title={:?}, image={}", site_url, og.title, image_url);

        let image_error = |reason: String| ScrapeError::Image {
            url: image_url.clone(),
            reason,
        };

        let resolved = self
            .resolver
            .fetch_remote(&image_url)
            .await
            .map_err(|e| image_error(e.to_string()))?;
        let image = normalize_blocking(resolved, NormalizeOptions::thumbnail(self.max_width))
            .await
            .map_err(|e| image_error(e.to_string()))?;

        Ok(LinkCard {
            site_url: site_url.to_string(),
            image_url: image_url.clone(),
            mime_type: image.mime_type,
            title: og.title.unwrap_or_default(),
            description: og.description.unwrap_or_default(),
            image,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, ScrapeError> {
        let page_error = |reason: String| ScrapeError::Page {
            url: url.to_string(),
            reason,
        };

        let response = self
            .resolver
            .client()
            .get(url)
            .header(reqwest::header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| page_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(page_error(format!("HTTP {}", status.as_u16())));
        }

        response.text().await.map_err(|e| page_error(e.to_string()))
    }
}
