//! Post orchestration: one description, one platform, one post
//!
//! A run moves through `LOAD → (images | link card | text only) → SUBMIT`.
//! Any error before SUBMIT aborts the run, so a post is either complete or
//! not made at all. The one soft failure is the link card: if the page
//! cannot be scraped the post goes out as text only.

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::error::{PlatformError, Result};
use crate::imaging::normalize_blocking;
use crate::linkcard::LinkCardBuilder;
use crate::platforms::Platform;
use crate::richtext::RichText;
use crate::source::SourceResolver;
use crate::types::{ImageRef, PostDescription, PostOutcome, PostPath};

pub struct Poster<P: Platform> {
    platform: P,
    resolver: SourceResolver,
}

impl<P: Platform> Poster<P> {
    pub fn new(platform: P, resolver: SourceResolver) -> Self {
        Self { platform, resolver }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Load the description at `location`, authenticate, and post it
    ///
    /// # Errors
    ///
    /// Returns the first error hit by any stage; nothing is posted in that case.
    pub async fn run(&mut self, location: &str) -> Result<PostOutcome> {
        let post = self.resolver.load_post(location).await?;
        self.check_image_count(&post)?;

        self.platform.authenticate().await?;
        self.post(&post).await
    }

    /// Post an already-loaded description. The platform must be authenticated.
    pub async fn post(&self, post: &PostDescription) -> Result<PostOutcome> {
        post.validate()?;
        self.check_image_count(post)?;

        let text = self.platform.detect_facets(&post.text).await?;

        let (embed, path) = if !post.images.is_empty() {
            let media = self.upload_images(&post.images).await?;
            let count = media.len();
            (
                Some(self.platform.images_embed(media)),
                PostPath::Images { count },
            )
        } else {
            match self.card_url(&text) {
                Some(url) => match self.card_embed(&url).await? {
                    Some(embed) => (Some(embed), PostPath::LinkCard { url }),
                    None => (None, PostPath::TextOnly),
                },
                None => (None, PostPath::TextOnly),
            }
        };

        debug!("Submitting to {} via {:?}", self.platform.name(), path);
        let post_id = self.platform.submit(&text, embed).await?;
        info!("Posted to {}: {}", self.platform.name(), post_id);

        Ok(PostOutcome {
            platform: self.platform.name().to_string(),
            post_id,
            path,
        })
    }

    fn check_image_count(&self, post: &PostDescription) -> Result<()> {
        let max = self.platform.max_images();
        if post.images.len() > max {
            return Err(PlatformError::Validation(format!(
                "{} accepts at most {} images per post (got {})",
                self.platform.name(),
                max,
                post.images.len()
            ))
            .into());
        }
        Ok(())
    }

    /// Resolve, normalize and upload every image concurrently.
    /// Media come back in input order; the first failure aborts the rest.
    async fn upload_images(&self, images: &[ImageRef]) -> Result<Vec<P::Media>> {
        let options = self.platform.normalize_options();

        let uploads = images.iter().enumerate().map(|(index, image)| async move {
            let resolved = self.resolver.resolve(&image.src).await?;
            let normalized = normalize_blocking(resolved, options).await?;
            debug!(
                "Image {} ({}) normalized to {}x{}",
                index + 1,
                image.src,
                normalized.width,
                normalized.height
            );
            self.platform.upload_image(normalized, &image.alt).await
        });

        try_join_all(uploads).await
    }

    fn card_url(&self, text: &RichText) -> Option<String> {
        if !self.platform.supports_link_cards() {
            return None;
        }
        text.first_link().map(str::to_string)
    }

    /// `Ok(None)` when the page gave us nothing usable
    async fn card_embed(&self, url: &str) -> Result<Option<P::Embed>> {
        let max_width = self.platform.normalize_options().max_width;
        match LinkCardBuilder::new(&self.resolver, max_width).build(url).await {
            Ok(card) => {
                debug!("Built link card for {}: {}", url, card.title);
                Ok(Some(self.platform.card_embed(&card).await?))
            }
            Err(e) => {
                warn!("Skipping link card: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TripostError;
    use crate::platforms::mock::{MockConfig, MockEmbed, MockPlatform};
    use std::io::Cursor;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
        let img = image::DynamicImage::new_rgb8(width, height);
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(dir.join(name), buf).unwrap();
    }

    async fn poster(platform: MockPlatform, base: &Path) -> Poster<MockPlatform> {
        let mut platform = platform;
        platform.authenticate().await.unwrap();
        Poster::new(
            platform,
            SourceResolver::new(base, Duration::from_secs(5)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_text_only_post_has_no_embed() {
        let temp = TempDir::new().unwrap();
        let poster = poster(MockPlatform::with_link_cards("mock"), temp.path()).await;

        let outcome = poster
            .post(&PostDescription::new("No links, no images"))
            .await
            .unwrap();

        assert_eq!(outcome.path, PostPath::TextOnly);
        assert_eq!(outcome.post_id, "mock-post-1");
        let submissions = poster.platform().submissions();
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].embed.is_none());
    }

    #[tokio::test]
    async fn test_link_ignored_without_card_support() {
        let temp = TempDir::new().unwrap();
        let poster = poster(MockPlatform::success("mock"), temp.path()).await;

        let outcome = poster
            .post(&PostDescription::new("Read https://example.invalid/post"))
            .await
            .unwrap();

        assert_eq!(outcome.path, PostPath::TextOnly);
        assert!(poster.platform().last_embed().is_none());
    }

    #[tokio::test]
    async fn test_too_many_images_rejected_before_upload() {
        let temp = TempDir::new().unwrap();
        let platform = MockPlatform::new(MockConfig {
            max_images: 2,
            ..Default::default()
        });
        let poster = poster(platform, temp.path()).await;

        let post = PostDescription::new("three")
            .with_image("a.png", "")
            .with_image("b.png", "")
            .with_image("c.png", "");
        let err = poster.post(&post).await.unwrap_err();

        assert!(matches!(err, TripostError::Platform(PlatformError::Validation(_))));
        assert_eq!(poster.platform().upload_call_count(), 0);
        assert_eq!(poster.platform().post_call_count(), 0);
    }

    #[tokio::test]
    async fn test_images_are_normalized_before_upload() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "wide.png", 1600, 900);
        write_png(temp.path(), "small.png", 300, 200);
        let poster = poster(MockPlatform::success("mock"), temp.path()).await;

        let post = PostDescription::new("pics")
            .with_image("wide.png", "wide")
            .with_image("small.png", "small");
        let outcome = poster.post(&post).await.unwrap();

        assert_eq!(outcome.path, PostPath::Images { count: 2 });
        match poster.platform().last_embed() {
            Some(MockEmbed::Images(media)) => {
                assert_eq!((media[0].width, media[0].height), (800, 450));
                assert_eq!((media[1].width, media[1].height), (300, 200));
            }
            other => panic!("Expected images embed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_undecodable_image_aborts_post() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("broken.png"), b"not a png").unwrap();
        let poster = poster(MockPlatform::success("mock"), temp.path()).await;

        let err = poster
            .post(&PostDescription::new("bad").with_image("broken.png", ""))
            .await
            .unwrap_err();

        assert!(matches!(err, TripostError::Image(_)));
        assert_eq!(poster.platform().post_call_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_post() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "a.png", 10, 10);
        write_png(temp.path(), "b.png", 10, 10);
        let platform = MockPlatform::new(MockConfig {
            fail_upload_for: Some("second".to_string()),
            ..Default::default()
        });
        let poster = poster(platform, temp.path()).await;

        let post = PostDescription::new("two")
            .with_image("a.png", "first")
            .with_image("b.png", "second");
        let err = poster.post(&post).await.unwrap_err();

        assert!(matches!(err, TripostError::Platform(PlatformError::Upload(_))));
        assert_eq!(poster.platform().post_call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_authenticates_after_loading() {
        let temp = TempDir::new().unwrap();
        let post_path = temp.path().join("post.json");
        std::fs::write(&post_path, r#"{"text":"from disk"}"#).unwrap();

        let mut poster = Poster::new(
            MockPlatform::success("mock"),
            SourceResolver::new(temp.path(), Duration::from_secs(5)).unwrap(),
        );
        let outcome = poster.run(post_path.to_str().unwrap()).await.unwrap();

        assert_eq!(outcome.platform, "mock");
        assert_eq!(poster.platform().auth_call_count(), 1);
        assert_eq!(poster.platform().submissions()[0].text.text, "from disk");
    }

    #[tokio::test]
    async fn test_run_does_not_authenticate_on_bad_document() {
        let temp = TempDir::new().unwrap();
        let mut poster = Poster::new(
            MockPlatform::success("mock"),
            SourceResolver::new(temp.path(), Duration::from_secs(5)).unwrap(),
        );

        let err = poster
            .run(temp.path().join("missing.json").to_str().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, TripostError::Io { .. }));
        assert_eq!(poster.platform().auth_call_count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_auth_failure() {
        let temp = TempDir::new().unwrap();
        let post_path = temp.path().join("post.json");
        std::fs::write(&post_path, r#"{"text":"hi"}"#).unwrap();

        let mut poster = Poster::new(
            MockPlatform::auth_failure("mock", "bad password"),
            SourceResolver::new(temp.path(), Duration::from_secs(5)).unwrap(),
        );
        let err = poster.run(post_path.to_str().unwrap()).await.unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert_eq!(poster.platform().post_call_count(), 0);
    }
}
