//! End-to-end tests for the posting pipeline
//!
//! These drive `Poster` against the mock platform, with real files on disk
//! and a local HTTP server standing in for remote images and web pages.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use libtripost::config::PlatformConfig;
use libtripost::error::{FetchError, PlatformError};
use libtripost::platforms::mock::{MockEmbed, MockPlatform};
use libtripost::types::ImageMimeType;
use libtripost::{Config, PlatformKind, PostDescription, PostPath, Poster, SourceResolver, TripostError};
use mockito::Server;
use serial_test::serial;
use tempfile::TempDir;

fn encode(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::DynamicImage::new_rgb8(width, height);
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32) {
    std::fs::write(dir.join(name), encode(width, height, image::ImageFormat::Png)).unwrap();
}

fn resolver(base: &Path) -> SourceResolver {
    SourceResolver::new(base, Duration::from_secs(5)).unwrap()
}

fn write_post(dir: &Path, post: &PostDescription) -> String {
    let path = dir.join("post.json");
    std::fs::write(&path, serde_json::to_string(post).unwrap()).unwrap();
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn test_images_keep_input_order_when_uploads_finish_out_of_order() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    write_png(temp.path(), "first.png", 40, 20);
    write_png(temp.path(), "second.png", 30, 20);
    write_png(temp.path(), "third.png", 20, 20);

    let platform = MockPlatform::with_upload_delays(
        "mock",
        &[
            ("first", Duration::from_millis(300)),
            ("second", Duration::from_millis(150)),
        ],
    );
    let post = PostDescription::new("three pictures")
        .with_image("first.png", "first")
        .with_image("second.png", "second")
        .with_image("third.png", "third");
    let location = write_post(temp.path(), &post);

    let mut poster = Poster::new(platform, resolver(temp.path()));
    let outcome = poster.run(&location).await?;

    assert_eq!(outcome.path, PostPath::Images { count: 3 });
    assert_eq!(
        poster.platform().completed_uploads(),
        vec!["third".to_string(), "second".to_string(), "first".to_string()]
    );
    match poster.platform().last_embed() {
        Some(MockEmbed::Images(media)) => {
            let alts: Vec<&str> = media.iter().map(|m| m.alt.as_str()).collect();
            assert_eq!(alts, vec!["first", "second", "third"]);
            let widths: Vec<u32> = media.iter().map(|m| m.width).collect();
            assert_eq!(widths, vec![40, 30, 20]);
        }
        other => panic!("Expected images embed, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_remote_and_local_images_mixed() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    write_png(temp.path(), "local.png", 1000, 500);

    let mut server = Server::new_async().await;
    let remote = server
        .mock("GET", "/photo.jpg")
        .with_status(200)
        .with_header("content-type", "image/jpeg")
        .with_body(encode(200, 100, image::ImageFormat::Jpeg))
        .create_async()
        .await;

    let post = PostDescription::new("one of each")
        .with_image(format!("{}/photo.jpg", server.url()), "remote")
        .with_image("local.png", "local");
    let location = write_post(temp.path(), &post);

    let mut poster = Poster::new(MockPlatform::success("mock"), resolver(temp.path()));
    poster.run(&location).await?;

    remote.assert_async().await;
    match poster.platform().last_embed() {
        Some(MockEmbed::Images(media)) => {
            assert_eq!(media.len(), 2);
            assert_eq!(media[0].alt, "remote");
            assert_eq!(media[0].mime_type, ImageMimeType::Jpeg);
            assert_eq!((media[0].width, media[0].height), (200, 100));
            assert_eq!(media[1].alt, "local");
            assert_eq!(media[1].mime_type, ImageMimeType::Png);
            assert_eq!((media[1].width, media[1].height), (800, 400));
        }
        other => panic!("Expected images embed, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_local_image_aborts_without_posting() {
    let temp = TempDir::new().unwrap();
    write_png(temp.path(), "present.png", 10, 10);

    let post = PostDescription::new("one is missing")
        .with_image("present.png", "here")
        .with_image("absent.png", "gone");
    let location = write_post(temp.path(), &post);

    let mut poster = Poster::new(MockPlatform::success("mock"), resolver(temp.path()));
    let err = poster.run(&location).await.unwrap_err();

    match err {
        TripostError::Io { path, .. } => assert!(path.ends_with("absent.png")),
        other => panic!("Expected IO error, got {:?}", other),
    }
    assert_eq!(poster.platform().post_call_count(), 0);
    assert!(poster.platform().submissions().is_empty());
}

#[tokio::test]
async fn test_remote_image_http_error_aborts() {
    let temp = TempDir::new().unwrap();
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/missing.png")
        .with_status(404)
        .create_async()
        .await;

    let post = PostDescription::new("broken link")
        .with_image(format!("{}/missing.png", server.url()), "");
    let location = write_post(temp.path(), &post);

    let mut poster = Poster::new(MockPlatform::success("mock"), resolver(temp.path()));
    let err = poster.run(&location).await.unwrap_err();

    assert!(matches!(
        err,
        TripostError::Fetch(FetchError::Status { status, .. }) if status == 404
    ));
    assert_eq!(poster.platform().post_call_count(), 0);
}

#[tokio::test]
async fn test_text_without_link_has_no_embed() {
    let temp = TempDir::new().unwrap();
    let location = write_post(temp.path(), &PostDescription::new("Nothing to see #here"));

    let mut poster = Poster::new(MockPlatform::with_link_cards("mock"), resolver(temp.path()));
    let outcome = poster.run(&location).await.unwrap();

    assert_eq!(outcome.path, PostPath::TextOnly);
    let submissions = poster.platform().submissions();
    assert_eq!(submissions.len(), 1);
    assert!(submissions[0].embed.is_none());
    assert_eq!(submissions[0].text.facets.len(), 1);
}

#[tokio::test]
async fn test_link_card_from_open_graph() {
    let temp = TempDir::new().unwrap();
    let mut server = Server::new_async().await;
    let html = format!(
        r#"<html><head>
            <meta property="og:title" content="A Post">
            <meta property="og:description" content="Worth reading">
            <meta property="og:image" content="{}/og.png">
        </head><body></body></html>"#,
        server.url()
    );
    let _page = server
        .mock("GET", "/blog/post")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(html)
        .create_async()
        .await;
    let _image = server
        .mock("GET", "/og.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(encode(1600, 800, image::ImageFormat::Png))
        .create_async()
        .await;

    let site_url = format!("{}/blog/post", server.url());
    let location = write_post(
        temp.path(),
        &PostDescription::new(format!("New post: {}", site_url)),
    );

    let mut poster = Poster::new(MockPlatform::with_link_cards("mock"), resolver(temp.path()));
    let outcome = poster.run(&location).await.unwrap();

    assert_eq!(outcome.path, PostPath::LinkCard { url: site_url.clone() });
    assert_eq!(
        poster.platform().last_embed(),
        Some(MockEmbed::Card {
            uri: site_url,
            title: "A Post".to_string(),
            description: "Worth reading".to_string(),
            thumb_width: 800,
        })
    );
}

#[tokio::test]
async fn test_failed_scrape_still_posts_text() {
    let temp = TempDir::new().unwrap();
    let mut server = Server::new_async().await;
    let page = server
        .mock("GET", "/gone")
        .with_status(404)
        .create_async()
        .await;

    let location = write_post(
        temp.path(),
        &PostDescription::new(format!("See {}/gone", server.url())),
    );

    let mut poster = Poster::new(MockPlatform::with_link_cards("mock"), resolver(temp.path()));
    let outcome = poster.run(&location).await.unwrap();

    page.assert_async().await;
    assert_eq!(outcome.path, PostPath::TextOnly);
    assert_eq!(poster.platform().post_call_count(), 1);
    assert!(poster.platform().last_embed().is_none());
}

#[tokio::test]
async fn test_images_take_precedence_over_link_card() {
    let temp = TempDir::new().unwrap();
    write_png(temp.path(), "pic.png", 10, 10);
    let mut server = Server::new_async().await;
    let page = server
        .mock("GET", "/article")
        .expect(0)
        .create_async()
        .await;

    let post = PostDescription::new(format!("Pic and link {}/article", server.url()))
        .with_image("pic.png", "pic");
    let location = write_post(temp.path(), &post);

    let mut poster = Poster::new(MockPlatform::with_link_cards("mock"), resolver(temp.path()));
    let outcome = poster.run(&location).await.unwrap();

    page.assert_async().await;
    assert_eq!(outcome.path, PostPath::Images { count: 1 });
}

#[tokio::test]
async fn test_post_document_loaded_from_url() {
    let temp = TempDir::new().unwrap();
    write_png(temp.path(), "pic.png", 10, 10);
    let mut server = Server::new_async().await;
    let _doc = server
        .mock("GET", "/post.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"text":"remote document","images":[{"src":"pic.png","alt":"local image"}]}"#)
        .create_async()
        .await;

    let mut poster = Poster::new(MockPlatform::success("mock"), resolver(temp.path()));
    let outcome = poster
        .run(&format!("{}/post.json", server.url()))
        .await
        .unwrap();

    assert_eq!(outcome.path, PostPath::Images { count: 1 });
    let submissions = poster.platform().submissions();
    assert_eq!(submissions[0].text.text, "remote document");
}

#[tokio::test]
async fn test_post_failure_reported_after_uploads() {
    let temp = TempDir::new().unwrap();
    write_png(temp.path(), "pic.png", 10, 10);
    let location = write_post(
        temp.path(),
        &PostDescription::new("rejected").with_image("pic.png", ""),
    );

    let mut poster = Poster::new(
        MockPlatform::post_failure("mock", "server said no"),
        resolver(temp.path()),
    );
    let err = poster.run(&location).await.unwrap_err();

    assert!(matches!(err, TripostError::Platform(PlatformError::Posting(_))));
    assert_eq!(poster.platform().upload_call_count(), 1);
    assert_eq!(err.exit_code(), 1);
}

#[test]
#[serial]
fn test_config_from_process_environment() {
    let keys = [
        ("POST_JSON_URL", "https://example.com/post.json"),
        ("MASTODON_API_URL", "mastodon.example"),
        ("MASTODON_ACCESS_TOKEN", "token"),
        ("TRIPOST_MAX_WIDTH", "640"),
        ("TRIPOST_HTTP_TIMEOUT", "5s"),
    ];
    for (key, value) in keys {
        std::env::set_var(key, value);
    }

    let config = Config::from_env(PlatformKind::Mastodon);

    for (key, _) in keys {
        std::env::remove_var(key);
    }

    let config = config.unwrap();
    assert_eq!(config.post_source, "https://example.com/post.json");
    assert_eq!(config.max_width, 640);
    assert_eq!(config.http_timeout, Duration::from_secs(5));
    assert!(matches!(config.platform, PlatformConfig::Mastodon(ref m) if m.instance == "mastodon.example"));
}

#[test]
#[serial]
fn test_config_from_process_environment_missing_credentials() {
    std::env::set_var("POST_JSON_URL", "post.json");
    std::env::remove_var("X_API_KEY");

    let result = Config::from_env(PlatformKind::X);
    std::env::remove_var("POST_JSON_URL");

    let err = result.unwrap_err();
    assert!(err.to_string().contains("X_API_KEY"));
    assert_eq!(err.exit_code(), 1);
}
