//! tri-post - Post a JSON post description to Bluesky, Mastodon or X

use clap::Parser;
use libtripost::config::{load_dotenv, PlatformConfig, POST_JSON_URL};
use libtripost::logging::{LogFormat, LoggingConfig};
use libtripost::platforms::bluesky::BlueskyPlatform;
use libtripost::platforms::mastodon::MastodonPlatform;
use libtripost::platforms::x::XPlatform;
use libtripost::{Config, PlatformKind, PostOutcome, Poster, Result, SourceResolver};
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(name = "tri-post")]
#[command(version)]
#[command(about = "Post text and images to Bluesky, Mastodon or X", long_about = None)]
#[command(after_help = r#"CONFIGURATION:
    Settings come from the environment (a .env file in the working
    directory is loaded first). Only the chosen platform's keys are needed.

    POST_JSON_URL          Post description (URL or path; --post overrides)
    BSKY_SERVICE_URL       Bluesky PDS, e.g. https://bsky.social
    BSKY_IDENTIFIER        Bluesky handle or email
    BSKY_PASSWORD          Bluesky app password
    MASTODON_API_URL       Mastodon instance URL
    MASTODON_ACCESS_TOKEN  Mastodon access token
    X_API_KEY, X_API_KEY_SECRET, X_ACCESS_TOKEN, X_ACCESS_TOKEN_SECRET

EXIT CODES:
    0 - Posted
    1 - Configuration, network, image or platform error
    2 - Authentication failed
    3 - Invalid post description"#)]
struct Cli {
    /// Target platform (bluesky, mastodon, x)
    platform: PlatformKind,

    /// Post description location; defaults to $POST_JSON_URL
    #[arg(short, long)]
    post: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text, json, pretty); defaults to $TRIPOST_LOG_FORMAT
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let dotenv = load_dotenv();
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.log_format, cli.verbose).init();
    match &dotenv {
        Ok(Some(path)) => debug!("Loaded environment from {}", path.display()),
        Ok(None) => {}
        Err(e) => warn!("Ignoring unreadable .env file: {}", e),
    }

    match run(&cli).await {
        Ok(outcome) => print_outcome(&outcome, &cli.format),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: &Cli) -> Result<PostOutcome> {
    let config = Config::from_lookup(cli.platform, |key| {
        if key == POST_JSON_URL {
            if let Some(post) = &cli.post {
                return Some(post.clone());
            }
        }
        std::env::var(key).ok()
    })?;
    debug!(
        "Posting {} to {} (base dir {})",
        config.post_source,
        config.platform.kind(),
        config.base_dir.display()
    );

    let resolver = SourceResolver::from_config(&config)?;

    match &config.platform {
        PlatformConfig::Bluesky(bluesky) => {
            let platform = BlueskyPlatform::from_config(bluesky, &config)?;
            Poster::new(platform, resolver).run(&config.post_source).await
        }
        PlatformConfig::Mastodon(mastodon) => {
            let platform = MastodonPlatform::from_config(mastodon, &config)?;
            Poster::new(platform, resolver).run(&config.post_source).await
        }
        PlatformConfig::X(x) => {
            let platform = XPlatform::from_config(x, &config)?;
            Poster::new(platform, resolver).run(&config.post_source).await
        }
    }
}

fn print_outcome(outcome: &PostOutcome, format: &str) {
    if format == "json" {
        match serde_json::to_string_pretty(outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: failed to serialize result: {}", e),
        }
    } else {
        println!("Posted to {}: {}", outcome.platform, outcome.post_id);
    }
}
