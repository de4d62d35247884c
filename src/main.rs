//! Passage Auth - check a Passage auth token from the command line
//!
//! Runs the Passage strategy against a token and prints the outcome.

use clap::Parser;
use passage_auth::auth::AuthRequest;
use passage_auth::config::{Config, TokenSource};
use passage_auth::strategy::{verify_fn, Verdict};
use passage_auth::{metrics, Outcome, PassageStrategy, Strategy};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Passage Auth - validate a Passage auth token and resolve its user
#[derive(Parser, Debug)]
#[command(name = "passage-auth")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Passage auth token to check
    #[arg(short, long)]
    token: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print Prometheus metrics after the check
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Passage Auth v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let request = match config.passage.token_source {
        TokenSource::Cookie => AuthRequest::new("GET", "/")
            .with_header("cookie", format!("psg_auth_token={}", args.token)),
        TokenSource::Header => AuthRequest::new("GET", "/")
            .with_header("authorization", format!("Bearer {}", args.token)),
    };

    let strategy = PassageStrategy::new(
        &config,
        verify_fn(|_request, _identity_id, profile| async move { Ok(Verdict::user(profile)) }),
    )?;

    let outcome = strategy.authenticate(&request).await;
    let status = outcome.http_status();
    let report = match &outcome {
        Outcome::Success { user, info } => json!({
            "outcome": "success",
            "status": status,
            "profile": user,
            "info": info,
        }),
        Outcome::Fail { info, status: explicit } => json!({
            "outcome": "fail",
            "status": status,
            "explicit_status": explicit,
            "info": info,
        }),
        Outcome::Error(cause) => json!({
            "outcome": "error",
            "status": status,
            "error": cause.to_string(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.metrics {
        print!("{}", metrics::gather_text());
    }

    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
