//! Bucketsync HTTP server
//!
//! Run with: bucketsync-server

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bucketsync::api::{router, AppState};
use bucketsync::config::{BucketNaming, StoreConfig, SyncOptions};
use bucketsync::store::S3Store;
use bucketsync::sync::SyncEngine;

#[derive(Parser, Debug)]
#[command(name = "bucketsync-server")]
#[command(about = "HTTP service syncing MinIO buckets to AWS S3")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "BUCKETSYNC_BIND", default_value = "0.0.0.0:8080")]
    bind: String,

    /// MinIO endpoint URL
    #[arg(long, env = "MINIO_ENDPOINT_URL")]
    minio_endpoint: String,

    /// MinIO access key
    #[arg(long, env = "MINIO_ACCESS_KEY")]
    minio_access_key: String,

    /// MinIO secret key
    #[arg(long, env = "MINIO_SECRET_KEY", hide_env_values = true)]
    minio_secret_key: String,

    /// MinIO region
    #[arg(long, env = "MINIO_REGION", default_value = "us-east-1")]
    minio_region: String,

    /// AWS region for the destination
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    aws_region: String,

    /// AWS access key (falls back to the default credential chain)
    #[arg(long, env = "AWS_ACCESS_KEY")]
    aws_access_key: Option<String>,

    /// AWS secret key
    #[arg(long, env = "AWS_SECRET_KEY", hide_env_values = true)]
    aws_secret_key: Option<String>,

    /// Override the destination endpoint (S3-compatible targets)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    aws_endpoint: Option<String>,

    /// Objects synced at once within a bucket
    #[arg(long, env = "BUCKETSYNC_CONCURRENCY", default_value = "1")]
    concurrency: usize,

    /// Prefix added to destination bucket names in fleet syncs
    #[arg(long, env = "BUCKETSYNC_DEST_PREFIX", default_value = "")]
    dest_prefix: String,

    /// Suffix added to destination bucket names in fleet syncs
    #[arg(long, env = "BUCKETSYNC_DEST_SUFFIX", default_value = "")]
    dest_suffix: String,

    /// Emit logs as JSON
    #[arg(long, env = "BUCKETSYNC_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));

    if json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .with(filter)
            .init();
    }
}

/// Resolves on ctrl-c; in-flight syncs are cancelled before connections drain
async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down, cancelling in-flight syncs");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut source_config = StoreConfig::minio(
        args.minio_endpoint,
        args.minio_access_key,
        args.minio_secret_key,
    );
    source_config.region = args.minio_region;
    let mut destination_config = StoreConfig::aws(args.aws_region)
        .with_credentials(args.aws_access_key, args.aws_secret_key);
    destination_config.endpoint_url = args.aws_endpoint;

    let source = S3Store::connect(&source_config)
        .await
        .context("failed to initialize MinIO client")?;
    let destination = S3Store::connect(&destination_config)
        .await
        .context("failed to initialize AWS S3 client")?;

    let engine = SyncEngine::new(Arc::new(source), Arc::new(destination)).with_options(
        SyncOptions {
            concurrency: args.concurrency.max(1),
            ..Default::default()
        },
    );
    let naming = BucketNaming {
        prefix: args.dest_prefix,
        suffix: args.dest_suffix,
    };

    let app = router(AppState::new(engine.clone()).with_naming(naming));

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(
        "bucketsync {} listening on {}",
        bucketsync::VERSION,
        args.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine.cancellation_token()))
        .await?;

    engine.drain_background().await;
    Ok(())
}
