//! Bucketsync CLI
//!
//! One-shot syncs from the command line. Results are printed as JSON.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bucketsync::config::{BucketNaming, StoreConfig, SyncOptions};
use bucketsync::store::S3Store;
use bucketsync::sync::{bucket_failure_report, failure_report, SyncEngine};

#[derive(Parser)]
#[command(name = "bucketsync")]
#[command(about = "Sync MinIO buckets to AWS S3")]
#[command(version)]
struct Cli {
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

    /// Override the destination endpoint
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    aws_endpoint: Option<String>,

    /// Objects synced at once within a bucket
    #[arg(long, env = "BUCKETSYNC_CONCURRENCY", default_value = "1")]
    concurrency: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync a single object
    Object {
        /// Source bucket
        source: String,
        /// Destination bucket
        destination: String,
        /// Object key
        key: String,
    },
    /// Sync every object in a bucket
    Bucket {
        /// Source bucket
        bucket: String,
        /// Destination bucket (defaults to the source name)
        #[arg(short, long)]
        dest: Option<String>,
        /// Only sync keys under this prefix
        #[arg(short, long)]
        prefix: Option<String>,
        /// Print a failure report instead of JSON
        #[arg(long)]
        report: bool,
    },
    /// Sync every bucket on the source store
    Fleet {
        /// Prefix added to destination bucket names
        #[arg(long, env = "BUCKETSYNC_DEST_PREFIX", default_value = "")]
        dest_prefix: String,
        /// Suffix added to destination bucket names
        #[arg(long, env = "BUCKETSYNC_DEST_SUFFIX", default_value = "")]
        dest_suffix: String,
        /// Print a failure report instead of JSON
        #[arg(long)]
        report: bool,
    },
    /// Show the recorded sync state of an object
    Status {
        /// Source bucket
        bucket: String,
        /// Object key
        key: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut source_config =
        StoreConfig::minio(cli.minio_endpoint, cli.minio_access_key, cli.minio_secret_key);
    source_config.region = cli.minio_region;
    let mut destination_config =
        StoreConfig::aws(cli.aws_region).with_credentials(cli.aws_access_key, cli.aws_secret_key);
    destination_config.endpoint_url = cli.aws_endpoint;

    let source = S3Store::connect(&source_config)
        .await
        .context("failed to initialize MinIO client")?;
    let destination = S3Store::connect(&destination_config)
        .await
        .context("failed to initialize AWS S3 client")?;

    let engine = SyncEngine::new(Arc::new(source), Arc::new(destination)).with_options(
        SyncOptions {
            concurrency: cli.concurrency.max(1),
            // nothing outlives the process, so annotate inline
            annotate_skips_in_background: false,
            ..Default::default()
        },
    );

    match cli.command {
        Commands::Object {
            source,
            destination,
            key,
        } => {
            let result = engine.sync_object(&source, &destination, &key).await;
            print_json(&result)?;
            if result.is_failed() {
                std::process::exit(1);
            }
        }

        Commands::Bucket {
            bucket,
            dest,
            prefix,
            report,
        } => {
            let summary = engine
                .sync_bucket(&bucket, dest.as_deref(), prefix.as_deref())
                .await;
            if report {
                println!("{}", bucket_failure_report(&summary));
            } else {
                print_json(&summary)?;
            }
            if summary.error.is_some() {
                std::process::exit(1);
            }
        }

        Commands::Fleet {
            dest_prefix,
            dest_suffix,
            report,
        } => {
            let naming = BucketNaming {
                prefix: dest_prefix,
                suffix: dest_suffix,
            };
            let summary = engine.sync_fleet(&naming).await?;
            if report {
                println!("{}", failure_report(&summary));
            } else {
                print_json(&summary)?;
            }
        }

        Commands::Status { bucket, key } => {
            let view = engine.sync_status(&bucket, &key).await?;
            print_json(&view)?;
        }
    }

    engine.drain_background().await;
    Ok(())
}
