//! CLI entry point for the index crawler.
//!
//! Provides subcommands for crawling keyword series from the index service,
//! decoding captured payloads offline, and post-processing saved tables.

mod infra;

use crate::infra::index::client::IndexClient;
use anyhow::{Context, Result, bail};
use aws_sdk_s3::primitives::ByteStream;
use clap::{Parser, Subcommand};
use flate2::Compression;
use flate2::write::GzEncoder;
use index_crawler::{
    config::{AppConfig, DEFAULT_REGIONS_PATH, RegionTable},
    crawl::{Crawler, Pacing, RetryPolicy},
    decode::decode,
    fetch::{BasicClient, auth::SessionHeaders},
    output::{merge_dir, print_json, print_pretty, read_table, write_hourly, write_table},
    series::{DateRange, materialize},
    services::index_api::KeywordGroup,
    stats::averages_by_year,
    table::{expand_hourly, join},
};
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "index_crawler")]
#[command(about = "Crawl and decode search-index time series", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl keyword series from the index service
    Crawl {
        /// Keyword groups: groups separated by ',', words within a group by '+'
        #[arg(short, long)]
        keywords: String,

        /// First day, YYYY-MM-DD
        #[arg(short, long)]
        start: String,

        /// Last day (inclusive), YYYY-MM-DD
        #[arg(short, long)]
        end: String,

        /// Region code; 999 queries every configured region
        #[arg(short, long, default_value = "0")]
        region: String,

        /// Directory to save one CSV per request in
        #[arg(short, long, default_value = "output")]
        output_dir: String,

        /// Do not write CSV files
        #[arg(long, default_value_t = false)]
        no_save: bool,

        /// Base pause between requests, in milliseconds
        #[arg(short, long, default_value_t = 5000)]
        interval_ms: u64,

        /// Attempts per request before it is skipped
        #[arg(short = 'a', long, default_value_t = 1)]
        max_attempts: u32,

        /// Optional: S3 bucket to upload saved CSVs to
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: Gzip compress CSV files before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Decode a captured payload with its key table
    Decode {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        payload: String,

        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        end: String,

        /// Column label of the series
        #[arg(short, long, default_value = "value")]
        label: String,

        /// CSV file to write the series to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Average a captured payload per calendar year
    Yearly {
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        payload: String,

        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        end: String,
    },
    /// Join every CSV in a directory into merge.csv
    Merge {
        #[arg(short, long)]
        dir: String,

        /// Optional: S3 bucket to upload merge.csv to
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: Gzip compress before uploading to S3
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Interpolate a saved table onto an hourly axis
    Expand {
        #[arg(short, long)]
        input: String,

        #[arg(short, long)]
        output: String,
    },
    /// List the configured region table
    Regions,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/index_crawler.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("index_crawler.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            keywords,
            start,
            end,
            region,
            output_dir,
            no_save,
            interval_ms,
            max_attempts,
            s3_bucket,
            gzip,
        } => {
            let groups = KeywordGroup::parse_list(&keywords);
            if groups.is_empty() {
                bail!("no keywords given");
            }
            let range = DateRange::parse(&start, &end).context("invalid date range")?;

            let config = AppConfig::from_env()?;
            info!(
                credentials = config.credentials.len(),
                regions = config.regions.len(),
                "Configuration loaded"
            );
            let credential = config
                .pick_credential()
                .context("no credentials configured")?;

            let http = SessionHeaders::new(
                BasicClient::with_timeout(Duration::from_secs(10))?,
                credential,
            )?;
            let mut crawler = Crawler::new(IndexClient::new(http))
                .with_retry(RetryPolicy {
                    max_attempts,
                    ..RetryPolicy::default()
                })
                .with_pacing(Pacing::new(Duration::from_millis(interval_ms)));
            if !no_save {
                crawler = crawler.saving_to(&output_dir);
            }

            let report = crawler.crawl(&groups, range, &region, &config.regions).await;
            print_json(&report)?;

            if !report.failures.is_empty() {
                warn!(failed = report.failures.len(), "Some requests were skipped");
            }

            if let Some(bucket) = s3_bucket {
                let files: Vec<PathBuf> = report
                    .results
                    .values()
                    .flatten()
                    .filter_map(|r| r.file.clone())
                    .collect();
                upload_files(&bucket, &files, gzip).await?;
            }
        }
        Commands::Decode {
            key,
            payload,
            start,
            end,
            label,
            output,
        } => {
            let range = DateRange::parse(&start, &end).context("invalid date range")?;
            let series = materialize(&range, &decode(&key, &payload)?, &label)?;
            info!(
                granularity = ?range.granularity(),
                records = series.len(),
                "Payload decoded"
            );
            print_json(&series)?;

            if let Some(output) = output {
                write_table(Path::new(&output), &join(&[series])?)?;
                info!(path = %output, "Series written");
            }
        }
        Commands::Yearly {
            key,
            payload,
            start,
            end,
        } => {
            let range = DateRange::parse(&start, &end).context("invalid date range")?;
            let series = materialize(&range, &decode(&key, &payload)?, "value")?;
            let averages = averages_by_year(&series);
            print_pretty(&averages);
            for average in &averages {
                info!(year = average.year, average = average.average, "Yearly average");
            }
        }
        Commands::Merge {
            dir,
            s3_bucket,
            gzip,
        } => match merge_dir(Path::new(&dir))? {
            Some(dest) => {
                if let Some(bucket) = s3_bucket {
                    upload_files(&bucket, &[dest], gzip).await?;
                }
            }
            None => warn!(dir = %dir, "Nothing to merge"),
        },
        Commands::Expand { input, output } => {
            let table = read_table(Path::new(&input))?;
            let hourly = expand_hourly(&table);
            write_hourly(Path::new(&output), &hourly)?;
            info!(rows = hourly.row_count(), path = %output, "Hourly table written");
        }
        Commands::Regions => {
            let path = std::env::var("REGIONS_PATH")
                .unwrap_or_else(|_| DEFAULT_REGIONS_PATH.to_string());
            let regions = RegionTable::load(Path::new(&path))?;
            for (code, name) in regions.iter() {
                info!(code, name, "Region");
            }
            info!(total = regions.len(), path = %path, "Region table");
        }
    }

    Ok(())
}

/// Uploads saved tables to S3, optionally gzip-compressing them.
///
/// Keys are the file names, with `.gz` appended when compressed.
#[tracing::instrument(skip_all, fields(bucket = %bucket, files = files.len(), gzip = gzip))]
async fn upload_files(bucket: &str, files: &[PathBuf], gzip: bool) -> Result<()> {
    let config = aws_config::load_from_env().await;
    let client = aws_sdk_s3::Client::new(&config);
    info!(bucket = %bucket, gzip, "S3 upload enabled");

    let mut upload_count = 0;
    for path in files {
        let Some(file_name) = path.file_name().and_then(OsStr::to_str) else {
            continue;
        };

        // Read the file
        let file_contents = std::fs::read(path)?;

        // Prepare the data to upload
        let (body, s3_key) = if gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&file_contents)?;
            (encoder.finish()?, format!("{}.gz", file_name))
        } else {
            (file_contents, file_name.to_string())
        };

        client
            .put_object()
            .bucket(bucket)
            .key(&s3_key)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("Failed to upload {}", s3_key))?;

        upload_count += 1;
    }

    info!(upload_count, "S3 upload complete");
    Ok(())
}
