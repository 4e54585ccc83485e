//! Crawl loop: batches keyword groups, retries failed fetches, decodes and
//! saves each batch.
//!
//! The decode/materialize core stays pure; everything that sleeps, retries or
//! touches the disk lives here.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RegionTable;
use crate::decode::KeyTable;
use crate::output::write_table;
use crate::series::{DateRange, Series, materialize};
use crate::services::index_api::{
    EncryptedBatch, IndexApi, IndexQuery, KeywordGroup, MAX_GROUPS_PER_REQUEST,
};
use crate::table::join;

/// Region code that expands to every region in the [`RegionTable`].
pub const ALL_REGIONS: &str = "999";

fn jitter(min: Duration, max: Duration) -> Duration {
    let lo = min.as_millis() as u64;
    let hi = max.as_millis().max(min.as_millis()) as u64;
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

/// How many times a request is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        jitter(self.backoff_min, self.backoff_max)
    }
}

/// Pause between consecutive successful requests.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub interval: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Pacing {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            jitter_min: Duration::from_millis(500),
            jitter_max: Duration::from_millis(1500),
        }
    }

    pub fn delay(&self) -> Duration {
        self.interval + jitter(self.jitter_min, self.jitter_max)
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    /// The service does not know some of the words; retrying will not help.
    #[error("unknown keywords: {}", words.join(", "))]
    NotFound { words: Vec<String> },

    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Decoded series of one request.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub region: String,
    pub series: Vec<Series>,
    /// Where the joined table was written, if it was saved.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct RequestFailure {
    pub region: String,
    pub keywords: String,
    pub error: String,
}

/// Everything a crawl produced, keyed by region code.
#[derive(Debug, Default, Serialize)]
pub struct CrawlReport {
    pub results: BTreeMap<String, Vec<BatchResult>>,
    pub failures: Vec<RequestFailure>,
}

/// Output file name of one batch: `<groups>_<start>-<end>_<region>.csv`.
pub fn output_file_name(groups: &[KeywordGroup], range: &DateRange, region_name: &str) -> String {
    let names = groups
        .iter()
        .map(|g| g.words().join(" "))
        .collect::<Vec<_>>()
        .join("_");
    format!(
        "{}_{}-{}_{}.csv",
        names,
        range.start.format("%Y-%m-%d"),
        range.end.format("%Y-%m-%d"),
        region_name
    )
}

/// Decrypts every payload of a batch and dates it.
pub fn decode_batch(
    groups: &[KeywordGroup],
    range: &DateRange,
    batch: &EncryptedBatch,
) -> Result<Vec<Series>> {
    if batch.payloads.len() != groups.len() {
        bail!(
            "request {} returned {} payloads for {} keyword groups",
            batch.unique_id,
            batch.payloads.len(),
            groups.len()
        );
    }

    let key = KeyTable::parse(&batch.key_table)?;
    groups
        .iter()
        .zip(&batch.payloads)
        .map(|(group, payload)| {
            let decoded = key.decode(payload)?;
            Ok(materialize(range, &decoded, group.label())?)
        })
        .collect()
}

enum Attempt {
    Decoded(Vec<Series>),
    Missing(Vec<String>),
}

pub struct Crawler<A> {
    api: A,
    retry: RetryPolicy,
    pacing: Pacing,
    output_dir: Option<PathBuf>,
}

impl<A: IndexApi> Crawler<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            retry: RetryPolicy::default(),
            pacing: Pacing::default(),
            output_dir: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Save each batch as a CSV table under `dir`.
    pub fn saving_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    async fn attempt(&self, query: &IndexQuery) -> Result<Attempt> {
        let missing = self.api.missing_words(&query.groups).await?;
        if !missing.is_empty() {
            return Ok(Attempt::Missing(missing));
        }

        let batch = self.api.fetch_key_and_payload(query).await?;
        debug!(
            unique_id = %batch.unique_id,
            payloads = batch.payloads.len(),
            "Encrypted batch received"
        );
        Ok(Attempt::Decoded(decode_batch(&query.groups, &query.range, &batch)?))
    }

    /// Runs one query under the retry policy.
    ///
    /// Any failure other than unknown keywords re-fetches a fresh key and
    /// payload on the next attempt.
    #[tracing::instrument(
        skip_all,
        fields(region = %query.region, keywords = %keyword_label(&query.groups))
    )]
    pub async fn crawl_request(
        &self,
        query: &IndexQuery,
        region_name: &str,
    ) -> std::result::Result<BatchResult, CrawlError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.attempt(query).await {
                Ok(Attempt::Decoded(series)) => {
                    let file = self.save(query, region_name, &series);
                    return Ok(BatchResult {
                        region: query.region.clone(),
                        series,
                        file,
                    });
                }
                Ok(Attempt::Missing(words)) => {
                    warn!(?words, "Keywords not known to the index service");
                    return Err(CrawlError::NotFound { words });
                }
                Err(e) => {
                    warn!(attempt, max_attempts = attempts, error = %e, "Index request failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.backoff()).await;
                    }
                }
            }
        }

        Err(CrawlError::Exhausted {
            attempts,
            last_error,
        })
    }

    fn save(&self, query: &IndexQuery, region_name: &str, series: &[Series]) -> Option<PathBuf> {
        let dir = self.output_dir.as_deref()?;
        let path = dir.join(output_file_name(&query.groups, &query.range, region_name));

        match join(series)
            .map_err(anyhow::Error::from)
            .and_then(|table| write_table(&path, &table))
        {
            Ok(()) => {
                info!(path = %path.display(), "Saved batch");
                Some(path)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to save batch");
                None
            }
        }
    }

    /// Crawls `groups` over `range` for `region` (or every region for [`ALL_REGIONS`]).
    ///
    /// Groups are sent in batches of [`MAX_GROUPS_PER_REQUEST`]. A failed
    /// request is recorded and skipped.
    #[tracing::instrument(skip_all, fields(region = %region, groups = groups.len()))]
    pub async fn crawl(
        &self,
        groups: &[KeywordGroup],
        range: DateRange,
        region: &str,
        regions: &RegionTable,
    ) -> CrawlReport {
        let targets: Vec<&str> = if region == ALL_REGIONS {
            regions.codes().collect()
        } else {
            vec![region]
        };

        let mut report = CrawlReport::default();
        let batches: Vec<&[KeywordGroup]> = groups.chunks(MAX_GROUPS_PER_REQUEST).collect();

        for (done, batch) in batches.iter().enumerate() {
            info!(
                done = done * MAX_GROUPS_PER_REQUEST,
                remaining = groups.len() - done * MAX_GROUPS_PER_REQUEST,
                "Crawl progress"
            );

            for &code in &targets {
                let query = IndexQuery {
                    groups: batch.to_vec(),
                    range,
                    region: code.to_string(),
                };
                let region_name = region_display_name(regions, code);

                match self.crawl_request(&query, region_name).await {
                    Ok(result) => {
                        report.results.entry(code.to_string()).or_default().push(result);
                        tokio::time::sleep(self.pacing.delay()).await;
                    }
                    Err(e) => {
                        error!(region = code, error = %e, "Skipping request");
                        report.failures.push(RequestFailure {
                            region: code.to_string(),
                            keywords: keyword_label(batch),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }
}

fn keyword_label(groups: &[KeywordGroup]) -> String {
    crate::services::index_api::word_set(groups)
}

fn region_display_name<'a>(regions: &'a RegionTable, code: &'a str) -> &'a str {
    regions.name(code).unwrap_or_else(|| {
        warn!(region = code, "Region code has no configured name");
        code
    })
}
