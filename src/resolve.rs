use crate::cache::{Fingerprint, FilteredResult, ResultCache};
use crate::filter::{accumulate, Accumulation, ZipCode};
use crate::io::{reader_from_path, reader_from_response};
use crate::probe::{
    is_remote, probe_local, probe_remote, MetadataProbe, Probe, ProbeWarning, SourceStamp,
};
use crate::request::{LoadRequest, RowLimit};
use crate::scan::{CsvScanner, BATCH_SIZE};
use crate::{IngestError, IngestResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{debug, info};

pub type SourceReader = Box<dyn AsyncRead + Unpin + Send>;

/// Opens a fresh byte stream over the source. Each call is one full read.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, url: &str) -> IngestResult<SourceReader>;
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Rows per batch pulled from the source.
    pub batch_size: usize,
    /// Budget for the metadata probe.
    pub probe_timeout: Duration,
    /// Budget for opening the source and for each batch; `None` waits forever.
    pub batch_timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
            probe_timeout: Duration::from_secs(10),
            batch_timeout: None,
        }
    }
}

/// HTTP(S) URLs through `reqwest`, anything else as a local path.
#[derive(Debug, Clone)]
pub struct CsvSource {
    client: reqwest::Client,
    probe_timeout: Duration,
}

impl CsvSource {
    pub fn new(probe_timeout: Duration) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("housing_ingest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(probe_timeout)
            .build()
            .map_err(|e| IngestError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self::with_client(client, probe_timeout))
    }

    /// Uses a caller-built client (proxy, TLS or pool settings).
    pub fn with_client(client: reqwest::Client, probe_timeout: Duration) -> Self {
        Self {
            client,
            probe_timeout,
        }
    }
}

#[async_trait]
impl MetadataProbe for CsvSource {
    async fn probe(&self, url: &str) -> Probe {
        if is_remote(url) {
            probe_remote(&self.client, url, self.probe_timeout).await
        } else {
            probe_local(url).await
        }
    }
}

#[async_trait]
impl SourceOpener for CsvSource {
    async fn open(&self, url: &str) -> IngestResult<SourceReader> {
        if !is_remote(url) {
            let (reader, meta) = reader_from_path(Path::new(url)).await?;
            debug!(path = url, encoding = %meta.content_encoding, "opened local source");
            return Ok(Box::new(reader));
        }

        let http = |e: reqwest::Error| IngestError::Http {
            url: url.to_string(),
            message: e.to_string(),
        };
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(http)?
            .error_for_status()
            .map_err(http)?;
        let (reader, meta) = reader_from_response(resp);
        debug!(
            url,
            content_type = %meta.content_type,
            encoding = %meta.content_encoding,
            charset = meta.charset.name(),
            "opened remote source"
        );
        Ok(Box::new(reader))
    }
}

/// Scan failure. None of `unresolved` were cached by the failed call.
#[derive(Debug, Error)]
#[error(
    "Error reading CSV file (unresolved zip codes: {}): {source}",
    join_zips(.unresolved)
)]
pub struct ResolveError {
    pub unresolved: Vec<ZipCode>,
    pub source: IngestError,
}

fn join_zips(zips: &[ZipCode]) -> String {
    zips.iter().map(ZipCode::as_str).collect::<Vec<_>>().join(", ")
}

/// What one `resolve` call produced and how.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub results: BTreeMap<ZipCode, Arc<FilteredResult>>,
    /// Zips served from the cache without touching the source.
    pub cache_hits: Vec<ZipCode>,
    /// Full reads of the source: 0 or 1.
    pub scans: usize,
    pub stamp: SourceStamp,
    pub warnings: Vec<ProbeWarning>,
}

impl Resolution {
    /// Lookup by raw zip text; "530" finds "00530".
    pub fn get(&self, zip: &str) -> Option<&Arc<FilteredResult>> {
        let zip = ZipCode::parse(zip).ok()?;
        self.results.get(&zip)
    }

    pub fn is_cached(&self, zip: &ZipCode) -> bool {
        self.cache_hits.contains(zip)
    }
}

/// Probes, consults the session cache, and scans at most once per call.
pub struct Loader<S> {
    source: S,
    config: LoaderConfig,
}

impl Loader<CsvSource> {
    pub fn from_config(config: LoaderConfig) -> IngestResult<Self> {
        let source = CsvSource::new(config.probe_timeout)?;
        Ok(Self::new(source, config))
    }
}

impl<S> Loader<S>
where
    S: MetadataProbe + SourceOpener,
{
    pub fn new(source: S, config: LoaderConfig) -> Self {
        Self { source, config }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// One probe, one fingerprint per zip, one scan for all zips that missed.
    pub async fn resolve(
        &self,
        cache: &mut ResultCache,
        request: &LoadRequest,
    ) -> Result<Resolution, ResolveError> {
        let probe = self.source.probe(&request.url).await;
        let stamp = probe.stamp;

        let mut results = BTreeMap::new();
        let mut cache_hits = Vec::new();
        let mut pending = BTreeMap::new();
        for zip in &request.zips {
            let fingerprint = Fingerprint::new(stamp, zip, request.row_limit);
            match cache.lookup(&fingerprint) {
                Some(hit) => {
                    debug!(zip = %zip, "using cached data (file unchanged)");
                    cache_hits.push(zip.clone());
                    results.insert(zip.clone(), hit);
                }
                None => {
                    pending.insert(zip.clone(), fingerprint);
                }
            }
        }

        let mut scans = 0;
        if !pending.is_empty() {
            let targets: BTreeSet<ZipCode> = pending.keys().cloned().collect();
            info!(
                url = %request.url,
                zips = targets.len(),
                row_limit = %request.row_limit,
                "loading fresh data"
            );
            let acc = self
                .scan(&request.url, &targets, request.row_limit)
                .await
                .map_err(|source| ResolveError {
                    unresolved: targets.iter().cloned().collect(),
                    source,
                })?;
            scans = 1;

            let Accumulation {
                mut rows,
                total_rows_processed,
                schema,
            } = acc;
            for (zip, fingerprint) in pending {
                let result = Arc::new(FilteredResult {
                    rows: rows.remove(&zip).unwrap_or_default(),
                    zip: zip.clone(),
                    schema: schema.clone(),
                    total_rows_processed,
                });
                cache.store(fingerprint, Arc::clone(&result));
                results.insert(zip, result);
            }
            info!(total_rows_processed, cached = cache.len(), "data loaded and cached");
        }

        Ok(Resolution {
            results,
            cache_hits,
            scans,
            stamp,
            warnings: probe.warning.into_iter().collect(),
        })
    }

    async fn scan(
        &self,
        url: &str,
        targets: &BTreeSet<ZipCode>,
        row_limit: RowLimit,
    ) -> IngestResult<Accumulation> {
        let reader = match self.config.batch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.source.open(url))
                .await
                .map_err(|_| IngestError::BatchTimeout(limit))??,
            None => self.source.open(url).await?,
        };
        let mut scanner = CsvScanner::open(
            reader,
            row_limit,
            self.config.batch_size,
            self.config.batch_timeout,
        )
        .await?;
        accumulate(&mut scanner, targets).await
    }
}
