use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use reqwest::header::{HeaderName, CONTENT_LENGTH, LAST_MODIFIED};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Size and modification time of a source, in bytes and Unix seconds.
/// Zero means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceStamp {
    pub size: u64,
    pub modified: u64,
}

impl SourceStamp {
    pub const UNKNOWN: Self = Self {
        size: 0,
        modified: 0,
    };
}

/// Metadata could not be read; results may come from a stale cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not get file info for {url}: {message}")]
pub struct ProbeWarning {
    pub url: String,
    pub message: String,
}

/// Outcome of a probe. Never an error: unknown fields fall back to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub stamp: SourceStamp,
    pub warning: Option<ProbeWarning>,
}

impl Probe {
    pub fn ok(stamp: SourceStamp) -> Self {
        Self {
            stamp,
            warning: None,
        }
    }

    pub fn degraded(url: &str, message: impl Into<String>) -> Self {
        let warning = ProbeWarning {
            url: url.to_string(),
            message: message.into(),
        };
        warn!("{warning}");
        Self {
            stamp: SourceStamp::UNKNOWN,
            warning: Some(warning),
        }
    }
}

/// Metadata-only lookup used to fingerprint a source.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    async fn probe(&self, url: &str) -> Probe;
}

pub fn is_remote(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Parses an HTTP-date (IMF-fixdate, or asctime) into Unix seconds.
pub fn parse_http_date(value: &str) -> Option<u64> {
    let value = value.trim();
    let seconds = DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.timestamp())
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y")
                .map(|dt| dt.and_utc().timestamp())
        })
        .ok()?;
    u64::try_from(seconds).ok()
}

/// HEAD request; the body is never fetched.
pub(crate) async fn probe_remote(client: &reqwest::Client, url: &str, timeout: Duration) -> Probe {
    let resp = match client.head(url).timeout(timeout).send().await {
        Ok(resp) => resp,
        Err(err) => return Probe::degraded(url, err.to_string()),
    };
    let resp = match resp.error_for_status() {
        Ok(resp) => resp,
        Err(err) => return Probe::degraded(url, err.to_string()),
    };

    let header = |name: HeaderName| resp.headers().get(name).and_then(|v| v.to_str().ok());
    let size = header(CONTENT_LENGTH)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let Some(modified) = header(LAST_MODIFIED).and_then(parse_http_date) else {
        let mut probe = Probe::degraded(url, "missing or unparsable Last-Modified header");
        probe.stamp.size = size;
        return probe;
    };

    debug!(url, size, modified, "probed remote source");
    Probe::ok(SourceStamp { size, modified })
}

pub(crate) async fn probe_local(path: &str) -> Probe {
    let meta = match tokio::fs::metadata(Path::new(path)).await {
        Ok(meta) => meta,
        Err(err) => return Probe::degraded(path, err.to_string()),
    };
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());

    debug!(path, size = meta.len(), modified, "probed local source");
    Probe::ok(SourceStamp {
        size: meta.len(),
        modified,
    })
}
