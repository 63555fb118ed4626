//! Postal-code filtered, fingerprint-cached CSV loading for housing dashboards.
//!
//! - Probe: HEAD (or filesystem metadata) for size and modification time.
//! - Scan: pull-based batches of `csv_async::ByteRecord`, capped by a row limit.
//! - Filter: one pass over the batches serves every requested zip code.
//! - Cache: per-session store keyed by `(mtime, size, zip, row_limit)`.
//!
//! Data shape:
//! - `Resolution { results: zip -> Arc<FilteredResult>, cache_hits, scans, warnings }`
//! - `FilteredResult { rows: Vec<Row>, total_rows_processed }`, date sorting via `dated()`
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod cache;
mod codec;
mod filter;
mod io;
pub mod metrics;
mod probe;
mod request;
mod resolve;
mod scan;
mod table;

pub use crate::cache::{Fingerprint, FilteredResult, ResultCache};
pub use crate::filter::{accumulate, Accumulation, ZipCode};
pub use crate::io::{build_csv_reader, reader_from_path, reader_from_response, CsvMeta};
pub use crate::probe::{is_remote, parse_http_date, MetadataProbe, Probe, ProbeWarning, SourceStamp};
pub use crate::request::{LoadRequest, RowLimit, ValidationError};
pub use crate::resolve::{
    CsvSource, Loader, LoaderConfig, Resolution, ResolveError, SourceOpener, SourceReader,
};
pub use crate::scan::{CsvScanner, Row, Schema, BATCH_SIZE, DATE_COLUMN, POSTAL_CODE_COLUMN};
pub use crate::table::{parse_month, DatedRow, DatedTable, DISPLAY_COLUMNS};

use thiserror::Error;

/// Error type for a failed scan. Aborts the whole resolve call.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("CSV header is empty or unreadable")]
    EmptyHeader,
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("No batch arrived within {0:?}")]
    BatchTimeout(std::time::Duration),
    #[error("HTTP request for {url} failed: {message}")]
    Http { url: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;
