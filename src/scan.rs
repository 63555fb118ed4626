use crate::request::RowLimit;
use crate::{IngestError, IngestResult};
use csv_async::{AsyncReader, AsyncReaderBuilder, ByteRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::debug;

/// Upper bound on rows held by one batch, whatever the source size.
pub const BATCH_SIZE: usize = 10_000;

pub const POSTAL_CODE_COLUMN: &str = "postal_code";
pub const DATE_COLUMN: &str = "month_date_yyyymm";

/// Column layout of a scanned source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    headers: Vec<String>,
    key_idx: Option<usize>,
    date_idx: Option<usize>,
}

impl Schema {
    pub fn new(headers: Vec<String>) -> Self {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let key_idx = find(POSTAL_CODE_COLUMN);
        let date_idx = find(DATE_COLUMN);
        Self {
            headers,
            key_idx,
            date_idx,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Index of `postal_code`, if the source has one.
    pub fn key_index(&self) -> Option<usize> {
        self.key_idx
    }

    /// Index of `month_date_yyyymm`, if the source has one.
    pub fn date_index(&self) -> Option<usize> {
        self.date_idx
    }
}

/// One source row, decoded to text. Values are passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    schema: Arc<Schema>,
    fields: Vec<String>,
}

impl Row {
    pub(crate) fn from_record(schema: &Arc<Schema>, record: &ByteRecord) -> Self {
        Self {
            schema: Arc::clone(schema),
            fields: record
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.schema
            .position(column)
            .and_then(|idx| self.fields.get(idx))
            .map(String::as_str)
    }

    pub fn key(&self) -> Option<&str> {
        self.schema
            .key_index()
            .and_then(|idx| self.fields.get(idx))
            .map(String::as_str)
    }

    pub fn date(&self) -> Option<&str> {
        self.schema
            .date_index()
            .and_then(|idx| self.fields.get(idx))
            .map(String::as_str)
    }

    /// `(column, value)` pairs in source column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.schema
            .headers()
            .iter()
            .map(String::as_str)
            .zip(self.fields.iter().map(String::as_str))
    }
}

/// Pull-based reader yielding bounded batches in source order.
///
/// Consumed once: after `next_batch` returns `None` the scanner stays exhausted.
pub struct CsvScanner<R> {
    reader: AsyncReader<R>,
    schema: Arc<Schema>,
    batch_size: usize,
    row_limit: RowLimit,
    batch_timeout: Option<Duration>,
    rows_read: u64,
    exhausted: bool,
}

impl<R> CsvScanner<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Reads the header row. An empty or undecodable header fails the scan.
    pub async fn open(
        reader: R,
        row_limit: RowLimit,
        batch_size: usize,
        batch_timeout: Option<Duration>,
    ) -> IngestResult<Self> {
        let mut reader = AsyncReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            // Larger internal buffer reduces syscalls and allocator churn
            .buffer_capacity(1 << 20) // 1 MiB
            .create_reader(reader);

        let headers = match batch_timeout {
            Some(limit) => tokio::time::timeout(limit, reader.headers())
                .await
                .map_err(|_| IngestError::BatchTimeout(limit))??
                .clone(),
            None => reader.headers().await?.clone(),
        };
        let headers: Vec<String> = headers
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(IngestError::EmptyHeader);
        }

        Ok(Self {
            reader,
            schema: Arc::new(Schema::new(headers)),
            batch_size: batch_size.max(1),
            row_limit,
            batch_timeout,
            rows_read: 0,
            exhausted: false,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Rows handed out so far; never exceeds the row limit.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Next batch, truncated so the cumulative count never passes the row limit.
    pub async fn next_batch(&mut self) -> IngestResult<Option<Vec<ByteRecord>>> {
        if self.exhausted {
            return Ok(None);
        }
        let want = match self.row_limit.remaining(self.rows_read) {
            Some(0) => {
                self.exhausted = true;
                return Ok(None);
            }
            Some(left) => usize::try_from(left).map_or(self.batch_size, |l| l.min(self.batch_size)),
            None => self.batch_size,
        };

        let batch = match self.batch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.fill(want))
                .await
                .map_err(|_| IngestError::BatchTimeout(limit))??,
            None => self.fill(want).await?,
        };

        if batch.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        self.rows_read += batch.len() as u64;
        debug!(rows = batch.len(), total = self.rows_read, "batch read");
        Ok(Some(batch))
    }

    async fn fill(&mut self, want: usize) -> IngestResult<Vec<ByteRecord>> {
        let mut batch = Vec::with_capacity(want);
        while batch.len() < want {
            let mut record = ByteRecord::new();
            if !self.reader.read_byte_record(&mut record).await? {
                self.exhausted = true;
                break;
            }
            batch.push(record);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn source(rows: usize) -> Cursor<Vec<u8>> {
        let mut csv = String::from("month_date_yyyymm,postal_code,median_listing_price\n");
        for i in 0..rows {
            csv.push_str(&format!("2023{:02},{:05},{}\n", i % 12 + 1, i, 100_000 + i));
        }
        Cursor::new(csv.into_bytes())
    }

    async fn drain(scanner: &mut CsvScanner<Cursor<Vec<u8>>>) -> Vec<usize> {
        let mut sizes = Vec::new();
        while let Some(batch) = scanner.next_batch().await.unwrap() {
            sizes.push(batch.len());
        }
        sizes
    }

    #[tokio::test]
    async fn batches_are_bounded_and_in_order() {
        let mut scanner = CsvScanner::open(source(25), RowLimit::Unbounded, 10, None)
            .await
            .unwrap();
        assert_eq!(scanner.schema().key_index(), Some(1));
        assert_eq!(scanner.schema().date_index(), Some(0));

        let first = scanner.next_batch().await.unwrap().unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].get(1), Some(&b"00000"[..]));
        assert_eq!(drain(&mut scanner).await, vec![10, 5]);
        assert_eq!(scanner.rows_read(), 25);
        assert!(scanner.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn row_limit_truncates_final_batch() {
        let mut scanner = CsvScanner::open(source(25), RowLimit::Rows(12), 10, None)
            .await
            .unwrap();
        assert_eq!(drain(&mut scanner).await, vec![10, 2]);
        assert_eq!(scanner.rows_read(), 12);
    }

    #[tokio::test]
    async fn zero_limit_yields_nothing() {
        let mut scanner = CsvScanner::open(source(5), RowLimit::Rows(0), 10, None)
            .await
            .unwrap();
        assert!(drain(&mut scanner).await.is_empty());
        assert_eq!(scanner.rows_read(), 0);
    }

    #[tokio::test]
    async fn empty_source_is_rejected() {
        let err = CsvScanner::open(Cursor::new(Vec::new()), RowLimit::Unbounded, 10, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IngestError::EmptyHeader));
    }

    #[tokio::test]
    async fn row_lookup_by_column_name() {
        let mut scanner = CsvScanner::open(source(1), RowLimit::Unbounded, 10, None)
            .await
            .unwrap();
        let batch = scanner.next_batch().await.unwrap().unwrap();
        let row = Row::from_record(scanner.schema(), &batch[0]);
        assert_eq!(row.get("median_listing_price"), Some("100000"));
        assert_eq!(row.key(), Some("00000"));
        assert_eq!(row.date(), Some("202301"));
        assert_eq!(row.get("median_square_feet"), None);
        assert_eq!(row.iter().count(), 3);
    }
}
