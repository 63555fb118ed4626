use crate::request::ValidationError;
use crate::scan::{CsvScanner, Row, Schema};
use crate::IngestResult;
use std::borrow::{Borrow, Cow};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncRead;

const ZIP_WIDTH: usize = 5;

/// A postal code zero-padded to five digits, so "530" and "00530" are one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZipCode(String);

impl ZipCode {
    /// User input: 1 to 5 ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > ZIP_WIDTH
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ValidationError::InvalidZip(raw.to_string()));
        }
        Ok(Self(zero_pad(trimmed).into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ZipCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZipCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source values get the same padding as user input. All-digit values are
/// read as numbers first, so "000501" and "501" both become "00501".
/// Anything else of five or more characters passes as-is.
fn zero_pad(raw: &str) -> Cow<'_, str> {
    let mut raw = raw.trim();
    if raw.len() > ZIP_WIDTH && raw.bytes().all(|b| b.is_ascii_digit()) {
        let digits = raw.trim_start_matches('0');
        raw = if digits.is_empty() { "0" } else { digits };
    }
    if raw.len() >= ZIP_WIDTH {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(format!("{raw:0>ZIP_WIDTH$}"))
    }
}

/// Per-zip matches of one scan plus the shared row count.
#[derive(Debug, Clone, Default)]
pub struct Accumulation {
    pub rows: BTreeMap<ZipCode, Vec<Row>>,
    pub total_rows_processed: u64,
    pub schema: Option<Arc<Schema>>,
}

/// Drains `scanner` once, routing each row to the target it matches.
///
/// Every target is served by the same pass; an empty target set returns
/// without reading anything.
pub async fn accumulate<R>(
    scanner: &mut CsvScanner<R>,
    targets: &BTreeSet<ZipCode>,
) -> IngestResult<Accumulation>
where
    R: AsyncRead + Unpin + Send,
{
    if targets.is_empty() {
        return Ok(Accumulation::default());
    }

    let schema = Arc::clone(scanner.schema());
    let key_idx = schema.key_index();
    let mut hits: HashMap<&str, Vec<Row>> =
        targets.iter().map(|z| (z.as_str(), Vec::new())).collect();

    while let Some(batch) = scanner.next_batch().await? {
        // No key column: rows are still counted, nothing can match.
        let Some(idx) = key_idx else { continue };
        for record in &batch {
            let Some(raw) = record.get(idx).and_then(|f| std::str::from_utf8(f).ok()) else {
                continue;
            };
            if let Some(rows) = hits.get_mut(&*zero_pad(raw)) {
                rows.push(Row::from_record(&schema, record));
            }
        }
    }

    let rows = targets
        .iter()
        .map(|zip| {
            let matched = hits.remove(zip.as_str()).unwrap_or_default();
            (zip.clone(), matched)
        })
        .collect();

    Ok(Accumulation {
        rows,
        total_rows_processed: scanner.rows_read(),
        schema: Some(schema),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RowLimit;
    use std::io::Cursor;

    fn zips(raw: &[&str]) -> BTreeSet<ZipCode> {
        raw.iter().map(|z| ZipCode::parse(z).unwrap()).collect()
    }

    async fn scanner(csv: &str, limit: RowLimit) -> CsvScanner<Cursor<Vec<u8>>> {
        CsvScanner::open(Cursor::new(csv.as_bytes().to_vec()), limit, 2, None)
            .await
            .unwrap()
    }

    #[test]
    fn zip_parse_pads_and_rejects() {
        assert_eq!(ZipCode::parse("530").unwrap().as_str(), "00530");
        assert_eq!(ZipCode::parse(" 11530 ").unwrap().as_str(), "11530");
        assert!(ZipCode::parse("").is_err());
        assert!(ZipCode::parse("123456").is_err());
        assert!(ZipCode::parse("12a45").is_err());
        assert_eq!(zero_pad("501"), "00501");
        assert_eq!(zero_pad("10001-1234"), "10001-1234");
        assert_eq!(zero_pad("000501"), "00501");
        assert_eq!(zero_pad("000000"), "00000");
        assert_eq!(zero_pad("123456"), "123456");
    }

    #[tokio::test]
    async fn numeric_source_keys_match_regardless_of_leading_zeros() {
        let csv = "postal_code,month_date_yyyymm\n\
                   501,202301\n\
                   00501,202302\n\
                   000501,202303\n\
                   501.0,202304\n\
                   \"  501 \",202305\n";
        let mut scan = scanner(csv, RowLimit::Unbounded).await;
        let acc = accumulate(&mut scan, &zips(&["501"])).await.unwrap();
        let months: Vec<_> = acc.rows[&ZipCode::parse("501").unwrap()]
            .iter()
            .map(|r| r.date().unwrap().to_string())
            .collect();
        assert_eq!(months, vec!["202301", "202302", "202303", "202305"]);
    }

    #[tokio::test]
    async fn one_pass_serves_all_targets_in_source_order() {
        let csv = "postal_code,month_date_yyyymm,v\n\
                   501,202302,a\n\
                   10001,202301,b\n\
                   00501,202301,c\n\
                   60601,202301,d\n\
                   10001,202302,e\n";
        let mut scan = scanner(csv, RowLimit::Unbounded).await;
        let acc = accumulate(&mut scan, &zips(&["501", "10001", "99999"]))
            .await
            .unwrap();

        let values = |zip: &str| -> Vec<String> {
            acc.rows[&ZipCode::parse(zip).unwrap()]
                .iter()
                .map(|r| r.get("v").unwrap().to_string())
                .collect()
        };
        assert_eq!(values("00501"), vec!["a", "c"]);
        assert_eq!(values("10001"), vec!["b", "e"]);
        assert!(values("99999").is_empty());
        assert_eq!(acc.total_rows_processed, 5);
    }

    #[tokio::test]
    async fn missing_key_column_matches_nothing_but_counts() {
        let csv = "zip,month_date_yyyymm\n00501,202301\n00501,202302\n";
        let mut scan = scanner(csv, RowLimit::Unbounded).await;
        let acc = accumulate(&mut scan, &zips(&["00501"])).await.unwrap();
        assert!(acc.rows[&ZipCode::parse("00501").unwrap()].is_empty());
        assert_eq!(acc.total_rows_processed, 2);
    }

    #[tokio::test]
    async fn empty_targets_short_circuit() {
        let csv = "postal_code\n00501\n00502\n";
        let mut scan = scanner(csv, RowLimit::Unbounded).await;
        let acc = accumulate(&mut scan, &BTreeSet::new()).await.unwrap();
        assert_eq!(acc.total_rows_processed, 0);
        assert!(acc.rows.is_empty());
        assert_eq!(scan.rows_read(), 0);
    }

    #[tokio::test]
    async fn limit_stops_matching_and_counting() {
        let csv = "postal_code\n00501\n00501\n00501\n00501\n";
        let mut scan = scanner(csv, RowLimit::Rows(3)).await;
        let acc = accumulate(&mut scan, &zips(&["00501"])).await.unwrap();
        assert_eq!(acc.rows[&ZipCode::parse("00501").unwrap()].len(), 3);
        assert_eq!(acc.total_rows_processed, 3);
    }
}
