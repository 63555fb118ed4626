use crate::cache::FilteredResult;
use crate::scan::{Row, DATE_COLUMN};
use crate::{IngestError, IngestResult};
use chrono::NaiveDate;
use tracing::warn;

/// Columns shown in the filtered-data table, in display order.
pub const DISPLAY_COLUMNS: [&str; 5] = [
    "month_date_yyyymm",
    "median_listing_price",
    "median_days_on_market",
    "median_listing_price_per_square_foot",
    "median_listing_price_per_square_foot_yy",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedRow {
    pub date: NaiveDate,
    pub row: Row,
}

/// Rows of one zip ordered by month. Rows of the same month keep source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatedTable {
    pub rows: Vec<DatedRow>,
    /// Rows dropped because their month could not be parsed.
    pub skipped: usize,
}

/// `YYYYMM` to the first day of that month.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Numeric exports sometimes carry a trailing ".0".
    let raw = raw.strip_suffix(".0").unwrap_or(raw);
    if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year = raw[..4].parse().ok()?;
    let month = raw[4..].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

impl FilteredResult {
    /// Date-sorted view of the matches.
    pub fn dated(&self) -> IngestResult<DatedTable> {
        if self.rows.is_empty() {
            return Ok(DatedTable::default());
        }
        let has_dates = self
            .schema
            .as_ref()
            .is_some_and(|s| s.date_index().is_some());
        if !has_dates {
            return Err(IngestError::MissingColumn(DATE_COLUMN.to_string()));
        }

        let mut table = DatedTable::default();
        for row in &self.rows {
            match row.date().and_then(parse_month) {
                Some(date) => table.rows.push(DatedRow {
                    date,
                    row: row.clone(),
                }),
                None => {
                    warn!(
                        zip = %self.zip,
                        value = row.date().unwrap_or(""),
                        "skipping row with malformed month"
                    );
                    table.skipped += 1;
                }
            }
        }
        // `sort_by_key` is stable.
        table.rows.sort_by_key(|r| r.date);
        Ok(table)
    }
}

impl DatedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Display columns that the source actually has.
    pub fn display_columns(&self) -> Vec<&'static str> {
        let Some(first) = self.rows.first() else {
            return Vec::new();
        };
        DISPLAY_COLUMNS
            .iter()
            .copied()
            .filter(|c| first.row.get(c).is_some())
            .collect()
    }

    /// Numeric points of one metric column. Blank and non-numeric cells are left out.
    pub fn series(&self, column: &str) -> Vec<(NaiveDate, f64)> {
        self.rows
            .iter()
            .filter_map(|r| {
                let value = r.row.get(column)?.trim().parse::<f64>().ok()?;
                value.is_finite().then_some((r.date, value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ZipCode;
    use crate::scan::Schema;
    use csv_async::ByteRecord;
    use std::sync::Arc;

    fn result(headers: &[&str], rows: &[&[&str]]) -> FilteredResult {
        let schema = Arc::new(Schema::new(headers.iter().map(|h| h.to_string()).collect()));
        FilteredResult {
            zip: ZipCode::parse("00501").unwrap(),
            rows: rows
                .iter()
                .map(|fields| {
                    let mut record = ByteRecord::new();
                    for field in fields.iter() {
                        record.push_field(field.as_bytes());
                    }
                    Row::from_record(&schema, &record)
                })
                .collect(),
            schema: Some(schema),
            total_rows_processed: rows.len() as u64,
        }
    }

    #[test]
    fn months_parse_to_first_day() {
        assert_eq!(parse_month("202302"), NaiveDate::from_ymd_opt(2023, 2, 1));
        assert_eq!(parse_month("202302.0"), NaiveDate::from_ymd_opt(2023, 2, 1));
        assert_eq!(parse_month("202313"), None);
        assert_eq!(parse_month("2023-02"), None);
        assert_eq!(parse_month(""), None);
    }

    #[test]
    fn sorts_by_date_and_skips_bad_months() {
        let res = result(
            &["postal_code", "month_date_yyyymm", "median_listing_price"],
            &[
                &["00501", "202302", "200"],
                &["00501", "oops", "0"],
                &["00501", "202301", "100"],
                &["00501", "202301", "101"],
            ],
        );
        let table = res.dated().unwrap();
        assert_eq!(table.skipped, 1);
        let prices: Vec<_> = table
            .series("median_listing_price")
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(prices, vec![100.0, 101.0, 200.0]);
        assert_eq!(table.display_columns(), vec!["month_date_yyyymm", "median_listing_price"]);
    }

    #[test]
    fn missing_date_column_is_an_error_only_with_rows() {
        let res = result(&["postal_code"], &[&["00501"]]);
        assert!(matches!(res.dated(), Err(IngestError::MissingColumn(_))));

        let empty = result(&["postal_code"], &[]);
        assert!(empty.dated().unwrap().is_empty());
    }
}
