use crate::filter::ZipCode;
use crate::probe::SourceStamp;
use crate::request::RowLimit;
use crate::scan::{Row, Schema};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity of one zip's filtered result. The URL is not part of it, so the
/// same file served from two URLs shares entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub modified: u64,
    pub size: u64,
    pub zip: ZipCode,
    pub row_limit: RowLimit,
}

impl Fingerprint {
    pub fn new(stamp: SourceStamp, zip: &ZipCode, row_limit: RowLimit) -> Self {
        Self {
            modified: stamp.modified,
            size: stamp.size,
            zip: zip.clone(),
            row_limit,
        }
    }
}

/// Rows matching one zip, in source order, plus the row count of the scan
/// that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredResult {
    pub zip: ZipCode,
    pub schema: Option<Arc<Schema>>,
    pub rows: Vec<Row>,
    pub total_rows_processed: u64,
}

impl FilteredResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Session-scoped store of filtered results. Entries are replaced whole and
/// never expire; a changed source simply produces a different fingerprint.
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: HashMap<Fingerprint, Arc<FilteredResult>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Arc<FilteredResult>> {
        self.entries.get(fingerprint).cloned()
    }

    pub fn store(&mut self, fingerprint: Fingerprint, result: Arc<FilteredResult>) {
        self.entries.insert(fingerprint, result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(zip: &ZipCode, total: u64) -> Arc<FilteredResult> {
        Arc::new(FilteredResult {
            zip: zip.clone(),
            schema: None,
            rows: Vec::new(),
            total_rows_processed: total,
        })
    }

    #[test]
    fn every_field_takes_part_in_identity() {
        let zip = ZipCode::parse("11530").unwrap();
        let stamp = SourceStamp { size: 10, modified: 20 };
        let base = Fingerprint::new(stamp, &zip, RowLimit::Unbounded);

        let mut cache = ResultCache::new();
        cache.store(base.clone(), result(&zip, 7));
        assert_eq!(cache.lookup(&base).unwrap().total_rows_processed, 7);

        let variants = [
            Fingerprint { size: 11, ..base.clone() },
            Fingerprint { modified: 21, ..base.clone() },
            Fingerprint { zip: ZipCode::parse("11531").unwrap(), ..base.clone() },
            Fingerprint { row_limit: RowLimit::Rows(100), ..base.clone() },
        ];
        for fp in &variants {
            assert!(cache.lookup(fp).is_none(), "{fp:?} should miss");
        }
    }

    #[test]
    fn store_overwrites_same_fingerprint() {
        let zip = ZipCode::parse("530").unwrap();
        let fp = Fingerprint::new(SourceStamp::UNKNOWN, &zip, RowLimit::Rows(5));
        let mut cache = ResultCache::new();
        cache.store(fp.clone(), result(&zip, 1));
        cache.store(fp.clone(), result(&zip, 2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup(&fp).unwrap().total_rows_processed, 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
