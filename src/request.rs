use crate::filter::ZipCode;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Rejected user input. Raised before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please provide a CSV URL")]
    MissingUrl,
    #[error("Please enter at least one zip code")]
    NoZipCodes,
    #[error("'{0}' is not a valid zip code (expected up to 5 digits)")]
    InvalidZip(String),
    #[error("'{0}' is not a valid row count (expected -1 or a non-negative integer)")]
    InvalidRowLimit(String),
}

/// How many data rows to read from the top of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowLimit {
    Unbounded,
    Rows(u64),
}

impl RowLimit {
    /// `-1` means the whole file.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidRowLimit(raw.to_string());
        match raw.trim().parse::<i64>().map_err(|_| invalid())? {
            -1 => Ok(Self::Unbounded),
            n if n >= 0 => Ok(Self::Rows(n as u64)),
            _ => Err(invalid()),
        }
    }

    /// Rows still allowed after `read`; `None` when unbounded.
    pub fn remaining(self, read: u64) -> Option<u64> {
        match self {
            Self::Unbounded => None,
            Self::Rows(limit) => Some(limit.saturating_sub(read)),
        }
    }
}

impl fmt::Display for RowLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("-1"),
            Self::Rows(n) => write!(f, "{n}"),
        }
    }
}

/// A validated load request: where to read, which zips, how far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub url: String,
    pub zips: BTreeSet<ZipCode>,
    pub row_limit: RowLimit,
}

impl LoadRequest {
    pub fn parse<S: AsRef<str>>(
        url: &str,
        zips: &[S],
        rows: &str,
    ) -> Result<Self, ValidationError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        let zips = zips
            .iter()
            .map(|z| ZipCode::parse(z.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if zips.is_empty() {
            return Err(ValidationError::NoZipCodes);
        }
        let row_limit = RowLimit::parse(rows)?;

        Ok(Self {
            url: url.to_string(),
            zips,
            row_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_limit_accepts_minus_one_and_non_negative() {
        assert_eq!(RowLimit::parse("-1"), Ok(RowLimit::Unbounded));
        assert_eq!(RowLimit::parse(" 1000 "), Ok(RowLimit::Rows(1000)));
        assert_eq!(RowLimit::parse("0"), Ok(RowLimit::Rows(0)));
        assert!(RowLimit::parse("-2").is_err());
        assert!(RowLimit::parse("ten").is_err());
        assert_eq!(RowLimit::Unbounded.to_string(), "-1");
    }

    #[test]
    fn remaining_saturates() {
        assert_eq!(RowLimit::Rows(10).remaining(4), Some(6));
        assert_eq!(RowLimit::Rows(10).remaining(12), Some(0));
        assert_eq!(RowLimit::Unbounded.remaining(12), None);
    }

    #[test]
    fn request_validation_happens_in_order() {
        assert_eq!(
            LoadRequest::parse("  ", &["11530"], "-1"),
            Err(ValidationError::MissingUrl)
        );
        assert_eq!(
            LoadRequest::parse("data.csv", &["1153O"], "-1"),
            Err(ValidationError::InvalidZip("1153O".into()))
        );
        assert_eq!(
            LoadRequest::parse::<&str>("data.csv", &[], "-1"),
            Err(ValidationError::NoZipCodes)
        );
        assert_eq!(
            LoadRequest::parse("data.csv", &["11530"], "-5"),
            Err(ValidationError::InvalidRowLimit("-5".into()))
        );
    }

    #[test]
    fn duplicate_zips_collapse_after_padding() {
        let req = LoadRequest::parse("data.csv", &["530", "00530", "11530"], "-1").unwrap();
        assert_eq!(req.zips.len(), 2);
        assert_eq!(req.row_limit, RowLimit::Unbounded);
    }
}
