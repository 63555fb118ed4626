//! Summary figures for a zip's dated table.
//!
//! Everything here works on `(date, value)` series from [`DatedTable::series`];
//! charting is left to the caller.

use crate::table::DatedTable;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

pub const PRICE: &str = "median_listing_price";
pub const DAYS_ON_MARKET: &str = "median_days_on_market";
pub const PRICE_PER_SQFT: &str = "median_listing_price_per_square_foot";
pub const PRICE_PER_SQFT_YY: &str = "median_listing_price_per_square_foot_yy";
pub const SQUARE_FEET: &str = "median_square_feet";

/// Metric columns the dashboard knows how to present, with their labels.
pub const METRICS: [(&str, &str); 5] = [
    (PRICE, "Avg Listing Price"),
    (DAYS_ON_MARKET, "Avg Days on Market"),
    (PRICE_PER_SQFT, "Avg Price per Sq Ft"),
    (PRICE_PER_SQFT_YY, "Avg Price per Sq Ft (YY)"),
    (SQUARE_FEET, "Avg Square Feet"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSummary {
    pub mean: f64,
    /// Percent change of the last point over the one before it.
    pub last_change_pct: Option<f64>,
}

pub fn summarize(series: &[(NaiveDate, f64)]) -> Option<MetricSummary> {
    if series.is_empty() {
        return None;
    }
    let mean = series.iter().map(|(_, v)| v).sum::<f64>() / series.len() as f64;
    let last_change_pct = match series {
        [.., (_, prev), (_, last)] => pct_change(*prev, *last),
        _ => None,
    };
    Some(MetricSummary {
        mean,
        last_change_pct,
    })
}

fn pct_change(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to - from) / from * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSpeed {
    Fast,
    Moderate,
    Slow,
}

impl MarketSpeed {
    pub fn from_days(days: f64) -> Self {
        if days < 30.0 {
            Self::Fast
        } else if days < 60.0 {
            Self::Moderate
        } else {
            Self::Slow
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Fast => "Fast-moving market",
            Self::Moderate => "Moderate market speed",
            Self::Slow => "Slow-moving market",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketInsights {
    /// First-to-last price change in percent.
    pub price_change_pct: Option<f64>,
    pub days_change_pct: Option<f64>,
    pub speed: Option<MarketSpeed>,
}

impl MarketInsights {
    pub fn appreciating(&self) -> Option<bool> {
        self.price_change_pct.map(|pct| pct > 0.0)
    }
}

/// Needs at least two dated points per metric to say anything.
pub fn insights(table: &DatedTable) -> MarketInsights {
    let span = |column: &str| {
        let series = table.series(column);
        match series.as_slice() {
            [(_, first), .., (_, last)] => Some((*first, *last)),
            _ => None,
        }
    };
    let price = span(PRICE);
    let days = span(DAYS_ON_MARKET);

    MarketInsights {
        price_change_pct: price.and_then(|(first, last)| pct_change(first, last)),
        days_change_pct: days.and_then(|(first, last)| pct_change(first, last)),
        speed: days.map(|(_, last)| MarketSpeed::from_days(last)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    /// Sign of a year-over-year value: negative is `Below`.
    pub fn of(value: f64) -> Self {
        Self::relative_to(value, 0.0)
    }

    pub fn relative_to(value: f64, baseline: f64) -> Self {
        if value < baseline {
            Self::Below
        } else {
            Self::Above
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketedPoint<K> {
    pub date: NaiveDate,
    pub value: f64,
    pub bucket: K,
    pub bucket_mean: f64,
    pub direction: Direction,
}

/// Groups points with `bucket_of`, then classifies each point against the
/// mean of its own group. Input order is kept.
pub fn compare_to_group_mean<K, F>(
    series: &[(NaiveDate, f64)],
    bucket_of: F,
) -> Vec<BucketedPoint<K>>
where
    K: Ord + Copy,
    F: Fn(NaiveDate) -> K,
{
    let mut sums: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    for &(date, value) in series {
        let entry = sums.entry(bucket_of(date)).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    series
        .iter()
        .map(|&(date, value)| {
            let bucket = bucket_of(date);
            let (sum, count) = sums[&bucket];
            let bucket_mean = sum / count as f64;
            BucketedPoint {
                date,
                value,
                bucket,
                bucket_mean,
                direction: Direction::relative_to(value, bucket_mean),
            }
        })
        .collect()
}

/// Yearly buckets, the usual grouping for monthly housing data.
pub fn by_year(date: NaiveDate) -> i32 {
    date.year()
}
