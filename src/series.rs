//! Daily time series and date alignment
//!
//! Both inputs (volatility indicator and underlying index) arrive as
//! independent `{date, value}` sequences. They are kept sorted by date with
//! unique dates, and joined on date before the strategy runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One daily observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// An ordered daily series (ascending by date, unique dates)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: String,
    pub points: Vec<TimePoint>,
}

impl Series {
    /// Build a series from unordered points.
    ///
    /// Non-finite values are dropped. Points are sorted by date and, when a
    /// date repeats, the last observation wins.
    pub fn new(id: impl Into<String>, points: impl IntoIterator<Item = TimePoint>) -> Self {
        let mut by_date = BTreeMap::new();
        for point in points {
            if point.value.is_finite() {
                by_date.insert(point.date, point.value);
            }
        }

        Self {
            id: id.into(),
            points: by_date
                .into_iter()
                .map(|(date, value)| TimePoint { date, value })
                .collect(),
        }
    }

    /// Build a series from raw `(date, value)` text pairs.
    ///
    /// Values that are not numeric (FRED reports missing days as ".") are
    /// treated as missing. Unparseable dates are skipped as well. Returns the
    /// series and the number of rows that were dropped.
    pub fn from_raw<'a>(
        id: impl Into<String>,
        rows: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> (Self, usize) {
        let mut dropped = 0usize;
        let mut points = Vec::new();

        for (date, value) in rows {
            match (parse_date(date), parse_value(value)) {
                (Some(date), Some(value)) => points.push(TimePoint { date, value }),
                _ => dropped += 1,
            }
        }

        (Self::new(id, points), dropped)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&TimePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TimePoint> {
        self.points.last()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.first()?.date, self.last()?.date))
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Coerce a raw observation to a finite number, or `None` for missing
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// One date present in both the underlying and indicator series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignedRecord {
    pub date: NaiveDate,
    pub underlying_value: f64,
    pub indicator_value: f64,
}

/// Inner-join two series on date.
///
/// Dates present in only one series are dropped. Both inputs are sorted, so
/// this is a single merge pass and the output is sorted ascending.
pub fn align(underlying: &Series, indicator: &Series) -> Vec<AlignedRecord> {
    let mut aligned = Vec::with_capacity(underlying.len().min(indicator.len()));
    let mut u = underlying.points.iter().peekable();
    let mut i = indicator.points.iter().peekable();

    while let (Some(up), Some(ip)) = (u.peek(), i.peek()) {
        match up.date.cmp(&ip.date) {
            std::cmp::Ordering::Less => {
                u.next();
            }
            std::cmp::Ordering::Greater => {
                i.next();
            }
            std::cmp::Ordering::Equal => {
                aligned.push(AlignedRecord {
                    date: up.date,
                    underlying_value: up.value,
                    indicator_value: ip.value,
                });
                u.next();
                i.next();
            }
        }
    }

    aligned
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashSet;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(day as i64)
    }

    fn series(id: &str, days: &[u32]) -> Series {
        Series::new(
            id,
            days.iter().map(|&day| TimePoint { date: d(day), value: day as f64 + 1.0 }),
        )
    }

    #[test]
    fn test_new_sorts_and_dedups() {
        let s = Series::new(
            "X",
            vec![
                TimePoint { date: d(3), value: 3.0 },
                TimePoint { date: d(1), value: 1.0 },
                TimePoint { date: d(3), value: 30.0 },
                TimePoint { date: d(2), value: f64::NAN },
            ],
        );
        assert_eq!(s.len(), 2);
        assert_eq!(s.points[0].date, d(1));
        assert_eq!(s.points[1].value, 30.0);
    }

    #[test]
    fn test_from_raw_coerces_missing() {
        let rows = vec![
            ("2024-01-02", "13.20"),
            ("2024-01-03", "."),
            ("2024-01-04", ""),
            ("not-a-date", "14.0"),
            ("2024-01-05", "14.1"),
        ];
        let (s, dropped) = Series::from_raw("VIXCLS", rows);
        assert_eq!(s.len(), 2);
        assert_eq!(dropped, 3);
        assert_eq!(s.values(), vec![13.20, 14.1]);
    }

    #[test]
    fn test_align_drops_symmetric_difference() {
        let a = series("A", &[1, 2, 3, 5, 8]);
        let b = series("B", &[0, 2, 3, 4, 8, 9]);
        let aligned = align(&a, &b);
        let dates: Vec<_> = aligned.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(2), d(3), d(8)]);
    }

    #[test]
    fn test_align_empty_intersection() {
        let a = series("A", &[1, 3, 5]);
        let b = series("B", &[2, 4, 6]);
        assert!(align(&a, &b).is_empty());
        assert!(align(&a, &Series::default()).is_empty());
    }

    #[test]
    fn test_align_random_series_only_keeps_common_dates() {
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let a_days: Vec<u32> = (0..200).filter(|_| rng.gen_bool(0.7)).collect();
            let b_days: Vec<u32> = (0..200).filter(|_| rng.gen_bool(0.7)).collect();
            let a = series("A", &a_days);
            let b = series("B", &b_days);

            let a_set: HashSet<_> = a_days.iter().map(|&x| d(x)).collect();
            let b_set: HashSet<_> = b_days.iter().map(|&x| d(x)).collect();
            let expected = a_set.intersection(&b_set).count();

            let aligned = align(&a, &b);
            assert_eq!(aligned.len(), expected);
            for rec in &aligned {
                assert!(a_set.contains(&rec.date) && b_set.contains(&rec.date));
            }
            assert!(aligned.windows(2).all(|w| w[0].date < w[1].date));
        }
    }
}
