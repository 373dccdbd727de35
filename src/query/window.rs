use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::date_util::{date_key, days_inclusive, parse_iso_date};
use crate::error::{Error, Result};

/// An inclusive date range selected in a dashboard, plus the arithmetic for
/// deriving the comparison window immediately before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::WindowOrder {
                start: date_key(start),
                end: date_key(end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from the ISO-8601 strings a date picker supplies.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_iso_date(start)?, parse_iso_date(end)?)
    }

    /// Number of calendar days covered, inclusive.
    pub fn num_days(&self) -> i64 {
        days_inclusive(self.start, self.end)
    }

    /// Start of the equal-length period preceding this one.
    ///
    /// The period length is computed as `(end - start) - 1 day`, one day short
    /// of the inclusive span. Historical charts were produced with this
    /// arithmetic, so it is kept as-is; changing it would shift every
    /// previous-period overlay by a day.
    pub fn previous_period_start(&self) -> NaiveDate {
        let period_length = self.end - self.start - Duration::days(1);
        self.start - period_length
    }

    /// The comparison window: `[previous_period_start, start - 1]`. Together
    /// with the boundary day that `PeriodPair::align` moves across, it matches
    /// the current window in length.
    ///
    /// For selections of two days or fewer the shortened period length leaves
    /// no previous days: the returned window is empty (end before start,
    /// `num_days() <= 0`) and densifies to nothing.
    pub fn previous(&self) -> DateWindow {
        DateWindow {
            start: self.previous_period_start(),
            end: self.start - Duration::days(1),
        }
    }

    /// The combined range `[previous_period_start, end]`, for queries that
    /// fetch both periods at once and tag each row with its period.
    pub fn combined(&self) -> DateWindow {
        DateWindow {
            start: self.previous_period_start(),
            end: self.end,
        }
    }

    pub fn start_key(&self) -> String {
        date_key(self.start)
    }

    pub fn end_key(&self) -> String {
        date_key(self.end)
    }
}

/// Parameters shared by every dashboard query: the selected window and the
/// organization ids to filter out (e.g. internal test orgs).
#[derive(Debug, Clone, Serialize)]
pub struct QueryParams {
    pub window: DateWindow,
    pub excluded_org_ids: BTreeSet<i64>,
}

impl QueryParams {
    pub fn new(window: DateWindow) -> Self {
        Self {
            window,
            excluded_org_ids: BTreeSet::new(),
        }
    }

    pub fn exclude_orgs(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.excluded_org_ids.extend(ids);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    #[test]
    fn test_parse() {
        let w = DateWindow::parse("2024-01-01", "2024-01-31").unwrap();
        assert_eq!(w.start, d(2024, 1, 1));
        assert_eq!(w.end, d(2024, 1, 31));
        assert_eq!(w.num_days(), 31);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(DateWindow::parse("not-a-date", "2024-01-31").is_err());
        assert!(DateWindow::parse("2024-01-01", "31.01.2024").is_err());
    }

    #[test]
    fn test_new_rejects_reversed_window() {
        assert!(DateWindow::new(d(2024, 2, 1), d(2024, 1, 1)).is_err());
        // A single-day window is fine
        assert!(DateWindow::new(d(2024, 1, 1), d(2024, 1, 1)).is_ok());
    }

    #[test]
    fn test_previous_period_start_is_strictly_earlier() {
        let w = DateWindow::new(d(2024, 3, 10), d(2024, 3, 25)).unwrap();
        assert!(w.previous_period_start() < w.start);
    }

    #[test]
    fn test_previous_period_off_by_one_preserved() {
        // 30-day selection: Jan 1 .. Jan 30. The legacy arithmetic subtracts
        // (end - start) - 1 = 28 days, not the inclusive 30.
        let w = DateWindow::new(d(2024, 1, 1), d(2024, 1, 30)).unwrap();
        assert_eq!(w.previous_period_start(), d(2023, 12, 4));

        let prev = w.previous();
        assert_eq!(prev.start, d(2023, 12, 4));
        assert_eq!(prev.end, d(2023, 12, 31));
        // Previous window has one day fewer than the current; align() moves
        // the current window's first day across to even them out.
        assert_eq!(prev.num_days(), w.num_days() - 2);
    }

    #[test]
    fn test_previous_of_minimal_windows_is_empty() {
        // One- and two-day selections leave the previous window with zero or
        // fewer days under the shortened period length.
        let one_day = DateWindow::new(d(2024, 1, 1), d(2024, 1, 1)).unwrap();
        assert_eq!(one_day.previous().num_days(), -1);

        let two_days = DateWindow::new(d(2024, 1, 1), d(2024, 1, 2)).unwrap();
        assert_eq!(two_days.previous().num_days(), 0);
    }

    #[test]
    fn test_combined_spans_both_periods() {
        let w = DateWindow::new(d(2024, 6, 10), d(2024, 6, 20)).unwrap();
        let c = w.combined();
        assert_eq!(c.start, w.previous_period_start());
        assert_eq!(c.end, w.end);
    }

    #[test]
    fn test_query_params_excluded_orgs_deduplicate() {
        let w = DateWindow::new(d(2024, 1, 1), d(2024, 1, 7)).unwrap();
        let p = QueryParams::new(w).exclude_orgs([3, 1, 3, 2]);
        assert_eq!(p.excluded_org_ids.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
