pub mod align;

pub use align::PeriodPair;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::query::DateWindow;

/// One (day, value) point of a daily time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyBucket {
    pub day: NaiveDate,
    pub value: i64,
}

impl DailyBucket {
    pub fn new(day: NaiveDate, value: i64) -> Self {
        Self { day, value }
    }
}

/// Fill a sparse per-day series so that every calendar day of `window` has
/// exactly one bucket. Days absent from `sparse` get `default`.
///
/// Matching is by exact date equality; the row source is expected to have
/// truncated timestamps to days already. Output is ordered ascending, one
/// bucket per day, and running the function on its own output is a no-op.
/// An empty window (end before start, as `DateWindow::previous` produces for
/// minimal selections) yields no buckets.
pub fn densify(sparse: &[DailyBucket], window: DateWindow, default: i64) -> Vec<DailyBucket> {
    let mut out = Vec::with_capacity(window.num_days().max(0) as usize);
    let mut day = window.start;
    while day <= window.end {
        let value = sparse
            .iter()
            .find(|b| b.day == day)
            .map(|b| b.value)
            .unwrap_or(default);
        out.push(DailyBucket::new(day, value));
        day += Duration::days(1);
    }
    out
}

/// Index-keyed counterpart of `densify` for axes that are not calendar dates
/// (e.g. "day 1..=14 of the trial"): returns one value per index of
/// `first..=last`, taking values from `sparse` `(index, value)` pairs and
/// `default` elsewhere.
pub fn densify_indexed(sparse: &[(i64, i64)], first: i64, last: i64, default: i64) -> Vec<i64> {
    (first..=last)
        .map(|idx| {
            sparse
                .iter()
                .find(|(i, _)| *i == idx)
                .map(|(_, v)| *v)
                .unwrap_or(default)
        })
        .collect()
}
