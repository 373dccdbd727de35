use serde::Serialize;

use super::{densify, DailyBucket};
use crate::query::DateWindow;

/// A current-period series and its previous-period counterpart, aligned so
/// that index `i` of both sides refers to the same relative day-offset.
///
/// Plotted together, `previous.buckets[i]` is what happened one full period
/// before `current.buckets[i]`, regardless of calendar dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodPair {
    pub current: Vec<DailyBucket>,
    pub previous: Vec<DailyBucket>,
}

impl PeriodPair {
    /// Densify both sparse series over their windows and align them.
    ///
    /// The previous window (`window.previous()`) is one day shorter than the
    /// current one, a consequence of the period-length arithmetic in
    /// `DateWindow::previous_period_start`. To reconcile the boundary, the
    /// first bucket of the current series is moved to the tail of the
    /// previous series. Zero-fill happens per window before the move, so it
    /// never spans the period boundary.
    ///
    /// A single-day selection has no previous period under that arithmetic
    /// and no current day left once the boundary crosses over; both sides
    /// come back empty.
    pub fn align(
        window: DateWindow,
        current_sparse: &[DailyBucket],
        previous_sparse: &[DailyBucket],
    ) -> Self {
        if window.num_days() <= 1 {
            return Self {
                current: Vec::new(),
                previous: Vec::new(),
            };
        }

        let mut current = densify(current_sparse, window, 0);
        let mut previous = densify(previous_sparse, window.previous(), 0);

        if !current.is_empty() {
            let boundary = current.remove(0);
            previous.push(boundary);
        }

        debug_assert_eq!(current.len(), previous.len());
        Self { current, previous }
    }

    /// Split one combined-window series on the current window's start date
    /// and align the halves. Used by queries that fetch both periods at once
    /// with a per-row period flag instead of issuing two statements.
    pub fn from_combined(window: DateWindow, combined_sparse: &[DailyBucket]) -> Self {
        let current: Vec<DailyBucket> = combined_sparse
            .iter()
            .filter(|b| b.day >= window.start)
            .copied()
            .collect();
        let previous: Vec<DailyBucket> = combined_sparse
            .iter()
            .filter(|b| b.day < window.start)
            .copied()
            .collect();
        Self::align(window, &current, &previous)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Relative day offsets (0..n) shared by both sides, for overlay axes.
    pub fn day_offsets(&self) -> Vec<usize> {
        (0..self.current.len()).collect()
    }
}
