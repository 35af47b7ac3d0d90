// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Row budget accounting across the batches of one scan.

use std::fmt;

/// How many more rows a scan may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowBudget {
    Unbounded,
    Bounded(usize),
}

impl fmt::Display for RowBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Bounded(n) => write!(f, "{n}"),
        }
    }
}

/// The part of one batch's surviving rows that a scan keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSlice {
    /// Surviving rows consumed by the offset.
    pub skip: usize,
    /// Surviving rows emitted after the skipped ones.
    pub take: usize,
}

/// Tracks the offset still to skip and the rows still allowed.
///
/// Updates are split in two steps. [`Self::plan`] computes what a batch may
/// contribute without changing anything; [`Self::commit`] applies it once
/// the batch has been built. A batch that fails in between leaves the
/// tracker as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitTracker {
    budget: RowBudget,
    to_skip: usize,
}

impl LimitTracker {
    pub fn new(limit: Option<usize>, offset: Option<usize>) -> Self {
        Self {
            budget: limit.map_or(RowBudget::Unbounded, RowBudget::Bounded),
            to_skip: offset.unwrap_or(0),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    pub fn remaining(&self) -> RowBudget {
        self.budget
    }

    /// Rows of the offset not yet skipped.
    pub fn to_skip(&self) -> usize {
        self.to_skip
    }

    /// True once no further row may be emitted.
    pub fn is_exhausted(&self) -> bool {
        self.budget == RowBudget::Bounded(0)
    }

    /// Split `available` surviving rows into the skipped and emitted parts.
    pub fn plan(&self, available: usize) -> LimitSlice {
        let skip = self.to_skip.min(available);
        let rest = available - skip;
        let take = match self.budget {
            RowBudget::Unbounded => rest,
            RowBudget::Bounded(remaining) => rest.min(remaining),
        };
        LimitSlice { skip, take }
    }

    /// Record that a batch consumed `slice`.
    pub fn commit(&mut self, slice: LimitSlice) {
        self.to_skip -= slice.skip.min(self.to_skip);
        if let RowBudget::Bounded(remaining) = &mut self.budget {
            *remaining -= slice.take.min(*remaining);
        }
    }
}

impl Default for LimitTracker {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_unbounded_is_never_exhausted() {
        let mut tracker = LimitTracker::unbounded();
        let slice = tracker.plan(1_000);
        assert_eq!(slice, LimitSlice { skip: 0, take: 1_000 });
        tracker.commit(slice);
        assert_eq!(tracker.remaining(), RowBudget::Unbounded);
        assert!(!tracker.is_exhausted());
    }

    #[test]
    fn test_bounded_truncates_and_exhausts() {
        let mut tracker = LimitTracker::new(Some(5), None);
        let slice = tracker.plan(3);
        assert_eq!(slice, LimitSlice { skip: 0, take: 3 });
        tracker.commit(slice);
        assert_eq!(tracker.remaining(), RowBudget::Bounded(2));

        let slice = tracker.plan(4);
        assert_eq!(slice.take, 2);
        tracker.commit(slice);
        assert!(tracker.is_exhausted());
        assert_eq!(tracker.plan(10).take, 0);
    }

    #[test]
    fn test_plan_does_not_mutate() {
        let tracker = LimitTracker::new(Some(2), Some(1));
        let before = tracker.clone();
        let _ = tracker.plan(10);
        assert_eq!(tracker, before);
    }

    #[test]
    fn test_offset_spans_batches() {
        let mut tracker = LimitTracker::new(Some(3), Some(4));
        let slice = tracker.plan(3);
        assert_eq!(slice, LimitSlice { skip: 3, take: 0 });
        tracker.commit(slice);
        assert_eq!(tracker.to_skip(), 1);

        let slice = tracker.plan(5);
        assert_eq!(slice, LimitSlice { skip: 1, take: 3 });
        tracker.commit(slice);
        assert!(tracker.is_exhausted());
    }

    #[test]
    fn test_zero_limit_starts_exhausted() {
        assert!(LimitTracker::new(Some(0), None).is_exhausted());
        assert_eq!(RowBudget::Bounded(0).to_string(), "0");
        assert_eq!(RowBudget::Unbounded.to_string(), "unbounded");
    }

    proptest! {
        #[test]
        fn test_emitted_rows_never_exceed_limit(
            limit in 0_usize..64,
            offset in 0_usize..16,
            batches in proptest::collection::vec(0_usize..32, 0..16),
        ) {
            let mut tracker = LimitTracker::new(Some(limit), Some(offset));
            let mut emitted = 0;
            let mut skipped = 0;
            for available in batches.iter().copied() {
                let slice = tracker.plan(available);
                prop_assert!(slice.skip + slice.take <= available);
                emitted += slice.take;
                skipped += slice.skip;
                tracker.commit(slice);
            }
            let total: usize = batches.iter().sum();
            prop_assert!(emitted <= limit);
            prop_assert_eq!(skipped, offset.min(total));
            prop_assert_eq!(emitted, limit.min(total - skipped));
            prop_assert_eq!(tracker.is_exhausted(), emitted == limit);
        }
    }
}
