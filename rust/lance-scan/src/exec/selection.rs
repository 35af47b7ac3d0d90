// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::ops::Range;

use std::sync::Arc;

use arrow_array::{cast::AsArray, Array, BooleanArray, UInt32Array};
use arrow_buffer::{BooleanBuffer, BooleanBufferBuilder, NullBuffer, ScalarBuffer};
use arrow_select::{filter::filter, take::take};
use lance_scan_core::{io::ColumnChunk, Error, Result};
use snafu::location;

/// The rows of one batch that survive the filter.
///
/// Every representation keeps rows in their original order.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// A contiguous run of rows.
    Range(Range<usize>),
    /// One bit per row of the batch.
    Mask(BooleanBuffer),
    /// Strictly increasing row offsets.
    Indices(ScalarBuffer<u32>),
}

impl Selection {
    /// Every row of a batch with `num_rows` rows.
    pub fn all(num_rows: usize) -> Self {
        Self::Range(0..num_rows)
    }

    /// Rows where `mask` is true. Null slots are not selected.
    pub fn from_mask(mask: &BooleanArray) -> Self {
        let values = match mask.nulls() {
            Some(nulls) if nulls.null_count() > 0 => mask.values() & nulls.inner(),
            _ => mask.values().clone(),
        };
        if values.count_set_bits() == values.len() {
            Self::all(values.len())
        } else {
            Self::Mask(values)
        }
    }

    /// Number of selected rows.
    pub fn num_selected(&self) -> usize {
        match self {
            Self::Range(range) => range.len(),
            Self::Mask(mask) => mask.count_set_bits(),
            Self::Indices(indices) => indices.len(),
        }
    }

    /// Drop the first `skip` selected rows and keep at most `take` of the rest.
    pub fn truncate(self, skip: usize, take: usize) -> Self {
        let selected = self.num_selected();
        if skip == 0 && take >= selected {
            return self;
        }
        match self {
            Self::Range(range) => {
                let start = (range.start + skip).min(range.end);
                let end = start + take.min(range.end - start);
                Self::Range(start..end)
            }
            Self::Mask(mask) => {
                let mut truncated = BooleanBufferBuilder::new(mask.len());
                truncated.append_n(mask.len(), false);
                for i in mask.set_indices().skip(skip).take(take) {
                    truncated.set_bit(i, true);
                }
                Self::Mask(truncated.finish())
            }
            Self::Indices(indices) => {
                let offset = skip.min(indices.len());
                let len = take.min(indices.len() - offset);
                Self::Indices(indices.slice(offset, len))
            }
        }
    }

    /// Offsets of the selected rows.
    pub fn indices(&self) -> Result<Vec<u32>> {
        match self {
            Self::Range(range) => range.clone().map(row_offset).collect(),
            Self::Mask(mask) => mask.set_indices().map(row_offset).collect(),
            Self::Indices(indices) => Ok(indices.to_vec()),
        }
    }

    /// Build a new chunk holding only the selected rows of `chunk`.
    ///
    /// `chunk` is left untouched. A range selection returns a zero-copy slice.
    pub fn apply(&self, chunk: &ColumnChunk) -> Result<ColumnChunk> {
        Ok(match self {
            Self::Range(range) => chunk.slice(range.start, range.len()),
            Self::Mask(mask) => filter(chunk.as_ref(), &BooleanArray::new(mask.clone(), None))?,
            Self::Indices(indices) => take(
                chunk.as_ref(),
                &UInt32Array::new(indices.clone(), None),
                None,
            )?,
        })
    }

    /// The validity bits of the selected rows.
    pub fn apply_nulls(&self, nulls: &NullBuffer) -> Result<NullBuffer> {
        let validity: ColumnChunk = Arc::new(BooleanArray::new(nulls.inner().clone(), None));
        let selected = self.apply(&validity)?;
        Ok(NullBuffer::new(selected.as_boolean().values().clone()))
    }
}

fn row_offset(i: usize) -> Result<u32> {
    u32::try_from(i).map_err(|_| Error::InvalidInput {
        message: format!("row offset {} does not fit in a u32 index", i),
        location: location!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow_array::{ArrayRef, Int32Array, StringArray};
    use rstest::rstest;

    fn chunk() -> ColumnChunk {
        Arc::new(Int32Array::from(vec![10, 20, 30, 40, 50, 60]))
    }

    fn values(chunk: &ColumnChunk) -> Vec<i32> {
        chunk
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap()
            .values()
            .to_vec()
    }

    fn mask() -> Selection {
        Selection::from_mask(&BooleanArray::from(vec![
            Some(true),
            None,
            Some(false),
            Some(true),
            Some(true),
            Some(true),
        ]))
    }

    #[test]
    fn test_from_mask_collapses_nulls() {
        let selection = mask();
        assert_eq!(selection.num_selected(), 4);
        assert_eq!(selection.indices().unwrap(), vec![0, 3, 4, 5]);
        assert_eq!(values(&selection.apply(&chunk()).unwrap()), vec![10, 40, 50, 60]);
    }

    #[test]
    fn test_from_all_true_mask_is_range() {
        let selection = Selection::from_mask(&BooleanArray::from(vec![true, true, true]));
        assert_eq!(selection, Selection::all(3));
        let selection = Selection::from_mask(&BooleanArray::from(Vec::<bool>::new()));
        assert_eq!(selection.num_selected(), 0);
    }

    #[test]
    fn test_range_apply_is_a_slice() {
        let chunk = chunk();
        let selected = Selection::Range(2..4).apply(&chunk).unwrap();
        assert_eq!(values(&selected), vec![30, 40]);
        assert_eq!(chunk.len(), 6);
    }

    #[rstest]
    #[case::keep_all(0, 10, vec![0, 3, 4, 5])]
    #[case::take_two(0, 2, vec![0, 3])]
    #[case::skip_one(1, 2, vec![3, 4])]
    #[case::skip_past_end(7, 2, vec![])]
    #[case::take_none(0, 0, vec![])]
    fn test_truncate(#[case] skip: usize, #[case] take: usize, #[case] expected: Vec<u32>) {
        let truncated = mask().truncate(skip, take);
        assert!(matches!(truncated, Selection::Mask(_)));
        assert_eq!(truncated.indices().unwrap(), expected);
        assert_eq!(
            values(&truncated.apply(&chunk()).unwrap()),
            expected.iter().map(|i| (*i as i32 + 1) * 10).collect::<Vec<_>>()
        );

        let indices = Selection::Indices(ScalarBuffer::from(vec![0, 3, 4, 5]));
        assert_eq!(indices.truncate(skip, take).indices().unwrap(), expected);
    }

    #[test]
    fn test_row_offset_beyond_u32() {
        let last = u32::MAX as usize;
        assert_eq!(Selection::Range(last..last + 1).indices().unwrap(), vec![u32::MAX]);
        let err = Selection::Range(last..last + 2).indices().unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }), "{err}");
    }

    #[test]
    fn test_apply_nulls() {
        let nulls = NullBuffer::from(vec![true, false, true, true, false, true]);
        let selected = mask().apply_nulls(&nulls).unwrap();
        assert_eq!(
            selected.inner().iter().collect::<Vec<_>>(),
            vec![true, true, false, true]
        );
        let selected = Selection::Range(1..3).apply_nulls(&nulls).unwrap();
        assert_eq!(selected.null_count(), 1);
    }

    #[rstest]
    #[case::prefix(0, 2, 0..2)]
    #[case::middle(1, 3, 1..4)]
    #[case::tail(4, 10, 4..6)]
    #[case::past_end(9, 1, 6..6)]
    fn test_truncate_range(#[case] skip: usize, #[case] take: usize, #[case] expected: Range<usize>) {
        assert_eq!(
            Selection::all(6).truncate(skip, take),
            Selection::Range(expected)
        );
    }

    #[test]
    fn test_apply_indices() {
        let chunk: ArrayRef = Arc::new(StringArray::from(vec!["a", "b", "c"]));
        let selection = Selection::Indices(ScalarBuffer::from(vec![0_u32, 2]));
        let selected = selection.apply(&chunk).unwrap();
        let selected = selected.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(selected.iter().collect::<Vec<_>>(), vec![Some("a"), Some("c")]);
    }
}
