// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Predicate evaluation over the decoded columns of one batch.

use std::collections::HashMap;

use arrow_arith::boolean::{and_kleene, is_not_null, is_null, not, or_kleene};
use arrow_array::{Array, BooleanArray, Datum, Scalar};
use arrow_buffer::BooleanBuffer;
use arrow_ord::cmp;
use arrow_schema::DataType;
use lance_scan_core::{io::ColumnChunk, Error, Result};

use super::predicate::{BoundExpr, BoundOperand, BoundPredicate, Operator};

/// Decoded chunks of one batch, keyed by field id.
pub type ColumnChunks = HashMap<i32, ColumnChunk>;

impl BoundPredicate {
    /// Evaluate the predicate over one batch of `num_rows` rows.
    ///
    /// The result has one slot per row. Rows where the predicate is unknown
    /// because of NULL inputs are null in the result; [`super::Selection::from_mask`]
    /// treats them as not selected.
    ///
    /// `chunks` must hold every field in [`Self::referenced_fields`]. The
    /// inputs are only read.
    pub fn evaluate(&self, chunks: &ColumnChunks, num_rows: usize) -> Result<BooleanArray> {
        let mask = evaluate_expr(&self.expr, chunks, num_rows)?;
        if mask.len() != num_rows {
            return Err(Error::internal(format!(
                "filter {} produced {} values for {} rows",
                self,
                mask.len(),
                num_rows
            )));
        }
        Ok(mask)
    }
}

fn evaluate_expr(expr: &BoundExpr, chunks: &ColumnChunks, num_rows: usize) -> Result<BooleanArray> {
    Ok(match expr {
        BoundExpr::Constant(value) => constant(*value, num_rows),
        BoundExpr::Compare { left, op, right } => {
            let lhs = datum(left, chunks)?;
            let rhs = datum(right, chunks)?;
            compare(*op, lhs.as_ref(), rhs.as_ref())?
        }
        BoundExpr::And(l, r) => and_kleene(
            &evaluate_expr(l, chunks, num_rows)?,
            &evaluate_expr(r, chunks, num_rows)?,
        )?,
        BoundExpr::Or(l, r) => or_kleene(
            &evaluate_expr(l, chunks, num_rows)?,
            &evaluate_expr(r, chunks, num_rows)?,
        )?,
        BoundExpr::Not(inner) => not(&evaluate_expr(inner, chunks, num_rows)?)?,
        BoundExpr::IsNull { field_id } => is_null(column(chunks, *field_id)?.as_ref())?,
        BoundExpr::IsNotNull { field_id } => is_not_null(column(chunks, *field_id)?.as_ref())?,
    })
}

/// Apply a comparison operator element-wise.
pub(crate) fn compare(op: Operator, lhs: &dyn Datum, rhs: &dyn Datum) -> Result<BooleanArray> {
    Ok(match op {
        Operator::Eq => cmp::eq(lhs, rhs)?,
        Operator::NotEq => cmp::neq(lhs, rhs)?,
        Operator::Lt => cmp::lt(lhs, rhs)?,
        Operator::LtEq => cmp::lt_eq(lhs, rhs)?,
        Operator::Gt => cmp::gt(lhs, rhs)?,
        Operator::GtEq => cmp::gt_eq(lhs, rhs)?,
    })
}

fn constant(value: Option<bool>, num_rows: usize) -> BooleanArray {
    match value {
        Some(true) => BooleanArray::new(BooleanBuffer::new_set(num_rows), None),
        Some(false) => BooleanArray::new(BooleanBuffer::new_unset(num_rows), None),
        None => BooleanArray::new_null(num_rows),
    }
}

fn column(chunks: &ColumnChunks, field_id: i32) -> Result<&ColumnChunk> {
    chunks.get(&field_id).ok_or_else(|| {
        Error::internal(format!(
            "field {} is referenced by the filter but was not read",
            field_id
        ))
    })
}

fn typed_column<'a>(
    chunks: &'a ColumnChunks,
    field_id: i32,
    expected: &DataType,
) -> Result<&'a ColumnChunk> {
    let chunk = column(chunks, field_id)?;
    if chunk.data_type() != expected {
        return Err(Error::type_mismatch(format!(
            "field {} was read as {} but the filter compares it as {}",
            field_id,
            chunk.data_type(),
            expected
        )));
    }
    Ok(chunk)
}

fn datum(operand: &BoundOperand, chunks: &ColumnChunks) -> Result<Box<dyn Datum>> {
    Ok(match operand {
        BoundOperand::Column {
            field_id,
            data_type,
        } => Box::new(typed_column(chunks, *field_id, data_type)?.clone()),
        BoundOperand::Literal(value) => Box::new(Scalar::new(value.clone())),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::exec::predicate::{col, lit, Literal, Predicate};

    use arrow_array::{ArrayRef, Int16Array, Int32Array, Int64Array, StringArray};
    use arrow_schema::{Field as ArrowField, Schema as ArrowSchema};
    use lance_scan_core::datatypes::Schema;
    use rstest::rstest;

    fn schema() -> Schema {
        Schema::try_from(&ArrowSchema::new(vec![
            ArrowField::new("k", DataType::Int16, false),
            ArrowField::new("v", DataType::Int32, true),
            ArrowField::new("w", DataType::Int32, true),
            ArrowField::new("s", DataType::Utf8, true),
        ]))
        .unwrap()
    }

    /// k = [1, 2, 3, 4], v = [10, 20, null, 40], w = [10, 25, 30, null], s = [a, b, null, d]
    fn chunks() -> ColumnChunks {
        let mut chunks = ColumnChunks::new();
        chunks.insert(0, Arc::new(Int16Array::from(vec![1, 2, 3, 4])) as ArrayRef);
        chunks.insert(
            1,
            Arc::new(Int32Array::from(vec![Some(10), Some(20), None, Some(40)])) as ArrayRef,
        );
        chunks.insert(
            2,
            Arc::new(Int32Array::from(vec![Some(10), Some(25), Some(30), None])) as ArrayRef,
        );
        chunks.insert(
            3,
            Arc::new(StringArray::from(vec![Some("a"), Some("b"), None, Some("d")])) as ArrayRef,
        );
        chunks
    }

    fn eval(predicate: Predicate) -> Vec<Option<bool>> {
        predicate
            .bind(&schema())
            .unwrap()
            .evaluate(&chunks(), 4)
            .unwrap()
            .iter()
            .collect()
    }

    #[rstest]
    #[case::eq(col("k").eq(lit(2_i16)), [false, true, false, false])]
    #[case::not_eq(col("k").not_eq(lit(2_i16)), [true, false, true, true])]
    #[case::lt(col("k").lt(lit(3_i16)), [true, true, false, false])]
    #[case::lt_eq(col("k").lt_eq(lit(3_i16)), [true, true, true, false])]
    #[case::gt(col("k").gt(lit(3_i16)), [false, false, false, true])]
    #[case::gt_eq(col("k").gt_eq(lit(3_i16)), [false, false, true, true])]
    #[case::coerced_literal(col("k").eq(lit(4_i64)), [false, false, false, true])]
    #[case::literal_on_left(lit(2_i16).lt(col("k")), [false, false, true, true])]
    fn test_comparisons(#[case] predicate: Predicate, #[case] expected: [bool; 4]) {
        let expected = expected.into_iter().map(Some).collect::<Vec<_>>();
        assert_eq!(eval(predicate), expected);
    }

    #[test]
    fn test_null_comparisons_are_unknown() {
        assert_eq!(
            eval(col("v").eq(lit(20))),
            vec![Some(false), Some(true), None, Some(false)]
        );
        assert_eq!(
            eval(col("v").not_eq(lit(20))),
            vec![Some(true), Some(false), None, Some(true)]
        );
        assert_eq!(
            eval(!col("v").eq(lit(20))),
            vec![Some(true), Some(false), None, Some(true)]
        );
        assert_eq!(eval(col("v").eq(lit(Literal::null()))), vec![None; 4]);
        assert_eq!(
            eval(col("s").gt_eq(lit("b"))),
            vec![Some(false), Some(true), None, Some(true)]
        );
    }

    #[test]
    fn test_column_to_column() {
        assert_eq!(
            eval(col("v").eq(col("w"))),
            vec![Some(true), Some(false), None, None]
        );
        assert_eq!(
            eval(col("v").lt(col("w"))),
            vec![Some(false), Some(true), None, None]
        );
    }

    #[test]
    fn test_three_valued_logic() {
        // NULL AND false is false, NULL AND true is NULL
        assert_eq!(
            eval(col("v").eq(lit(20)).and(col("k").lt(lit(4_i16)))),
            vec![Some(false), Some(true), None, Some(false)]
        );
        // NULL OR true is true, NULL OR false is NULL
        assert_eq!(
            eval(col("v").eq(lit(20)).or(col("k").eq(lit(3_i16)))),
            vec![Some(false), Some(true), Some(true), Some(false)]
        );
        assert_eq!(
            eval(col("v").eq(lit(20)).or(col("k").eq(lit(1_i16)))),
            vec![Some(true), Some(true), None, Some(false)]
        );
    }

    #[test]
    fn test_null_checks() {
        assert_eq!(
            eval(col("v").is_null()),
            vec![Some(false), Some(false), Some(true), Some(false)]
        );
        assert_eq!(
            eval(col("s").is_not_null().and(col("w").is_not_null())),
            vec![Some(true), Some(true), Some(false), Some(false)]
        );
    }

    #[test]
    fn test_constant_predicates() {
        assert_eq!(eval(lit(1).lt(lit(2))), vec![Some(true); 4]);
        assert_eq!(eval(lit(1).gt(lit(2))), vec![Some(false); 4]);
        assert_eq!(eval(lit(1).gt(lit(Literal::null()))), vec![None; 4]);
    }

    #[test]
    fn test_chunk_type_disagrees_with_schema() {
        let bound = col("v").eq(lit(20)).bind(&schema()).unwrap();
        let mut chunks = chunks();
        chunks.insert(1, Arc::new(Int64Array::from(vec![10, 20, 30, 40])) as ArrayRef);
        let err = bound.evaluate(&chunks, 4).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn test_missing_chunk() {
        let bound = col("v").eq(lit(20)).bind(&schema()).unwrap();
        let err = bound.evaluate(&ColumnChunks::new(), 4).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }), "{err}");
    }

    #[test]
    fn test_empty_batch() {
        let bound = col("k").eq(lit(1_i16)).bind(&schema()).unwrap();
        let mut chunks = ColumnChunks::new();
        chunks.insert(0, Arc::new(Int16Array::from(Vec::<i16>::new())) as ArrayRef);
        assert_eq!(bound.evaluate(&chunks, 0).unwrap().len(), 0);
    }
}
