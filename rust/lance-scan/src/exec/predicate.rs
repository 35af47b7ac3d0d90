// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Filter expressions over schema columns.
//!
//! A [`Predicate`] names its columns by dotted path. Binding it to a
//! [`Schema`] resolves those paths to field ids, checks operand types and
//! folds sub-expressions that do not depend on any column.

use std::{collections::BTreeSet, fmt, sync::Arc};

use arrow_array::{
    new_null_array, Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, Int8Array, NullArray, StringArray, UInt16Array, UInt32Array,
    UInt64Array, UInt8Array,
};
use arrow_cast::{
    cast::{cast_with_options, CastOptions},
    display::array_value_to_string,
};
use arrow_schema::DataType;
use lance_scan_core::{datatypes::Schema, Error, Result};
use snafu::location;

use super::filter::compare;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        };
        write!(f, "{op}")
    }
}

/// A single typed constant, stored as a one-element array.
#[derive(Debug, Clone)]
pub struct Literal(ArrayRef);

impl Literal {
    /// Wrap a one-element array.
    pub fn try_new(value: ArrayRef) -> Result<Self> {
        if value.len() != 1 {
            return Err(Error::InvalidInput {
                message: format!("a literal needs exactly one value, got {}", value.len()),
                location: location!(),
            });
        }
        Ok(Self(value))
    }

    /// The untyped NULL literal.
    pub fn null() -> Self {
        Self(Arc::new(NullArray::new(1)))
    }

    pub fn data_type(&self) -> &DataType {
        self.0.data_type()
    }

    pub fn is_null(&self) -> bool {
        self.0.data_type() == &DataType::Null || self.0.is_null(0)
    }

    pub fn value(&self) -> &ArrayRef {
        &self.0
    }

    /// Convert the literal to `target` so it can be compared against a
    /// column of that type.
    ///
    /// Integers convert to any integer or floating point type, floats to
    /// other floats, strings to other string types. The conversion fails if
    /// the value does not fit the target type.
    pub(crate) fn coerce_to(&self, target: &DataType) -> Result<ArrayRef> {
        let source = self.0.data_type();
        if source == target {
            return Ok(self.0.clone());
        }
        if self.is_null() {
            return Ok(new_null_array(target, 1));
        }
        let compatible = match (source, target) {
            (s, t) if s.is_integer() => t.is_integer() || t.is_floating(),
            (s, t) if s.is_floating() => t.is_floating(),
            (DataType::Utf8 | DataType::LargeUtf8, DataType::Utf8 | DataType::LargeUtf8) => true,
            _ => false,
        };
        if !compatible {
            return Err(Error::type_mismatch(format!(
                "literal {} of type {} cannot be compared with type {}",
                self, source, target
            )));
        }
        let options = CastOptions {
            safe: false,
            ..Default::default()
        };
        cast_with_options(&self.0, target, &options).map_err(|e| {
            Error::type_mismatch(format!(
                "literal {} cannot be represented as {}: {}",
                self, target, e
            ))
        })
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "NULL");
        }
        match array_value_to_string(&self.0, 0) {
            Ok(s) if matches!(self.data_type(), DataType::Utf8 | DataType::LargeUtf8) => {
                write!(f, "'{s}'")
            }
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "<{}>", self.data_type()),
        }
    }
}

macro_rules! impl_literal_from {
    ($native:ty, $array:ty) => {
        impl From<$native> for Literal {
            fn from(value: $native) -> Self {
                Self(Arc::new(<$array>::from(vec![value])))
            }
        }
    };
}

impl_literal_from!(bool, BooleanArray);
impl_literal_from!(i8, Int8Array);
impl_literal_from!(i16, Int16Array);
impl_literal_from!(i32, Int32Array);
impl_literal_from!(i64, Int64Array);
impl_literal_from!(u8, UInt8Array);
impl_literal_from!(u16, UInt16Array);
impl_literal_from!(u32, UInt32Array);
impl_literal_from!(u64, UInt64Array);
impl_literal_from!(f32, Float32Array);
impl_literal_from!(f64, Float64Array);
impl_literal_from!(&str, StringArray);
impl_literal_from!(String, StringArray);

/// One side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A column, by dotted path.
    Column(String),
    Literal(Literal),
}

/// Reference a column by its dotted path, i.e. `col("point.x")`.
pub fn col(name: impl Into<String>) -> Operand {
    Operand::Column(name.into())
}

/// A literal operand.
pub fn lit(value: impl Into<Literal>) -> Operand {
    Operand::Literal(value.into())
}

#[allow(clippy::should_implement_trait)]
impl Operand {
    fn compare(self, op: Operator, other: Self) -> Predicate {
        Predicate::Compare {
            left: self,
            op,
            right: other,
        }
    }

    pub fn eq(self, other: Self) -> Predicate {
        self.compare(Operator::Eq, other)
    }

    pub fn not_eq(self, other: Self) -> Predicate {
        self.compare(Operator::NotEq, other)
    }

    pub fn lt(self, other: Self) -> Predicate {
        self.compare(Operator::Lt, other)
    }

    pub fn lt_eq(self, other: Self) -> Predicate {
        self.compare(Operator::LtEq, other)
    }

    pub fn gt(self, other: Self) -> Predicate {
        self.compare(Operator::Gt, other)
    }

    pub fn gt_eq(self, other: Self) -> Predicate {
        self.compare(Operator::GtEq, other)
    }

    pub fn is_null(self) -> Predicate {
        Predicate::IsNull(self)
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNotNull(self)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(name) => write!(f, "{name}"),
            Self::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// A boolean filter expression.
///
/// Comparisons involving NULL are unknown. Unknown propagates through
/// `AND`, `OR` and `NOT` with three-valued logic and a row is selected only
/// when the whole predicate is true.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        left: Operand,
        op: Operator,
        right: Operand,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    IsNull(Operand),
    IsNotNull(Operand),
}

impl Predicate {
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// The dotted paths of every column the predicate reads.
    pub fn column_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_column_names(&mut names);
        names
    }

    fn collect_column_names<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        fn add<'a>(operand: &'a Operand, names: &mut BTreeSet<&'a str>) {
            if let Operand::Column(name) = operand {
                names.insert(name.as_str());
            }
        }
        match self {
            Self::Compare { left, right, .. } => {
                add(left, names);
                add(right, names);
            }
            Self::IsNull(operand) | Self::IsNotNull(operand) => add(operand, names),
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_column_names(names);
                r.collect_column_names(names);
            }
            Self::Not(inner) => inner.collect_column_names(names),
        }
    }

    /// Resolve column paths against `schema` and type-check the expression.
    pub fn bind(&self, schema: &Schema) -> Result<BoundPredicate> {
        let mut referenced_fields = BTreeSet::new();
        let expr = bind_expr(self, schema, &mut referenced_fields)?;
        Ok(BoundPredicate {
            expr,
            referenced_fields,
            predicate: self.clone(),
        })
    }
}

impl std::ops::Not for Predicate {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not(Box::new(self))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            Self::And(l, r) => write!(f, "({l} AND {r})"),
            Self::Or(l, r) => write!(f, "({l} OR {r})"),
            Self::Not(inner) => write!(f, "NOT {inner}"),
            Self::IsNull(operand) => write!(f, "{operand} IS NULL"),
            Self::IsNotNull(operand) => write!(f, "{operand} IS NOT NULL"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum BoundOperand {
    Column { field_id: i32, data_type: DataType },
    /// Already converted to the type of the column it is compared with.
    Literal(ArrayRef),
}

#[derive(Debug, Clone)]
pub(crate) enum BoundExpr {
    /// A value that is the same for every row; `None` is unknown.
    Constant(Option<bool>),
    Compare {
        left: BoundOperand,
        op: Operator,
        right: BoundOperand,
    },
    And(Box<BoundExpr>, Box<BoundExpr>),
    Or(Box<BoundExpr>, Box<BoundExpr>),
    Not(Box<BoundExpr>),
    IsNull { field_id: i32 },
    IsNotNull { field_id: i32 },
}

/// A [`Predicate`] resolved against a schema.
///
/// Immutable, so one bound predicate can be shared by every batch of a scan
/// and across scans.
#[derive(Debug, Clone)]
pub struct BoundPredicate {
    pub(crate) expr: BoundExpr,
    referenced_fields: BTreeSet<i32>,
    predicate: Predicate,
}

impl BoundPredicate {
    /// Ids of the fields the predicate reads.
    pub fn referenced_fields(&self) -> &BTreeSet<i32> {
        &self.referenced_fields
    }

    /// The expression this was bound from.
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl fmt::Display for BoundPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.predicate)
    }
}

fn bind_expr(
    predicate: &Predicate,
    schema: &Schema,
    referenced: &mut BTreeSet<i32>,
) -> Result<BoundExpr> {
    Ok(match predicate {
        Predicate::Compare { left, op, right } => {
            bind_compare(left, *op, right, schema, referenced)?
        }
        Predicate::And(l, r) => BoundExpr::And(
            Box::new(bind_expr(l, schema, referenced)?),
            Box::new(bind_expr(r, schema, referenced)?),
        ),
        Predicate::Or(l, r) => BoundExpr::Or(
            Box::new(bind_expr(l, schema, referenced)?),
            Box::new(bind_expr(r, schema, referenced)?),
        ),
        Predicate::Not(inner) => BoundExpr::Not(Box::new(bind_expr(inner, schema, referenced)?)),
        Predicate::IsNull(Operand::Column(name)) => BoundExpr::IsNull {
            field_id: bind_column(name, schema, referenced)?.0,
        },
        Predicate::IsNotNull(Operand::Column(name)) => BoundExpr::IsNotNull {
            field_id: bind_column(name, schema, referenced)?.0,
        },
        Predicate::IsNull(Operand::Literal(value)) => BoundExpr::Constant(Some(value.is_null())),
        Predicate::IsNotNull(Operand::Literal(value)) => {
            BoundExpr::Constant(Some(!value.is_null()))
        }
    })
}

fn bind_column(
    name: &str,
    schema: &Schema,
    referenced: &mut BTreeSet<i32>,
) -> Result<(i32, DataType)> {
    let field = schema.field(name).ok_or_else(|| Error::UnknownColumn {
        name: name.to_string(),
        location: location!(),
    })?;
    referenced.insert(field.id);
    Ok((field.id, field.data_type()))
}

fn bind_comparable_column(
    name: &str,
    schema: &Schema,
    referenced: &mut BTreeSet<i32>,
) -> Result<(i32, DataType)> {
    let (field_id, data_type) = bind_column(name, schema, referenced)?;
    if data_type.is_nested() {
        return Err(Error::type_mismatch(format!(
            "column {} has nested type {} which cannot be compared",
            name, data_type
        )));
    }
    Ok((field_id, data_type))
}

fn bind_compare(
    left: &Operand,
    op: Operator,
    right: &Operand,
    schema: &Schema,
    referenced: &mut BTreeSet<i32>,
) -> Result<BoundExpr> {
    let (left, right) = match (left, right) {
        (Operand::Column(l), Operand::Column(r)) => {
            let (l_id, l_type) = bind_comparable_column(l, schema, referenced)?;
            let (r_id, r_type) = bind_comparable_column(r, schema, referenced)?;
            if l_type != r_type {
                return Err(Error::type_mismatch(format!(
                    "cannot compare column {} ({}) with column {} ({})",
                    l, l_type, r, r_type
                )));
            }
            (
                BoundOperand::Column {
                    field_id: l_id,
                    data_type: l_type,
                },
                BoundOperand::Column {
                    field_id: r_id,
                    data_type: r_type,
                },
            )
        }
        (Operand::Column(name), Operand::Literal(value)) => {
            let (field_id, data_type) = bind_comparable_column(name, schema, referenced)?;
            let value = value.coerce_to(&data_type)?;
            (
                BoundOperand::Column {
                    field_id,
                    data_type,
                },
                BoundOperand::Literal(value),
            )
        }
        (Operand::Literal(value), Operand::Column(name)) => {
            let (field_id, data_type) = bind_comparable_column(name, schema, referenced)?;
            let value = value.coerce_to(&data_type)?;
            (
                BoundOperand::Literal(value),
                BoundOperand::Column {
                    field_id,
                    data_type,
                },
            )
        }
        (Operand::Literal(l), Operand::Literal(r)) => {
            return fold_literal_compare(l, op, r);
        }
    };
    Ok(BoundExpr::Compare { left, op, right })
}

fn fold_literal_compare(left: &Literal, op: Operator, right: &Literal) -> Result<BoundExpr> {
    if left.is_null() || right.is_null() {
        return Ok(BoundExpr::Constant(None));
    }
    // Either side may be the wider one.
    let (left, right) = match right.coerce_to(left.data_type()) {
        Ok(right) => (left.value().clone(), right),
        Err(_) => (left.coerce_to(right.data_type())?, right.value().clone()),
    };
    let result = compare(op, &left, &right)?;
    Ok(BoundExpr::Constant(Some(result.value(0))))
}
