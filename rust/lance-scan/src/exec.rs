// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Scan execution: column pruning, filtering and limits.

mod filter;
mod limit;
mod planner;
mod predicate;
mod project;
mod selection;

pub use filter::ColumnChunks;
pub use limit::{LimitSlice, LimitTracker, RowBudget};
pub use planner::{ProjectionPlan, StructValidity};
pub use predicate::{col, lit, BoundPredicate, Literal, Operand, Operator, Predicate};
pub use project::{Project, ProjectOptions};
pub use selection::Selection;
