// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Lance Scan
//!
//! The read path of a columnar scan: given a [`Schema`], a set of output
//! columns, an optional filter and an optional limit, [`Project`] reads only
//! the columns it needs from a [`BatchReader`] and produces Arrow
//! [`RecordBatch`](arrow_array::RecordBatch)es holding the filtered,
//! limited rows.
//!
//! ## Example
//!
//! ```rust
//! # use std::sync::Arc;
//! # use arrow_array::{Int16Array, Int32Array, RecordBatch};
//! # use arrow_schema::{DataType, Field, Schema as ArrowSchema};
//! # use tokio::runtime::Runtime;
//! use lance_scan::{col, lit, testing::InMemoryReader, Project, ProjectOptions};
//!
//! # let rt = Runtime::new().unwrap();
//! # rt.block_on(async {
//! let schema = Arc::new(ArrowSchema::new(vec![
//!     Field::new("k", DataType::Int16, false),
//!     Field::new("v", DataType::Int32, false),
//! ]));
//! let batch = RecordBatch::try_new(
//!     schema,
//!     vec![
//!         Arc::new(Int16Array::from(vec![1, 2, 3, 4])),
//!         Arc::new(Int32Array::from(vec![10, 20, 30, 40])),
//!     ],
//! )
//! .unwrap();
//! let reader = InMemoryReader::from_batches(vec![batch]).unwrap();
//!
//! let options = ProjectOptions {
//!     filter: Some(col("k").gt(lit(2_i16))),
//!     ..ProjectOptions::new(["v"])
//! };
//! let mut project = Project::try_new(reader.schema(), &options).unwrap();
//! let output = project.execute(&reader, 0).await.unwrap().unwrap();
//! assert_eq!(output.num_columns(), 1);
//! assert_eq!(output.num_rows(), 2);
//! # });
//! ```

pub mod exec;
pub mod testing;

pub use exec::{
    col, lit, BoundPredicate, Literal, Operand, Operator, Predicate, Project, ProjectOptions,
    ProjectionPlan, Selection,
};
pub use lance_scan_core::{datatypes::Schema, io::BatchReader, Error, Result};
