// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Core types shared by the Lance scan execution crates.
//!
//! - [`datatypes::Schema`] / [`datatypes::Field`]: the logical schema, with a stable
//!   field id for every (possibly nested) field.
//! - [`io::BatchReader`]: the contract a storage reader fulfils to hand decoded
//!   column chunks to the executor.
//! - [`Error`]: the error type used across the scan crates.

pub mod datatypes;
pub mod error;
pub mod io;

pub use error::{Error, Result};
