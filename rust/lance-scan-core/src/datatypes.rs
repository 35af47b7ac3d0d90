// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Lance data types, [Schema] and [Field]

mod field;
mod schema;

pub use field::Field;
pub use schema::Schema;

/// Separator between the components of a nested column path, i.e. `"point.x"`.
pub const PATH_SEPARATOR: char = '.';
