// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use arrow_schema::ArrowError;
use snafu::{location, Location, Snafu};

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Allocates error on the heap and then places `e` into it.
#[inline]
pub fn box_error(e: impl std::error::Error + Send + Sync + 'static) -> BoxedError {
    Box::new(e)
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Column {name} does not exist in schema, {location}"))]
    UnknownColumn { name: String, location: Location },
    #[snafu(display(
        "Projection must request at least one output column or define a filter, {location}"
    ))]
    EmptyProjection { location: Location },
    #[snafu(display("Type mismatch: {message}, {location}"))]
    TypeMismatch { message: String, location: Location },
    #[snafu(display("Inconsistent batch {batch_index}: {message}, {location}"))]
    InconsistentBatch {
        batch_index: usize,
        message: String,
        location: Location,
    },
    #[snafu(display("Reader error: {source}, {location}"))]
    Reader {
        source: BoxedError,
        location: Location,
    },
    #[snafu(display("Not found: {message}, {location}"))]
    NotFound { message: String, location: Location },
    #[snafu(display("LanceError(Schema): {message}, {location}"))]
    Schema { message: String, location: Location },
    #[snafu(display("LanceError(Arrow): {message}, {location}"))]
    Arrow { message: String, location: Location },
    #[snafu(display("Invalid user input: {message}, {location}"))]
    InvalidInput { message: String, location: Location },
    #[snafu(display("Encountered internal error. Please file a bug report at https://github.com/lancedb/lance/issues. {message}, {location}"))]
    Internal { message: String, location: Location },
}

impl Error {
    /// Wrap a failure raised by a [`crate::io::BatchReader`].
    #[track_caller]
    pub fn reader(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Reader {
            source: box_error(source),
            location: std::panic::Location::caller().to_snafu_location(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            message: message.into(),
            location: location!(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            location: location!(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

trait ToSnafuLocation {
    fn to_snafu_location(&'static self) -> snafu::Location;
}

impl ToSnafuLocation for std::panic::Location<'static> {
    fn to_snafu_location(&'static self) -> snafu::Location {
        snafu::Location::new(self.file(), self.line(), self.column())
    }
}

impl From<ArrowError> for Error {
    #[track_caller]
    fn from(e: ArrowError) -> Self {
        Self::Arrow {
            message: e.to_string(),
            location: std::panic::Location::caller().to_snafu_location(),
        }
    }
}
