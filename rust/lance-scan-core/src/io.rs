// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! The reader contract consumed by the scan executor.

use arrow_array::{Array, ArrayRef};
use arrow_buffer::NullBuffer;
use async_trait::async_trait;

use crate::Result;

/// A decoded, batch-scoped array of values for one field.
///
/// Chunks are shared read-only; filtering produces new arrays.
pub type ColumnChunk = ArrayRef;

/// Source of decoded column chunks, addressed by field id and batch index.
///
/// How the reader chunks and decodes the underlying file is up to the
/// implementation. Implementations return [`crate::Error::NotFound`] for
/// unknown field ids or batch indices.
#[async_trait]
pub trait BatchReader: Send + Sync {
    /// Number of batches available.
    fn num_batches(&self) -> usize;

    /// Number of rows in the batch at `batch_index`.
    fn batch_row_count(&self, batch_index: usize) -> Result<usize>;

    /// Read the decoded values of `field_id` in the batch at `batch_index`.
    ///
    /// For a struct field, the returned chunk holds every child. A nested
    /// field is null in every row where one of its ancestors is null.
    async fn fetch_column(&self, field_id: i32, batch_index: usize) -> Result<ColumnChunk>;

    /// Read only the validity of `field_id` in the batch at `batch_index`.
    ///
    /// `None` means every row is valid. Like [`Self::fetch_column`], the
    /// result includes the nulls of the field's ancestors. This is read when
    /// a struct is rebuilt from some of its children.
    async fn fetch_validity(
        &self,
        field_id: i32,
        batch_index: usize,
    ) -> Result<Option<NullBuffer>> {
        Ok(self.fetch_column(field_id, batch_index).await?.nulls().cloned())
    }
}
