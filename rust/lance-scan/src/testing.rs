// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! A [`BatchReader`] over in-memory record batches, for tests and demos.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};

use arrow_array::{cast::AsArray, make_array, Array, RecordBatch};
use arrow_buffer::NullBuffer;
use async_trait::async_trait;
use lance_scan_core::{
    datatypes::Schema,
    io::{BatchReader, ColumnChunk},
    Error, Result,
};
use snafu::location;

/// Serves the columns of a list of [`RecordBatch`]es by field id.
///
/// Every column fetch is recorded, so tests can check which columns a scan
/// read. Validity reads are not recorded.
#[derive(Debug)]
pub struct InMemoryReader {
    schema: Arc<Schema>,
    batches: Vec<RecordBatch>,
    fetches: AtomicUsize,
    fetch_log: Mutex<Vec<(i32, usize)>>,
}

impl InMemoryReader {
    /// Serve `batches`, whose top-level columns follow the fields of `schema`.
    pub fn try_new(schema: Arc<Schema>, batches: Vec<RecordBatch>) -> Result<Self> {
        for (batch_index, batch) in batches.iter().enumerate() {
            if batch.num_columns() != schema.fields.len() {
                return Err(Error::InvalidInput {
                    message: format!(
                        "batch {} has {} columns, the schema has {} top-level fields",
                        batch_index,
                        batch.num_columns(),
                        schema.fields.len()
                    ),
                    location: location!(),
                });
            }
        }
        Ok(Self {
            schema,
            batches,
            fetches: AtomicUsize::new(0),
            fetch_log: Mutex::new(vec![]),
        })
    }

    /// Serve `batches`, deriving the schema and its field ids from the first one.
    pub fn from_batches(batches: Vec<RecordBatch>) -> Result<Self> {
        let first = batches.first().ok_or_else(|| Error::InvalidInput {
            message: "at least one batch is needed to derive a schema".to_string(),
            location: location!(),
        })?;
        let schema = Schema::try_from(first.schema().as_ref())?;
        Self::try_new(Arc::new(schema), batches)
    }

    pub fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    /// Number of `fetch_column` calls so far, including failed ones.
    pub fn num_fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// `(field_id, batch_index)` of every successful fetch, in call order.
    pub fn fetched(&self) -> Vec<(i32, usize)> {
        self.fetch_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_fetch(&self, field_id: i32, batch_index: usize) {
        self.fetch_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((field_id, batch_index));
    }

    fn batch(&self, batch_index: usize) -> Result<&RecordBatch> {
        self.batches.get(batch_index).ok_or_else(|| Error::NotFound {
            message: format!(
                "batch {} (the reader has {} batches)",
                batch_index,
                self.batches.len()
            ),
            location: location!(),
        })
    }

    /// The column of `field_id` as stored, and the combined nulls of its
    /// ancestors.
    fn locate(
        &self,
        field_id: i32,
        batch: &RecordBatch,
    ) -> Result<(ColumnChunk, Option<NullBuffer>)> {
        let not_found = || Error::NotFound {
            message: format!("field id {}", field_id),
            location: location!(),
        };
        let ancestry = self
            .schema
            .field_ancestry_by_id(field_id)
            .ok_or_else(not_found)?;
        let (top, nested) = ancestry.split_first().ok_or_else(not_found)?;
        let position = self
            .schema
            .fields
            .iter()
            .position(|f| f.id == top.id)
            .ok_or_else(not_found)?;

        let mut column = batch.column(position).clone();
        let mut ancestor_nulls: Option<NullBuffer> = None;
        for field in nested {
            let parent = column.as_struct_opt().ok_or_else(|| {
                Error::internal(format!(
                    "expected a struct column above {} but found {}",
                    field.name,
                    column.data_type()
                ))
            })?;
            ancestor_nulls = NullBuffer::union(ancestor_nulls.as_ref(), parent.nulls());
            let child = parent.column_by_name(&field.name).ok_or_else(not_found)?.clone();
            column = child;
        }
        Ok((column, ancestor_nulls))
    }

    fn column(&self, field_id: i32, batch: &RecordBatch) -> Result<ColumnChunk> {
        let (column, ancestor_nulls) = self.locate(field_id, batch)?;
        let Some(ancestor_nulls) = ancestor_nulls else {
            return Ok(column);
        };
        let nulls = NullBuffer::union(Some(&ancestor_nulls), column.nulls());
        let data = column.to_data().into_builder().nulls(nulls).build()?;
        Ok(make_array(data))
    }
}

#[async_trait]
impl BatchReader for InMemoryReader {
    fn num_batches(&self) -> usize {
        self.batches.len()
    }

    fn batch_row_count(&self, batch_index: usize) -> Result<usize> {
        Ok(self.batch(batch_index)?.num_rows())
    }

    async fn fetch_column(&self, field_id: i32, batch_index: usize) -> Result<ColumnChunk> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let column = self.column(field_id, self.batch(batch_index)?)?;
        self.record_fetch(field_id, batch_index);
        Ok(column)
    }

    async fn fetch_validity(
        &self,
        field_id: i32,
        batch_index: usize,
    ) -> Result<Option<NullBuffer>> {
        let (column, ancestor_nulls) = self.locate(field_id, self.batch(batch_index)?)?;
        Ok(NullBuffer::union(ancestor_nulls.as_ref(), column.nulls()))
    }
}
