// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::sync::Arc;

use arrow_array::{Array, RecordBatch};
use arrow_schema::SchemaRef;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use lance_scan_core::{
    datatypes::Schema,
    io::{BatchReader, ColumnChunk},
    Error, Result,
};
use snafu::location;
use tracing::{debug, instrument, trace};

use super::{
    filter::ColumnChunks,
    limit::{LimitTracker, RowBudget},
    planner::{ProjectionPlan, StructValidity},
    predicate::Predicate,
    selection::Selection,
};

/// What a [`Project`] reads and returns.
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    /// Output columns by dotted path. Output batches follow schema order,
    /// not the order given here.
    pub columns: Vec<String>,
    /// Rows for which the filter is not true are dropped.
    pub filter: Option<Predicate>,
    /// Maximum number of rows returned over the whole scan.
    pub limit: Option<usize>,
    /// Number of surviving rows to skip before the first returned one.
    pub offset: Option<usize>,
}

impl ProjectOptions {
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// Executes a projection, an optional filter and an optional limit over the
/// batches of a [`BatchReader`].
///
/// Only the fields needed for the output and for the filter are fetched.
/// A `Project` holds the limit state of one scan; use [`Project::fork`] to
/// start another scan over the same plan.
#[derive(Debug)]
pub struct Project {
    plan: Arc<ProjectionPlan>,
    limit: LimitTracker,
    initial_limit: LimitTracker,
}

impl Project {
    /// Resolve `options` against `schema`.
    ///
    /// Fails with [`Error::UnknownColumn`] if a column or a filter reference
    /// does not exist, [`Error::EmptyProjection`] if there are neither columns
    /// nor a filter, and [`Error::TypeMismatch`] if the filter compares
    /// incompatible types.
    pub fn try_new(schema: Arc<Schema>, options: &ProjectOptions) -> Result<Self> {
        let plan = ProjectionPlan::try_new(schema, &options.columns, options.filter.as_ref())?;
        let limit = LimitTracker::new(options.limit, options.offset);
        Ok(Self {
            plan: Arc::new(plan),
            initial_limit: limit.clone(),
            limit,
        })
    }

    /// A new scan over the same plan, with the limit and offset reset.
    pub fn fork(&self) -> Self {
        Self {
            plan: self.plan.clone(),
            limit: self.initial_limit.clone(),
            initial_limit: self.initial_limit.clone(),
        }
    }

    pub fn plan(&self) -> &Arc<ProjectionPlan> {
        &self.plan
    }

    pub fn output_schema(&self) -> SchemaRef {
        self.plan.arrow_schema()
    }

    /// Rows this scan may still return.
    pub fn remaining(&self) -> RowBudget {
        self.limit.remaining()
    }

    pub fn is_exhausted(&self) -> bool {
        self.limit.is_exhausted()
    }

    /// Produce the output for the batch at `batch_index`.
    ///
    /// Returns `Ok(None)` once the limit is reached, without calling the
    /// reader. The returned batch may have zero rows if nothing in the batch
    /// survives the filter.
    ///
    /// The limit is only updated when the call succeeds.
    #[instrument(level = "debug", skip_all, fields(batch_index = batch_index))]
    pub async fn execute<R: BatchReader + ?Sized>(
        &mut self,
        reader: &R,
        batch_index: usize,
    ) -> Result<Option<RecordBatch>> {
        if self.limit.is_exhausted() {
            trace!("limit exhausted, skipping batch");
            return Ok(None);
        }

        let num_rows = reader
            .batch_row_count(batch_index)
            .map_err(Error::reader)?;
        let chunks = self.fetch(reader, batch_index, num_rows).await?;
        let validity = self.fetch_validity(reader, batch_index, num_rows).await?;

        let selection = match self.plan.filter() {
            Some(filter) => Selection::from_mask(&filter.evaluate(&chunks, num_rows)?),
            None => Selection::all(num_rows),
        };
        let slice = self.limit.plan(selection.num_selected());
        let selection = selection.truncate(slice.skip, slice.take);
        let batch = self
            .plan
            .assemble(batch_index, &chunks, &validity, &selection)?;

        self.limit.commit(slice);
        debug!(
            num_rows,
            num_selected = batch.num_rows(),
            skipped = slice.skip,
            remaining = %self.limit.remaining(),
            "executed batch"
        );
        if self.limit.is_exhausted() {
            debug!("limit reached");
        }
        Ok(Some(batch))
    }

    async fn fetch<R: BatchReader + ?Sized>(
        &self,
        reader: &R,
        batch_index: usize,
        num_rows: usize,
    ) -> Result<ColumnChunks> {
        let mut chunks = ColumnChunks::with_capacity(self.plan.covering_ids().len());
        for field_id in self.plan.covering_ids().iter().copied() {
            let chunk: ColumnChunk = reader
                .fetch_column(field_id, batch_index)
                .await
                .map_err(Error::reader)?;
            check_row_count(batch_index, field_id, chunk.len(), num_rows)?;
            chunks.insert(field_id, chunk);
        }
        trace!(num_chunks = chunks.len(), "fetched covering columns");
        Ok(chunks)
    }

    async fn fetch_validity<R: BatchReader + ?Sized>(
        &self,
        reader: &R,
        batch_index: usize,
        num_rows: usize,
    ) -> Result<StructValidity> {
        let mut validity = StructValidity::new();
        for field_id in self.plan.validity_ids().iter().copied() {
            let nulls = reader
                .fetch_validity(field_id, batch_index)
                .await
                .map_err(Error::reader)?;
            if let Some(nulls) = nulls {
                check_row_count(batch_index, field_id, nulls.len(), num_rows)?;
                validity.insert(field_id, nulls);
            }
        }
        Ok(validity)
    }

    /// Execute every batch of `reader` in order.
    ///
    /// Batches with no surviving rows are skipped and the stream ends as soon
    /// as the limit is reached.
    pub fn scan<R: BatchReader + ?Sized + 'static>(
        self,
        reader: Arc<R>,
    ) -> BoxStream<'static, Result<RecordBatch>> {
        futures::stream::try_unfold(
            (self, reader, 0_usize),
            |(mut project, reader, batch_index)| async move {
                if batch_index >= reader.num_batches() {
                    return Ok(None);
                }
                let batch = project.execute(reader.as_ref(), batch_index).await?;
                Ok::<_, Error>(batch.map(|batch| (batch, (project, reader, batch_index + 1))))
            },
        )
        .try_filter(|batch| futures::future::ready(batch.num_rows() > 0))
        .boxed()
    }
}

fn check_row_count(batch_index: usize, field_id: i32, len: usize, num_rows: usize) -> Result<()> {
    if len != num_rows {
        return Err(Error::InconsistentBatch {
            batch_index,
            message: format!(
                "field {} has {} rows but the batch has {}",
                field_id, len, num_rows
            ),
            location: location!(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow_array::{Int16Array, Int32Array};
    use arrow_schema::{DataType, Field as ArrowField, Schema as ArrowSchema};

    use crate::{
        exec::predicate::{col, lit},
        testing::InMemoryReader,
    };

    fn reader() -> InMemoryReader {
        let schema = Arc::new(ArrowSchema::new(vec![
            ArrowField::new("k", DataType::Int16, false),
            ArrowField::new("v", DataType::Int32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int16Array::from(vec![1, 2, 3, 4])),
                Arc::new(Int32Array::from(vec![10, 20, 30, 40])),
            ],
        )
        .unwrap();
        InMemoryReader::from_batches(vec![batch.clone(), batch]).unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_fork_resets_limit() {
        let reader = reader();
        let options = ProjectOptions {
            limit: Some(3),
            ..ProjectOptions::new(["v"])
        };
        let mut project = Project::try_new(reader.schema(), &options).unwrap();
        assert_eq!(project.execute(&reader, 0).await.unwrap().unwrap().num_rows(), 3);
        assert!(project.is_exhausted());

        let mut fork = project.fork();
        assert_eq!(fork.remaining(), RowBudget::Bounded(3));
        assert!(Arc::ptr_eq(fork.plan(), project.plan()));
        assert_eq!(fork.execute(&reader, 1).await.unwrap().unwrap().num_rows(), 3);
        assert!(project.execute(&reader, 1).await.unwrap().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_scan_skips_empty_batches() {
        let reader = Arc::new(reader());
        let options = ProjectOptions {
            filter: Some(col("k").gt(lit(2_i16))),
            ..ProjectOptions::new(["k"])
        };
        let project = Project::try_new(reader.schema(), &options).unwrap();
        let batches = project.scan(reader.clone()).try_collect::<Vec<_>>().await.unwrap();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.num_rows() == 2));

        let options = ProjectOptions {
            filter: Some(col("k").gt(lit(9_i16))),
            ..ProjectOptions::new(["k"])
        };
        let project = Project::try_new(reader.schema(), &options).unwrap();
        let batches = project.scan(reader).try_collect::<Vec<_>>().await.unwrap();
        assert!(batches.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_scan_stops_at_limit() {
        let reader = Arc::new(reader());
        let options = ProjectOptions {
            limit: Some(2),
            ..ProjectOptions::new(["v"])
        };
        let project = Project::try_new(reader.schema(), &options).unwrap();
        let batches = project.scan(reader.clone()).try_collect::<Vec<_>>().await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 2);
        assert_eq!(reader.fetched(), vec![(1, 0)]);
    }
}
