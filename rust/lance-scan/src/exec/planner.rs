// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Resolve requested columns into the field ids a scan reads and returns.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use arrow_array::{Array, ArrayRef, RecordBatch, RecordBatchOptions, StructArray};
use arrow_buffer::NullBuffer;
use arrow_schema::{Fields, Schema as ArrowSchema, SchemaRef};
use lance_scan_core::{
    datatypes::{Field, Schema},
    Error, Result,
};
use snafu::location;
use tracing::debug;

use super::{
    filter::ColumnChunks,
    predicate::{BoundPredicate, Predicate},
    selection::Selection,
};

/// Validity of the partly requested structs of one batch, keyed by field id.
/// A struct with no nulls has no entry.
pub type StructValidity = HashMap<i32, NullBuffer>;

/// The resolved, immutable part of a scan.
///
/// Built once per [`super::Project`] and shared by every batch and by every
/// fork of it.
#[derive(Debug)]
pub struct ProjectionPlan {
    schema: Arc<Schema>,
    /// Requested fields in schema pre-order. A field whose ancestor is
    /// also requested is dropped.
    output_ids: Vec<i32>,
    /// `output_ids` plus the fields read by the filter, in schema pre-order.
    covering_ids: Vec<i32>,
    /// Structs in the output that are only partly requested. Their
    /// validity is read so they can be rebuilt.
    validity_ids: Vec<i32>,
    output_schema: Schema,
    arrow_schema: SchemaRef,
    filter: Option<BoundPredicate>,
}

impl ProjectionPlan {
    pub fn try_new(
        schema: Arc<Schema>,
        columns: &[impl AsRef<str>],
        filter: Option<&Predicate>,
    ) -> Result<Self> {
        if columns.is_empty() && filter.is_none() {
            return Err(Error::EmptyProjection {
                location: location!(),
            });
        }

        let requested = columns
            .iter()
            .map(|c| schema.field_id(c.as_ref()))
            .collect::<Result<HashSet<_>>>()?;
        let filter = filter.map(|f| f.bind(&schema)).transpose()?;

        let output_ids = schema
            .fields_pre_order()
            .filter(|f| requested.contains(&f.id))
            .filter(|f| !has_requested_ancestor(&schema, f, &requested))
            .map(|f| f.id)
            .collect::<Vec<_>>();

        let mut covering = output_ids.iter().copied().collect::<HashSet<_>>();
        if let Some(filter) = &filter {
            covering.extend(filter.referenced_fields().iter().copied());
        }
        let covering_ids = schema
            .field_ids()
            .into_iter()
            .filter(|id| covering.contains(id))
            .collect::<Vec<_>>();

        let output_schema = schema.project_by_ids(&output_ids, true);
        let arrow_schema = Arc::new(ArrowSchema::from(&output_schema));
        let validity_ids = output_schema
            .fields_pre_order()
            .filter(|f| !requested.contains(&f.id))
            .filter(|f| !has_requested_ancestor(&schema, f, &requested))
            .map(|f| f.id)
            .collect::<Vec<_>>();

        debug!(
            output = ?output_ids,
            covering = ?covering_ids,
            validity = ?validity_ids,
            filter = ?filter.as_ref().map(ToString::to_string),
            "resolved projection"
        );

        Ok(Self {
            schema,
            output_ids,
            covering_ids,
            validity_ids,
            output_schema,
            arrow_schema,
            filter,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn output_ids(&self) -> &[i32] {
        &self.output_ids
    }

    /// Field ids fetched from the reader for every batch.
    pub fn covering_ids(&self) -> &[i32] {
        &self.covering_ids
    }

    /// Struct fields whose validity is read for every batch.
    pub fn validity_ids(&self) -> &[i32] {
        &self.validity_ids
    }

    /// The schema of the output batches, with field ids.
    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        self.arrow_schema.clone()
    }

    pub fn filter(&self) -> Option<&BoundPredicate> {
        self.filter.as_ref()
    }

    /// Build the output batch from the covering chunks of one batch.
    ///
    /// Only output chunks are sliced; chunks fetched for the filter alone
    /// are ignored.
    pub(crate) fn assemble(
        &self,
        batch_index: usize,
        chunks: &ColumnChunks,
        validity: &StructValidity,
        selection: &Selection,
    ) -> Result<RecordBatch> {
        let mut columns = HashMap::with_capacity(self.output_ids.len());
        for id in &self.output_ids {
            let chunk = chunks.get(id).ok_or_else(|| {
                Error::internal(format!("output field {} was not read", id))
            })?;
            columns.insert(*id, selection.apply(chunk)?);
        }
        let mut nulls = HashMap::with_capacity(validity.len());
        for id in &self.validity_ids {
            if let Some(validity) = validity.get(id) {
                nulls.insert(*id, selection.apply_nulls(validity)?);
            }
        }
        let assembly = Assembly {
            batch_index,
            requested: self.output_ids.iter().copied().collect(),
            columns,
            nulls,
        };

        let columns = self
            .output_schema
            .fields
            .iter()
            .map(|f| assembly.field(f))
            .collect::<Result<Vec<_>>>()?;

        let options = RecordBatchOptions::new().with_row_count(Some(selection.num_selected()));
        RecordBatch::try_new_with_options(self.arrow_schema.clone(), columns, &options).map_err(
            |e| Error::InconsistentBatch {
                batch_index,
                message: e.to_string(),
                location: location!(),
            },
        )
    }
}

fn has_requested_ancestor(schema: &Schema, field: &Field, requested: &HashSet<i32>) -> bool {
    let mut parent_id = field.parent_id();
    while parent_id >= 0 {
        if requested.contains(&parent_id) {
            return true;
        }
        parent_id = match schema.field_by_id(parent_id) {
            Some(parent) => parent.parent_id(),
            None => return false,
        };
    }
    false
}

/// The selected rows of one batch, ready to be put together into output
/// columns.
struct Assembly {
    batch_index: usize,
    requested: HashSet<i32>,
    columns: HashMap<i32, ArrayRef>,
    nulls: HashMap<i32, NullBuffer>,
}

impl Assembly {
    /// Produce the column for `field` of the output schema.
    ///
    /// A requested field is taken as read. A struct that is only partly
    /// requested is rebuilt from its requested descendants and its own
    /// validity.
    fn field(&self, field: &Field) -> Result<ArrayRef> {
        if self.requested.contains(&field.id) {
            let chunk = self.columns.get(&field.id).ok_or_else(|| {
                Error::internal(format!("output field {} was not sliced", field.id))
            })?;
            let expected = field.data_type();
            if chunk.data_type() != &expected {
                return Err(self.inconsistent(format!(
                    "column {} has type {} but the schema declares {}",
                    field.name,
                    chunk.data_type(),
                    expected
                )));
            }
            return Ok(chunk.clone());
        }

        let children = field
            .children
            .iter()
            .map(|c| self.field(c))
            .collect::<Result<Vec<_>>>()?;
        let fields = field.children.iter().map(arrow_schema::Field::from).collect::<Fields>();
        let nulls = self.nulls.get(&field.id).cloned();
        let array = StructArray::try_new(fields, children, nulls).map_err(|e| {
            self.inconsistent(format!("cannot rebuild struct {}: {}", field.name, e))
        })?;
        Ok(Arc::new(array))
    }

    fn inconsistent(&self, message: String) -> Error {
        Error::InconsistentBatch {
            batch_index: self.batch_index,
            message,
            location: location!(),
        }
    }
}
