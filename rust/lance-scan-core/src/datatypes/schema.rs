// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Schema

use std::{
    collections::{HashMap, HashSet},
    fmt::{self, Formatter},
};

use arrow_schema::{Field as ArrowField, Schema as ArrowSchema};
use snafu::location;

use super::{field::Field, PATH_SEPARATOR};
use crate::{Error, Result};

/// Lance Schema.
#[derive(Default, Debug, Clone)]
pub struct Schema {
    /// Top-level fields in the dataset.
    pub fields: Vec<Field>,
    /// Metadata of the schema
    pub metadata: HashMap<String, String>,
}

/// State for a pre-order DFS iterator over the fields of a schema.
struct SchemaFieldIterPreOrder<'a> {
    field_stack: Vec<&'a Field>,
}

impl<'a> SchemaFieldIterPreOrder<'a> {
    fn new(schema: &'a Schema) -> Self {
        let mut field_stack = Vec::with_capacity(schema.fields.len() * 2);
        for field in schema.fields.iter().rev() {
            field_stack.push(field);
        }
        Self { field_stack }
    }
}

/// Iterator implementation for a pre-order traversal of fields
impl<'a> Iterator for SchemaFieldIterPreOrder<'a> {
    type Item = &'a Field;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(next_field) = self.field_stack.pop() {
            for child in next_field.children.iter().rev() {
                self.field_stack.push(child);
            }
            Some(next_field)
        } else {
            None
        }
    }
}

impl Schema {
    /// Build a schema from fields that already carry their ids.
    ///
    /// Fields with a negative id are assigned fresh ids after the largest
    /// existing one.
    pub fn try_new(fields: Vec<Field>) -> Result<Self> {
        let mut schema = Self {
            fields,
            metadata: HashMap::new(),
        };
        schema.set_field_id(None);
        schema.validate()?;
        Ok(schema)
    }

    /// Check that field names are usable as dotted paths and that every
    /// field id is unique and non-negative.
    pub fn validate(&self) -> Result<()> {
        // Paths are resolved through ids, so ids are checked first.
        let mut seen_ids = HashSet::new();
        for field in self.fields_pre_order() {
            if !seen_ids.insert(field.id) {
                return Err(Error::Schema {
                    message: format!("Duplicate field id {} in schema {:?}", field.id, self),
                    location: location!(),
                });
            }
        }

        let mut seen_names = HashSet::new();
        for field in self.fields_pre_order() {
            if field.name.contains(PATH_SEPARATOR) {
                return Err(Error::Schema {
                    message: format!(
                        "Field {} cannot contain `{}`. Maybe you meant to create a struct field?",
                        field.name, PATH_SEPARATOR
                    ),
                    location: location!(),
                });
            }
            if field.id < 0 {
                return Err(Error::Schema {
                    message: format!("Field {} has a negative id {}", field.name, field.id),
                    location: location!(),
                });
            }
            let column_path = self.field_path(field.id).ok_or_else(|| {
                Error::internal(format!("field {} is not reachable from the root", field.id))
            })?;
            if !seen_names.insert(column_path.clone()) {
                return Err(Error::Schema {
                    message: format!("Duplicate field name \"{}\" in schema", column_path),
                    location: location!(),
                });
            }
        }

        Ok(())
    }

    /// Iterates over the fields using a pre-order traversal
    ///
    /// This is a DFS traversal where the parent is visited
    /// before its children
    pub fn fields_pre_order(&self) -> impl Iterator<Item = &Field> {
        SchemaFieldIterPreOrder::new(self)
    }

    /// Returns a new schema that only contains the fields in `column_ids`.
    ///
    /// This projection can filter out both top-level and nested fields
    ///
    /// If `include_all_children` is true, then if a parent field id is passed,
    /// then all children of that field will be included in the projection
    /// regardless of whether their ids were passed. If this is false, then
    /// only the child fields with the passed ids will be included.
    pub fn project_by_ids(&self, column_ids: &[i32], include_all_children: bool) -> Self {
        let filtered_fields = self
            .fields
            .iter()
            .filter_map(|f| f.project_by_ids(column_ids, include_all_children))
            .collect();
        Self {
            fields: filtered_fields,
            metadata: self.metadata.clone(),
        }
    }

    /// Get a field by its dotted path. Return `None` if the field does not exist.
    pub fn field(&self, name: &str) -> Option<&Field> {
        let split = name.split(PATH_SEPARATOR).collect::<Vec<_>>();
        self.fields
            .iter()
            .find(|f| f.name == split[0])
            .and_then(|c| c.sub_field(&split[1..]))
    }

    /// Resolve a dotted column path to its field id.
    pub fn field_id(&self, column: &str) -> Result<i32> {
        self.field(column)
            .map(|f| f.id)
            .ok_or_else(|| Error::UnknownColumn {
                name: column.to_string(),
                location: location!(),
            })
    }

    pub fn top_level_field_ids(&self) -> Vec<i32> {
        self.fields.iter().map(|f| f.id).collect()
    }

    // Recursively collect all the field IDs, in pre-order traversal order.
    pub fn field_ids(&self) -> Vec<i32> {
        self.fields_pre_order().map(|f| f.id).collect()
    }

    /// Get field by its id.
    pub fn field_by_id(&self, id: impl Into<i32>) -> Option<&Field> {
        let id = id.into();
        for field in self.fields.iter() {
            if field.id == id {
                return Some(field);
            }
            if let Some(grandchild) = field.field_by_id(id) {
                return Some(grandchild);
            }
        }
        None
    }

    /// Get the sequence of fields from the root to the field with the given id.
    pub fn field_ancestry_by_id(&self, id: i32) -> Option<Vec<&Field>> {
        let mut to_visit = self.fields.iter().map(|f| vec![f]).collect::<Vec<_>>();
        while let Some(path) = to_visit.pop() {
            let field = *path.last()?;
            if field.id == id {
                return Some(path);
            }
            for child in field.children.iter() {
                let mut new_path = path.clone();
                new_path.push(child);
                to_visit.push(new_path);
            }
        }
        None
    }

    /// The dotted path of the field with the given id, i.e. `"point.x"`.
    pub fn field_path(&self, id: i32) -> Option<String> {
        self.field_ancestry_by_id(id).map(|ancestry| {
            ancestry
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(&PATH_SEPARATOR.to_string())
        })
    }

    /// Get the maximum field id in the schema.
    pub fn max_field_id(&self) -> Option<i32> {
        self.fields.iter().map(|f| f.max_id()).max()
    }

    /// Walk through the fields and assign a new field id to each field that does
    /// not have one (e.g. is set to -1)
    ///
    /// If `max_existing_id` is lower than the maximum field id in this schema,
    /// the ids are assigned starting after the schema's own maximum.
    pub fn set_field_id(&mut self, max_existing_id: Option<i32>) {
        let schema_max_id = self.max_field_id().unwrap_or(-1);
        let max_existing_id = max_existing_id.unwrap_or(-1);
        let mut current_id = schema_max_id.max(max_existing_id) + 1;
        self.fields
            .iter_mut()
            .for_each(|f| f.set_id(-1, &mut current_id));
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for field in self.fields.iter() {
            writeln!(f, "{field}")?
        }
        Ok(())
    }
}

/// Convert an Arrow schema into a Lance schema, assigning field ids in pre-order.
impl TryFrom<&ArrowSchema> for Schema {
    type Error = Error;

    fn try_from(schema: &ArrowSchema) -> Result<Self> {
        let mut schema = Self {
            fields: schema
                .fields
                .iter()
                .map(|f| Field::try_from(f.as_ref()))
                .collect::<Result<_>>()?,
            metadata: schema.metadata.clone(),
        };
        schema.set_field_id(None);
        schema.validate()?;

        Ok(schema)
    }
}

/// Convert Lance Schema to Arrow Schema
impl From<&Schema> for ArrowSchema {
    fn from(schema: &Schema) -> Self {
        Self::new_with_metadata(
            schema
                .fields
                .iter()
                .map(ArrowField::from)
                .collect::<Vec<_>>(),
            schema.metadata.clone(),
        )
    }
}
