// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Lance Schema Field

use std::{cmp::max, collections::HashMap, fmt};

use arrow_schema::{DataType, Field as ArrowField, Fields};

use crate::{Error, Result};

/// Lance Schema Field
///
/// Struct fields carry their members in `children`. Every other type,
/// including lists, is a leaf as far as projection is concerned.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub id: i32,
    parent_id: i32,
    data_type: DataType,
    metadata: HashMap<String, String>,
    pub nullable: bool,

    pub children: Vec<Field>,
}

impl Field {
    /// Create a leaf field with an explicit field id.
    pub fn new(name: impl Into<String>, id: i32, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            id,
            parent_id: -1,
            data_type,
            metadata: HashMap::new(),
            nullable,
            children: vec![],
        }
    }

    /// Create a struct field with an explicit field id.
    pub fn new_struct(
        name: impl Into<String>,
        id: i32,
        children: Vec<Self>,
        nullable: bool,
    ) -> Self {
        let mut field = Self::new(name, id, DataType::Struct(Fields::empty()), nullable);
        field.children = children
            .into_iter()
            .map(|mut c| {
                c.parent_id = id;
                c
            })
            .collect();
        field
    }

    /// Returns arrow data type.
    pub fn data_type(&self) -> DataType {
        match &self.data_type {
            DataType::Struct(_) => {
                DataType::Struct(self.children.iter().map(ArrowField::from).collect())
            }
            dt => dt.clone(),
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.data_type, DataType::Struct(_))
    }

    /// Id of the enclosing struct field, or `-1` for top-level fields.
    pub fn parent_id(&self) -> i32 {
        self.parent_id
    }

    pub fn sub_field(&self, path_components: &[&str]) -> Option<&Self> {
        if path_components.is_empty() {
            Some(self)
        } else {
            let first = path_components[0];
            self.children
                .iter()
                .find(|c| c.name == first)
                .and_then(|c| c.sub_field(&path_components[1..]))
        }
    }

    /// Keep the fields whose id is in `ids`, plus their ancestors.
    ///
    /// If `include_all_children` is true, a selected struct keeps every
    /// child; otherwise only the children that are selected themselves.
    pub fn project_by_ids(&self, ids: &[i32], include_all_children: bool) -> Option<Self> {
        if ids.contains(&self.id) {
            if include_all_children {
                return Some(self.clone());
            }
            let children = self
                .children
                .iter()
                .filter_map(|c| c.project_by_ids(ids, include_all_children))
                .collect();
            return Some(Self {
                children,
                ..self.shallow_clone()
            });
        }
        let children = self
            .children
            .iter()
            .filter_map(|c| c.project_by_ids(ids, include_all_children))
            .collect::<Vec<_>>();
        if children.is_empty() {
            None
        } else {
            Some(Self {
                children,
                ..self.shallow_clone()
            })
        }
    }

    fn shallow_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            id: self.id,
            parent_id: self.parent_id,
            data_type: self.data_type.clone(),
            metadata: self.metadata.clone(),
            nullable: self.nullable,
            children: vec![],
        }
    }

    // Get the max field id of itself and all children.
    pub(super) fn max_id(&self) -> i32 {
        max(
            self.id,
            self.children.iter().map(|c| c.max_id()).max().unwrap_or(-1),
        )
    }

    /// Recursively set field ID and parent ID for this field and all its children.
    pub(super) fn set_id(&mut self, parent_id: i32, id_seed: &mut i32) {
        self.parent_id = parent_id;
        if self.id < 0 {
            self.id = *id_seed;
            *id_seed += 1;
        }
        let id = self.id;
        self.children
            .iter_mut()
            .for_each(|f| f.set_id(id, id_seed));
    }

    pub fn field_by_id(&self, id: impl Into<i32>) -> Option<&Self> {
        let id = id.into();
        for child in self.children.as_slice() {
            if child.id == id {
                return Some(child);
            }
            if let Some(grandchild) = child.field_by_id(id) {
                return Some(grandchild);
            }
        }
        None
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_struct() {
            write!(f, "Field(id={}, name={}, type=struct", self.id, self.name)?;
        } else {
            write!(
                f,
                "Field(id={}, name={}, type={}",
                self.id, self.name, self.data_type
            )?;
        }

        if !self.children.is_empty() {
            write!(f, ", children=[")?;
            for child in self.children.iter() {
                write!(f, "{}, ", child)?;
            }
            write!(f, "]")?;
        }

        write!(f, ")")
    }
}

impl TryFrom<&ArrowField> for Field {
    type Error = Error;

    fn try_from(field: &ArrowField) -> Result<Self> {
        let children = match field.data_type() {
            DataType::Struct(children) => children
                .iter()
                .map(|f| Self::try_from(f.as_ref()))
                .collect::<Result<_>>()?,
            DataType::Union(_, _) | DataType::RunEndEncoded(_, _) => {
                return Err(Error::Schema {
                    message: format!(
                        "Field {} has unsupported type {}",
                        field.name(),
                        field.data_type()
                    ),
                    location: snafu::location!(),
                })
            }
            _ => vec![],
        };
        Ok(Self {
            id: -1,
            parent_id: -1,
            name: field.name().clone(),
            // Struct members live in `children`.
            data_type: match field.data_type() {
                DataType::Struct(_) => DataType::Struct(Fields::empty()),
                dt => dt.clone(),
            },
            metadata: field.metadata().clone(),
            nullable: field.is_nullable(),
            children,
        })
    }
}

impl TryFrom<ArrowField> for Field {
    type Error = Error;

    fn try_from(field: ArrowField) -> Result<Self> {
        Self::try_from(&field)
    }
}

impl From<&Field> for ArrowField {
    fn from(field: &Field) -> Self {
        let out = Self::new(&field.name, field.data_type(), field.nullable);
        out.with_metadata(field.metadata.clone())
    }
}
