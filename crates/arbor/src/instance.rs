//! configuration instances
//!
//! The configuration being built is an owned tree mirroring the schema. Every record field starts out
//! [Field::Unset] and is filled in when the node holding it is visited. A variant instance owns exactly one
//! selected option at a time.
//!
//! The plain form ([RecordInstance::to_value]) emits every field. Unset fields are written as [UNSET] and a variant
//! contributes its selected option's fields next to a [SELECTION_KEY] entry:
//!
//! ```yaml
//! some_field: ???
//! some_multi:
//!   _selected: first
//!   field_a: ???
//! ```
use crate::error::{Error, Result};
use crate::schema::{FieldType, RecordSchema, VariantSchema};
use crate::util::split_path;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// Marker of an unset field, in documents and on the command line
pub const UNSET: &str = "???";

/// Key carrying the selected option of a variant
pub const SELECTION_KEY: &str = "_selected";

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Unset,
    Value(Value),
    Record(RecordInstance),
    Variant(VariantInstance),
}

impl Field {
    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Field::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&VariantInstance> {
        match self {
            Field::Variant(variant) => Some(variant),
            _ => None,
        }
    }
}

/// What a field is set to while building
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Unset,
    Value(Value),
    /// Name of the option to select
    Select(String),
}

#[derive(Debug, Clone)]
pub struct RecordInstance {
    schema: Arc<RecordSchema>,
    fields: IndexMap<String, Field>,
}

impl RecordInstance {
    /// A record with all fields unset
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        let fields = schema
            .fields()
            .keys()
            .map(|name| (name.clone(), Field::Unset))
            .collect();
        Self { schema, fields }
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    /// The record at a path below this one
    ///
    /// A variant on the way resolves to its selected option. `None` when a node on the path has not been created or
    /// the selected option does not have the field.
    pub fn lookup(&self, path: &str) -> Option<&RecordInstance> {
        split_path(path)
            .into_iter()
            .try_fold(self, |record, segment| match record.get(segment)? {
                Field::Record(nested) => Some(nested),
                Field::Variant(variant) => Some(variant.config()),
                Field::Unset | Field::Value(_) => None,
            })
    }

    pub(crate) fn lookup_mut(&mut self, path: &str) -> Option<&mut RecordInstance> {
        split_path(path)
            .into_iter()
            .try_fold(self, |record, segment| match record.get_mut(segment)? {
                Field::Record(nested) => Some(nested),
                Field::Variant(variant) => Some(variant.config_mut()),
                Field::Unset | Field::Value(_) => None,
            })
    }

    /// Set a primitive or variant field
    ///
    /// Selecting the option that is already selected keeps the existing option instance, any other selection
    /// replaces it with a fresh one.
    pub(crate) fn assign(&mut self, name: &str, assignment: Assignment) -> Result<()> {
        let ty = self.schema.field(name).cloned().ok_or_else(|| {
            Error::invariant(format!("{} has no field '{name}'", self.schema.name()))
        })?;
        let field = self.fields.get_mut(name).ok_or_else(|| {
            Error::invariant(format!("instance of {} misses field '{name}'", self.schema.name()))
        })?;

        *field = match (ty, assignment) {
            (_, Assignment::Unset) => Field::Unset,
            (FieldType::Primitive(_), Assignment::Value(value)) => Field::Value(value),
            (FieldType::Variant(variant), Assignment::Select(selected)) => match &*field {
                Field::Variant(current) if current.selected() == selected => return Ok(()),
                _ => Field::Variant(VariantInstance::new(variant, &selected)?),
            },
            (ty, assignment) => {
                return Err(Error::invariant(format!(
                    "can not assign {assignment:?} to the {ty} field '{name}'"
                )))
            }
        };

        Ok(())
    }

    /// Plain nested form of the configuration
    pub fn to_value(&self) -> Value {
        Value::Object(self.object())
    }

    fn object(&self) -> IndexMap<String, Value> {
        self.fields
            .iter()
            .map(|(name, field)| {
                let value = match field {
                    Field::Unset => Value::from(UNSET),
                    Field::Value(value) => value.clone(),
                    Field::Record(record) => record.to_value(),
                    Field::Variant(variant) => variant.to_value(),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

impl PartialEq for RecordInstance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema) && self.fields == other.fields
    }
}

impl serde::ser::Serialize for RecordInstance {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde::Serialize::serialize(&self.to_value(), serializer)
    }
}

#[derive(Debug, Clone)]
pub struct VariantInstance {
    schema: Arc<VariantSchema>,
    selected: String,
    config: RecordInstance,
}

impl VariantInstance {
    /// Select an option, creating an instance of its record
    pub fn new(schema: Arc<VariantSchema>, selected: &str) -> Result<Self> {
        let record = schema.select(selected)?.clone();
        Ok(Self {
            schema,
            selected: selected.to_string(),
            config: RecordInstance::new(record),
        })
    }

    pub fn schema(&self) -> &Arc<VariantSchema> {
        &self.schema
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    /// Instance of the selected option
    pub fn config(&self) -> &RecordInstance {
        &self.config
    }

    pub(crate) fn config_mut(&mut self) -> &mut RecordInstance {
        &mut self.config
    }

    pub fn to_value(&self) -> Value {
        let mut object = IndexMap::with_capacity(self.config.fields.len() + 1);
        object.insert(SELECTION_KEY.to_string(), Value::from(self.selected.as_str()));
        object.extend(self.config.object());
        Value::Object(object)
    }
}

impl PartialEq for VariantInstance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
            && self.selected == other.selected
            && self.config == other.config
    }
}
