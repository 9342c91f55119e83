//! schema model
//!
//! A schema is a tree of [RecordSchema]s. A record has ordered fields, each of which is a primitive, a nested record
//! or a [VariantSchema]. A variant is a closed set of named options that all extend a common superschema, exactly
//! one of which is selected in a configuration.
//!
//! Schemas are immutable once built and shared through [Arc]s. The same record may appear at several places in a
//! tree.
use crate::error::{Error, Result};
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::Arc;

/// Types of scalar fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Integer,
    Decimal,
    Boolean,
}

impl PrimitiveType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(PrimitiveType::String),
            "integer" => Some(PrimitiveType::Integer),
            "decimal" => Some(PrimitiveType::Decimal),
            "boolean" => Some(PrimitiveType::Boolean),
            _ => None,
        }
    }

    /// Parse a raw string (from the command line or a condition key) into a value of this type
    pub fn parse(self, raw: &str) -> Result<Value, String> {
        match self {
            PrimitiveType::String => Ok(Value::String(raw.to_string())),
            PrimitiveType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| format!("'{raw}' is not an integer: {e}")),
            PrimitiveType::Decimal => raw
                .trim()
                .parse::<f64>()
                .map(Value::Decimal)
                .map_err(|e| format!("'{raw}' is not a decimal: {e}")),
            PrimitiveType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(format!("'{raw}' is not a boolean (true/false)")),
            },
        }
    }

    /// Check a literal against this type
    ///
    /// Integers are accepted as decimals, nothing else converts.
    pub fn coerce(self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (PrimitiveType::String, value @ Value::String(_))
            | (PrimitiveType::Integer, value @ Value::Integer(_))
            | (PrimitiveType::Decimal, value @ Value::Decimal(_))
            | (PrimitiveType::Boolean, value @ Value::Boolean(_)) => Ok(value),
            (PrimitiveType::Decimal, Value::Integer(int)) => Ok(Value::Decimal(int as f64)),
            (expected, value) => Err(format!(
                "expected {expected}, found {} '{value}'",
                value.type_name()
            )),
        }
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimitiveType::String => f.write_str("string"),
            PrimitiveType::Integer => f.write_str("integer"),
            PrimitiveType::Decimal => f.write_str("decimal"),
            PrimitiveType::Boolean => f.write_str("boolean"),
        }
    }
}

/// Type of a record field
#[derive(Debug, Clone)]
pub enum FieldType {
    Primitive(PrimitiveType),
    Record(Arc<RecordSchema>),
    Variant(Arc<VariantSchema>),
}

impl FieldType {
    /// The nested schema, if this is not a primitive
    pub fn as_schema(&self) -> Option<SchemaType> {
        match self {
            FieldType::Primitive(_) => None,
            FieldType::Record(record) => Some(SchemaType::Record(record.clone())),
            FieldType::Variant(variant) => Some(SchemaType::Variant(variant.clone())),
        }
    }

    fn same_as(&self, other: &FieldType) -> bool {
        match (self, other) {
            (FieldType::Primitive(a), FieldType::Primitive(b)) => a == b,
            (FieldType::Record(a), FieldType::Record(b)) => Arc::ptr_eq(a, b),
            (FieldType::Variant(a), FieldType::Variant(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<PrimitiveType> for FieldType {
    fn from(value: PrimitiveType) -> Self {
        FieldType::Primitive(value)
    }
}

impl From<Arc<RecordSchema>> for FieldType {
    fn from(value: Arc<RecordSchema>) -> Self {
        FieldType::Record(value)
    }
}

impl From<Arc<VariantSchema>> for FieldType {
    fn from(value: Arc<VariantSchema>) -> Self {
        FieldType::Variant(value)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Primitive(primitive) => primitive.fmt(f),
            FieldType::Record(record) => f.write_str(record.name()),
            FieldType::Variant(variant) => f.write_str(variant.name()),
        }
    }
}

/// A declared dependency on another node of the tree
///
/// The path is absolute, starting at the root record. An optional reference may be missing in some options of the
/// variants it passes through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_new::new)]
pub struct Reference {
    pub path: String,
    #[new(default)]
    pub optional: bool,
}

impl Reference {
    pub fn optional(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            optional: true,
        }
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Reference::new(value.to_string())
    }
}

/// A fixed, named set of typed fields
#[derive(Debug)]
pub struct RecordSchema {
    name: String,
    fields: IndexMap<String, FieldType>,
    dependencies: Vec<Reference>,
}

impl RecordSchema {
    pub fn builder(name: impl Into<String>) -> RecordBuilder {
        RecordBuilder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &IndexMap<String, FieldType> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    /// Declared (unvalidated) dependencies
    pub fn dependencies(&self) -> &[Reference] {
        &self.dependencies
    }
}

#[derive(derive_new::new)]
pub struct RecordBuilder {
    name: String,
    #[new(default)]
    fields: IndexMap<String, FieldType>,
    #[new(default)]
    dependencies: Vec<Reference>,
    #[new(default)]
    duplicates: Vec<String>,
}

impl RecordBuilder {
    pub fn field(mut self, name: impl Into<String>, ty: impl Into<FieldType>) -> Self {
        let name = name.into();
        if self.fields.contains_key(&name) {
            self.duplicates.push(name);
        } else {
            self.fields.insert(name, ty.into());
        }
        self
    }

    pub fn string(self, name: impl Into<String>) -> Self {
        self.field(name, PrimitiveType::String)
    }

    pub fn integer(self, name: impl Into<String>) -> Self {
        self.field(name, PrimitiveType::Integer)
    }

    pub fn decimal(self, name: impl Into<String>) -> Self {
        self.field(name, PrimitiveType::Decimal)
    }

    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.field(name, PrimitiveType::Boolean)
    }

    pub fn depends_on(mut self, reference: impl Into<Reference>) -> Self {
        self.dependencies.push(reference.into());
        self
    }

    pub fn build(self) -> Result<Arc<RecordSchema>> {
        if let Some(duplicate) = self.duplicates.first() {
            return Err(Error::InvalidSchema(format!(
                "field '{duplicate}' is declared twice in {}",
                self.name
            )));
        }

        Ok(Arc::new(RecordSchema {
            name: self.name,
            fields: self.fields,
            dependencies: self.dependencies,
        }))
    }
}

/// A closed set of named options extending a common superschema
///
/// Every option is stored as its effective record: the superschema's fields followed by the option's own fields,
/// and the superschema's dependencies followed by the option's own dependencies.
#[derive(Debug)]
pub struct VariantSchema {
    name: String,
    superschema: Arc<RecordSchema>,
    options: IndexMap<String, Arc<RecordSchema>>,
}

impl VariantSchema {
    /// Start declaring a variant
    ///
    /// The superschema is required up front, options are added on the builder. A variant without options can not be
    /// built.
    pub fn builder(name: impl Into<String>, superschema: Arc<RecordSchema>) -> VariantBuilder {
        VariantBuilder::new(name.into(), superschema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superschema(&self) -> &Arc<RecordSchema> {
        &self.superschema
    }

    /// Effective option records, in declaration order
    pub fn options(&self) -> &IndexMap<String, Arc<RecordSchema>> {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&Arc<RecordSchema>> {
        self.options.get(name)
    }

    pub fn option_names(&self) -> Vec<String> {
        self.options.keys().cloned().collect()
    }

    /// The option selected when nothing else decides
    pub fn first_option(&self) -> (&String, &Arc<RecordSchema>) {
        self.options
            .first()
            .expect("variants are built with at least one option")
    }

    /// Select an option by name
    pub fn select(&self, selected: &str) -> Result<&Arc<RecordSchema>> {
        self.options
            .get(selected)
            .ok_or_else(|| Error::InvalidOption {
                variant: self.name.clone(),
                selected: selected.to_string(),
                options: self.option_names(),
            })
    }
}

#[derive(derive_new::new)]
pub struct VariantBuilder {
    name: String,
    superschema: Arc<RecordSchema>,
    #[new(default)]
    options: Vec<(String, Arc<RecordSchema>)>,
}

impl VariantBuilder {
    /// Add an option. Only the option's own fields are given, the superschema's fields are implied.
    pub fn option(mut self, name: impl Into<String>, record: Arc<RecordSchema>) -> Self {
        self.options.push((name.into(), record));
        self
    }

    pub fn build(self) -> Result<Arc<VariantSchema>> {
        if self.options.is_empty() {
            return Err(Error::InvalidSchema(format!(
                "variant {} declares no options",
                self.name
            )));
        }

        let mut options = IndexMap::with_capacity(self.options.len());
        for (option_name, record) in self.options {
            if self.superschema.fields.contains_key(&option_name) {
                return Err(Error::InvalidSchema(format!(
                    "option '{option_name}' of {} has the same name as a field of {}",
                    self.name, self.superschema.name
                )));
            }

            if options.contains_key(&option_name) {
                return Err(Error::InvalidSchema(format!(
                    "option '{option_name}' is declared twice in {}",
                    self.name
                )));
            }

            let effective = Self::extend(&self.superschema, &record)?;
            options.insert(option_name, effective);
        }

        Ok(Arc::new(VariantSchema {
            name: self.name,
            superschema: self.superschema,
            options,
        }))
    }

    fn extend(superschema: &Arc<RecordSchema>, option: &Arc<RecordSchema>) -> Result<Arc<RecordSchema>> {
        if option.fields.is_empty() && option.dependencies.is_empty() {
            return Ok(superschema.clone());
        }
        if Arc::ptr_eq(superschema, option) {
            return Ok(option.clone());
        }

        let mut fields = superschema.fields.clone();
        for (field_name, ty) in &option.fields {
            match fields.get(field_name) {
                Some(existing) if existing.same_as(ty) => {}
                Some(existing) => {
                    return Err(Error::InvalidSchema(format!(
                        "{}.{field_name} is {ty} but {}.{field_name} is {existing}",
                        option.name, superschema.name
                    )))
                }
                None => {
                    fields.insert(field_name.clone(), ty.clone());
                }
            }
        }

        let mut dependencies = superschema.dependencies.clone();
        for reference in &option.dependencies {
            if !dependencies.contains(reference) {
                dependencies.push(reference.clone());
            }
        }

        Ok(Arc::new(RecordSchema {
            name: option.name.clone(),
            fields,
            dependencies,
        }))
    }
}

/// A node of the schema tree, either a record or a variant
///
/// Two schema types are equal when they are the very same declaration.
#[derive(Debug, Clone)]
pub enum SchemaType {
    Record(Arc<RecordSchema>),
    Variant(Arc<VariantSchema>),
}

impl SchemaType {
    pub fn name(&self) -> &str {
        match self {
            SchemaType::Record(record) => record.name(),
            SchemaType::Variant(variant) => variant.name(),
        }
    }

    /// Records that make up this node: the record itself, or every option of a variant
    pub fn records(&self) -> Vec<&Arc<RecordSchema>> {
        match self {
            SchemaType::Record(record) => vec![record],
            SchemaType::Variant(variant) => variant.options().values().collect(),
        }
    }

    /// Declared dependencies of this node
    ///
    /// For a variant this is the union over all options, the selection is not known when ordering.
    pub fn dependencies(&self) -> Vec<&Reference> {
        let mut dependencies: Vec<&Reference> = vec![];
        for record in self.records() {
            for reference in record.dependencies() {
                if !dependencies.contains(&reference) {
                    dependencies.push(reference);
                }
            }
        }
        dependencies
    }
}

impl PartialEq for SchemaType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SchemaType::Record(a), SchemaType::Record(b)) => Arc::ptr_eq(a, b),
            (SchemaType::Variant(a), SchemaType::Variant(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Display for SchemaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
