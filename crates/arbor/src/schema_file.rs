//! schema documents
//!
//! Schemas can be declared in yaml instead of code. Types are referenced by name: one of the primitive types
//! (`string`, `integer`, `decimal`, `boolean`) or the name of a record or variant declared in the same document.
//!
//! ```yaml
//! root: Conf
//! records:
//!   Conf:
//!     fields:
//!       dataset: DatasetMulti
//!       epochs: integer
//!   DatasetConf:
//!     fields:
//!       img_size: integer
//!     dependencies:
//!       - ""                                  # the root record
//!       - { path: model.arch, optional: true }
//!   LocalDatasetConf:
//!     fields:
//!       path: string
//! variants:
//!   DatasetMulti:
//!     superschema: DatasetConf
//!     options:
//!       local: LocalDatasetConf
//! ```
//!
//! Every name resolves to a single shared schema, so a record used in several places is the same type everywhere.
use crate::documents::LoadError;
use crate::error::{Error, Result};
use crate::schema::{FieldType, PrimitiveType, RecordSchema, Reference, VariantSchema};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDocument {
    /// Name of the root record
    pub root: String,
    #[serde(default)]
    pub records: IndexMap<String, RecordDecl>,
    #[serde(default)]
    pub variants: IndexMap<String, VariantDecl>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordDecl {
    /// field name to type name
    #[serde(default)]
    pub fields: IndexMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<ReferenceDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ReferenceDecl {
    Path(String),
    Full {
        path: String,
        #[serde(default)]
        optional: bool,
    },
}

impl From<&ReferenceDecl> for Reference {
    fn from(value: &ReferenceDecl) -> Self {
        match value {
            ReferenceDecl::Path(path) => Reference::new(path.clone()),
            ReferenceDecl::Full { path, optional } => Reference {
                path: path.clone(),
                optional: *optional,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantDecl {
    /// Record with the fields shared by all options, none when omitted
    #[serde(default)]
    pub superschema: Option<String>,
    /// option name to record name
    pub options: IndexMap<String, String>,
}

impl SchemaDocument {
    pub fn from_yaml(contents: &str) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_owned()).into());
        }

        tracing::info!(path = %path.display(), "loading schema");
        let contents = std::fs::read_to_string(path).map_err(LoadError::from)?;
        Self::from_yaml(&contents).map_err(|source| {
            LoadError::InvalidDocument {
                path: path.to_owned(),
                source: Box::new(source),
            }
            .into()
        })
    }

    /// Resolve all type names into the root record's schema tree
    #[tracing::instrument(level = "trace", skip_all, fields(root = %self.root))]
    pub fn resolve(&self) -> Result<Arc<RecordSchema>> {
        for name in self.records.keys() {
            if self.variants.contains_key(name) {
                return Err(Error::InvalidSchema(format!(
                    "'{name}' is declared as a record and as a variant"
                )));
            }
        }
        for name in self.records.keys().chain(self.variants.keys()) {
            if PrimitiveType::from_name(name).is_some() {
                return Err(Error::InvalidSchema(format!(
                    "'{name}' is a primitive type and can not be redeclared"
                )));
            }
        }

        TypeResolver::new(self).record(&self.root)
    }
}

#[derive(derive_new::new)]
struct TypeResolver<'d> {
    document: &'d SchemaDocument,
    #[new(default)]
    records: HashMap<String, Arc<RecordSchema>>,
    #[new(default)]
    variants: HashMap<String, Arc<VariantSchema>>,
    /// types currently being resolved
    #[new(default)]
    stack: Vec<String>,
}

impl<'d> TypeResolver<'d> {
    fn field_type(&mut self, name: &str) -> Result<FieldType> {
        if let Some(primitive) = PrimitiveType::from_name(name) {
            return Ok(primitive.into());
        }
        if self.document.records.contains_key(name) {
            return Ok(self.record(name)?.into());
        }
        if self.document.variants.contains_key(name) {
            return Ok(self.variant(name)?.into());
        }
        Err(Error::InvalidSchema(format!("unknown type '{name}'")))
    }

    fn enter(&mut self, name: &str) -> Result<()> {
        if self.stack.iter().any(|active| active == name) {
            let mut chain = self.stack.clone();
            chain.push(name.to_string());
            return Err(Error::InvalidSchema(format!(
                "recursive type: {}",
                chain.join(" -> ")
            )));
        }
        self.stack.push(name.to_string());
        Ok(())
    }

    fn record(&mut self, name: &str) -> Result<Arc<RecordSchema>> {
        if let Some(record) = self.records.get(name) {
            return Ok(record.clone());
        }

        let document = self.document;
        let declaration = document
            .records
            .get(name)
            .ok_or_else(|| Error::InvalidSchema(format!("unknown record '{name}'")))?;

        self.enter(name)?;
        let mut builder = RecordSchema::builder(name);
        for (field, type_name) in &declaration.fields {
            builder = builder.field(field.clone(), self.field_type(type_name)?);
        }
        for reference in &declaration.dependencies {
            builder = builder.depends_on(Reference::from(reference));
        }
        let record = builder.build()?;
        self.stack.pop();

        self.records.insert(name.to_string(), record.clone());
        Ok(record)
    }

    fn variant(&mut self, name: &str) -> Result<Arc<VariantSchema>> {
        if let Some(variant) = self.variants.get(name) {
            return Ok(variant.clone());
        }

        let document = self.document;
        let declaration = document
            .variants
            .get(name)
            .ok_or_else(|| Error::InvalidSchema(format!("unknown variant '{name}'")))?;

        self.enter(name)?;
        let superschema = match &declaration.superschema {
            Some(superschema) => self.record(superschema)?,
            None => RecordSchema::builder(format!("{name}Base")).build()?,
        };
        let mut builder = VariantSchema::builder(name, superschema);
        for (option, record) in &declaration.options {
            builder = builder.option(option.clone(), self.record(record)?);
        }
        let variant = builder.build()?;
        self.stack.pop();

        self.variants.insert(name.to_string(), variant.clone());
        Ok(variant)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::SchemaType;
    use pretty_assertions::assert_eq;

    const EXAMPLE: &str = r#"
root: Conf
records:
  Conf:
    fields:
      model: ModelConf
      dataset: DatasetMulti
  ModelConf:
    fields:
      arch: ArchMulti
    dependencies:
      - dataset
  DatasetConf:
    fields:
      img_size: integer
  LocalDatasetConf:
    fields:
      path: string
  ArchConf:
    fields:
      width: decimal
    dependencies:
      - { path: dataset }
      - { path: model, optional: true }
  VanillaConf: {}
variants:
  DatasetMulti:
    superschema: DatasetConf
    options:
      local: LocalDatasetConf
      plain: DatasetConf
  ArchMulti:
    superschema: ArchConf
    options:
      vanilla: VanillaConf
"#;

    #[test]
    fn resolves_example() {
        let root = SchemaDocument::from_yaml(EXAMPLE).unwrap().resolve().unwrap();

        assert_eq!(root.name(), "Conf");
        assert_eq!(root.fields().keys().collect::<Vec<_>>(), vec!["model", "dataset"]);

        let Some(FieldType::Record(model)) = root.field("model") else {
            panic!("model is a record");
        };
        assert_eq!(model.dependencies(), &[Reference::from("dataset")]);

        let Some(FieldType::Variant(arch)) = model.field("arch") else {
            panic!("arch is a variant");
        };
        let vanilla = arch.option("vanilla").unwrap();
        assert_eq!(vanilla.fields().keys().collect::<Vec<_>>(), vec!["width"]);
        assert_eq!(
            vanilla.dependencies(),
            &[Reference::from("dataset"), Reference::optional("model")]
        );
    }

    #[test]
    fn names_are_shared_types() {
        let root = SchemaDocument::from_yaml(EXAMPLE).unwrap().resolve().unwrap();
        let Some(FieldType::Variant(datasets)) = root.field("dataset") else {
            panic!("dataset is a variant");
        };

        // an option without own fields is its superschema
        assert_eq!(
            SchemaType::Record(datasets.option("plain").unwrap().clone()),
            SchemaType::Record(datasets.superschema().clone())
        );
    }

    #[test]
    fn recursive_types() {
        let document = SchemaDocument::from_yaml(
            "root: A\nrecords:\n  A:\n    fields:\n      b: B\n  B:\n    fields:\n      a: A\n",
        )
        .unwrap();
        let err = document.resolve().unwrap_err();
        assert!(
            matches!(err, Error::InvalidSchema(ref message) if message.contains("A -> B -> A")),
            "{err}"
        );
    }

    #[test]
    fn unknown_types() {
        let document =
            SchemaDocument::from_yaml("root: A\nrecords:\n  A:\n    fields:\n      b: float\n").unwrap();
        assert!(matches!(document.resolve(), Err(Error::InvalidSchema(_))));

        let document = SchemaDocument::from_yaml("root: Missing\n").unwrap();
        assert!(matches!(document.resolve(), Err(Error::InvalidSchema(_))));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(SchemaDocument::from_yaml("root: A\nrecord: {}\n").is_err());
    }
}
