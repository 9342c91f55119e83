//! building a configuration
//!
//! [build] runs every pass in sequence: validation, build order, defaults loading and instantiation. Nodes are
//! instantiated in build order. Each visit creates the node if needed and then assigns the node's own primitive and
//! variant fields from the first source that has a value:
//! 1. the command line ([Overrides])
//! 2. the loaded document, if `load_path` names one. It has to contain every field that is not set on the command
//!    line.
//! 3. the node's resolved defaults
//! 4. unset. An unset variant selects its first option and reports a [Warning].
use crate::defaults::{DefaultsLoader, DefaultsTree};
use crate::documents::{load_document, require_directory};
use crate::error::{Error, Result};
use crate::instance::{Assignment, Field, RecordInstance, VariantInstance, SELECTION_KEY, UNSET};
use crate::order::build_order;
use crate::query::DefaultsResolver;
use crate::schema::{FieldType, PrimitiveType, RecordSchema, VariantSchema};
use crate::util::{display_path, join_path, split_path};
use crate::validate::ValidatedSchema;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reserved override naming a previously written configuration to load
pub const LOAD_PATH: &str = "load_path";

/// Raw values from the command line, by dotted field path
///
/// A path without a value behaves as if it was not given at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    values: IndexMap<String, Option<String>>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(path.into(), Some(value.into()));
        self
    }

    /// Mention a path without a value
    pub fn set_none(&mut self, path: impl Into<String>) -> &mut Self {
        self.values.insert(path.into(), None);
        self
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.values.get(path)?.as_deref()
    }

    pub fn load_path(&self) -> Option<&Path> {
        self.get(LOAD_PATH).map(Path::new)
    }

    /// Every path has to name a primitive or variant field somewhere in the schema
    pub fn validate(&self, schema: &ValidatedSchema) -> Result<()> {
        match self
            .values
            .keys()
            .find(|path| path.as_str() != LOAD_PATH && !schema.has_field(path))
        {
            Some(path) => Err(Error::UnknownField { path: path.clone() }),
            None => Ok(()),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Overrides {
    fn from_iter<T: IntoIterator<Item = (K, Option<String>)>>(iter: T) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(path, value)| (path.into(), value))
                .collect(),
        }
    }
}

/// Recoverable events of a build
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// Nothing selected an option, the first one was picked
    AutoSelectedOption { path: String, option: String },
    /// A file in a defaults folder that is not a document
    IgnoredFile { path: PathBuf },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::AutoSelectedOption { path, option } => write!(
                f,
                "neither default nor manual option set for '{path}', selected the first option '{option}'"
            ),
            Warning::IgnoredFile { path } => {
                write!(f, "unknown file {} in defaults folder, ignored", path.display())
            }
        }
    }
}

/// Result of a successful build
#[derive(Debug)]
pub struct Built {
    pub config: RecordInstance,
    pub build_order: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// Build the configuration for `root` from the defaults below `defaults_dir` and the given overrides
pub fn build(root: Arc<RecordSchema>, defaults_dir: &Path, overrides: &Overrides) -> Result<Built> {
    require_directory(defaults_dir)?;

    let schema = ValidatedSchema::new(root)?;
    let build_order = build_order(&schema)?;
    overrides.validate(&schema)?;

    let loaded = overrides.load_path().map(load_document).transpose()?;

    let mut loader = DefaultsLoader::new();
    let defaults = loader.load(defaults_dir, &schema)?;

    let mut builder = Builder::new(&schema, &defaults, overrides, loaded.as_ref());
    let config = builder.run(&build_order)?;

    let mut warnings = loader.into_warnings();
    warnings.extend(builder.into_warnings());

    Ok(Built {
        config,
        build_order,
        warnings,
    })
}

/// Instantiates a configuration node by node
#[derive(derive_new::new)]
pub struct Builder<'b> {
    schema: &'b ValidatedSchema,
    defaults: &'b DefaultsTree,
    overrides: &'b Overrides,
    loaded: Option<&'b Value>,
    #[new(default)]
    warnings: Vec<Warning>,
}

impl<'b> Builder<'b> {
    pub fn run(&mut self, order: &[String]) -> Result<RecordInstance> {
        let mut root = RecordInstance::new(self.schema.root().clone());
        for path in order {
            self.build_node(&mut root, path)?;
        }
        Ok(root)
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    #[tracing::instrument(level = "trace", skip(self, root))]
    fn build_node(&mut self, root: &mut RecordInstance, path: &str) -> Result<()> {
        if !self.ensure(root, path)? {
            tracing::debug!(path, "not part of the selected options, skipping");
            return Ok(());
        }

        let assignments = self.resolve_fields(root, path)?;

        let record = root
            .lookup_mut(path)
            .ok_or_else(|| Error::invariant(format!("'{}' vanished", display_path(path))))?;
        for (name, assignment) in assignments {
            record.assign(&name, assignment)?;
        }
        Ok(())
    }

    /// Create the nodes leading to `path`. `false` when a selected option on the way does not have the path.
    fn ensure(&mut self, root: &mut RecordInstance, path: &str) -> Result<bool> {
        let mut record = root;
        let mut current = String::new();

        for segment in split_path(path) {
            current = join_path(&current, segment);
            let Some(ty) = record.schema().field(segment).cloned() else {
                return Ok(false);
            };

            let field = record
                .get_mut(segment)
                .ok_or_else(|| Error::invariant(format!("instance misses field '{current}'")))?;
            if field.is_unset() {
                *field = match ty {
                    FieldType::Record(nested) => Field::Record(RecordInstance::new(nested)),
                    FieldType::Variant(variant) => Field::Variant(self.auto_select(&current, variant)?),
                    FieldType::Primitive(_) => {
                        return Err(Error::invariant(format!(
                            "'{current}' is a primitive, not a schema node"
                        )))
                    }
                };
            }

            record = match field {
                Field::Record(nested) => nested,
                Field::Variant(variant) => variant.config_mut(),
                Field::Unset | Field::Value(_) => {
                    return Err(Error::invariant(format!(
                        "'{current}' holds a value, not a schema node"
                    )))
                }
            };
        }

        Ok(true)
    }

    fn auto_select(&mut self, path: &str, variant: Arc<VariantSchema>) -> Result<VariantInstance> {
        let option = self.first_option(path, &variant);
        VariantInstance::new(variant, &option)
    }

    /// Name of the first option, reported as a [Warning::AutoSelectedOption]
    fn first_option(&mut self, path: &str, variant: &VariantSchema) -> String {
        let option = variant.first_option().0.clone();
        tracing::warn!(
            path,
            %option,
            "neither default nor manual option set, selecting the first option"
        );
        self.warnings.push(Warning::AutoSelectedOption {
            path: path.to_string(),
            option: option.clone(),
        });
        option
    }

    /// Decide every own field of the node at `path`
    fn resolve_fields(&mut self, root: &RecordInstance, path: &str) -> Result<Vec<(String, Assignment)>> {
        let record = root
            .lookup(path)
            .ok_or_else(|| Error::invariant(format!("'{}' was not created", display_path(path))))?;
        let node = self.schema.node(path).ok_or_else(|| {
            Error::invariant(format!("'{}' is not a schema node", display_path(path)))
        })?;

        let mut dependencies = BTreeMap::new();
        for (dependency, reference) in &node.dependencies {
            let instance = root.lookup(dependency);
            if instance.is_none() && !reference.optional {
                return Err(Error::invariant(format!(
                    "dependency '{}' of '{}' has not been built",
                    display_path(dependency),
                    display_path(path)
                )));
            }
            dependencies.insert(dependency.clone(), instance);
        }

        let local = self
            .node_defaults(root, path)
            .map(|tree| tree.local(record.schema()))
            .unwrap_or_default();
        let defaults = DefaultsResolver::new(path, &dependencies).resolve(&local)?;

        for (name, value) in &defaults {
            match record.schema().field(name) {
                Some(FieldType::Primitive(_) | FieldType::Variant(_)) => {}
                Some(FieldType::Record(nested)) => {
                    return Err(Error::InvalidDefaultFile {
                        path: join_path(path, name),
                        reason: format!(
                            "'{name}' is a {} record, found {} '{value}'",
                            nested.name(),
                            value.type_name()
                        ),
                    })
                }
                None => tracing::debug!(path, field = %name, "default for an unknown field, ignoring"),
            }
        }

        let mut assignments = vec![];
        for (name, ty) in record.schema().fields() {
            let field_path = join_path(path, name);
            let default = defaults.get(name);
            let assignment = match ty {
                FieldType::Record(_) => continue,
                FieldType::Primitive(primitive) => self.primitive(&field_path, *primitive, default)?,
                FieldType::Variant(variant) => {
                    self.selection(&field_path, variant, record.get(name), default)?
                }
            };
            assignments.push((name.clone(), assignment));
        }

        Ok(assignments)
    }

    /// The defaults subtree of the node at `path`, following the selected options
    fn node_defaults(&self, root: &RecordInstance, path: &str) -> Option<&'b DefaultsTree> {
        let mut tree: &'b DefaultsTree = self.defaults;
        let mut record = root;

        for segment in split_path(path) {
            tree = tree.subtree(segment)?;
            record = match record.get(segment)? {
                Field::Record(nested) => nested,
                Field::Variant(variant) => {
                    tree = tree.subtree(variant.selected())?;
                    variant.config()
                }
                Field::Unset | Field::Value(_) => return None,
            };
        }

        Some(tree)
    }

    fn primitive(&self, path: &str, ty: PrimitiveType, default: Option<&Value>) -> Result<Assignment> {
        if let Some(raw) = self.overrides.get(path) {
            tracing::trace!(path, raw, "from the command line");
            if raw == UNSET {
                return Ok(Assignment::Unset);
            }
            return ty
                .parse(raw)
                .map(Assignment::Value)
                .map_err(|reason| Error::InvalidValue {
                    path: path.to_string(),
                    reason,
                });
        }

        if let Some(loaded) = self.loaded {
            let value = loaded_entry(loaded, path)?;
            return literal(ty, value).map_err(|reason| Error::InvalidLoadedConfig {
                path: path.to_string(),
                reason,
            });
        }

        match default {
            Some(value) => literal(ty, value).map_err(|reason| Error::InvalidValue {
                path: path.to_string(),
                reason,
            }),
            None => Ok(Assignment::Unset),
        }
    }

    fn selection(
        &mut self,
        path: &str,
        variant: &Arc<VariantSchema>,
        current: Option<&Field>,
        default: Option<&Value>,
    ) -> Result<Assignment> {
        let selected = if let Some(raw) = self.overrides.get(path) {
            Some(raw)
        } else if let Some(loaded) = self.loaded {
            let entry = loaded_entry(loaded, path)?;
            let selected = entry
                .as_object()
                .and_then(|object| object.get(SELECTION_KEY))
                .and_then(Value::as_str)
                .ok_or_else(|| Error::InvalidLoadedConfig {
                    path: path.to_string(),
                    reason: format!("a variant has to be a mapping with the selected option under '{SELECTION_KEY}'"),
                })?;
            Some(selected)
        } else {
            match default {
                Some(value) => Some(value.as_str().ok_or_else(|| Error::InvalidValue {
                    path: path.to_string(),
                    reason: format!("expected an option name, found {} '{value}'", value.type_name()),
                })?),
                None => None,
            }
        };

        match (selected.filter(|selected| *selected != UNSET), current) {
            (Some(selected), _) => {
                variant.select(selected)?;
                Ok(Assignment::Select(selected.to_string()))
            }
            (None, Some(Field::Variant(existing))) => Ok(Assignment::Select(existing.selected().to_string())),
            (None, _) => Ok(Assignment::Select(self.first_option(path, variant))),
        }
    }
}

/// Check a literal from a document against the field's type
fn literal(ty: PrimitiveType, value: &Value) -> Result<Assignment, String> {
    if value.as_str() == Some(UNSET) {
        return Ok(Assignment::Unset);
    }
    ty.coerce(value.clone()).map(Assignment::Value)
}

/// The entry for a field path in a loaded document
fn loaded_entry<'v>(loaded: &'v Value, path: &str) -> Result<&'v Value> {
    split_path(path).into_iter().try_fold(loaded, |value, segment| {
        value
            .as_object()
            .and_then(|object| object.get(segment))
            .ok_or_else(|| Error::InvalidLoadedConfig {
                path: path.to_string(),
                reason: format!("'{segment}' is missing"),
            })
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::VariantSchema;
    use pretty_assertions::assert_eq;

    /// { some_field: string, some_multi: Multi{first{field_a}, second{field_a}, third{field_b}} }
    fn schema() -> Arc<RecordSchema> {
        let multi = VariantSchema::builder(
            "SomeMulti",
            RecordSchema::builder("SomeMultiBase").build().unwrap(),
        )
        .option("first", RecordSchema::builder("First").integer("field_a").build().unwrap())
        .option("second", RecordSchema::builder("Second").integer("field_a").build().unwrap())
        .option("third", RecordSchema::builder("Third").string("field_b").build().unwrap())
        .build()
        .unwrap();
        RecordSchema::builder("Root")
            .string("some_field")
            .field("some_multi", multi)
            .build()
            .unwrap()
    }

    fn overrides(values: &[(&str, &str)]) -> Overrides {
        values
            .iter()
            .map(|(path, value)| (*path, Some(value.to_string())))
            .collect()
    }

    #[test]
    fn overrides_without_value_are_absent() {
        let mut overrides = Overrides::new();
        overrides.set("a", "1").set_none("b");
        assert_eq!(overrides.get("a"), Some("1"));
        assert_eq!(overrides.get("b"), None);
        assert_eq!(overrides.load_path(), None);
    }

    #[test]
    fn unknown_override() {
        let dir = tempfile::tempdir().unwrap();
        let err = build(schema(), dir.path(), &overrides(&[("some_multi.nope", "1")])).unwrap_err();
        assert!(matches!(err, Error::UnknownField { ref path } if path == "some_multi.nope"), "{err}");
    }

    #[test]
    fn missing_defaults_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = build(schema(), &dir.path().join("nothing"), &Overrides::new()).unwrap_err();
        assert!(matches!(err, Error::Load(_)), "{err}");
    }

    #[test]
    fn selection_from_the_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let built = build(
            schema(),
            dir.path(),
            &overrides(&[("some_multi", "third"), ("some_multi.field_b", "b")]),
        )
        .unwrap();

        let option = built.config.lookup("some_multi").unwrap();
        assert_eq!(option.schema().name(), "Third");
        assert_eq!(option.get("field_b"), Some(&Field::Value(Value::from("b"))));
        assert!(built.warnings.is_empty());
    }

    #[test]
    fn unknown_selection() {
        let dir = tempfile::tempdir().unwrap();
        let err = build(schema(), dir.path(), &overrides(&[("some_multi", "fourth")])).unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }), "{err}");
    }

    #[test]
    fn unparsable_value() {
        let dir = tempfile::tempdir().unwrap();
        let err = build(
            schema(),
            dir.path(),
            &overrides(&[("some_multi", "first"), ("some_multi.field_a", "many")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { ref path, .. } if path == "some_multi.field_a"), "{err}");
    }

    #[test]
    fn first_option_is_selected_with_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let built = build(schema(), dir.path(), &Overrides::new()).unwrap();

        assert_eq!(
            built.config.get("some_multi").and_then(Field::as_variant).map(VariantInstance::selected),
            Some("first")
        );
        assert_eq!(
            built.warnings,
            vec![Warning::AutoSelectedOption {
                path: "some_multi".to_string(),
                option: "first".to_string()
            }]
        );
    }

    #[test]
    fn loaded_document_must_be_complete() {
        let dir = tempfile::tempdir().unwrap();
        let load = dir.path().join("saved.yaml");
        std::fs::write(&load, "some_field: x\n").unwrap();

        let err = build(
            schema(),
            dir.path(),
            &overrides(&[(LOAD_PATH, load.to_str().unwrap())]),
        )
        .unwrap_err();
        assert!(
            matches!(err, Error::InvalidLoadedConfig { ref path, .. } if path == "some_multi"),
            "{err}"
        );
    }

    #[test]
    fn loaded_variant_needs_a_selection() {
        let dir = tempfile::tempdir().unwrap();
        let load = dir.path().join("saved.yaml");
        std::fs::write(&load, "some_field: x\nsome_multi:\n  field_a: 1\n").unwrap();

        let err = build(
            schema(),
            dir.path(),
            &overrides(&[(LOAD_PATH, load.to_str().unwrap())]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidLoadedConfig { .. }), "{err}");
    }

    #[test]
    fn first_option_reports_a_warning() {
        let schema = ValidatedSchema::new(schema()).unwrap();
        let defaults = DefaultsTree::new();
        let overrides = Overrides::new();
        let mut builder = Builder::new(&schema, &defaults, &overrides, None);

        let Some(FieldType::Variant(multi)) = schema.root().field("some_multi") else {
            panic!("some_multi is a variant");
        };
        assert_eq!(builder.first_option("some_multi", multi), "first");
        assert_eq!(
            builder.warnings(),
            &[Warning::AutoSelectedOption {
                path: "some_multi".to_string(),
                option: "first".to_string()
            }]
        );
    }

    #[test]
    fn more_specific_defaults_win_over_marked_ones() {
        let dir = tempfile::tempdir().unwrap();
        let write = |file: &str, contents: &str| {
            let path = dir.path().join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        };
        write("defaults.yaml", "some_field!: from file\nsome_multi: first\n");
        write("defaults/some_field.yaml", "from folder\n");
        write("some_multi/defaults.yaml", "field_a!: 7\n");
        write("some_multi/first/defaults.yaml", "field_a: 2\n");

        let built = build(schema(), dir.path(), &Overrides::new()).unwrap();
        assert_eq!(
            built.config.get("some_field"),
            Some(&Field::Value(Value::from("from folder")))
        );
        let option = built.config.lookup("some_multi").unwrap();
        assert_eq!(option.get("field_a"), Some(&Field::Value(Value::Integer(2))));

        // the shared default still applies where the option has none
        let built = build(schema(), dir.path(), &overrides(&[("some_multi", "second")])).unwrap();
        let option = built.config.lookup("some_multi").unwrap();
        assert_eq!(option.get("field_a"), Some(&Field::Value(Value::Integer(7))));
    }
}

