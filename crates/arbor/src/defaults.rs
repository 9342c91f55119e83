//! defaults trees
//!
//! Defaults are read from a directory mirroring the schema:
//!
//! ```text
//! config/
//!   defaults.yaml          # defaults of the root record
//!   defaults/              # one entry per key, merged over defaults.yaml
//!     some_field.yaml
//!     dataset.img_size.yaml
//!   model/                 # a nested record field
//!     defaults.yaml
//!     arch/                # a variant field
//!       defaults.yaml      # shared by all options, may carry `_selected`
//!       vanilla/           # one directory per option
//!         defaults.yaml
//! ```
//!
//! Everything found is merged into a single [DefaultsTree]. Sources on the same level merge as siblings: a literal
//! set twice is a [Error::RedundantDefault] unless its key carries the override marker. The `defaults/` folder is
//! more specific than the `defaults.*` documents next to it and wins over them.
//!
//! After loading, variant subtrees are normalized to `{_selected?, <option>: tree}`. The shared part is copied into
//! every option and the option's own defaults are merged on top of it.
use crate::builder::Warning;
use crate::documents::{load_document, require_directory, Format, LoadError};
use crate::error::{Error, Result};
use crate::instance::SELECTION_KEY;
use crate::schema::{FieldType, RecordSchema, VariantSchema};
use crate::util::{join_path, KeyExt, OVERRIDE_SUFFIX};
use crate::validate::ValidatedSchema;
use crate::value::Value;
use indexmap::{map::Entry, IndexMap};
use serde::{ser::SerializeMap, Serializer};
use std::path::Path;

/// File stem of defaults documents and name of the defaults folder
pub const DEFAULTS_STEM: &str = "defaults";

/// How two trees are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// Equally specific sources, a repeated literal is an error unless override marked
    Sibling,
    /// The incoming tree is more specific and replaces what it overlaps
    Override,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultsNode {
    Literal(Value),
    Tree(DefaultsTree),
}

impl From<Value> for DefaultsNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(object) => DefaultsNode::Tree(DefaultsTree::from_object(object)),
            other => DefaultsNode::Literal(other),
        }
    }
}

/// Nested defaults, keyed by field name, option name or query key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultsTree {
    entries: IndexMap<String, DefaultsNode>,
}

impl DefaultsTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_object(object: IndexMap<String, Value>) -> Self {
        Self {
            entries: object
                .into_iter()
                .map(|(key, value)| (key, DefaultsNode::from(value)))
                .collect(),
        }
    }

    /// The tree of a single defaults document, which has to be a mapping
    pub fn from_document(path: &Path, document: Value) -> Result<Self> {
        match document {
            Value::Object(object) => Ok(Self::from_object(object)),
            other => Err(Error::InvalidDefaultFile {
                path: path.display().to_string(),
                reason: format!(
                    "expected a mapping at the top level, found {}",
                    other.type_name()
                ),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&DefaultsNode> {
        self.entries.get(key)
    }

    pub fn subtree(&self, key: &str) -> Option<&DefaultsTree> {
        match self.entries.get(key) {
            Some(DefaultsNode::Tree(tree)) => Some(tree),
            _ => None,
        }
    }

    pub fn literal(&self, key: &str) -> Option<&Value> {
        match self.entries.get(key) {
            Some(DefaultsNode::Literal(value)) => Some(value),
            _ => None,
        }
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, DefaultsNode> {
        self.entries.iter()
    }

    pub fn insert(&mut self, key: impl Into<String>, node: impl Into<DefaultsNode>) {
        self.entries.insert(key.into(), node.into());
    }

    /// Merge another tree into this one
    ///
    /// `location` names this tree in errors.
    pub fn merge(&mut self, other: DefaultsTree, mode: Merge, location: &str) -> Result<()> {
        for (key, node) in other.entries {
            self.merge_entry(key, node, mode, location)?;
        }
        Ok(())
    }

    pub fn merge_entry(
        &mut self,
        key: String,
        node: DefaultsNode,
        mode: Merge,
        location: &str,
    ) -> Result<()> {
        if mode == Merge::Override {
            // `k` and `k!` set the same field, the more specific source replaces either form
            let other = if key.is_override() {
                key.base_key().to_string()
            } else {
                format!("{key}{OVERRIDE_SUFFIX}")
            };
            if self.entries.shift_remove(&other).is_some() {
                tracing::trace!(location, %key, replaced = %other, "replacing default");
            }
        }

        let mut occupied = match self.entries.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(node);
                return Ok(());
            }
            Entry::Occupied(occupied) => occupied,
        };

        let key = occupied.key().clone();
        let existing = occupied.get_mut();
        let both_literal =
            matches!(existing, DefaultsNode::Literal(_)) && matches!(node, DefaultsNode::Literal(_));

        match (existing, node) {
            (DefaultsNode::Tree(current), DefaultsNode::Tree(incoming)) => {
                current.merge(incoming, mode, &join_path(location, &key))
            }
            (existing, node) if mode == Merge::Override || (both_literal && key.is_override()) => {
                tracing::trace!(location, %key, "replacing default");
                *existing = node;
                Ok(())
            }
            _ => Err(Error::RedundantDefault {
                location: location.to_string(),
                key,
            }),
        }
    }

    /// Scope the tree to the own fields of a record
    ///
    /// Subtrees of nested records are dropped and a variant subtree is replaced by its selection literal. Everything
    /// else, query keys included, is kept.
    pub fn local(&self, record: &RecordSchema) -> DefaultsTree {
        let mut local = DefaultsTree::new();

        for (key, node) in &self.entries {
            let name = key.base_key();
            match (record.field(name), node) {
                (Some(FieldType::Record(_)), _) => {}
                (Some(FieldType::Variant(_)), DefaultsNode::Tree(tree)) => {
                    if let Some(selected) = tree.literal(SELECTION_KEY) {
                        local.insert(name, DefaultsNode::Literal(selected.clone()));
                    }
                    let marked = format!("{SELECTION_KEY}{OVERRIDE_SUFFIX}");
                    if let Some(selected) = tree.literal(&marked) {
                        local.insert(
                            format!("{name}{OVERRIDE_SUFFIX}"),
                            DefaultsNode::Literal(selected.clone()),
                        );
                    }
                }
                _ => local.insert(key.clone(), node.clone()),
            }
        }

        local
    }

    /// Bring the variant subtrees below `record` into their normalized layout
    pub(crate) fn normalize_record(&mut self, record: &RecordSchema, location: &str) -> Result<()> {
        for (name, ty) in record.fields() {
            let path = join_path(location, name);
            match ty {
                FieldType::Primitive(_) => {}
                FieldType::Record(nested) => {
                    let marked = format!("{name}{OVERRIDE_SUFFIX}");
                    for key in [name.as_str(), marked.as_str()] {
                        if let Some(DefaultsNode::Literal(value)) = self.entries.get(key) {
                            return Err(Error::InvalidDefaultFile {
                                path: join_path(location, key),
                                reason: format!(
                                    "'{name}' is a {} record, found {} '{value}'",
                                    nested.name(),
                                    value.type_name()
                                ),
                            });
                        }
                    }
                    if let Some(DefaultsNode::Tree(tree)) = self.entries.get_mut(name) {
                        tree.normalize_record(nested, &path)?;
                    }
                }
                FieldType::Variant(variant) => {
                    self.hoist_selection(name);
                    if let Some(DefaultsNode::Tree(tree)) = self.entries.get_mut(name) {
                        tree.normalize_variant(variant, &path)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `field: option` becomes `field: {_selected: option}`
    fn hoist_selection(&mut self, name: &str) {
        let Some(DefaultsNode::Literal(selected)) = self.entries.get(name) else {
            return;
        };

        let mut tree = DefaultsTree::new();
        tree.insert(SELECTION_KEY, DefaultsNode::Literal(selected.clone()));
        self.entries.insert(name.to_string(), DefaultsNode::Tree(tree));
    }

    fn normalize_variant(&mut self, variant: &VariantSchema, location: &str) -> Result<()> {
        let mut selection = IndexMap::new();
        let mut options: IndexMap<String, DefaultsTree> = IndexMap::new();
        let mut shared = DefaultsTree::new();

        for (key, node) in std::mem::take(&mut self.entries) {
            if key.base_key() == SELECTION_KEY {
                selection.insert(key, node);
            } else if variant.option(&key).is_some() {
                match node {
                    DefaultsNode::Tree(tree) => {
                        options.insert(key, tree);
                    }
                    DefaultsNode::Literal(value) => {
                        return Err(Error::InvalidDefaultFile {
                            path: join_path(location, &key),
                            reason: format!(
                                "defaults of option '{key}' must be a mapping, found {}",
                                value.type_name()
                            ),
                        })
                    }
                }
            } else {
                shared.entries.insert(key, node);
            }
        }

        self.entries = selection;
        for (name, record) in variant.options() {
            let own = options.shift_remove(name);
            if shared.is_empty() && own.is_none() {
                continue;
            }

            let option_location = join_path(location, name);
            let mut tree = shared.clone();
            tree.normalize_record(record, &option_location)?;
            if let Some(mut own) = own {
                own.normalize_record(record, &option_location)?;
                tree.merge(own, Merge::Override, &option_location)?;
            }
            self.entries.insert(name.clone(), DefaultsNode::Tree(tree));
        }

        Ok(())
    }
}

impl serde::ser::Serialize for DefaultsTree {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut ser = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, node) in &self.entries {
            match node {
                DefaultsNode::Literal(value) => ser.serialize_entry(key, value)?,
                DefaultsNode::Tree(tree) => ser.serialize_entry(key, tree)?,
            }
        }
        ser.end()
    }
}

/// Reads a defaults directory into a single [DefaultsTree]
#[derive(Debug, Default)]
pub struct DefaultsLoader {
    warnings: Vec<Warning>,
}

impl DefaultsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files skipped while loading
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    /// Load and normalize the defaults below `base`
    #[tracing::instrument(level = "trace", skip_all, fields(base = %base.display()))]
    pub fn load(&mut self, base: &Path, schema: &ValidatedSchema) -> Result<DefaultsTree> {
        require_directory(base)?;

        let root = schema.root();
        let mut tree = self.load_record(base, root, "")?;
        tree.normalize_record(root, "")?;
        Ok(tree)
    }

    fn load_record(&mut self, dir: &Path, record: &RecordSchema, location: &str) -> Result<DefaultsTree> {
        let mut tree = self.load_local(dir, location)?;
        self.load_fields(dir, record, location, &mut tree)?;
        Ok(tree)
    }

    fn load_variant(&mut self, dir: &Path, variant: &VariantSchema, location: &str) -> Result<DefaultsTree> {
        let mut tree = self.load_local(dir, location)?;
        self.load_fields(dir, variant.superschema(), location, &mut tree)?;

        for (name, record) in variant.options() {
            let option_dir = dir.join(name);
            if !option_dir.is_dir() {
                continue;
            }

            let option_tree = self.load_record(&option_dir, record, &join_path(location, name))?;
            tree.merge_entry(
                name.clone(),
                DefaultsNode::Tree(option_tree),
                Merge::Sibling,
                location,
            )?;
        }

        Ok(tree)
    }

    /// Subdirectories of nested record and variant fields
    fn load_fields(
        &mut self,
        dir: &Path,
        record: &RecordSchema,
        location: &str,
        tree: &mut DefaultsTree,
    ) -> Result<()> {
        for (name, ty) in record.fields() {
            let field_dir = dir.join(name);
            let path = join_path(location, name);

            let subtree = match ty {
                FieldType::Primitive(_) => continue,
                FieldType::Record(nested) if field_dir.is_dir() => {
                    self.load_record(&field_dir, nested, &path)?
                }
                FieldType::Variant(variant) => {
                    // a selection literal next to the variant's own directory
                    tree.hoist_selection(name);
                    if !field_dir.is_dir() {
                        continue;
                    }
                    self.load_variant(&field_dir, variant, &path)?
                }
                FieldType::Record(_) => continue,
            };

            tree.merge_entry(
                name.clone(),
                DefaultsNode::Tree(subtree),
                Merge::Sibling,
                location,
            )?;
        }
        Ok(())
    }

    /// `defaults.*` documents merged as siblings, then the `defaults/` folder on top
    fn load_local(&mut self, dir: &Path, location: &str) -> Result<DefaultsTree> {
        let mut tree = DefaultsTree::new();

        for (extension, _) in Format::EXTENSIONS {
            let file = dir.join(format!("{DEFAULTS_STEM}.{extension}"));
            if !file.is_file() {
                continue;
            }

            let document = DefaultsTree::from_document(&file, load_document(&file)?)?;
            tree.merge(document, Merge::Sibling, location)?;
        }

        let folder = dir.join(DEFAULTS_STEM);
        if folder.is_dir() {
            let folder_tree = self.load_folder(&folder, location)?;
            tree.merge(folder_tree, Merge::Override, location)?;
        }

        Ok(tree)
    }

    /// Every entry of a defaults folder is a key: files by their stem, subfolders by their name
    fn load_folder(&mut self, folder: &Path, location: &str) -> Result<DefaultsTree> {
        let mut paths = std::fs::read_dir(folder)
            .map_err(LoadError::from)?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(LoadError::from)?;
        paths.sort();

        let mut tree = DefaultsTree::new();
        for path in paths {
            if path.is_dir() {
                let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                    self.ignore(&path);
                    continue;
                };
                let subtree = self.load_folder(&path, &join_path(location, name))?;
                tree.merge_entry(
                    name.to_string(),
                    DefaultsNode::Tree(subtree),
                    Merge::Sibling,
                    location,
                )?;
                continue;
            }

            let name = path.file_stem().and_then(|name| name.to_str());
            match (name, Format::from_path(&path)) {
                (Some(name), Some(_)) => {
                    let node = DefaultsNode::from(load_document(&path)?);
                    tree.merge_entry(name.to_string(), node, Merge::Sibling, location)?;
                }
                _ => self.ignore(&path),
            }
        }

        Ok(tree)
    }

    fn ignore(&mut self, path: &Path) {
        tracing::warn!(path = %path.display(), "unknown file in defaults folder, ignoring");
        self.warnings.push(Warning::IgnoredFile {
            path: path.to_owned(),
        });
    }
}
