//! reference validation
//!
//! [ValidatedSchema::new] walks the whole schema tree once and produces an immutable arena of [SchemaNode]s keyed by
//! dotted path. Every declared [Reference] is resolved against the root, walking into every option of every variant
//! it crosses, and replaced by a [ValidatedReference] bound to the node type it ends on.
//!
//! Nodes beneath a variant additionally depend on every record that holds a variant selection on their way from the
//! root. A selection is itself a configuration value, so it has to be known before the nodes it gates are built.
use crate::error::{Error, Result};
use crate::schema::{FieldType, RecordSchema, Reference, SchemaType};
use crate::util::{display_path, join_path, split_path};
use crate::visit::{walk_schema, SchemaEntry};
use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A reference proven to resolve to the same node type along every branch
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReference {
    pub path: String,
    pub optional: bool,
    pub target: SchemaType,
    /// Synthesized from a variant selection rather than declared
    pub implicit: bool,
}

/// A record or variant location in the schema tree
#[derive(Debug)]
pub struct SchemaNode {
    pub path: String,
    /// Node types found at this path. More than one when options of a variant declare the same field differently.
    pub schemas: Vec<SchemaType>,
    /// Validated dependencies, deduplicated and ordered by path
    pub dependencies: BTreeMap<String, ValidatedReference>,
}

/// Schema tree with validated dependencies
#[derive(Debug)]
pub struct ValidatedSchema {
    root: Arc<RecordSchema>,
    /// indexed by path, in tree order (parents before children, fields in declaration order)
    nodes: IndexMap<String, SchemaNode>,
    /// every primitive or variant field path, across all branches
    fields: IndexSet<String>,
}

impl ValidatedSchema {
    #[tracing::instrument(level = "trace", skip_all, fields(root = root.name()))]
    pub fn new(root: Arc<RecordSchema>) -> Result<Self> {
        let mut entries: Vec<SchemaEntry> = vec![];
        walk_schema(&root, &mut |entry: &SchemaEntry| {
            entries.push(entry.clone());
            Ok(())
        })?;

        let validator = ReferenceValidator::new(&root);
        let mut nodes: IndexMap<String, SchemaNode> = IndexMap::new();
        let mut fields = IndexSet::new();

        for entry in &entries {
            for record in entry.schema.records() {
                for (name, ty) in record.fields() {
                    if !matches!(ty, FieldType::Record(_)) {
                        fields.insert(join_path(&entry.path, name));
                    }
                }
            }

            let node = nodes
                .entry(entry.path.clone())
                .or_insert_with(|| SchemaNode {
                    path: entry.path.clone(),
                    schemas: vec![],
                    dependencies: BTreeMap::new(),
                });

            if node.schemas.contains(&entry.schema) {
                continue;
            }
            node.schemas.push(entry.schema.clone());

            for reference in entry.schema.dependencies() {
                let validated = validator.validate(reference)?;
                node.dependencies
                    .entry(validated.path.clone())
                    .or_insert(validated);
            }
        }

        // implicit dependencies on selection holders, resolved once every node is known
        for entry in &entries {
            for holder in &entry.selection_holders {
                let target = nodes
                    .get(holder)
                    .and_then(|node| node.schemas.first().cloned())
                    .ok_or_else(|| {
                        Error::invariant(format!(
                            "selection holder '{}' is not a node",
                            display_path(holder)
                        ))
                    })?;

                let node = nodes.get_mut(&entry.path).ok_or_else(|| {
                    Error::invariant(format!("'{}' is not a node", display_path(&entry.path)))
                })?;
                node.dependencies
                    .entry(holder.clone())
                    .or_insert_with(|| ValidatedReference {
                        path: holder.clone(),
                        optional: false,
                        target,
                        implicit: true,
                    });
            }
        }

        tracing::debug!(nodes = nodes.len(), fields = fields.len(), "schema validated");

        Ok(Self {
            root,
            nodes,
            fields,
        })
    }

    pub fn root(&self) -> &Arc<RecordSchema> {
        &self.root
    }

    /// All nodes in tree order
    pub fn nodes(&self) -> &IndexMap<String, SchemaNode> {
        &self.nodes
    }

    pub fn node(&self, path: &str) -> Option<&SchemaNode> {
        self.nodes.get(path)
    }

    /// Whether `path` names a primitive or variant field in any branch of the tree
    pub fn has_field(&self, path: &str) -> bool {
        self.fields.contains(path)
    }

    pub fn field_paths(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

/// Resolves raw references against the root schema
#[derive(derive_new::new)]
struct ReferenceValidator<'s> {
    root: &'s Arc<RecordSchema>,
}

impl<'s> ReferenceValidator<'s> {
    #[tracing::instrument(level = "trace", skip(self))]
    fn validate(&self, reference: &Reference) -> Result<ValidatedReference> {
        let segments = split_path(&reference.path);
        let mut reached = vec![];
        self.resolve(
            reference,
            &segments,
            SchemaType::Record(self.root.clone()),
            &mut reached,
        )?;

        let mut reached = reached.into_iter();
        let target = reached.next().ok_or_else(|| Error::InvalidPath {
            path: reference.path.clone(),
            reason: "does not resolve to any node".to_string(),
        })?;

        if let Some(other) = reached.find(|other| *other != target) {
            return Err(Error::InconsistentReferenceType {
                path: reference.path.clone(),
                first: target.name().to_string(),
                second: other.name().to_string(),
            });
        }

        tracing::trace!(path = %reference.path, target = target.name(), "reference validated");

        Ok(ValidatedReference {
            path: reference.path.clone(),
            optional: reference.optional,
            target,
            implicit: false,
        })
    }

    fn resolve(
        &self,
        reference: &Reference,
        segments: &[&str],
        current: SchemaType,
        reached: &mut Vec<SchemaType>,
    ) -> Result<()> {
        let Some((segment, rest)) = segments.split_first() else {
            reached.push(current);
            return Ok(());
        };

        match &current {
            SchemaType::Record(record) => {
                let ty = record.field(segment).ok_or_else(|| Error::InvalidPath {
                    path: reference.path.clone(),
                    reason: format!("{} has no field '{segment}'", record.name()),
                })?;
                self.follow(reference, segment, ty, rest, reached)
            }
            SchemaType::Variant(variant) => {
                // shared fields are present in every option
                if let Some(ty) = variant.superschema().field(segment) {
                    return self.follow(reference, segment, ty, rest, reached);
                }

                let mut valid = 0;
                for (option, record) in variant.options() {
                    match record.field(segment) {
                        Some(ty) => {
                            valid += 1;
                            self.follow(reference, segment, ty, rest, reached)?;
                        }
                        None if !reference.optional => {
                            return Err(Error::RequiredReferenceInvalid {
                                path: reference.path.clone(),
                                variant: variant.name().to_string(),
                                option: option.clone(),
                            });
                        }
                        None => {}
                    }
                }

                if valid == 0 {
                    return Err(Error::InvalidPath {
                        path: reference.path.clone(),
                        reason: format!("'{segment}' is not valid for any option of {}", variant.name()),
                    });
                }

                Ok(())
            }
        }
    }

    fn follow(
        &self,
        reference: &Reference,
        segment: &str,
        ty: &FieldType,
        rest: &[&str],
        reached: &mut Vec<SchemaType>,
    ) -> Result<()> {
        match ty.as_schema() {
            Some(next) => self.resolve(reference, rest, next, reached),
            None if rest.is_empty() => Err(Error::InvalidPath {
                path: reference.path.clone(),
                reason: format!("ends on the {ty} field '{segment}', dependencies must end on a record or variant"),
            }),
            None => Err(Error::InvalidPath {
                path: reference.path.clone(),
                reason: format!("continues past the {ty} field '{segment}'"),
            }),
        }
    }
}
