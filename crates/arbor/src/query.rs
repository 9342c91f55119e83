//! conditional defaults
//!
//! A node's local defaults tree holds two kinds of keys:
//! - literal keys (`field: value`, `field!: value`), defaults for the node's own fields
//! - query keys (`dataset.img_size: {...}`), whose value maps conditions to further defaults
//!
//! A query key names a field of a dependency: everything before the last dot is the dependency path, the last
//! segment is the field. A key without a dot names a field of the root. Every condition starts with an [Operator]
//! followed by an operand, e.g. `">=1.5"` or `"=local"`. The operand is parsed with the declared type of the queried
//! field, a variant field compares by option name. The defaults of every matching condition are applied, and may
//! contain queries themselves:
//!
//! ```yaml
//! batch_size: 32
//! dataset.img_size:
//!   ">=512":
//!     batch_size!: 8
//!   "<512":
//!     model.arch:
//!       "=vanilla":
//!         batch_size!: 64
//! ```
use crate::defaults::{DefaultsNode, DefaultsTree};
use crate::error::{Error, Result};
use crate::instance::{Field, RecordInstance};
use crate::schema::FieldType;
use crate::util::{display_path, KeyExt};
use crate::value::Value;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Comparison operators of conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

impl Operator {
    /// Two character symbols first so `<=3` is not read as `<` with operand `=3`
    const BY_PREFIX: [Operator; 6] = [
        Operator::NotEqual,
        Operator::LessOrEqual,
        Operator::GreaterOrEqual,
        Operator::Equal,
        Operator::Less,
        Operator::Greater,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
        }
    }

    /// Split a condition into its operator and the remaining operand
    pub fn split(condition: &str) -> Option<(Operator, &str)> {
        Self::BY_PREFIX.iter().find_map(|operator| {
            condition
                .strip_prefix(operator.symbol())
                .map(|operand| (*operator, operand))
        })
    }

    /// Values that can not be compared are only ever unequal
    pub fn evaluate(self, value: &Value, operand: &Value) -> bool {
        let ordering = value.compare(operand);
        match self {
            Operator::Equal => ordering == Some(Ordering::Equal),
            Operator::NotEqual => ordering != Some(Ordering::Equal),
            Operator::Less => ordering == Some(Ordering::Less),
            Operator::Greater => ordering == Some(Ordering::Greater),
            Operator::LessOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Operator::GreaterOrEqual => {
                matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
            }
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Flattens a local defaults tree into defaults for the node's fields
///
/// `dependencies` holds the already built instance of every dependency of the node, `None` for an optional
/// dependency that does not exist in the selected options.
#[derive(derive_new::new)]
pub struct DefaultsResolver<'d> {
    location: &'d str,
    dependencies: &'d BTreeMap<String, Option<&'d RecordInstance>>,
    #[new(default)]
    plain: IndexMap<String, Value>,
    /// override marked writes, by field name
    #[new(default)]
    overrides: IndexMap<String, Value>,
}

impl<'d> DefaultsResolver<'d> {
    #[tracing::instrument(level = "trace", skip_all, fields(location = self.location))]
    pub fn resolve(mut self, tree: &DefaultsTree) -> Result<IndexMap<String, Value>> {
        self.apply(tree)?;

        let mut resolved = self.plain;
        for (name, value) in self.overrides {
            resolved.insert(name, value);
        }
        Ok(resolved)
    }

    fn apply(&mut self, tree: &DefaultsTree) -> Result<()> {
        // literals before queries, a query's defaults land on top of the plain ones
        for (key, node) in tree.iter() {
            if let DefaultsNode::Literal(value) = node {
                self.write(key, value)?;
            }
        }

        for (key, node) in tree.iter() {
            if let DefaultsNode::Tree(conditions) = node {
                self.query(key, conditions)?;
            }
        }

        Ok(())
    }

    fn write(&mut self, key: &str, value: &Value) -> Result<()> {
        if key.is_override() {
            self.overrides
                .insert(key.base_key().to_string(), value.clone());
            return Ok(());
        }

        if self.plain.contains_key(key) {
            return Err(Error::RedundantDefault {
                location: self.location.to_string(),
                key: key.to_string(),
            });
        }
        self.plain.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn query(&mut self, key: &str, conditions: &DefaultsTree) -> Result<()> {
        let (dependency, field) = key.rsplit_once('.').unwrap_or(("", key));

        let dependencies = self.dependencies;
        let instance = dependencies.get(dependency).ok_or_else(|| Error::InvalidDefaultFile {
            path: self.location.to_string(),
            reason: format!(
                "query '{key}' refers to '{}' which is not a dependency",
                display_path(dependency)
            ),
        })?;

        let Some(instance) = instance else {
            tracing::debug!(key, "optional dependency does not exist, skipping query");
            return Ok(());
        };

        let Some(ty) = instance.schema().field(field) else {
            tracing::debug!(key, "queried field does not exist in the selected option, skipping query");
            return Ok(());
        };

        let current = match instance.get(field) {
            Some(Field::Value(value)) => Some(value.clone()),
            Some(Field::Variant(variant)) => Some(Value::from(variant.selected())),
            _ => None,
        };

        for (condition, node) in conditions.iter() {
            let (operator, operand) =
                Operator::split(condition).ok_or_else(|| Error::InvalidDefaultFile {
                    path: self.location.to_string(),
                    reason: format!(
                        "condition '{condition}' of query '{key}' does not start with one of =, !=, <, >, <=, >="
                    ),
                })?;
            let operand = self.operand(key, ty, operand.trim())?;

            let matched = current
                .as_ref()
                .is_some_and(|value| operator.evaluate(value, &operand));
            tracing::trace!(key, %condition, matched, "condition");
            if !matched {
                continue;
            }

            match node {
                DefaultsNode::Tree(tree) => self.apply(tree)?,
                DefaultsNode::Literal(_) => {
                    return Err(Error::InvalidDefaultFile {
                        path: self.location.to_string(),
                        reason: format!(
                            "condition '{condition}' of query '{key}' must hold a mapping of defaults"
                        ),
                    })
                }
            }
        }

        Ok(())
    }

    fn operand(&self, key: &str, ty: &FieldType, raw: &str) -> Result<Value> {
        match ty {
            FieldType::Primitive(primitive) => {
                primitive
                    .parse(raw)
                    .map_err(|reason| Error::InvalidDefaultFile {
                        path: self.location.to_string(),
                        reason: format!("query '{key}': {reason}"),
                    })
            }
            FieldType::Variant(_) => Ok(Value::from(raw)),
            FieldType::Record(_) => Err(Error::InvalidDefaultFile {
                path: self.location.to_string(),
                reason: format!("query '{key}' names a record, only fields can be queried"),
            }),
        }
    }
}
