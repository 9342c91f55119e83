//! # arbor - hierarchical configuration
//!
//! Builds a fully populated configuration from a typed schema, command line overrides, a previously written
//! configuration and a directory of defaults. Defaults may depend on values chosen elsewhere in the tree.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `arbor` works internally.
//!
//! ### Terms
//!
//! - a `record` is a fixed set of typed fields ([schema::RecordSchema])
//! - a field is a `primitive` (string, integer, decimal, boolean), a nested record or a `variant`
//! - a `variant` picks exactly one of its named `options` ([schema::VariantSchema]). Every option extends the
//!   variant's `superschema`, so fields of the superschema exist no matter which option is selected.
//! - a `path` addresses a node from the root record: `model.arch`. The root itself is the empty path.
//! - a record may declare `dependencies`: paths of other nodes whose values its defaults look at
//!
//! ```yaml
//! root: Conf
//! records:
//!   Conf:
//!     fields:
//!       dataset: DatasetMulti
//!       model: ModelConf
//!   ModelConf:
//!     fields:
//!       layers: integer
//!     dependencies: [dataset]
//!   # ...
//! ```
//!
//! ### Validation
//!
//! see [validate::ValidatedSchema::new]
//!
//! Every dependency is resolved against the root. Where a path crosses a variant it is followed into every option.
//! A required dependency has to exist in all of them, an optional one in at least one, and it has to end on the same
//! record or variant type everywhere. The result is an immutable arena of nodes keyed by path.
//!
//! ### Build order
//!
//! see [order::build_order]
//!
//! A depth first traversal that emits every node after its dependencies. A variant is ordered by the dependencies of
//! all its options since the selection is not known yet. Revisiting a node on the active branch is a cycle.
//!
//! ### Defaults
//!
//! see [defaults]
//!
//! The defaults directory is read once into a [defaults::DefaultsTree] that mirrors the schema. Before a node is
//! built its part of the tree is scoped to the node's own fields and resolved by [query::DefaultsResolver]: literal
//! keys are defaults, query keys such as `dataset.img_size` hold conditions evaluated against dependencies that are
//! already built.
//!
//! ```yaml
//! layers: 4
//! dataset.img_size:
//!   ">=512":
//!     layers!: 8
//! ```
//!
//! A default set twice is an error. A trailing `!` marks a deliberate override.
//!
//! ### Instantiation
//!
//! see [builder::build]
//!
//! Nodes are created in build order. Every field takes its value from the command line, the loaded document, the
//! resolved defaults or stays unset, in that order. A variant nobody selected picks its first option with a warning.
//!
//! ### Output
//!
//! The finished [instance::RecordInstance] serializes into a plain tree via [serde], with `_selected` naming the
//! option of every variant. Written out, it can be loaded again through `load_path`.
//!
pub mod builder;
pub mod defaults;
pub mod documents;
pub mod error;
pub mod instance;
pub mod order;
pub mod query;
pub mod schema;
pub mod schema_file;
mod util;
pub mod validate;
pub mod value;
mod visit;

pub use builder::{build, Built, Overrides, Warning};
pub use error::{Error, Result};
