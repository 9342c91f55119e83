//! error taxonomy
//!
//! Every error aborts the whole build. There is no partially resolved configuration.
use crate::documents::LoadError;
use crate::util::display_path;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A selection names an option the variant does not declare
    #[error("option '{selected}' does not exist for {variant}, options are: {}", .options.join(", "))]
    InvalidOption {
        variant: String,
        selected: String,
        options: Vec<String>,
    },

    #[error("reference to '{}' is required but not valid when {variant} is '{option}' (mark the reference optional to allow this)", display_path(.path))]
    RequiredReferenceInvalid {
        path: String,
        variant: String,
        option: String,
    },

    #[error("invalid reference '{}': {reason}", display_path(.path))]
    InvalidPath { path: String, reason: String },

    #[error("reference '{}' resolves to {first} or {second} depending on the selected options", display_path(.path))]
    InconsistentReferenceType {
        path: String,
        first: String,
        second: String,
    },

    #[error("cyclic dependency: {}", .cycle.iter().map(|p| display_path(p)).collect::<Vec<_>>().join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("invalid defaults for '{}': {reason}", display_path(.path))]
    InvalidDefaultFile { path: String, reason: String },

    #[error("default '{key}' appears more than once at '{}' (append '!' to the key to override)", display_path(.location))]
    RedundantDefault { location: String, key: String },

    #[error("invalid loaded config at '{}': {reason}", display_path(.path))]
    InvalidLoadedConfig { path: String, reason: String },

    #[error("invalid value for '{}': {reason}", display_path(.path))]
    InvalidValue { path: String, reason: String },

    #[error("'{path}' is not a field of the schema")]
    UnknownField { path: String },

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl Error {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Error::InternalInvariantViolation(message.into())
    }
}
