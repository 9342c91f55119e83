//! loading documents (yaml, json, hcl) into [Value]s
//!
//! Documents are recognized by their file extension. Anything else is not a document and is left to the caller to
//! skip or reject.
use crate::value::Value;
use std::path::{Path, PathBuf};

/// Recognized document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Hcl,
}

impl Format {
    /// Recognized extensions, in the order they are looked up
    pub const EXTENSIONS: [(&'static str, Format); 4] = [
        ("yaml", Format::Yaml),
        ("yml", Format::Yaml),
        ("json", Format::Json),
        ("hcl", Format::Hcl),
    ];

    pub fn from_path(path: &Path) -> Option<Format> {
        let extension = path.extension()?.to_str()?;
        Self::EXTENSIONS
            .iter()
            .find(|(known, _)| *known == extension)
            .map(|(_, format)| *format)
    }

    /// Parse document contents
    ///
    /// An empty yaml document is an empty object.
    pub fn parse(self, contents: &str) -> Result<Value, LoadError> {
        match self {
            Format::Yaml => {
                let yaml: serde_yaml::Value = serde_yaml::from_str(contents)?;
                if yaml.is_null() {
                    return Ok(Value::Object(Default::default()));
                }
                yaml.try_into()
            }
            Format::Json => serde_json::from_str::<serde_json::Value>(contents)?.try_into(),
            Format::Hcl => hcl::from_str::<hcl::Value>(contents)?.try_into(),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Yaml => f.write_str("yaml"),
            Format::Json => f.write_str("json"),
            Format::Hcl => f.write_str("hcl"),
        }
    }
}

/// Load a single document from disk
pub fn load_document(file_path: &Path) -> Result<Value, LoadError> {
    if !file_path.exists() {
        return Err(LoadError::NotFound(file_path.to_owned()));
    }

    let format =
        Format::from_path(file_path).ok_or_else(|| LoadError::UnknownFormat(file_path.to_owned()))?;

    let file_path = file_path.canonicalize()?;
    tracing::info!(path=%file_path.display(), %format, "loading document");

    let file_contents = std::fs::read_to_string(&file_path)?;
    format
        .parse(&file_contents)
        .map_err(|source| LoadError::InvalidDocument {
            path: file_path,
            source: Box::new(source),
        })
}

/// Ensure a path is an existing directory
pub fn require_directory(dir_path: &Path) -> Result<(), LoadError> {
    if !dir_path.exists() {
        return Err(LoadError::NotFound(dir_path.to_owned()));
    }
    if !dir_path.is_dir() {
        return Err(LoadError::NotADirectory(dir_path.to_owned()));
    }
    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("{} is not a recognized document (expected .yaml, .yml, .json or .hcl)", .0.display())]
    UnknownFormat(PathBuf),
    #[error("Unable to load {}", .path.display())]
    InvalidDocument {
        path: PathBuf,
        #[source]
        source: Box<LoadError>,
    },
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse yaml document")]
    YamlParseFailed(#[from] serde_yaml::Error),
    #[error("Unable to parse json document")]
    JsonParseFailed(#[from] serde_json::Error),
    #[error("Unable to parse hcl document")]
    HclParseFailed(#[from] hcl::Error),
}
