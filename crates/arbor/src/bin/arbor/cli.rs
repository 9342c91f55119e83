//! arbor cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; arbor ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a configuration
    ///
    /// Fields take their value from --set, the document given with --load,
    /// the defaults directory or stay unset (`???`), in that order.
    Build(BuildCommand),

    /// Print the order in which schema nodes are built
    Order(OrderCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct SchemaArgs {
    /// Schema document (yaml)
    #[clap(short = 's', long = "schema", default_value = "schema.yaml")]
    pub schema: PathBuf,
}

#[derive(Parser, Debug)]
pub struct BuildCommand {
    #[clap(flatten)]
    pub schema: SchemaArgs,

    /// Directory holding the defaults of the root record
    #[clap(short = 'd', long = "defaults", default_value = "config")]
    pub defaults: PathBuf,

    /// Set a field, e.g. `--set model.arch=vanilla`
    ///
    /// Can be specified multiple times. A variant field takes the name
    /// of an option. `???` leaves the field unset.
    #[clap(long = "set", value_name = "PATH=VALUE", value_parser = parse_override)]
    pub overrides: Vec<(String, Option<String>)>,

    /// Load a previously written configuration
    ///
    /// Every field not given with --set has to be present in it.
    #[clap(short = 'l', long = "load")]
    pub load: Option<PathBuf>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct OrderCommand {
    #[clap(flatten)]
    pub schema: SchemaArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub schema: SchemaArgs,

    /// Directory holding the defaults of the root record
    #[clap(short = 'd', long = "defaults", default_value = "config")]
    pub defaults: PathBuf,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Validated schema nodes and their dependencies
    Schema,
    /// Merged defaults tree
    Defaults,
}

/// `PATH=VALUE`, or a bare `PATH` which counts as not given
fn parse_override(raw: &str) -> Result<(String, Option<String>), String> {
    match raw.split_once('=') {
        Some(("", _)) => Err(format!("missing field path in '{raw}'")),
        Some((path, value)) => Ok((path.to_string(), Some(value.to_string()))),
        None if raw.is_empty() => Err("missing field path".to_string()),
        None => Ok((raw.to_string(), None)),
    }
}
