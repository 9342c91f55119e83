mod cli;

use arbor::schema::RecordSchema;
use std::path::Path;
use std::sync::Arc;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ARBOR_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Build(build_cli) => build(build_cli),
        cli::Command::Order(order_cli) => order(order_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn build(cli: cli::BuildCommand) -> anyhow::Result<()> {
    let root = load_schema(&cli.schema.schema)?;

    let mut overrides: arbor::Overrides = cli.overrides.into_iter().collect();
    if let Some(load) = &cli.load {
        overrides.set(arbor::builder::LOAD_PATH, load.display().to_string());
    }

    let built = arbor::build(root, &cli.defaults, &overrides)?;
    for warning in &built.warnings {
        eprintln!("warning: {warning}");
    }

    output(&cli.output, &built.config)?;
    Ok(())
}

pub fn order(cli: cli::OrderCommand) -> anyhow::Result<()> {
    let root = load_schema(&cli.schema.schema)?;
    let schema = arbor::validate::ValidatedSchema::new(root)?;
    let order = arbor::order::build_order(&schema)?;

    output(&cli.output, &order)?;
    Ok(())
}

fn load_schema(path: &Path) -> anyhow::Result<Arc<RecordSchema>> {
    let document = arbor::schema_file::SchemaDocument::load(path)?;
    Ok(document.resolve()?)
}

fn output(output: &cli::OutputArgs, value: &impl serde::Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (arbor-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let root = load_schema(&cli.schema.schema)?;
    let schema = arbor::validate::ValidatedSchema::new(root)?;

    match cli.command {
        Schema => println!("{schema:#?}"),
        Defaults => {
            let mut loader = arbor::defaults::DefaultsLoader::new();
            let defaults = loader.load(&cli.defaults, &schema)?;
            for warning in loader.warnings() {
                eprintln!("warning: {warning}");
            }
            serde_yaml::to_writer(std::io::stdout(), &defaults)?;
        }
    }

    Ok(())
}
