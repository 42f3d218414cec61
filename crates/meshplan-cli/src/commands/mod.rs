//! CLI command definitions and dispatch.

pub mod plan;
pub mod render;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use meshplan_common::config::CompilerConfig;
use meshplan_compose::manifest::Manifest;
use meshplan_compose::plan::DeployablePlan;

/// meshplan: service-mesh topology compiler.
#[derive(Parser, Debug)]
#[command(name = "mshp", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Compiler configuration file (YAML or JSON).
    #[arg(long, global = true, env = "MSHP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level regardless of `RUST_LOG`.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check a manifest without emitting anything.
    Validate(validate::ValidateArgs),
    /// Summarize the plans a manifest compiles to.
    Plan(plan::PlanArgs),
    /// Render task documents for every service.
    Render(render::RenderArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Validate(args) => validate::execute(&args, config),
        Command::Plan(args) => plan::execute(&args, config),
        Command::Render(args) => render::execute(&args, config),
    }
}

/// Loads `manifest` and compiles it.
///
/// Compiler settings come from the manifest's `compiler` block if present,
/// else from `config_path`, else the defaults.
///
/// # Errors
///
/// Returns an error if either file cannot be loaded or the topology is invalid.
pub fn compile_manifest(
    manifest: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<Vec<DeployablePlan>> {
    if !manifest.exists() {
        anyhow::bail!(
            "manifest not found: {}\n\
             Create a topology manifest or specify a path: mshp <command> <file>",
            manifest.display()
        );
    }

    let mut manifest = Manifest::load(manifest)
        .with_context(|| format!("failed to load {}", manifest.display()))?;
    let config = match (manifest.compiler.take(), config_path) {
        (Some(config), _) => config,
        (None, Some(path)) => CompilerConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        (None, None) => CompilerConfig::default(),
    };

    let mut graph = manifest.into_topology()?;
    Ok(meshplan_compose::compile(&mut graph, config)?)
}
