//! `mshp validate`: Check a manifest without emitting anything.

use std::path::{Path, PathBuf};

use clap::Args;

use crate::output::{GREEN, RESET, count};

/// Arguments for the `validate` command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the topology manifest.
    #[arg(default_value = "meshplan.yaml")]
    pub file: PathBuf,
}

/// Executes the `validate` command.
///
/// # Errors
///
/// Returns the first error found while loading or compiling the manifest.
pub fn execute(args: &ValidateArgs, config: Option<&Path>) -> anyhow::Result<()> {
    tracing::info!(path = %args.file.display(), "validating manifest");
    let plans = super::compile_manifest(&args.file, config)?;

    let upstreams: usize = plans.iter().map(|p| p.upstreams().len()).sum();
    println!(
        "{GREEN}valid{RESET} {}: {}, {}",
        args.file.display(),
        count(plans.len(), "service"),
        count(upstreams, "connection")
    );
    Ok(())
}
