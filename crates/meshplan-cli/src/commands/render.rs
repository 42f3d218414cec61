//! `mshp render`: Render task documents for every service.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, ValueEnum};
use meshplan_emit::format::Format;

/// Output encodings accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    Json,
    /// YAML.
    Yaml,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => Self::Json,
            OutputFormat::Yaml => Self::Yaml,
        }
    }
}

/// Arguments for the `render` command.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Path to the topology manifest.
    #[arg(default_value = "meshplan.yaml")]
    pub file: PathBuf,

    /// Write output to a file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output encoding; guessed from the output file's extension when omitted.
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl RenderArgs {
    fn resolved_format(&self) -> Format {
        match (self.format, &self.output) {
            (Some(format), _) => format.into(),
            (None, Some(path)) => Format::from_path(path),
            (None, None) => Format::default(),
        }
    }
}

/// Executes the `render` command.
///
/// # Errors
///
/// Returns an error if compilation, serialization, or writing fails.
pub fn execute(args: &RenderArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let plans = super::compile_manifest(&args.file, config)?;
    let format = args.resolved_format();
    let rendered = meshplan_emit::render(&plans, format)?;

    if let Some(ref out_path) = args.output {
        std::fs::write(out_path, &rendered)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        tracing::info!(path = %out_path.display(), %format, plans = plans.len(), "documents written");
        println!("Rendered {} -> {}", args.file.display(), out_path.display());
    } else {
        print!("{rendered}");
    }
    Ok(())
}
