//! `mshp plan`: Summarize the plans a manifest compiles to.

use std::path::{Path, PathBuf};

use clap::Args;
use meshplan_emit::backend::{DryRunBackend, provision_all};

use crate::output::{BOLD, CYAN, DIM, RESET, count, format_container, short_fingerprint};

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Path to the topology manifest.
    #[arg(default_value = "meshplan.yaml")]
    pub file: PathBuf,
}

/// Executes the `plan` command.
///
/// Compiles the manifest, dry-runs every plan, and prints one block per
/// service in registration order.
///
/// # Errors
///
/// Returns an error if loading, synthesis, or the dry run fails.
pub fn execute(args: &PlanArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let plans = super::compile_manifest(&args.file, config)?;
    let backend = DryRunBackend::new();
    let reports = provision_all(&backend, &plans)?;

    println!("{BOLD}Deployment plan for {}{RESET}", args.file.display());
    println!();

    for (plan, report) in plans.iter().zip(&reports) {
        let fingerprint = plan.fingerprint()?;
        println!(
            "  {CYAN}+ {}{RESET} {DIM}{}{RESET}",
            plan.service(),
            short_fingerprint(&fingerprint)
        );
        for container in plan.containers() {
            println!("      {}", format_container(container));
        }
        for upstream in plan.upstreams() {
            println!(
                "      upstream {} on localhost:{}",
                upstream.target, upstream.local_bind_port
            );
        }
        println!(
            "      {}, {}",
            count(plan.ingress_rules().len(), "ingress rule"),
            count(plan.secrets().len(), "secret")
        );
        for endpoint in &report.endpoints {
            println!("      {} = {}", endpoint.name, endpoint.address);
        }
        println!();
    }

    println!("  {} will be deployed.", count(plans.len(), "service"));
    Ok(())
}
