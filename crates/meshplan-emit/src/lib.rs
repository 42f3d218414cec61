//! # meshplan-emit
//!
//! Hands synthesized plans to the provisioning layer.
//!
//! - **Document**: maps a plan onto a task-definition-shaped document.
//! - **Format**: JSON and YAML encodings of documents.
//! - **Backend**: the provisioning seam and a dry-run implementation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod document;
pub mod format;

use meshplan_common::error::Result;
use meshplan_compose::plan::DeployablePlan;

use crate::document::TaskDocument;
use crate::format::Format;

/// Renders every plan as a task document and serializes the list.
///
/// # Errors
///
/// Returns an error if a plan cannot be fingerprinted or serialized.
pub fn render(plans: &[DeployablePlan], format: Format) -> Result<String> {
    let documents = plans
        .iter()
        .map(TaskDocument::from_plan)
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(documents = documents.len(), %format, "rendering task documents");
    format.render(&documents)
}
