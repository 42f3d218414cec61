//! Provisioning backend abstraction.
//!
//! The compiler stops at the plan; creating cloud resources is the job of
//! a [`ProvisioningBackend`]. [`DryRunBackend`] renders documents and
//! reports what would be reachable without contacting anything.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use meshplan_common::error::Result;
use meshplan_compose::plan::DeployablePlan;
use serde::Serialize;

use crate::document::TaskDocument;

/// An address a provisioned service publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    /// Service that published it.
    pub service: String,
    /// Output key it was derived from.
    pub name: String,
    /// The published value.
    pub address: String,
}

/// Outcome of provisioning one plan.
///
/// `errors` holds problems the backend found but could work around or
/// defer; hard failures are returned as `Err` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    /// Published endpoints.
    pub endpoints: Vec<Endpoint>,
    /// Non-fatal provisioning problems.
    pub errors: Vec<String>,
}

impl ProvisionReport {
    /// Returns whether provisioning reported no problems.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Something that turns a plan into running infrastructure.
pub trait ProvisioningBackend: Send + Sync {
    /// Provisions the resources described by `plan`.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be provisioned at all.
    fn provision(&self, plan: &DeployablePlan) -> Result<ProvisionReport>;
}

/// Provisions every plan in order, stopping at the first hard failure.
///
/// # Errors
///
/// Returns the first error a backend reports.
pub fn provision_all(
    backend: &dyn ProvisioningBackend,
    plans: &[DeployablePlan],
) -> Result<Vec<ProvisionReport>> {
    plans
        .iter()
        .map(|plan| {
            tracing::info!(service = plan.service(), "provisioning plan");
            backend.provision(plan)
        })
        .collect()
}

/// Backend that records rendered documents instead of creating resources.
#[derive(Debug, Default)]
pub struct DryRunBackend {
    documents: Mutex<Vec<TaskDocument>>,
    known_secrets: Option<BTreeSet<String>>,
}

impl DryRunBackend {
    /// Creates a backend that accepts every secret handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the secret store to `handles`; references to any other
    /// handle are reported as provisioning errors.
    #[must_use]
    pub fn with_known_secrets<I, S>(mut self, handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_secrets = Some(handles.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the documents rendered so far, in provisioning order.
    pub fn documents(&self) -> Vec<TaskDocument> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProvisioningBackend for DryRunBackend {
    fn provision(&self, plan: &DeployablePlan) -> Result<ProvisionReport> {
        let document = TaskDocument::from_plan(plan)?;

        let mut errors = Vec::new();
        if let Some(ref known) = self.known_secrets {
            for secret in plan.secrets() {
                if !known.contains(secret.handle.as_str()) {
                    errors.push(format!(
                        "secret {} for container {} references unknown handle {}",
                        secret.name, secret.container, secret.handle
                    ));
                }
            }
        }

        let endpoints = plan
            .outputs()
            .iter()
            .map(|o| Endpoint {
                service: plan.service().to_string(),
                name: o.key.clone(),
                address: o.value.clone(),
            })
            .collect();

        tracing::debug!(
            service = plan.service(),
            fingerprint = %document.fingerprint,
            errors = errors.len(),
            "dry run recorded document"
        );
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(document);

        Ok(ProvisionReport { endpoints, errors })
    }
}
