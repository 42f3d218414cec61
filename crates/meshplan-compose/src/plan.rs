//! Deployable plans: the synthesis engine's per-service output.
//!
//! A plan is immutable once emitted. Fields are read through accessors;
//! only the synthesis engine constructs plans.

use meshplan_common::error::Result;
use meshplan_common::types::{ContainerRef, ContainerRole};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::contribution::{
    ContainerSpec, IngressRule, LoadBalancerSpec, NetworkGroup, PlanOutput, PortRule, SecretRef,
    SidecarConfig, UpstreamEntry,
};

/// A container together with the containers it must start after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerPlan {
    /// The merged container definition.
    #[serde(flatten)]
    pub spec: ContainerSpec,
    /// Containers that must have started before this one.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub start_after: Vec<ContainerRef>,
}

/// The fully synthesized description of one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployablePlan {
    service: String,
    containers: Vec<ContainerPlan>,
    ports: Vec<PortRule>,
    ingress_rules: Vec<IngressRule>,
    secrets: Vec<SecretRef>,
    volumes: Vec<String>,
    security_groups: Vec<NetworkGroup>,
    outputs: Vec<PlanOutput>,
    assign_public_ip: bool,
    load_balancer: Option<LoadBalancerSpec>,
    sidecar: Option<SidecarConfig>,
}

/// Mutable staging area the synthesis engine fills before sealing a plan.
#[derive(Debug, Default)]
pub(crate) struct PlanParts {
    pub containers: Vec<ContainerPlan>,
    pub ports: Vec<PortRule>,
    pub ingress_rules: Vec<IngressRule>,
    pub secrets: Vec<SecretRef>,
    pub volumes: Vec<String>,
    pub security_groups: Vec<NetworkGroup>,
    pub outputs: Vec<PlanOutput>,
    pub assign_public_ip: bool,
    pub load_balancer: Option<LoadBalancerSpec>,
    pub sidecar: Option<SidecarConfig>,
}

impl DeployablePlan {
    pub(crate) fn seal(service: String, parts: PlanParts) -> Self {
        Self {
            service,
            containers: parts.containers,
            ports: parts.ports,
            ingress_rules: parts.ingress_rules,
            secrets: parts.secrets,
            volumes: parts.volumes,
            security_groups: parts.security_groups,
            outputs: parts.outputs,
            assign_public_ip: parts.assign_public_ip,
            load_balancer: parts.load_balancer,
            sidecar: parts.sidecar,
        }
    }

    /// Service this plan deploys.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Containers in unit-addition order.
    pub fn containers(&self) -> &[ContainerPlan] {
        &self.containers
    }

    /// Looks up a container by name.
    pub fn container(&self, name: &str) -> Option<&ContainerPlan> {
        self.containers.iter().find(|c| c.spec.name.as_str() == name)
    }

    /// Looks up the container playing `role`.
    pub fn container_by_role(&self, role: &ContainerRole) -> Option<&ContainerPlan> {
        self.containers.iter().find(|c| &c.spec.role == role)
    }

    /// Merged port mappings.
    pub fn ports(&self) -> &[PortRule] {
        &self.ports
    }

    /// Merged network ingress rules.
    pub fn ingress_rules(&self) -> &[IngressRule] {
        &self.ingress_rules
    }

    /// Merged secret references.
    pub fn secrets(&self) -> &[SecretRef] {
        &self.secrets
    }

    /// Task-level volumes.
    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    /// Network groups the service's tasks join.
    pub fn security_groups(&self) -> &[NetworkGroup] {
        &self.security_groups
    }

    /// Published outputs.
    pub fn outputs(&self) -> &[PlanOutput] {
        &self.outputs
    }

    /// Looks up a published output by key.
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.value.as_str())
    }

    /// Whether tasks receive a public IP.
    pub const fn assign_public_ip(&self) -> bool {
        self.assign_public_ip
    }

    /// Load balancer listener, if the service has ingress.
    pub const fn load_balancer(&self) -> Option<&LoadBalancerSpec> {
        self.load_balancer.as_ref()
    }

    /// Mesh sidecar configuration, if the service is in the mesh.
    pub const fn sidecar(&self) -> Option<&SidecarConfig> {
        self.sidecar.as_ref()
    }

    /// Proxied upstreams; empty for services outside the mesh.
    pub fn upstreams(&self) -> &[UpstreamEntry] {
        self.sidecar
            .as_ref()
            .map(|s| s.upstreams.as_slice())
            .unwrap_or_default()
    }

    /// SHA-256 of the plan's canonical JSON form, hex encoded.
    ///
    /// Two structurally identical plans always share a fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be serialized.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
