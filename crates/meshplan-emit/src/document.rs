//! Task documents: the provisioning-facing shape of a deployable plan.
//!
//! Field names follow the container-orchestrator task-definition schema
//! (`containerDefinitions`, `portMappings`, `dependsOn`, ...), so a
//! document can be handed to a provisioning tool without reshaping.

use std::collections::BTreeMap;

use meshplan_common::error::Result;
use meshplan_common::types::Protocol;
use meshplan_compose::plan::{ContainerPlan, DeployablePlan};
use serde::Serialize;

/// Start condition used for every container dependency.
pub const START_CONDITION: &str = "START";

/// One service's task definition plus the network wiring around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    /// Task family, named after the service.
    pub family: String,
    /// Containers in plan order.
    pub container_definitions: Vec<ContainerDefinition>,
    /// Task-level volumes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeDefinition>,
    /// How the task attaches to the network.
    pub network_configuration: NetworkConfiguration,
    /// Rules admitting traffic into the service's groups.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_group_ingress: Vec<IngressDefinition>,
    /// Load balancer in front of the workload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerDefinition>,
    /// Published outputs, sorted by key.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    /// Fingerprint of the plan this document was rendered from.
    pub fingerprint: String,
}

/// A container inside the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// CPU units.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// Soft memory limit in MiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_reservation: Option<u32>,
    /// Entry point override.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entry_point: Vec<String>,
    /// Command arguments.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Whether the task stops when this container exits.
    pub essential: bool,
    /// Exposed ports.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapping>,
    /// Plain environment variables, sorted by name.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
    /// Secret-backed environment variables.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretDefinition>,
    /// Volume mounts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mount_points: Vec<MountPointDefinition>,
    /// Containers that must start first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ContainerDependency>,
}

/// An exposed container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

/// A `name`/`value` environment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValuePair {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// An environment variable resolved from the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretDefinition {
    /// Variable name.
    pub name: String,
    /// Secret handle.
    pub value_from: String,
}

/// A volume mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountPointDefinition {
    /// Task volume name.
    pub source_volume: String,
    /// Path inside the container.
    pub container_path: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

/// A start-order dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDependency {
    /// Container that must start first.
    pub container_name: String,
    /// Condition the dependency waits for.
    pub condition: String,
}

/// A task-level volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeDefinition {
    /// Volume name.
    pub name: String,
}

/// Network attachment of the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    /// Whether tasks receive a public IP.
    pub assign_public_ip: bool,
    /// Groups the task joins.
    pub security_groups: Vec<String>,
}

/// One ingress rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressDefinition {
    /// Group the rule is attached to.
    pub group: String,
    /// Traffic origin.
    pub source: String,
    /// Destination port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Purpose of the rule.
    pub description: String,
}

/// Load balancer listener and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerDefinition {
    /// Public listener port.
    pub listener_port: u16,
    /// Container receiving traffic.
    pub container_name: String,
    /// Port on that container.
    pub container_port: u16,
}

impl TaskDocument {
    /// Maps a plan onto the task-definition schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan cannot be fingerprinted.
    pub fn from_plan(plan: &DeployablePlan) -> Result<Self> {
        let containers = plan
            .containers()
            .iter()
            .map(|c| container_definition(plan, c))
            .collect();

        Ok(Self {
            family: plan.service().to_string(),
            container_definitions: containers,
            volumes: plan
                .volumes()
                .iter()
                .map(|name| VolumeDefinition { name: name.clone() })
                .collect(),
            network_configuration: NetworkConfiguration {
                assign_public_ip: plan.assign_public_ip(),
                security_groups: plan.security_groups().iter().map(ToString::to_string).collect(),
            },
            security_group_ingress: plan
                .ingress_rules()
                .iter()
                .map(|r| IngressDefinition {
                    group: r.target.to_string(),
                    source: r.peer.to_string(),
                    port: r.port,
                    protocol: r.protocol,
                    description: r.description.clone(),
                })
                .collect(),
            load_balancer: plan.load_balancer().map(|lb| LoadBalancerDefinition {
                listener_port: lb.listener_port,
                container_name: lb.target_container.to_string(),
                container_port: lb.target_port,
            }),
            outputs: plan
                .outputs()
                .iter()
                .map(|o| (o.key.clone(), o.value.clone()))
                .collect(),
            fingerprint: plan.fingerprint()?,
        })
    }

    /// Looks up a container definition by name.
    pub fn container(&self, name: &str) -> Option<&ContainerDefinition> {
        self.container_definitions.iter().find(|c| c.name == name)
    }
}

fn container_definition(plan: &DeployablePlan, container: &ContainerPlan) -> ContainerDefinition {
    let spec = &container.spec;
    ContainerDefinition {
        name: spec.name.to_string(),
        image: spec.image.clone(),
        cpu: spec.cpu,
        memory_reservation: spec.memory_mib,
        entry_point: spec.entry_point.clone(),
        command: spec.command.clone(),
        essential: spec.essential,
        port_mappings: plan
            .ports()
            .iter()
            .filter(|p| p.container == spec.name)
            .map(|p| PortMapping {
                container_port: p.container_port,
                protocol: p.protocol,
            })
            .collect(),
        environment: spec
            .environment
            .iter()
            .map(|(name, value)| KeyValuePair {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
        secrets: plan
            .secrets()
            .iter()
            .filter(|s| s.container == spec.name)
            .map(|s| SecretDefinition {
                name: s.name.clone(),
                value_from: s.handle.to_string(),
            })
            .collect(),
        mount_points: spec
            .mount_points
            .iter()
            .map(|m| MountPointDefinition {
                source_volume: m.source_volume.clone(),
                container_path: m.container_path.clone(),
                read_only: m.read_only,
            })
            .collect(),
        depends_on: container
            .start_after
            .iter()
            .map(|after| ContainerDependency {
                container_name: after.to_string(),
                condition: START_CONDITION.into(),
            })
            .collect(),
    }
}
