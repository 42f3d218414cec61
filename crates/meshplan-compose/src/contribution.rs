//! Values a capability unit contributes to its service.
//!
//! A [`Contribution`] is plain data: the synthesis engine merges the
//! contributions of every unit in a descriptor into one deployable plan.

use std::collections::BTreeMap;
use std::fmt;

use meshplan_common::types::{ContainerRef, ContainerRole, Protocol, SecretHandle};
use serde::{Deserialize, Serialize};

use crate::retry_join::RetryJoinParams;

/// One container a unit wants in the service's task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name, unique within the task.
    pub name: ContainerRef,
    /// Logical role used as the merge key.
    pub role: ContainerRole,
    /// Image reference.
    pub image: String,
    /// CPU units, if reserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// Memory reservation in MiB, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mib: Option<u32>,
    /// Entry point override.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entry_point: Vec<String>,
    /// Command arguments.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Plain environment variables.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Volume mounts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mount_points: Vec<MountPoint>,
    /// Whether the task stops when this container exits.
    pub essential: bool,
}

/// A task volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MountPoint {
    /// Name of the task volume.
    pub source_volume: String,
    /// Path inside the container.
    pub container_path: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

/// A port a container exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRule {
    /// Container exposing the port.
    pub container: ContainerRef,
    /// Port inside the container.
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

/// A network group rules are attached to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum NetworkGroup {
    /// A security group provisioned outside the topology (e.g. the mesh client group).
    SecurityGroup(String),
    /// The group owned by one service's tasks.
    Service(String),
    /// The group owned by one service's load balancer.
    LoadBalancer(String),
}

impl fmt::Display for NetworkGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecurityGroup(name) => write!(f, "sg:{name}"),
            Self::Service(name) => write!(f, "service:{name}"),
            Self::LoadBalancer(name) => write!(f, "lb:{name}"),
        }
    }
}

/// Origin of traffic admitted by an ingress rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// Members of a network group.
    Group(NetworkGroup),
    /// Anywhere on the IPv4 internet.
    AnyIpv4,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(group) => write!(f, "{group}"),
            Self::AnyIpv4 => write!(f, "0.0.0.0/0"),
        }
    }
}

/// Permission for `peer` to reach `target` on one port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngressRule {
    /// Group the rule is attached to.
    pub target: NetworkGroup,
    /// Traffic origin.
    pub peer: Peer,
    /// Destination port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Human-readable purpose.
    pub description: String,
}

/// A secret injected into a container as an environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    /// Receiving container.
    pub container: ContainerRef,
    /// Environment variable name.
    pub name: String,
    /// Handle resolved by the secret store at provisioning time.
    pub handle: SecretHandle,
}

/// `container` must not start before `after` has started.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StartAfter {
    /// Dependent container.
    pub container: ContainerRef,
    /// Container that must be started first.
    pub after: ContainerRef,
}

/// An environment variable injected into a container declared by another unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Receiving container.
    pub container: ContainerRef,
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// A value published alongside the plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanOutput {
    /// Output key, unique per plan.
    pub key: String,
    /// Output value.
    pub value: String,
}

/// An HTTP load balancer listener forwarding to a container port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    /// Public listener port.
    pub listener_port: u16,
    /// Container receiving forwarded traffic.
    pub target_container: ContainerRef,
    /// Port on the target container.
    pub target_port: u16,
}

/// One upstream the sidecar exposes on a local port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpstreamEntry {
    /// Discovery name of the upstream service.
    pub target: String,
    /// Port on `localhost` the workload calls.
    pub local_bind_port: u16,
}

/// Mesh sidecar configuration carried by the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarConfig {
    /// Name the service registers under in the mesh catalog.
    pub discovery_name: String,
    /// Control-plane datacenter.
    pub datacenter: String,
    /// Whether agent traffic is TLS-verified.
    pub tls: bool,
    /// Cluster discovery selector.
    pub retry_join: RetryJoinParams,
    /// Proxied upstreams, in connection order.
    pub upstreams: Vec<UpstreamEntry>,
}

/// Everything one capability unit adds to its service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contribution {
    /// Containers, merged by role.
    pub containers: Vec<ContainerSpec>,
    /// Exposed ports.
    pub ports: Vec<PortRule>,
    /// Network permissions.
    pub ingress_rules: Vec<IngressRule>,
    /// Secret wiring.
    pub secrets: Vec<SecretRef>,
    /// Start-order constraints.
    pub start_after: Vec<StartAfter>,
    /// Environment injected into other units' containers.
    pub environment: Vec<EnvVar>,
    /// Task volumes.
    pub volumes: Vec<String>,
    /// Groups the service's tasks join.
    pub security_groups: Vec<NetworkGroup>,
    /// Published outputs.
    pub outputs: Vec<PlanOutput>,
    /// Whether tasks receive a public IP.
    pub assign_public_ip: bool,
    /// Load balancer listener, if any.
    pub load_balancer: Option<LoadBalancerSpec>,
    /// Mesh sidecar configuration, if any.
    pub sidecar: Option<SidecarConfig>,
}
