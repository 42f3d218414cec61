//! Capability units: the composable building blocks of a service.
//!
//! A service descriptor is an ordered list of units. Each unit is a pure
//! function of its own configuration and the [`ServiceContext`] the
//! synthesis engine hands it, producing a [`Contribution`].

pub mod addressing;
pub mod ingress;
pub mod mesh;
pub mod workload;

use std::fmt;

use meshplan_common::config::CompilerConfig;
use meshplan_common::error::{MeshError, Result};
use meshplan_common::types::ContainerRef;

use crate::contribution::Contribution;
use crate::retry_join::RetryJoinParams;

pub use self::addressing::{AddressingUnit, DnsRecord};
pub use self::ingress::IngressUnit;
pub use self::mesh::{MeshSidecarUnit, SecurityGroups};
pub use self::workload::WorkloadUnit;

/// Discriminant of a capability unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Application container.
    Workload,
    /// Mesh agent and sidecar proxy.
    MeshSidecar,
    /// HTTP load balancer.
    Ingress,
    /// Public addressing.
    Addressing,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workload => write!(f, "workload"),
            Self::MeshSidecar => write!(f, "mesh sidecar"),
            Self::Ingress => write!(f, "ingress"),
            Self::Addressing => write!(f, "addressing"),
        }
    }
}

/// An upstream resolved from one outgoing connection edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// Registered name of the target service.
    pub service: String,
    /// Name the target registers under in the mesh catalog.
    pub discovery_name: String,
    /// Port the sidecar binds on `localhost` for this upstream.
    pub local_bind_port: u16,
}

/// Everything a unit may know about the service it belongs to.
#[derive(Debug, Clone)]
pub struct ServiceContext<'a> {
    /// Service name.
    pub service: &'a str,
    /// Traffic port declared by the service's workload unit.
    pub traffic_port: Option<u16>,
    /// Name of the workload container.
    pub workload_container: Option<ContainerRef>,
    /// Discovery parameters resolved for the service's mesh sidecar.
    pub retry_join: Option<RetryJoinParams>,
    /// Outgoing connections, in insertion order.
    pub upstreams: &'a [Upstream],
    /// Services holding a connection to this one, in insertion order.
    pub downstreams: &'a [String],
    /// Deployment-wide compiler settings.
    pub config: &'a CompilerConfig,
}

impl<'a> ServiceContext<'a> {
    /// Creates a context for a service with no workload and no edges.
    pub const fn new(service: &'a str, config: &'a CompilerConfig) -> Self {
        Self {
            service,
            traffic_port: None,
            workload_container: None,
            retry_join: None,
            upstreams: &[],
            downstreams: &[],
            config,
        }
    }

    /// Returns the traffic port and workload container, or a configuration
    /// error naming what the caller needed them for.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Configuration`] if the service has no workload unit.
    pub fn require_workload(&self, purpose: &str) -> Result<(u16, ContainerRef)> {
        match (self.traffic_port, &self.workload_container) {
            (Some(port), Some(container)) => Ok((port, container.clone())),
            _ => Err(MeshError::config(
                self.service,
                format!("no traffic port to {purpose}"),
            )),
        }
    }
}

/// Behaviour shared by every capability unit.
pub trait Capability {
    /// Which variant this unit is.
    fn kind(&self) -> UnitKind;

    /// Computes what this unit adds to the service.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the unit cannot be satisfied in
    /// the given context.
    fn contribute(&self, ctx: &ServiceContext<'_>) -> Result<Contribution>;
}

/// A capability unit of any variant.
#[derive(Debug, Clone)]
pub enum CapabilityUnit {
    /// Application container.
    Workload(WorkloadUnit),
    /// Mesh agent and sidecar proxy.
    MeshSidecar(MeshSidecarUnit),
    /// HTTP load balancer.
    Ingress(IngressUnit),
    /// Public addressing.
    Addressing(AddressingUnit),
}

impl Capability for CapabilityUnit {
    fn kind(&self) -> UnitKind {
        match self {
            Self::Workload(u) => u.kind(),
            Self::MeshSidecar(u) => u.kind(),
            Self::Ingress(u) => u.kind(),
            Self::Addressing(u) => u.kind(),
        }
    }

    fn contribute(&self, ctx: &ServiceContext<'_>) -> Result<Contribution> {
        match self {
            Self::Workload(u) => u.contribute(ctx),
            Self::MeshSidecar(u) => u.contribute(ctx),
            Self::Ingress(u) => u.contribute(ctx),
            Self::Addressing(u) => u.contribute(ctx),
        }
    }
}

impl From<WorkloadUnit> for CapabilityUnit {
    fn from(unit: WorkloadUnit) -> Self {
        Self::Workload(unit)
    }
}

impl From<MeshSidecarUnit> for CapabilityUnit {
    fn from(unit: MeshSidecarUnit) -> Self {
        Self::MeshSidecar(unit)
    }
}

impl From<IngressUnit> for CapabilityUnit {
    fn from(unit: IngressUnit) -> Self {
        Self::Ingress(unit)
    }
}

impl From<AddressingUnit> for CapabilityUnit {
    fn from(unit: AddressingUnit) -> Self {
        Self::Addressing(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_workload_fails_without_traffic_port() {
        let config = CompilerConfig::default();
        let ctx = ServiceContext::new("orphan", &config);
        let err = ctx.require_workload("proxy").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no traffic port to proxy"), "got: {msg}");
        assert!(msg.contains("orphan"), "got: {msg}");
    }

    #[test]
    fn require_workload_returns_port_and_container() {
        let config = CompilerConfig::default();
        let ctx = ServiceContext {
            traffic_port: Some(3000),
            workload_container: Some(ContainerRef::new("name")),
            ..ServiceContext::new("name", &config)
        };
        let (port, container) = ctx.require_workload("proxy").expect("workload present");
        assert_eq!(port, 3000);
        assert_eq!(container.as_str(), "name");
    }

    #[test]
    fn enum_dispatch_reports_kind() {
        let unit = CapabilityUnit::from(AddressingUnit::new());
        assert_eq!(unit.kind(), UnitKind::Addressing);
        assert_eq!(unit.kind().to_string(), "addressing");
    }
}
