//! Service descriptors: a named, ordered set of capability units.

use meshplan_common::error::{MeshError, Result};
use meshplan_common::types::ContainerRef;

use crate::unit::{Capability, CapabilityUnit, MeshSidecarUnit, UnitKind, WorkloadUnit};

/// One logical service assembled from capability units.
///
/// Descriptors are mutable until the synthesis engine freezes them; after
/// that every [`add`](Self::add) fails with [`MeshError::FrozenDescriptor`].
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    name: String,
    units: Vec<CapabilityUnit>,
    frozen: bool,
}

impl ServiceDescriptor {
    /// Creates an empty descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: Vec::new(),
            frozen: false,
        }
    }

    /// Appends a capability unit.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::FrozenDescriptor`] once the descriptor is frozen,
    /// and [`MeshError::Configuration`] for a second workload or mesh
    /// sidecar unit.
    pub fn add(&mut self, unit: impl Into<CapabilityUnit>) -> Result<&mut Self> {
        if self.frozen {
            return Err(MeshError::FrozenDescriptor {
                service: self.name.clone(),
            });
        }

        let unit = unit.into();
        let kind = unit.kind();
        if matches!(kind, UnitKind::Workload | UnitKind::MeshSidecar)
            && self.units.iter().any(|u| u.kind() == kind)
        {
            return Err(MeshError::Configuration {
                service: self.name.clone(),
                unit: Some(self.units.len()),
                message: format!("a service may declare only one {kind} unit"),
            });
        }

        tracing::debug!(service = %self.name, %kind, index = self.units.len(), "adding unit");
        self.units.push(unit);
        Ok(self)
    }

    /// Consuming variant of [`add`](Self::add) for building descriptors inline.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub fn with(mut self, unit: impl Into<CapabilityUnit>) -> Result<Self> {
        let _ = self.add(unit)?;
        Ok(self)
    }

    /// Freezes the descriptor. Repeated calls are no-ops.
    pub fn freeze(&mut self) {
        if !self.frozen {
            tracing::debug!(service = %self.name, "freezing descriptor");
            self.frozen = true;
        }
    }

    /// Returns whether the descriptor is frozen.
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns the service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the units in addition order.
    pub fn units(&self) -> &[CapabilityUnit] {
        &self.units
    }

    /// Returns the workload unit, if any.
    pub fn workload(&self) -> Option<&WorkloadUnit> {
        self.units.iter().find_map(|u| match u {
            CapabilityUnit::Workload(w) => Some(w),
            _ => None,
        })
    }

    /// Returns the mesh sidecar unit, if any.
    pub fn mesh_sidecar(&self) -> Option<&MeshSidecarUnit> {
        self.units.iter().find_map(|u| match u {
            CapabilityUnit::MeshSidecar(m) => Some(m),
            _ => None,
        })
    }

    /// Returns the traffic port if a workload unit declares one.
    pub fn declared_traffic_port(&self) -> Option<u16> {
        self.workload().map(WorkloadUnit::traffic_port)
    }

    /// Returns the workload's traffic port.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Configuration`] if there is no workload unit.
    pub fn traffic_port(&self) -> Result<u16> {
        self.declared_traffic_port()
            .ok_or_else(|| MeshError::config(&self.name, "no workload unit declares a traffic port"))
    }

    /// Returns the workload container's name if a workload unit exists.
    pub fn workload_container(&self) -> Option<ContainerRef> {
        self.workload().map(|_| ContainerRef::new(&self.name))
    }

    /// Returns the name this service registers under in the mesh catalog.
    pub fn discovery_name(&self) -> Option<&str> {
        self.mesh_sidecar()
            .map(|m| m.resolved_discovery_name(&self.name))
    }
}
