//! The application container of a service.

use std::collections::BTreeMap;

use meshplan_common::error::{MeshError, Result};
use meshplan_common::types::{ContainerRef, ContainerRole, Protocol};

use super::{Capability, ServiceContext, UnitKind};
use crate::contribution::{ContainerSpec, Contribution, NetworkGroup, PortRule};

/// Builder-style description of the workload container.
///
/// At most one workload unit may be added to a service; its traffic port
/// is the port every other unit proxies, routes, or protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadUnit {
    image: String,
    traffic_port: u16,
    cpu: Option<u32>,
    memory_mib: Option<u32>,
    command: Vec<String>,
    environment: BTreeMap<String, String>,
}

impl WorkloadUnit {
    /// Creates a workload running `image` and listening on `traffic_port`.
    #[must_use]
    pub fn new(image: impl Into<String>, traffic_port: u16) -> Self {
        Self {
            image: image.into(),
            traffic_port,
            cpu: None,
            memory_mib: None,
            command: Vec::new(),
            environment: BTreeMap::new(),
        }
    }

    /// Sets the CPU units reserved for the container.
    #[must_use]
    pub const fn cpu(mut self, units: u32) -> Self {
        self.cpu = Some(units);
        self
    }

    /// Sets the memory reservation in MiB.
    #[must_use]
    pub const fn memory_mib(mut self, mib: u32) -> Self {
        self.memory_mib = Some(mib);
        self
    }

    /// Sets the command to run inside the container.
    #[must_use]
    pub fn command(mut self, cmd: Vec<String>) -> Self {
        self.command = cmd;
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.environment.insert(key.into(), value.into());
        self
    }

    /// Returns the declared traffic port.
    pub const fn traffic_port(&self) -> u16 {
        self.traffic_port
    }

    /// Returns the image reference.
    pub fn image(&self) -> &str {
        &self.image
    }
}

impl Capability for WorkloadUnit {
    fn kind(&self) -> UnitKind {
        UnitKind::Workload
    }

    fn contribute(&self, ctx: &ServiceContext<'_>) -> Result<Contribution> {
        if self.image.trim().is_empty() {
            return Err(MeshError::config(ctx.service, "workload image is empty"));
        }
        if self.traffic_port == 0 {
            return Err(MeshError::config(ctx.service, "workload traffic port is 0"));
        }

        let name = ContainerRef::new(ctx.service);
        let mut environment = self.environment.clone();
        let _ = environment
            .entry("PORT".into())
            .or_insert_with(|| self.traffic_port.to_string());

        Ok(Contribution {
            containers: vec![ContainerSpec {
                name: name.clone(),
                role: ContainerRole::Workload,
                image: self.image.clone(),
                cpu: self.cpu,
                memory_mib: self.memory_mib,
                entry_point: Vec::new(),
                command: self.command.clone(),
                environment,
                mount_points: Vec::new(),
                essential: true,
            }],
            ports: vec![PortRule {
                container: name,
                container_port: self.traffic_port,
                protocol: Protocol::Tcp,
            }],
            security_groups: vec![NetworkGroup::Service(ctx.service.to_string())],
            ..Contribution::default()
        })
    }
}
