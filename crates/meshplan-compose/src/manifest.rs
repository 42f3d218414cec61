//! Topology manifests: the on-disk description of a whole topology.
//!
//! A manifest is a YAML or JSON document with optional control-plane blocks
//! (`cluster`, `trust`, `security_groups`), optional compiler overrides, and
//! a list of services. Each service lists its capability units in order
//! and the connections it makes:
//!
//! ```yaml
//! cluster: { tag_key: Name, tag_value: test-consul-server, region: us-east-1, datacenter: dc1 }
//! trust: { ca_cert: arn:ca, gossip_key: arn:gossip }
//! security_groups: { client: consul-client, server: consul-server }
//! services:
//!   - name: greeter
//!     units:
//!       - kind: workload
//!         image: nathanpeck/greeter
//!         traffic_port: 3000
//!       - kind: mesh
//!     connect:
//!       - { target: name, local_bind_port: 3001 }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use meshplan_common::config::CompilerConfig;
use meshplan_common::error::{MeshError, Result};
use serde::{Deserialize, Serialize};

use crate::descriptor::ServiceDescriptor;
use crate::graph::TopologyGraph;
use crate::retry_join::ClusterIdentity;
use crate::trust::TrustMaterial;
use crate::unit::{
    AddressingUnit, CapabilityUnit, DnsRecord, IngressUnit, MeshSidecarUnit, SecurityGroups,
    WorkloadUnit,
};

/// Root of a topology manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Control-plane cluster every mesh sidecar joins.
    #[serde(default)]
    pub cluster: Option<ClusterIdentity>,
    /// Trust material every mesh sidecar distributes.
    #[serde(default)]
    pub trust: Option<TrustMaterial>,
    /// Client and server security groups of the control plane.
    #[serde(default)]
    pub security_groups: Option<SecurityGroups>,
    /// Compiler settings overriding the defaults for this topology.
    #[serde(default)]
    pub compiler: Option<CompilerConfig>,
    /// Services in registration order.
    #[serde(default)]
    pub services: Vec<ServiceManifest>,
}

/// One service entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceManifest {
    /// Unique service name.
    pub name: String,
    /// Capability units in addition order.
    #[serde(default)]
    pub units: Vec<UnitManifest>,
    /// Outgoing connections in insertion order.
    #[serde(default)]
    pub connect: Vec<ConnectManifest>,
}

/// A capability unit entry, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitManifest {
    /// Application container.
    Workload(WorkloadManifest),
    /// Mesh agent and sidecar proxy.
    Mesh(MeshManifest),
    /// HTTP load balancer.
    Ingress(IngressManifest),
    /// Public addressing.
    Addressing(AddressingManifest),
}

/// Fields of a `workload` unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadManifest {
    /// Container image reference.
    pub image: String,
    /// Port the application listens on.
    pub traffic_port: u16,
    /// CPU units reserved for the container.
    #[serde(default)]
    pub cpu: Option<u32>,
    /// Memory reservation in MiB.
    #[serde(default)]
    pub memory_mib: Option<u32>,
    /// Extra environment variables.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Command override.
    #[serde(default)]
    pub command: Vec<String>,
}

/// Fields of a `mesh` unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshManifest {
    /// Catalog name, defaulting to the service name.
    #[serde(default)]
    pub discovery_name: Option<String>,
    /// Whether agents verify each other's certificates.
    #[serde(default = "default_tls")]
    pub tls: bool,
}

const fn default_tls() -> bool {
    true
}

/// Fields of an `ingress` unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngressManifest {
    /// Public listener port, defaulting to the compiler setting.
    #[serde(default)]
    pub listener_port: Option<u16>,
}

/// Fields of an `addressing` unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddressingManifest {
    /// DNS record to publish.
    #[serde(default)]
    pub dns: Option<DnsRecord>,
}

/// One outgoing connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectManifest {
    /// Target service name.
    pub target: String,
    /// Port the sidecar binds on `localhost` for this upstream.
    pub local_bind_port: u16,
}

/// Control-plane values shared by every mesh unit of one manifest.
struct SharedMesh {
    cluster: Arc<ClusterIdentity>,
    trust: Arc<TrustMaterial>,
    groups: SecurityGroups,
}

impl Manifest {
    /// Loads a manifest, choosing JSON or YAML by extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading topology manifest");
        let content = std::fs::read_to_string(path).map_err(|e| MeshError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Parses a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Yaml`] on malformed input.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parses a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Serialization`] on malformed input.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Builds the topology graph the manifest describes.
    ///
    /// All services are registered before any connection is made, so a
    /// service may connect to one listed after it. Every mesh unit shares
    /// one cluster identity and one trust material value.
    ///
    /// # Errors
    ///
    /// Returns the first unit, registration, or connection error.
    pub fn into_topology(self) -> Result<TopologyGraph> {
        let shared = match (self.cluster, self.trust, self.security_groups) {
            (Some(cluster), Some(trust), Some(groups)) => Some(SharedMesh {
                cluster: Arc::new(cluster),
                trust: Arc::new(trust),
                groups,
            }),
            _ => None,
        };

        let mut graph = TopologyGraph::new();
        let mut connections = Vec::new();
        for service in self.services {
            let mut descriptor = ServiceDescriptor::new(&service.name);
            for (index, unit) in service.units.into_iter().enumerate() {
                let unit = build_unit(&service.name, unit, shared.as_ref())
                    .map_err(|e| e.at_unit(index))?;
                let _ = descriptor.add(unit)?;
            }
            graph.register(descriptor)?;
            connections.extend(
                service
                    .connect
                    .into_iter()
                    .map(|c| (service.name.clone(), c)),
            );
        }

        for (source, connection) in connections {
            graph.connect(&source, &connection.target, connection.local_bind_port)?;
        }

        tracing::debug!(
            services = graph.len(),
            connections = graph.connection_count(),
            "manifest loaded into topology"
        );
        Ok(graph)
    }
}

fn build_unit(
    service: &str,
    unit: UnitManifest,
    shared: Option<&SharedMesh>,
) -> Result<CapabilityUnit> {
    let unit = match unit {
        UnitManifest::Workload(w) => {
            let mut workload = WorkloadUnit::new(w.image, w.traffic_port).command(w.command);
            if let Some(cpu) = w.cpu {
                workload = workload.cpu(cpu);
            }
            if let Some(mib) = w.memory_mib {
                workload = workload.memory_mib(mib);
            }
            for (key, value) in w.environment {
                workload = workload.env(key, value);
            }
            workload.into()
        }
        UnitManifest::Mesh(m) => {
            let shared = shared.ok_or_else(|| {
                MeshError::config(
                    service,
                    "mesh unit needs the manifest's cluster, trust and security_groups blocks",
                )
            })?;
            let mut mesh = MeshSidecarUnit::new(
                Arc::clone(&shared.cluster),
                Arc::clone(&shared.trust),
                shared.groups.clone(),
            )
            .tls(m.tls);
            if let Some(name) = m.discovery_name {
                mesh = mesh.discovery_name(name);
            }
            mesh.into()
        }
        UnitManifest::Ingress(i) => {
            let mut ingress = IngressUnit::new();
            if let Some(port) = i.listener_port {
                ingress = ingress.listener_port(port);
            }
            ingress.into()
        }
        UnitManifest::Addressing(a) => {
            let mut addressing = AddressingUnit::new();
            if let Some(dns) = a.dns {
                addressing = addressing.dns(dns);
            }
            addressing.into()
        }
    };
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const GREETER: &str = r"
cluster:
  tag_key: Name
  tag_value: test-consul-server
  region: us-east-1
  datacenter: dc1
trust:
  ca_cert: arn:aws:secretsmanager:us-east-1:000000000000:secret:ca
  gossip_key: arn:aws:secretsmanager:us-east-1:000000000000:secret:gossip
security_groups:
  client: consul-client
  server: consul-server
services:
  - name: greeter
    units:
      - kind: workload
        image: nathanpeck/greeter
        traffic_port: 3000
      - kind: mesh
      - kind: ingress
    connect:
      - { target: name, local_bind_port: 3001 }
  - name: name
    units:
      - kind: workload
        image: nathanpeck/name
        traffic_port: 3000
      - kind: mesh
        discovery_name: name-svc
";

    #[test]
    fn yaml_manifest_builds_topology() {
        let graph = Manifest::from_yaml_str(GREETER)
            .expect("parse")
            .into_topology()
            .expect("topology");
        assert_eq!(graph.service_names(), vec!["greeter", "name"]);
        assert_eq!(graph.connection_count(), 1);
        assert_eq!(
            graph.descriptor("name").and_then(ServiceDescriptor::discovery_name),
            Some("name-svc")
        );
        let workload = graph
            .descriptor("greeter")
            .and_then(ServiceDescriptor::workload)
            .expect("greeter workload");
        assert_eq!(workload.image(), "nathanpeck/greeter");
        assert_eq!(workload.traffic_port(), 3000);
    }

    #[test]
    fn mesh_units_share_control_plane_values() {
        let graph = Manifest::from_yaml_str(GREETER)
            .expect("parse")
            .into_topology()
            .expect("topology");
        let a = graph
            .descriptor("greeter")
            .and_then(ServiceDescriptor::mesh_sidecar)
            .expect("greeter mesh");
        let b = graph
            .descriptor("name")
            .and_then(ServiceDescriptor::mesh_sidecar)
            .expect("name mesh");
        assert!(Arc::ptr_eq(a.cluster(), b.cluster()));
        assert!(Arc::ptr_eq(a.trust(), b.trust()));
    }

    #[test]
    fn mesh_unit_without_control_plane_fails() {
        let yaml = r"
services:
  - name: lonely
    units:
      - kind: workload
        image: img
        traffic_port: 3000
      - kind: mesh
";
        let err = Manifest::from_yaml_str(yaml)
            .expect("parse")
            .into_topology()
            .unwrap_err();
        assert!(
            matches!(err, MeshError::Configuration { unit: Some(1), .. }),
            "got: {err}"
        );
    }

    #[test]
    fn unknown_unit_kind_is_rejected() {
        let yaml = r"
services:
  - name: a
    units:
      - kind: teleport
";
        let err = Manifest::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, MeshError::Yaml { .. }), "got: {err}");
    }

    #[test]
    fn connection_to_unknown_service_fails() {
        let yaml = r"
services:
  - name: a
    connect:
      - { target: ghost, local_bind_port: 3001 }
";
        let err = Manifest::from_yaml_str(yaml)
            .expect("parse")
            .into_topology()
            .unwrap_err();
        assert!(matches!(err, MeshError::UnknownService { .. }), "got: {err}");
    }

    #[test]
    fn load_json_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        write!(
            file,
            r#"{{"services": [{{"name": "web", "units": [{{"kind": "workload", "image": "nginx", "traffic_port": 80}}, {{"kind": "addressing"}}]}}]}}"#
        )
        .expect("write");

        let manifest = Manifest::load(file.path()).expect("load");
        assert_eq!(manifest.services.len(), 1);
        assert_eq!(manifest.services[0].units.len(), 2);
    }

    #[test]
    fn compiler_overrides_are_parsed() {
        let yaml = "compiler:\n  proxy_port: 21000\nservices: []\n";
        let manifest = Manifest::from_yaml_str(yaml).expect("parse");
        assert_eq!(manifest.compiler.map(|c| c.proxy_port), Some(21000));
    }
}
