//! Topology graph of mesh connections using `petgraph`.
//!
//! Nodes are service descriptors in registration order; each directed edge
//! is a `connectTo` declaration weighted by the local bind port the source's
//! sidecar exposes the target on. Cycles between distinct services are
//! valid mesh topologies and are not rejected.

use std::collections::HashMap;

use meshplan_common::error::{MeshError, Result};
use petgraph::Direction;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::descriptor::ServiceDescriptor;

/// A directed connection from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionEdge {
    /// Calling service.
    pub source: String,
    /// Called service.
    pub target: String,
    /// Port on the source's `localhost` the target is reachable at.
    pub local_bind_port: u16,
}

/// The set of registered services and the connections between them.
#[derive(Debug, Default)]
pub struct TopologyGraph {
    graph: petgraph::Graph<ServiceDescriptor, u16>,
    index: HashMap<String, NodeIndex>,
}

impl TopologyGraph {
    /// Creates an empty topology.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service descriptor as a graph node.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::DuplicateService`] if the name is taken, or a
    /// configuration error if the name is empty.
    pub fn register(&mut self, descriptor: ServiceDescriptor) -> Result<()> {
        let name = descriptor.name().to_string();
        if name.trim().is_empty() {
            return Err(MeshError::config(name, "service name is empty"));
        }
        if self.index.contains_key(&name) {
            return Err(MeshError::DuplicateService { name });
        }

        tracing::info!(service = %name, units = descriptor.units().len(), "registering service");
        let idx = self.graph.add_node(descriptor);
        let _ = self.index.insert(name, idx);
        Ok(())
    }

    /// Adds a directed connection from `source` to `target`.
    ///
    /// # Errors
    ///
    /// - [`MeshError::UnknownService`] if either endpoint is not registered.
    /// - [`MeshError::SelfConnection`] if `source == target`.
    /// - [`MeshError::PortCollision`] if `local_bind_port` is already bound
    ///   by another outgoing edge of `source` or equals its traffic port.
    pub fn connect(&mut self, source: &str, target: &str, local_bind_port: u16) -> Result<()> {
        let from = self.node(source)?;
        let to = self.node(target)?;
        if from == to {
            return Err(MeshError::SelfConnection {
                service: source.to_string(),
            });
        }

        check_bind_port(&self.graph[from], local_bind_port)?;
        if let Some(existing) = self
            .graph
            .edges_directed(from, Direction::Outgoing)
            .find(|e| *e.weight() == local_bind_port)
        {
            return Err(MeshError::PortCollision {
                service: source.to_string(),
                port: local_bind_port,
                reason: format!(
                    "is already bound to upstream \"{}\"",
                    self.graph[existing.target()].name()
                ),
            });
        }

        tracing::info!(source, target, local_bind_port, "connecting services");
        let _ = self.graph.add_edge(from, to, local_bind_port);
        Ok(())
    }

    /// Returns the outgoing edges of `service` in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownService`] if `service` is not registered.
    pub fn edges_from(&self, service: &str) -> Result<Vec<ConnectionEdge>> {
        self.edges(service, Direction::Outgoing)
    }

    /// Returns the incoming edges of `service` in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::UnknownService`] if `service` is not registered.
    pub fn edges_to(&self, service: &str) -> Result<Vec<ConnectionEdge>> {
        self.edges(service, Direction::Incoming)
    }

    /// Returns the descriptor registered under `name`.
    pub fn descriptor(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.index.get(name).map(|&idx| &self.graph[idx])
    }

    /// Returns the descriptor registered under `name` for further unit additions.
    pub fn descriptor_mut(&mut self, name: &str) -> Option<&mut ServiceDescriptor> {
        let idx = *self.index.get(name)?;
        self.graph.node_weight_mut(idx)
    }

    /// Iterates descriptors in registration order.
    pub fn services(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    /// Returns the registered service names in registration order.
    pub fn service_names(&self) -> Vec<String> {
        self.services().map(|d| d.name().to_string()).collect()
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns whether no service is registered.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the number of connections.
    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn node(&self, name: &str) -> Result<NodeIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| MeshError::UnknownService {
                name: name.to_string(),
            })
    }

    fn edges(&self, service: &str, direction: Direction) -> Result<Vec<ConnectionEdge>> {
        let idx = self.node(service)?;
        // petgraph walks adjacency lists newest-first; edge indices are
        // assigned in insertion order.
        let mut edges: Vec<(EdgeIndex, ConnectionEdge)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                (
                    e.id(),
                    ConnectionEdge {
                        source: self.graph[e.source()].name().to_string(),
                        target: self.graph[e.target()].name().to_string(),
                        local_bind_port: *e.weight(),
                    },
                )
            })
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        Ok(edges.into_iter().map(|(_, edge)| edge).collect())
    }
}

/// Rejects a bind port equal to the source's own traffic port.
pub(crate) fn check_bind_port(source: &ServiceDescriptor, local_bind_port: u16) -> Result<()> {
    if local_bind_port == 0 {
        return Err(MeshError::PortCollision {
            service: source.name().to_string(),
            port: local_bind_port,
            reason: "is not a bindable port".into(),
        });
    }
    if source.declared_traffic_port() == Some(local_bind_port) {
        return Err(MeshError::PortCollision {
            service: source.name().to_string(),
            port: local_bind_port,
            reason: "equals the service traffic port".into(),
        });
    }
    Ok(())
}
