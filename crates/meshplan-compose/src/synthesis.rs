//! Synthesis: turning a topology into one deployable plan per service.
//!
//! Services are processed in registration order. For each one the engine
//! freezes the descriptor, resolves its connections into sidecar upstreams,
//! collects every unit's contribution in addition order and merges them:
//!
//! - containers are keyed by role; a later unit's container replaces an
//!   earlier one in place,
//! - the proxy always starts after the agent,
//! - ports, rules, secrets, volumes and groups are unioned,
//! - outputs are keyed; a later value replaces an earlier one.
//!
//! The first error aborts the whole topology; no partial plan set is returned.

use std::collections::HashMap;

use meshplan_common::config::CompilerConfig;
use meshplan_common::error::{MeshError, Result};
use meshplan_common::types::{ContainerRef, ContainerRole};

use crate::contribution::{ContainerSpec, Contribution, EnvVar, StartAfter};
use crate::descriptor::ServiceDescriptor;
use crate::graph::{self, TopologyGraph};
use crate::plan::{ContainerPlan, DeployablePlan, PlanParts};
use crate::retry_join::{self, ClusterIdentity};
use crate::trust::TrustMaterial;
use crate::unit::{Capability, ServiceContext, Upstream};

/// Compiles a [`TopologyGraph`] into deployable plans.
#[derive(Debug, Clone, Default)]
pub struct SynthesisEngine {
    config: CompilerConfig,
}

impl SynthesisEngine {
    /// Creates an engine with the given compiler settings.
    #[must_use]
    pub const fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Returns the compiler settings.
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Synthesizes one plan per registered service, in registration order.
    ///
    /// Contributions are collected while the graph is only shared-borrowed.
    /// Every descriptor is frozen once the whole topology has synthesized;
    /// on error nothing is frozen, so the graph can be corrected and
    /// synthesized again.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found anywhere in the topology.
    pub fn synthesize(&self, graph: &mut TopologyGraph) -> Result<Vec<DeployablePlan>> {
        tracing::info!(
            services = graph.len(),
            connections = graph.connection_count(),
            "synthesizing topology"
        );
        check_single_control_plane(graph)?;

        let names = graph.service_names();
        let plans = names
            .iter()
            .map(|name| self.synthesize_service(graph, name))
            .collect::<Result<Vec<_>>>()?;

        for name in &names {
            if let Some(descriptor) = graph.descriptor_mut(name) {
                descriptor.freeze();
            }
        }

        tracing::info!(plans = plans.len(), "topology synthesized");
        Ok(plans)
    }

    fn synthesize_service(&self, graph: &TopologyGraph, name: &str) -> Result<DeployablePlan> {
        let descriptor = graph
            .descriptor(name)
            .ok_or_else(|| MeshError::UnknownService {
                name: name.to_string(),
            })?;

        let upstreams = resolve_upstreams(graph, descriptor)?;
        let downstreams: Vec<String> = graph
            .edges_to(name)?
            .into_iter()
            .map(|edge| edge.source)
            .collect();

        let ctx = ServiceContext {
            service: name,
            traffic_port: descriptor.declared_traffic_port(),
            workload_container: descriptor.workload_container(),
            retry_join: descriptor
                .mesh_sidecar()
                .map(|mesh| retry_join::resolve(mesh.cluster())),
            upstreams: &upstreams,
            downstreams: &downstreams,
            config: &self.config,
        };

        let contributions = descriptor
            .units()
            .iter()
            .enumerate()
            .map(|(index, unit)| unit.contribute(&ctx).map_err(|e| e.at_unit(index)))
            .collect::<Result<Vec<_>>>()?;

        let plan = merge(name, contributions)?;
        tracing::debug!(
            service = name,
            containers = plan.containers().len(),
            upstreams = plan.upstreams().len(),
            rules = plan.ingress_rules().len(),
            "service synthesized"
        );
        Ok(plan)
    }
}

/// Asserts every mesh sidecar joins the same cluster with the same trust material.
fn check_single_control_plane(graph: &TopologyGraph) -> Result<()> {
    let mut cluster: Option<(&str, &ClusterIdentity)> = None;
    let mut trust: Option<(&str, &TrustMaterial)> = None;

    for descriptor in graph.services() {
        let Some(mesh) = descriptor.mesh_sidecar() else {
            continue;
        };

        match cluster {
            None => cluster = Some((descriptor.name(), mesh.cluster().as_ref())),
            Some((first, seen)) if seen != mesh.cluster().as_ref() => {
                return Err(MeshError::Topology {
                    message: format!(
                        "multiple cluster identities in one topology: \"{first}\" and \"{}\" join different clusters",
                        descriptor.name()
                    ),
                });
            }
            Some(_) => {}
        }

        match trust {
            None => trust = Some((descriptor.name(), mesh.trust().as_ref())),
            Some((first, seen)) if seen != mesh.trust().as_ref() => {
                return Err(MeshError::Topology {
                    message: format!(
                        "multiple trust material pairs in one topology: \"{first}\" and \"{}\" use different secrets",
                        descriptor.name()
                    ),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Turns the outgoing edges of `descriptor` into sidecar upstreams.
fn resolve_upstreams(graph: &TopologyGraph, descriptor: &ServiceDescriptor) -> Result<Vec<Upstream>> {
    let edges = graph.edges_from(descriptor.name())?;
    if edges.is_empty() {
        return Ok(Vec::new());
    }

    if descriptor.mesh_sidecar().is_none() {
        return Err(MeshError::config(
            descriptor.name(),
            "has outgoing connections but no mesh sidecar to proxy them",
        ));
    }

    edges
        .into_iter()
        .map(|edge| {
            // The traffic port may have been declared after the edge was added.
            graph::check_bind_port(descriptor, edge.local_bind_port)?;

            let target = graph
                .descriptor(&edge.target)
                .ok_or_else(|| MeshError::UnknownService {
                    name: edge.target.clone(),
                })?;
            let discovery_name = target.discovery_name().unwrap_or_else(|| {
                tracing::warn!(
                    source = descriptor.name(),
                    target = target.name(),
                    "upstream has no mesh sidecar; addressing it by service name"
                );
                target.name()
            });

            Ok(Upstream {
                service: edge.target.clone(),
                discovery_name: discovery_name.to_string(),
                local_bind_port: edge.local_bind_port,
            })
        })
        .collect()
}

fn union_into<T: PartialEq>(target: &mut Vec<T>, items: Vec<T>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Merges the contributions of one service's units into a sealed plan.
fn merge(service: &str, contributions: Vec<Contribution>) -> Result<DeployablePlan> {
    let mut parts = PlanParts::default();
    let mut containers: Vec<ContainerSpec> = Vec::new();
    let mut constraints: Vec<StartAfter> = Vec::new();
    let mut environment: Vec<EnvVar> = Vec::new();

    for contribution in contributions {
        for spec in contribution.containers {
            if let Some(existing) = containers.iter_mut().find(|c| c.role == spec.role) {
                tracing::debug!(service, role = %spec.role, "later unit overrides container");
                *existing = spec;
            } else {
                containers.push(spec);
            }
        }

        union_into(&mut parts.ports, contribution.ports);
        union_into(&mut parts.ingress_rules, contribution.ingress_rules);
        union_into(&mut parts.secrets, contribution.secrets);
        union_into(&mut parts.volumes, contribution.volumes);
        union_into(&mut parts.security_groups, contribution.security_groups);
        union_into(&mut constraints, contribution.start_after);
        environment.extend(contribution.environment);

        for output in contribution.outputs {
            if let Some(existing) = parts.outputs.iter_mut().find(|o| o.key == output.key) {
                *existing = output;
            } else {
                parts.outputs.push(output);
            }
        }

        parts.assign_public_ip |= contribution.assign_public_ip;
        if contribution.load_balancer.is_some() {
            parts.load_balancer = contribution.load_balancer;
        }
        if contribution.sidecar.is_some() {
            parts.sidecar = contribution.sidecar;
        }
    }

    check_unique_names(service, &containers)?;

    for var in environment {
        let target = containers
            .iter_mut()
            .find(|c| c.name == var.container)
            .ok_or_else(|| {
                MeshError::config(
                    service,
                    format!(
                        "environment variable {} targets unknown container \"{}\"",
                        var.name, var.container
                    ),
                )
            })?;
        let _ = target.environment.insert(var.name, var.value);
    }

    let agent = role_name(&containers, &ContainerRole::MeshAgent);
    let proxy = role_name(&containers, &ContainerRole::MeshProxy);
    if let (Some(agent), Some(proxy)) = (agent, proxy) {
        union_into(
            &mut constraints,
            vec![StartAfter {
                container: proxy,
                after: agent,
            }],
        );
    }

    check_references(service, &containers, &parts, &constraints)?;
    check_start_order_acyclic(service, &containers, &constraints)?;

    parts.containers = containers
        .into_iter()
        .map(|spec| {
            let start_after = constraints
                .iter()
                .filter(|c| c.container == spec.name)
                .map(|c| c.after.clone())
                .collect();
            ContainerPlan { spec, start_after }
        })
        .collect();

    Ok(DeployablePlan::seal(service.to_string(), parts))
}

fn role_name(containers: &[ContainerSpec], role: &ContainerRole) -> Option<ContainerRef> {
    containers
        .iter()
        .find(|c| &c.role == role)
        .map(|c| c.name.clone())
}

fn check_unique_names(service: &str, containers: &[ContainerSpec]) -> Result<()> {
    for (i, spec) in containers.iter().enumerate() {
        if containers[..i].iter().any(|c| c.name == spec.name) {
            return Err(MeshError::config(
                service,
                format!("container name \"{}\" is declared by two roles", spec.name),
            ));
        }
    }
    Ok(())
}

fn check_references(
    service: &str,
    containers: &[ContainerSpec],
    parts: &PlanParts,
    constraints: &[StartAfter],
) -> Result<()> {
    let known = |name: &ContainerRef| containers.iter().any(|c| &c.name == name);
    let unknown = |what: String, name: &ContainerRef| {
        MeshError::config(service, format!("{what} references unknown container \"{name}\""))
    };

    for rule in &parts.ports {
        if !known(&rule.container) {
            return Err(unknown(
                format!("port {}/{}", rule.container_port, rule.protocol),
                &rule.container,
            ));
        }
    }
    for secret in &parts.secrets {
        if !known(&secret.container) {
            return Err(unknown(format!("secret {}", secret.name), &secret.container));
        }
    }
    for constraint in constraints {
        for name in [&constraint.container, &constraint.after] {
            if !known(name) {
                return Err(unknown("start-after constraint".into(), name));
            }
        }
    }
    if let Some(ref lb) = parts.load_balancer {
        if !known(&lb.target_container) {
            return Err(unknown("load balancer".into(), &lb.target_container));
        }
    }
    Ok(())
}

/// Rejects start-after constraints that can never be satisfied.
fn check_start_order_acyclic(
    service: &str,
    containers: &[ContainerSpec],
    constraints: &[StartAfter],
) -> Result<()> {
    let mut order = petgraph::Graph::<&str, ()>::new();
    let nodes: HashMap<&ContainerRef, petgraph::graph::NodeIndex> = containers
        .iter()
        .map(|c| (&c.name, order.add_node(c.name.as_str())))
        .collect();

    for constraint in constraints {
        if let (Some(&after), Some(&dependent)) =
            (nodes.get(&constraint.after), nodes.get(&constraint.container))
        {
            let _ = order.add_edge(after, dependent, ());
        }
    }

    petgraph::algo::toposort(&order, None).map(|_| ()).map_err(|cycle| {
        MeshError::config(
            service,
            format!(
                "start-order constraints form a cycle through container \"{}\"",
                order[cycle.node_id()]
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::contribution::PlanOutput;
    use crate::unit::{AddressingUnit, IngressUnit, MeshSidecarUnit, SecurityGroups, WorkloadUnit};

    fn cluster() -> Arc<ClusterIdentity> {
        Arc::new(ClusterIdentity::new("Name", "test-consul-server", "us-east-1", "dc1"))
    }

    fn trust() -> Arc<TrustMaterial> {
        Arc::new(TrustMaterial::new("arn:ca", "arn:gossip"))
    }

    fn mesh_with(cluster: &Arc<ClusterIdentity>, trust: &Arc<TrustMaterial>) -> MeshSidecarUnit {
        MeshSidecarUnit::new(
            Arc::clone(cluster),
            Arc::clone(trust),
            SecurityGroups::new("consul-client", "consul-server"),
        )
    }

    fn meshed(name: &str, cluster: &Arc<ClusterIdentity>, trust: &Arc<TrustMaterial>) -> ServiceDescriptor {
        ServiceDescriptor::new(name)
            .with(WorkloadUnit::new(format!("nathanpeck/{name}"), 3000))
            .and_then(|d| d.with(mesh_with(cluster, trust)))
            .and_then(|d| d.with(AddressingUnit::new()))
            .expect("descriptor")
    }

    fn greeter_topology() -> TopologyGraph {
        let (c, t) = (cluster(), trust());
        let mut graph = TopologyGraph::new();
        graph.register(meshed("name", &c, &t)).expect("name");
        graph.register(meshed("greeter", &c, &t)).expect("greeter");
        graph.connect("greeter", "name", 3001).expect("connect");
        graph
    }

    #[test]
    fn plans_follow_registration_order() {
        let mut graph = greeter_topology();
        let plans = SynthesisEngine::default().synthesize(&mut graph).expect("synthesize");
        let names: Vec<&str> = plans.iter().map(DeployablePlan::service).collect();
        assert_eq!(names, vec!["name", "greeter"]);
    }

    #[test]
    fn synthesis_freezes_descriptors() {
        let mut graph = greeter_topology();
        let _ = SynthesisEngine::default().synthesize(&mut graph).expect("synthesize");
        let err = graph
            .descriptor_mut("name")
            .expect("name")
            .add(IngressUnit::new())
            .unwrap_err();
        assert!(matches!(err, MeshError::FrozenDescriptor { .. }), "got: {err}");
    }

    #[test]
    fn proxy_starts_after_agent() {
        let mut graph = greeter_topology();
        let plans = SynthesisEngine::default().synthesize(&mut graph).expect("synthesize");
        for plan in &plans {
            let proxy = plan
                .container_by_role(&ContainerRole::MeshProxy)
                .expect("proxy");
            let agent = plan
                .container_by_role(&ContainerRole::MeshAgent)
                .expect("agent");
            assert!(proxy.start_after.contains(&agent.spec.name));
            assert!(agent.start_after.is_empty());
        }
    }

    #[test]
    fn upstream_env_lands_on_workload_container() {
        let mut graph = greeter_topology();
        let plans = SynthesisEngine::default().synthesize(&mut graph).expect("synthesize");
        let greeter = plans[1].container("greeter").expect("workload");
        assert_eq!(
            greeter.spec.environment.get("NAME_URL").map(String::as_str),
            Some("http://localhost:3001")
        );
    }

    #[test]
    fn shared_client_rules_are_deduplicated() {
        let mut graph = greeter_topology();
        let plans = SynthesisEngine::default().synthesize(&mut graph).expect("synthesize");
        let rules = plans[0].ingress_rules();
        for (i, rule) in rules.iter().enumerate() {
            assert!(!rules[..i].contains(rule), "duplicate rule {rule:?}");
        }
        let groups = plans[0].security_groups();
        assert_eq!(
            groups.iter().filter(|g| matches!(g, crate::contribution::NetworkGroup::Service(_))).count(),
            1
        );
    }

    #[test]
    fn callee_admits_caller_on_proxy_port() {
        let mut graph = greeter_topology();
        let engine = SynthesisEngine::default();
        let plans = engine.synthesize(&mut graph).expect("synthesize");
        let name = &plans[0];
        assert!(name.ingress_rules().iter().any(|r| {
            r.port == engine.config().proxy_port
                && r.description == "mesh traffic from greeter"
        }));
    }

    #[test]
    fn mesh_sidecar_without_workload_reports_unit_index() {
        let (c, t) = (cluster(), trust());
        let mut graph = TopologyGraph::new();
        graph
            .register(
                ServiceDescriptor::new("orphan")
                    .with(AddressingUnit::new())
                    .and_then(|d| d.with(mesh_with(&c, &t)))
                    .expect("descriptor"),
            )
            .expect("register");

        let err = SynthesisEngine::default().synthesize(&mut graph).unwrap_err();
        assert!(
            matches!(err, MeshError::Configuration { ref service, unit: Some(1), .. } if service == "orphan"),
            "got: {err}"
        );
        assert!(err.to_string().contains("no traffic port to proxy"));
    }

    #[test]
    fn connection_without_sidecar_fails() {
        let (c, t) = (cluster(), trust());
        let mut graph = TopologyGraph::new();
        graph.register(meshed("name", &c, &t)).expect("name");
        graph
            .register(
                ServiceDescriptor::new("plain")
                    .with(WorkloadUnit::new("img", 3000))
                    .expect("descriptor"),
            )
            .expect("plain");
        graph.connect("plain", "name", 3001).expect("connect");

        let err = SynthesisEngine::default().synthesize(&mut graph).unwrap_err();
        assert!(err.to_string().contains("no mesh sidecar to proxy"), "got: {err}");
    }

    #[test]
    fn unmeshed_target_is_addressed_by_service_name() {
        let (c, t) = (cluster(), trust());
        let mut graph = TopologyGraph::new();
        graph
            .register(
                ServiceDescriptor::new("name")
                    .with(WorkloadUnit::new("nathanpeck/name", 3000))
                    .expect("descriptor"),
            )
            .expect("name");
        graph.register(meshed("greeter", &c, &t)).expect("greeter");
        graph.connect("greeter", "name", 3001).expect("connect");

        let plans = SynthesisEngine::default().synthesize(&mut graph).expect("synthesize");
        let upstreams = plans[1].upstreams();
        assert_eq!(upstreams.len(), 1);
        assert_eq!(upstreams[0].target, "name");
        assert_eq!(upstreams[0].local_bind_port, 3001);
        assert!(plans[0].upstreams().is_empty());
    }

    #[test]
    fn traffic_port_added_after_connect_is_rechecked() {
        let (c, t) = (cluster(), trust());
        let mut graph = TopologyGraph::new();
        graph.register(meshed("name", &c, &t)).expect("name");
        graph
            .register(ServiceDescriptor::new("late").with(mesh_with(&c, &t)).expect("late"))
            .expect("register");
        graph.connect("late", "name", 4000).expect("no traffic port yet");
        let _ = graph
            .descriptor_mut("late")
            .expect("late")
            .add(WorkloadUnit::new("img", 4000))
            .expect("add workload");

        let err = SynthesisEngine::default().synthesize(&mut graph).unwrap_err();
        assert!(matches!(err, MeshError::PortCollision { port: 4000, .. }), "got: {err}");
    }

    #[test]
    fn different_cluster_identities_fail() {
        let t = trust();
        let other = Arc::new(ClusterIdentity::new("Name", "other", "eu-west-1", "dc2"));
        let mut graph = TopologyGraph::new();
        graph.register(meshed("name", &cluster(), &t)).expect("name");
        graph.register(meshed("greeter", &other, &t)).expect("greeter");

        let err = SynthesisEngine::default().synthesize(&mut graph).unwrap_err();
        assert!(matches!(err, MeshError::Topology { .. }), "got: {err}");
        assert!(err.to_string().contains("multiple cluster identities in one topology"));
    }

    #[test]
    fn equal_cluster_values_count_as_one_identity() {
        let t = trust();
        let mut graph = TopologyGraph::new();
        graph.register(meshed("name", &cluster(), &t)).expect("name");
        graph.register(meshed("greeter", &cluster(), &t)).expect("greeter");
        assert!(SynthesisEngine::default().synthesize(&mut graph).is_ok());
    }

    #[test]
    fn different_trust_material_fails() {
        let c = cluster();
        let other = Arc::new(TrustMaterial::new("arn:ca2", "arn:gossip2"));
        let mut graph = TopologyGraph::new();
        graph.register(meshed("name", &c, &trust())).expect("name");
        graph.register(meshed("greeter", &c, &other)).expect("greeter");

        let err = SynthesisEngine::default().synthesize(&mut graph).unwrap_err();
        assert!(err.to_string().contains("trust material"), "got: {err}");
    }

    #[test]
    fn first_error_aborts_whole_topology() {
        let (c, t) = (cluster(), trust());
        let mut graph = TopologyGraph::new();
        graph.register(meshed("name", &c, &t)).expect("name");
        graph
            .register(ServiceDescriptor::new("broken").with(mesh_with(&c, &t)).expect("broken"))
            .expect("register");
        graph.register(meshed("greeter", &c, &t)).expect("greeter");

        assert!(SynthesisEngine::default().synthesize(&mut graph).is_err());
    }

    #[test]
    fn later_container_with_same_role_overrides_in_place() {
        let first = Contribution {
            containers: vec![spec("app", ContainerRole::Workload, "v1")],
            ..Contribution::default()
        };
        let sidecar = Contribution {
            containers: vec![spec("log", ContainerRole::Auxiliary("log".into()), "fluent")],
            ..Contribution::default()
        };
        let refine = Contribution {
            containers: vec![spec("app", ContainerRole::Workload, "v2")],
            ..Contribution::default()
        };

        let plan = merge("svc", vec![first, sidecar, refine]).expect("merge");
        let images: Vec<&str> = plan.containers().iter().map(|c| c.spec.image.as_str()).collect();
        assert_eq!(images, vec!["v2", "fluent"]);
    }

    #[test]
    fn later_output_with_same_key_wins() {
        let out = |v: &str| Contribution {
            outputs: vec![PlanOutput {
                key: "k".into(),
                value: v.into(),
            }],
            ..Contribution::default()
        };
        let plan = merge("svc", vec![out("a"), out("b")]).expect("merge");
        assert_eq!(plan.outputs().len(), 1);
        assert_eq!(plan.output("k"), Some("b"));
    }

    #[test]
    fn constraint_on_unknown_container_fails() {
        let c = Contribution {
            containers: vec![spec("app", ContainerRole::Workload, "img")],
            start_after: vec![StartAfter {
                container: ContainerRef::new("app"),
                after: ContainerRef::new("ghost"),
            }],
            ..Contribution::default()
        };
        let err = merge("svc", vec![c]).unwrap_err();
        assert!(err.to_string().contains("ghost"), "got: {err}");
    }

    #[test]
    fn cyclic_start_order_fails() {
        let c = Contribution {
            containers: vec![
                spec("a", ContainerRole::Workload, "img"),
                spec("b", ContainerRole::Auxiliary("b".into()), "img"),
            ],
            start_after: vec![
                StartAfter {
                    container: ContainerRef::new("a"),
                    after: ContainerRef::new("b"),
                },
                StartAfter {
                    container: ContainerRef::new("b"),
                    after: ContainerRef::new("a"),
                },
            ],
            ..Contribution::default()
        };
        let err = merge("svc", vec![c]).unwrap_err();
        assert!(err.to_string().contains("cycle"), "got: {err}");
    }

    #[test]
    fn duplicate_container_names_fail() {
        let c = Contribution {
            containers: vec![
                spec("app", ContainerRole::Workload, "img"),
                spec("app", ContainerRole::Auxiliary("x".into()), "img"),
            ],
            ..Contribution::default()
        };
        let err = merge("svc", vec![c]).unwrap_err();
        assert!(err.to_string().contains("two roles"), "got: {err}");
    }

    fn spec(name: &str, role: ContainerRole, image: &str) -> ContainerSpec {
        ContainerSpec {
            name: ContainerRef::new(name),
            role,
            image: image.into(),
            cpu: None,
            memory_mib: None,
            entry_point: Vec::new(),
            command: Vec::new(),
            environment: std::collections::BTreeMap::new(),
            mount_points: Vec::new(),
            essential: true,
        }
    }
}
