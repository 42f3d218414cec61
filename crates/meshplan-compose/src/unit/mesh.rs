//! Mesh sidecar: a mesh agent plus a sidecar proxy for the workload.
//!
//! The agent joins the control-plane cluster through retry-join and holds
//! the trust material; the proxy registers with the agent, so it only
//! starts once the agent has started. For every outgoing connection the
//! proxy exposes the upstream on a local bind port and the workload gets a
//! `<TARGET>_URL` variable pointing at it.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use meshplan_common::constants::{
    AGENT_DNS_PORT, AGENT_HTTP_PORT, AGENT_RPC_PORT, AGENT_SUFFIX, CA_CERT_ENV, CONFIG_MOUNT_PATH,
    CONFIG_VOLUME, DATA_MOUNT_PATH, DATA_VOLUME, GOSSIP_KEY_ENV, GOSSIP_PORT, PROXY_SUFFIX,
    SERVER_RPC_PORT,
};
use meshplan_common::error::{MeshError, Result};
use meshplan_common::types::{ContainerRef, ContainerRole, Protocol};
use serde::{Deserialize, Serialize};

use super::{Capability, ServiceContext, UnitKind, Upstream};
use crate::contribution::{
    ContainerSpec, Contribution, EnvVar, IngressRule, MountPoint, NetworkGroup, Peer, PlanOutput,
    PortRule, SecretRef, SidecarConfig, StartAfter, UpstreamEntry,
};
use crate::retry_join::{self, ClusterIdentity, RetryJoinParams};
use crate::trust::TrustMaterial;

const SHELL_ENTRY_POINT: [&str; 2] = ["/bin/sh", "-c"];
const CA_FILE: &str = "/consul/config/consul-agent-ca.pem";

/// Security groups provisioned alongside the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityGroups {
    /// Group every mesh client task joins.
    pub client: String,
    /// Group protecting the control-plane servers.
    pub server: String,
}

impl SecurityGroups {
    /// Creates the client/server group pair.
    pub fn new(client: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            server: server.into(),
        }
    }
}

/// Joins a service to the mesh.
///
/// Cluster identity and trust material are shared values: every sidecar
/// in a topology must point at the same ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSidecarUnit {
    cluster: Arc<ClusterIdentity>,
    trust: Arc<TrustMaterial>,
    groups: SecurityGroups,
    discovery_name: Option<String>,
    tls: bool,
}

impl MeshSidecarUnit {
    /// Creates a sidecar with TLS enabled and the service name as its
    /// discovery name.
    #[must_use]
    pub const fn new(
        cluster: Arc<ClusterIdentity>,
        trust: Arc<TrustMaterial>,
        groups: SecurityGroups,
    ) -> Self {
        Self {
            cluster,
            trust,
            groups,
            discovery_name: None,
            tls: true,
        }
    }

    /// Overrides the name the service registers under in the mesh catalog.
    #[must_use]
    pub fn discovery_name(mut self, name: impl Into<String>) -> Self {
        self.discovery_name = Some(name.into());
        self
    }

    /// Enables or disables TLS verification of agent traffic.
    #[must_use]
    pub const fn tls(mut self, enabled: bool) -> Self {
        self.tls = enabled;
        self
    }

    /// Returns the cluster identity this sidecar joins.
    pub fn cluster(&self) -> &Arc<ClusterIdentity> {
        &self.cluster
    }

    /// Returns the trust material this sidecar distributes.
    pub fn trust(&self) -> &Arc<TrustMaterial> {
        &self.trust
    }

    /// Returns the catalog name, defaulting to the service name.
    pub fn resolved_discovery_name<'a>(&'a self, service: &'a str) -> &'a str {
        self.discovery_name.as_deref().unwrap_or(service)
    }

    fn agent_command(&self, retry_join: &RetryJoinParams) -> String {
        let mut cmd = String::new();
        if self.tls {
            let _ = write!(cmd, "echo \"${CA_CERT_ENV}\" > {CA_FILE} && ");
        }
        let _ = write!(
            cmd,
            "exec consul agent -data-dir {DATA_MOUNT_PATH} -config-dir {CONFIG_MOUNT_PATH} \
             -datacenter {} -retry-join \"{retry_join}\" -encrypt \"${GOSSIP_KEY_ENV}\"",
            self.cluster.datacenter
        );
        if self.tls {
            let _ = write!(
                cmd,
                " -hcl 'ca_file = \"{CA_FILE}\"' -hcl 'verify_outgoing = true'"
            );
        }
        cmd
    }

    fn agent_container(&self, name: ContainerRef, ctx: &ServiceContext<'_>, retry_join: &RetryJoinParams) -> ContainerSpec {
        ContainerSpec {
            name,
            role: ContainerRole::MeshAgent,
            image: ctx.config.agent_image.clone(),
            cpu: None,
            memory_mib: Some(ctx.config.sidecar_memory_mib),
            entry_point: SHELL_ENTRY_POINT.iter().map(ToString::to_string).collect(),
            command: vec![self.agent_command(retry_join)],
            environment: BTreeMap::new(),
            mount_points: vec![
                MountPoint {
                    source_volume: DATA_VOLUME.into(),
                    container_path: DATA_MOUNT_PATH.into(),
                    read_only: false,
                },
                MountPoint {
                    source_volume: CONFIG_VOLUME.into(),
                    container_path: CONFIG_MOUNT_PATH.into(),
                    read_only: false,
                },
            ],
            essential: false,
        }
    }

    fn proxy_container(name: ContainerRef, workload: &ContainerRef, ctx: &ServiceContext<'_>) -> ContainerSpec {
        let mut cmd = format!("exec consul connect proxy -sidecar-for {workload}");
        for upstream in ctx.upstreams {
            let _ = write!(
                cmd,
                " -upstream {}:{}",
                upstream.discovery_name, upstream.local_bind_port
            );
        }

        ContainerSpec {
            name,
            role: ContainerRole::MeshProxy,
            image: ctx.config.proxy_image.clone(),
            cpu: None,
            memory_mib: Some(ctx.config.sidecar_memory_mib),
            entry_point: SHELL_ENTRY_POINT.iter().map(ToString::to_string).collect(),
            command: vec![cmd],
            environment: BTreeMap::new(),
            mount_points: Vec::new(),
            essential: false,
        }
    }

    fn ingress_rules(&self, ctx: &ServiceContext<'_>) -> Vec<IngressRule> {
        let client = NetworkGroup::SecurityGroup(self.groups.client.clone());
        let server = NetworkGroup::SecurityGroup(self.groups.server.clone());
        let from_client = Peer::Group(client.clone());

        let mut rules = vec![
            IngressRule {
                target: client.clone(),
                peer: from_client.clone(),
                port: GOSSIP_PORT,
                protocol: Protocol::Tcp,
                description: "mesh clients gossip with each other".into(),
            },
            IngressRule {
                target: client,
                peer: from_client.clone(),
                port: GOSSIP_PORT,
                protocol: Protocol::Udp,
                description: "mesh clients gossip with each other".into(),
            },
            IngressRule {
                target: server.clone(),
                peer: from_client.clone(),
                port: SERVER_RPC_PORT,
                protocol: Protocol::Tcp,
                description: "mesh clients reach server RPC".into(),
            },
            IngressRule {
                target: server.clone(),
                peer: from_client.clone(),
                port: GOSSIP_PORT,
                protocol: Protocol::Tcp,
                description: "mesh clients gossip with servers".into(),
            },
            IngressRule {
                target: server,
                peer: from_client,
                port: GOSSIP_PORT,
                protocol: Protocol::Udp,
                description: "mesh clients gossip with servers".into(),
            },
        ];

        let own_group = NetworkGroup::Service(ctx.service.to_string());
        for caller in ctx.downstreams {
            rules.push(IngressRule {
                target: own_group.clone(),
                peer: Peer::Group(NetworkGroup::Service(caller.clone())),
                port: ctx.config.proxy_port,
                protocol: Protocol::Tcp,
                description: format!("mesh traffic from {caller}"),
            });
        }
        rules
    }
}

/// Name of the variable pointing the workload at an upstream, e.g. `NAME_URL`.
fn upstream_env_name(service: &str) -> String {
    let upper: String = service
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("{upper}_URL")
}

/// One `<TARGET>_URL` variable per upstream; two targets may not share a name.
fn upstream_environment(
    ctx: &ServiceContext<'_>,
    workload: &ContainerRef,
) -> Result<Vec<EnvVar>> {
    let mut claimed: BTreeMap<String, &str> = BTreeMap::new();
    let mut environment = Vec::with_capacity(ctx.upstreams.len());
    for upstream in ctx.upstreams {
        let name = upstream_env_name(&upstream.service);
        if let Some(previous) = claimed.insert(name.clone(), &upstream.service) {
            return Err(MeshError::config(
                ctx.service,
                format!(
                    "upstreams \"{previous}\" and \"{}\" both map to environment variable {name}",
                    upstream.service
                ),
            ));
        }
        environment.push(EnvVar {
            container: workload.clone(),
            name,
            value: format!("http://localhost:{}", upstream.local_bind_port),
        });
    }
    Ok(environment)
}

fn upstream_entries(upstreams: &[Upstream]) -> Vec<UpstreamEntry> {
    upstreams
        .iter()
        .map(|u| UpstreamEntry {
            target: u.discovery_name.clone(),
            local_bind_port: u.local_bind_port,
        })
        .collect()
}

impl Capability for MeshSidecarUnit {
    fn kind(&self) -> UnitKind {
        UnitKind::MeshSidecar
    }

    fn contribute(&self, ctx: &ServiceContext<'_>) -> Result<Contribution> {
        let (_, workload) = ctx.require_workload("proxy")?;
        let retry_join = ctx
            .retry_join
            .clone()
            .unwrap_or_else(|| retry_join::resolve(&self.cluster));

        let agent = ContainerRef::new(format!("{}{AGENT_SUFFIX}", ctx.service));
        let proxy = ContainerRef::new(format!("{}{PROXY_SUFFIX}", ctx.service));

        let ports = [
            (agent.clone(), GOSSIP_PORT, Protocol::Tcp),
            (agent.clone(), GOSSIP_PORT, Protocol::Udp),
            (agent.clone(), AGENT_RPC_PORT, Protocol::Tcp),
            (agent.clone(), AGENT_HTTP_PORT, Protocol::Tcp),
            (agent.clone(), AGENT_DNS_PORT, Protocol::Udp),
            (proxy.clone(), ctx.config.proxy_port, Protocol::Tcp),
        ]
        .into_iter()
        .map(|(container, container_port, protocol)| PortRule {
            container,
            container_port,
            protocol,
        })
        .collect();

        let secrets = vec![
            SecretRef {
                container: agent.clone(),
                name: CA_CERT_ENV.into(),
                handle: self.trust.ca_cert.clone(),
            },
            SecretRef {
                container: agent.clone(),
                name: GOSSIP_KEY_ENV.into(),
                handle: self.trust.gossip_key.clone(),
            },
        ];

        let environment = upstream_environment(ctx, &workload)?;

        let outputs = ctx
            .upstreams
            .iter()
            .map(|u| PlanOutput {
                key: format!("connect:{}", u.service),
                value: format!(
                    "{} -> {} via localhost:{}",
                    ctx.service, u.discovery_name, u.local_bind_port
                ),
            })
            .collect();

        Ok(Contribution {
            containers: vec![
                self.agent_container(agent.clone(), ctx, &retry_join),
                Self::proxy_container(proxy.clone(), &workload, ctx),
            ],
            ports,
            ingress_rules: self.ingress_rules(ctx),
            secrets,
            start_after: vec![StartAfter {
                container: proxy,
                after: agent,
            }],
            environment,
            volumes: vec![DATA_VOLUME.into(), CONFIG_VOLUME.into()],
            security_groups: vec![
                NetworkGroup::Service(ctx.service.to_string()),
                NetworkGroup::SecurityGroup(self.groups.client.clone()),
            ],
            outputs,
            sidecar: Some(SidecarConfig {
                discovery_name: self.resolved_discovery_name(ctx.service).to_string(),
                datacenter: self.cluster.datacenter.clone(),
                tls: self.tls,
                retry_join,
                upstreams: upstream_entries(ctx.upstreams),
            }),
            ..Contribution::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use meshplan_common::config::CompilerConfig;

    use super::*;

    fn sidecar() -> MeshSidecarUnit {
        MeshSidecarUnit::new(
            Arc::new(ClusterIdentity::new(
                "Name",
                "test-consul-server",
                "us-east-1",
                "dc1",
            )),
            Arc::new(TrustMaterial::new("arn:ca", "arn:gossip")),
            SecurityGroups::new("consul-client", "consul-server"),
        )
    }

    fn context<'a>(
        service: &'a str,
        config: &'a CompilerConfig,
        upstreams: &'a [Upstream],
        downstreams: &'a [String],
    ) -> ServiceContext<'a> {
        ServiceContext {
            traffic_port: Some(3000),
            workload_container: Some(ContainerRef::new(service)),
            upstreams,
            downstreams,
            ..ServiceContext::new(service, config)
        }
    }

    #[test]
    fn missing_workload_fails_with_no_traffic_port() {
        let config = CompilerConfig::default();
        let ctx = ServiceContext::new("lonely", &config);
        let err = sidecar().contribute(&ctx).unwrap_err();
        assert!(
            err.to_string().contains("no traffic port to proxy"),
            "got: {err}"
        );
    }

    #[test]
    fn contributes_agent_and_proxy_with_start_order() {
        let config = CompilerConfig::default();
        let ctx = context("greeter", &config, &[], &[]);
        let c = sidecar().contribute(&ctx).expect("should contribute");

        let names: Vec<&str> = c.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["greeter-agent", "greeter-proxy"]);
        assert_eq!(
            c.start_after,
            vec![StartAfter {
                container: ContainerRef::new("greeter-proxy"),
                after: ContainerRef::new("greeter-agent"),
            }]
        );
    }

    #[test]
    fn proxy_command_targets_workload_and_lists_upstreams() {
        let config = CompilerConfig::default();
        let upstreams = vec![
            Upstream {
                service: "name".into(),
                discovery_name: "name".into(),
                local_bind_port: 3001,
            },
            Upstream {
                service: "greeting".into(),
                discovery_name: "greeting".into(),
                local_bind_port: 3002,
            },
        ];
        let ctx = context("greeter", &config, &upstreams, &[]);
        let c = sidecar().contribute(&ctx).expect("should contribute");

        let proxy = &c.containers[1];
        assert_eq!(proxy.entry_point, vec!["/bin/sh", "-c"]);
        assert_eq!(
            proxy.command,
            vec![
                "exec consul connect proxy -sidecar-for greeter -upstream name:3001 -upstream greeting:3002"
            ]
        );
    }

    #[test]
    fn agent_command_carries_retry_join_and_datacenter() {
        let config = CompilerConfig::default();
        let ctx = context("name", &config, &[], &[]);
        let c = sidecar().contribute(&ctx).expect("should contribute");
        let cmd = &c.containers[0].command[0];
        assert!(cmd.contains("-datacenter dc1"), "got: {cmd}");
        assert!(
            cmd.contains("provider=aws region=us-east-1 tag_key=Name tag_value=test-consul-server"),
            "got: {cmd}"
        );
        assert!(cmd.contains("verify_outgoing"), "got: {cmd}");
    }

    #[test]
    fn tls_disabled_skips_ca_file() {
        let config = CompilerConfig::default();
        let ctx = context("name", &config, &[], &[]);
        let c = sidecar().tls(false).contribute(&ctx).expect("should contribute");
        let cmd = &c.containers[0].command[0];
        assert!(!cmd.contains("ca_file"), "got: {cmd}");
        assert!(!c.sidecar.expect("sidecar").tls);
    }

    #[test]
    fn trust_material_is_wired_as_agent_secrets() {
        let config = CompilerConfig::default();
        let ctx = context("name", &config, &[], &[]);
        let c = sidecar().contribute(&ctx).expect("should contribute");
        assert_eq!(c.secrets.len(), 2);
        assert!(c.secrets.iter().all(|s| s.container.as_str() == "name-agent"));
        assert!(c.secrets.iter().any(|s| s.handle.as_str() == "arn:ca"));
        assert!(c.secrets.iter().any(|s| s.handle.as_str() == "arn:gossip"));
    }

    #[test]
    fn upstreams_inject_url_env_and_diagnostic_output() {
        let config = CompilerConfig::default();
        let upstreams = vec![Upstream {
            service: "name".into(),
            discovery_name: "name".into(),
            local_bind_port: 3001,
        }];
        let ctx = context("greeter", &config, &upstreams, &[]);
        let c = sidecar().contribute(&ctx).expect("should contribute");

        assert_eq!(
            c.environment,
            vec![EnvVar {
                container: ContainerRef::new("greeter"),
                name: "NAME_URL".into(),
                value: "http://localhost:3001".into(),
            }]
        );
        assert_eq!(c.outputs.len(), 1);
        assert_eq!(c.outputs[0].key, "connect:name");
        assert!(c.outputs[0].value.contains("localhost:3001"));

        let sidecar = c.sidecar.expect("sidecar config");
        assert_eq!(
            sidecar.upstreams,
            vec![UpstreamEntry {
                target: "name".into(),
                local_bind_port: 3001,
            }]
        );
    }

    #[test]
    fn downstream_callers_get_proxy_port_ingress() {
        let config = CompilerConfig::default();
        let callers = vec!["greeter".to_string()];
        let ctx = context("name", &config, &[], &callers);
        let c = sidecar().contribute(&ctx).expect("should contribute");

        let rule = c
            .ingress_rules
            .iter()
            .find(|r| r.peer == Peer::Group(NetworkGroup::Service("greeter".into())))
            .expect("caller rule");
        assert_eq!(rule.target, NetworkGroup::Service("name".into()));
        assert_eq!(rule.port, config.proxy_port);
    }

    #[test]
    fn discovery_name_defaults_to_service() {
        let unit = sidecar();
        assert_eq!(unit.resolved_discovery_name("name"), "name");
        let unit = unit.discovery_name("name-v2");
        assert_eq!(unit.resolved_discovery_name("name"), "name-v2");
    }

    #[test]
    fn upstreams_sharing_an_env_name_are_rejected() {
        let config = CompilerConfig::default();
        let upstreams = vec![
            Upstream {
                service: "user-profile".into(),
                discovery_name: "user-profile".into(),
                local_bind_port: 3001,
            },
            Upstream {
                service: "user_profile".into(),
                discovery_name: "user_profile".into(),
                local_bind_port: 3002,
            },
        ];
        let ctx = context("caller", &config, &upstreams, &[]);
        let err = sidecar().contribute(&ctx).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("USER_PROFILE_URL"), "got: {msg}");
        assert!(msg.contains("\"user-profile\""), "got: {msg}");
        assert!(msg.contains("\"user_profile\""), "got: {msg}");
    }

    #[test]
    fn env_name_is_uppercased_and_sanitized() {
        assert_eq!(upstream_env_name("name"), "NAME_URL");
        assert_eq!(upstream_env_name("user-profile"), "USER_PROFILE_URL");
    }
}
