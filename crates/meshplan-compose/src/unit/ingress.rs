//! Public HTTP ingress through a load balancer.

use meshplan_common::error::Result;
use meshplan_common::types::Protocol;

use super::{Capability, ServiceContext, UnitKind};
use crate::contribution::{
    Contribution, IngressRule, LoadBalancerSpec, NetworkGroup, Peer, PlanOutput,
};

/// Puts an HTTP load balancer in front of the workload's traffic port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngressUnit {
    listener_port: Option<u16>,
}

impl IngressUnit {
    /// Creates an ingress listening on the configured default port.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            listener_port: None,
        }
    }

    /// Overrides the public listener port.
    #[must_use]
    pub const fn listener_port(mut self, port: u16) -> Self {
        self.listener_port = Some(port);
        self
    }
}

impl Capability for IngressUnit {
    fn kind(&self) -> UnitKind {
        UnitKind::Ingress
    }

    fn contribute(&self, ctx: &ServiceContext<'_>) -> Result<Contribution> {
        let (traffic_port, workload) = ctx.require_workload("route")?;
        let listener_port = self.listener_port.unwrap_or(ctx.config.listener_port);
        let service_group = NetworkGroup::Service(ctx.service.to_string());
        let lb_group = NetworkGroup::LoadBalancer(ctx.service.to_string());

        Ok(Contribution {
            ingress_rules: vec![
                IngressRule {
                    target: lb_group.clone(),
                    peer: Peer::AnyIpv4,
                    port: listener_port,
                    protocol: Protocol::Tcp,
                    description: "public HTTP listener".into(),
                },
                IngressRule {
                    target: service_group.clone(),
                    peer: Peer::Group(lb_group),
                    port: traffic_port,
                    protocol: Protocol::Tcp,
                    description: "load balancer to workload".into(),
                },
            ],
            security_groups: vec![service_group],
            outputs: vec![PlanOutput {
                key: "load-balancer".into(),
                value: format!("http :{listener_port} -> {workload}:{traffic_port}"),
            }],
            load_balancer: Some(LoadBalancerSpec {
                listener_port,
                target_container: workload,
                target_port: traffic_port,
            }),
            ..Contribution::default()
        })
    }
}
