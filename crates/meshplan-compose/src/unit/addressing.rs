//! Public addressing for a service's tasks.

use meshplan_common::error::{MeshError, Result};
use serde::{Deserialize, Serialize};

use super::{Capability, ServiceContext, UnitKind};
use crate::contribution::{Contribution, PlanOutput};

/// A DNS record published for the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsRecord {
    /// Hosted zone, e.g. `example.com`.
    pub zone: String,
    /// Record name inside the zone.
    pub record_name: String,
}

/// Assigns public IPs to the service's tasks, optionally under a DNS name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressingUnit {
    dns: Option<DnsRecord>,
}

impl AddressingUnit {
    /// Creates an addressing unit without a DNS record.
    #[must_use]
    pub const fn new() -> Self {
        Self { dns: None }
    }

    /// Publishes the tasks under a DNS record.
    #[must_use]
    pub fn dns(mut self, record: DnsRecord) -> Self {
        self.dns = Some(record);
        self
    }
}

impl Capability for AddressingUnit {
    fn kind(&self) -> UnitKind {
        UnitKind::Addressing
    }

    fn contribute(&self, ctx: &ServiceContext<'_>) -> Result<Contribution> {
        let mut outputs = Vec::new();
        if let Some(ref dns) = self.dns {
            if dns.zone.is_empty() || dns.record_name.is_empty() {
                return Err(MeshError::config(
                    ctx.service,
                    "DNS record needs both a zone and a record name",
                ));
            }
            outputs.push(PlanOutput {
                key: "dns-record".into(),
                value: format!("{}.{}", dns.record_name, dns.zone),
            });
        }

        Ok(Contribution {
            assign_public_ip: true,
            outputs,
            ..Contribution::default()
        })
    }
}
