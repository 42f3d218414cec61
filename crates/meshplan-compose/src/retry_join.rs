//! Retry-join discovery parameters.
//!
//! A new mesh agent finds the control plane by looking up instances that
//! carry a known tag in a known region. [`resolve`] projects those
//! parameters out of the cluster identity record.

use std::fmt;

use meshplan_common::constants::RETRY_JOIN_PROVIDER;
use serde::{Deserialize, Serialize};

/// Identity of the mesh control-plane cluster.
///
/// Written once by whatever provisions the control-plane nodes and shared
/// read-only by every mesh sidecar in the topology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterIdentity {
    /// Tag key carried by control-plane instances.
    pub tag_key: String,
    /// Tag value carried by control-plane instances.
    pub tag_value: String,
    /// Region the control plane runs in.
    pub region: String,
    /// Mesh datacenter name.
    pub datacenter: String,
}

impl ClusterIdentity {
    /// Creates a cluster identity.
    pub fn new(
        tag_key: impl Into<String>,
        tag_value: impl Into<String>,
        region: impl Into<String>,
        datacenter: impl Into<String>,
    ) -> Self {
        Self {
            tag_key: tag_key.into(),
            tag_value: tag_value.into(),
            region: region.into(),
            datacenter: datacenter.into(),
        }
    }
}

/// Tag-based discovery selector handed to each agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetryJoinParams {
    /// Region to search.
    pub region: String,
    /// Tag key to match.
    pub tag_key: String,
    /// Tag value to match.
    pub tag_value: String,
}

/// Renders the cloud auto-join selector, e.g.
/// `provider=aws region=us-east-1 tag_key=Name tag_value=consul-server`.
impl fmt::Display for RetryJoinParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "provider={RETRY_JOIN_PROVIDER} region={} tag_key={} tag_value={}",
            self.region, self.tag_key, self.tag_value
        )
    }
}

/// Projects the discovery parameters out of a cluster identity.
pub fn resolve(identity: &ClusterIdentity) -> RetryJoinParams {
    RetryJoinParams {
        region: identity.region.clone(),
        tag_key: identity.tag_key.clone(),
        tag_value: identity.tag_value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ClusterIdentity {
        ClusterIdentity::new("Name", "test-consul-server", "us-east-1", "dc1")
    }

    #[test]
    fn resolve_projects_region_and_tag() {
        let params = resolve(&identity());
        assert_eq!(params.region, "us-east-1");
        assert_eq!(params.tag_key, "Name");
        assert_eq!(params.tag_value, "test-consul-server");
    }

    #[test]
    fn resolve_is_deterministic() {
        assert_eq!(resolve(&identity()), resolve(&identity()));
    }

    #[test]
    fn selector_string_uses_auto_join_format() {
        let selector = resolve(&identity()).to_string();
        assert_eq!(
            selector,
            "provider=aws region=us-east-1 tag_key=Name tag_value=test-consul-server"
        );
    }
}
