//! Domain primitive types used across the meshplan workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of a container within one service's task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerRef(String);

impl ContainerRef {
    /// Creates a container reference from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a secret held by the external secret store.
///
/// The compiler never resolves the value; it only wires the handle
/// into the containers that need it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretHandle(String);

impl SecretHandle {
    /// Creates a handle from its store-specific identifier (e.g. an ARN).
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the store-specific identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport protocol of a port mapping or network rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// Logical role a container plays inside a service's task.
///
/// Containers are merged by role: when two capability units declare the
/// same role, the later declaration wins.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerRole {
    /// The application container carrying the service's traffic port.
    Workload,
    /// The mesh agent that joins the control-plane cluster.
    MeshAgent,
    /// The sidecar proxy that terminates and originates mesh traffic.
    MeshProxy,
    /// Any other auxiliary container, keyed by name.
    Auxiliary(String),
}

impl fmt::Display for ContainerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workload => write!(f, "workload"),
            Self::MeshAgent => write!(f, "mesh-agent"),
            Self::MeshProxy => write!(f, "mesh-proxy"),
            Self::Auxiliary(name) => write!(f, "auxiliary:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_ref_displays_name() {
        assert_eq!(ContainerRef::new("greeter-proxy").to_string(), "greeter-proxy");
    }

    #[test]
    fn protocol_serializes_lowercase() {
        let json = serde_json::to_string(&Protocol::Udp).expect("serialize");
        assert_eq!(json, "\"udp\"");
    }

    #[test]
    fn secret_handle_is_transparent_in_json() {
        let handle = SecretHandle::new("arn:aws:secretsmanager:us-east-1:1:secret:ca");
        let json = serde_json::to_string(&handle).expect("serialize");
        assert_eq!(json, "\"arn:aws:secretsmanager:us-east-1:1:secret:ca\"");
    }

    #[test]
    fn roles_display_kebab_case() {
        assert_eq!(ContainerRole::MeshAgent.to_string(), "mesh-agent");
        assert_eq!(
            ContainerRole::Auxiliary("log-router".into()).to_string(),
            "auxiliary:log-router"
        );
    }
}
