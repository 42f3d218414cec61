//! Mesh-wide trust material.

use meshplan_common::types::SecretHandle;
use serde::{Deserialize, Serialize};

/// Handles to the CA certificate and gossip encryption key secrets.
///
/// One pair exists per topology; every mesh sidecar holds it by reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustMaterial {
    /// CA certificate the agents verify each other against.
    pub ca_cert: SecretHandle,
    /// Symmetric key encrypting gossip traffic.
    pub gossip_key: SecretHandle,
}

impl TrustMaterial {
    /// Creates a trust material pair from two secret handles.
    pub fn new(ca_cert: impl Into<String>, gossip_key: impl Into<String>) -> Self {
        Self {
            ca_cert: SecretHandle::new(ca_cert),
            gossip_key: SecretHandle::new(gossip_key),
        }
    }
}
