//! Unified error types for the meshplan workspace.
//!
//! Every failure the compiler can report is a variant of [`MeshError`].
//! Build-time variants name the offending service (and, where known, the
//! capability unit index) so an operator can locate the misconfiguration.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MeshError {
    /// A capability unit or service descriptor is malformed or incomplete.
    #[error("invalid configuration for service \"{service}\"{}: {message}", unit_suffix(.unit.as_ref()))]
    Configuration {
        /// Service the misconfiguration belongs to.
        service: String,
        /// Index of the offending capability unit, when one is to blame.
        unit: Option<usize>,
        /// Description of the invalid configuration.
        message: String,
    },

    /// A descriptor was mutated after synthesis froze it.
    #[error("service \"{service}\" is frozen and can no longer be modified")]
    FrozenDescriptor {
        /// Service whose descriptor is frozen.
        service: String,
    },

    /// Two descriptors share the same name within one topology.
    #[error("duplicate service name: \"{name}\"")]
    DuplicateService {
        /// The duplicated name.
        name: String,
    },

    /// A connection referenced a service that was never registered.
    #[error("unknown service: \"{name}\"")]
    UnknownService {
        /// The unregistered name.
        name: String,
    },

    /// A connection pointed a service at itself.
    #[error("service \"{service}\" cannot connect to itself")]
    SelfConnection {
        /// Service that attempted the self-loop.
        service: String,
    },

    /// A local bind port is already taken on the source service.
    #[error("port collision on service \"{service}\": local bind port {port} {reason}")]
    PortCollision {
        /// Source service of the offending edge.
        service: String,
        /// The colliding port.
        port: u16,
        /// What the port collides with.
        reason: String,
    },

    /// A topology-wide invariant was violated.
    #[error("topology error: {message}")]
    Topology {
        /// Description of the violated invariant.
        message: String,
    },

    /// A manifest or compiler configuration document could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A JSON document could not be (de)serialized.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// A YAML document could not be (de)serialized.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl MeshError {
    /// Shorthand for a [`MeshError::Configuration`] not tied to a unit.
    pub fn config(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            service: service.into(),
            unit: None,
            message: message.into(),
        }
    }

    /// Attaches a capability unit index to a configuration error.
    ///
    /// Other variants are returned unchanged, as are configuration errors
    /// that already carry an index.
    #[must_use]
    pub fn at_unit(self, index: usize) -> Self {
        match self {
            Self::Configuration {
                service,
                unit: None,
                message,
            } => Self::Configuration {
                service,
                unit: Some(index),
                message,
            },
            other => other,
        }
    }
}

fn unit_suffix(unit: Option<&usize>) -> String {
    unit.map_or_else(String::new, |i| format!(" (unit #{i})"))
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MeshError>;
