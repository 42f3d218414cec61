//! Compiler configuration model.
//!
//! Holds the knobs that are fixed per deployment rather than per service:
//! sidecar images, the proxy's public port, and listener defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MeshError, Result};

/// Root configuration for the topology compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Image run by every mesh agent container.
    pub agent_image: String,
    /// Image run by every sidecar proxy container.
    pub proxy_image: String,
    /// Public listener port of the sidecar proxy.
    pub proxy_port: u16,
    /// Memory reservation of agent and proxy containers, in MiB.
    pub sidecar_memory_mib: u32,
    /// Default listener port for ingress units that do not set one.
    pub listener_port: u16,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            agent_image: constants::DEFAULT_AGENT_IMAGE.to_string(),
            proxy_image: constants::DEFAULT_PROXY_IMAGE.to_string(),
            proxy_port: constants::DEFAULT_PROXY_PORT,
            sidecar_memory_mib: constants::DEFAULT_SIDECAR_MEMORY_MIB,
            listener_port: constants::DEFAULT_LISTENER_PORT,
        }
    }
}

impl CompilerConfig {
    /// Loads a configuration file, choosing JSON or YAML by extension.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading compiler configuration");
        let content = std::fs::read_to_string(path).map_err(|e| MeshError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_uses_consul_images() {
        let config = CompilerConfig::default();
        assert_eq!(config.agent_image, constants::DEFAULT_AGENT_IMAGE);
        assert_eq!(config.proxy_port, 8080);
        assert_eq!(config.listener_port, 80);
    }

    #[test]
    fn load_yaml_fills_missing_fields() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("tempfile");
        writeln!(file, "proxy_port: 20000").expect("write");

        let config = CompilerConfig::load(file.path()).expect("should load");
        assert_eq!(config.proxy_port, 20000);
        assert_eq!(config.sidecar_memory_mib, constants::DEFAULT_SIDECAR_MEMORY_MIB);
    }

    #[test]
    fn load_json_by_extension() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .expect("tempfile");
        write!(file, r#"{{"agent_image": "consul:1.15"}}"#).expect("write");

        let config = CompilerConfig::load(file.path()).expect("should load");
        assert_eq!(config.agent_image, "consul:1.15");
    }

    #[test]
    fn load_rejects_unknown_fields() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("tempfile");
        writeln!(file, "proxy_prot: 1").expect("write");

        let err = CompilerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, MeshError::Yaml { .. }), "got: {err}");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = CompilerConfig::load(Path::new("/nonexistent/meshplan.yaml")).unwrap_err();
        assert!(matches!(err, MeshError::Io { .. }));
    }
}
