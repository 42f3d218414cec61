//! Mesh-wide constants and defaults.

/// Serf LAN gossip port used by every mesh agent.
pub const GOSSIP_PORT: u16 = 8301;

/// Server RPC port agents use to reach the control plane.
pub const SERVER_RPC_PORT: u16 = 8300;

/// Agent CLI RPC port.
pub const AGENT_RPC_PORT: u16 = 8400;

/// Agent HTTP API port.
pub const AGENT_HTTP_PORT: u16 = 8500;

/// Agent DNS interface port.
pub const AGENT_DNS_PORT: u16 = 53;

/// Default public listener port of the sidecar proxy.
pub const DEFAULT_PROXY_PORT: u16 = 8080;

/// Default listener port of an HTTP load balancer.
pub const DEFAULT_LISTENER_PORT: u16 = 80;

/// Default mesh agent image.
pub const DEFAULT_AGENT_IMAGE: &str = "public.ecr.aws/hashicorp/consul:1.9.1";

/// Default sidecar proxy image.
pub const DEFAULT_PROXY_IMAGE: &str = "public.ecr.aws/hashicorp/consul:1.9.1";

/// Default memory reservation for the agent and proxy containers, in MiB.
pub const DEFAULT_SIDECAR_MEMORY_MIB: u32 = 512;

/// Task volume holding agent state.
pub const DATA_VOLUME: &str = "consul-data";

/// Task volume holding agent configuration.
pub const CONFIG_VOLUME: &str = "consul-config";

/// Mount path of [`DATA_VOLUME`] inside the agent.
pub const DATA_MOUNT_PATH: &str = "/consul/data";

/// Mount path of [`CONFIG_VOLUME`] inside the agent.
pub const CONFIG_MOUNT_PATH: &str = "/consul/config";

/// Environment variable receiving the CA certificate secret.
pub const CA_CERT_ENV: &str = "CONSUL_CACERT_PEM";

/// Environment variable receiving the gossip encryption key secret.
pub const GOSSIP_KEY_ENV: &str = "CONSUL_GOSSIP_ENCRYPT";

/// Cloud auto-join provider used in retry-join selectors.
pub const RETRY_JOIN_PROVIDER: &str = "aws";

/// Suffix appended to a service name for its agent container.
pub const AGENT_SUFFIX: &str = "-agent";

/// Suffix appended to a service name for its proxy container.
pub const PROXY_SUFFIX: &str = "-proxy";

/// Application name used in CLI output.
pub const APP_NAME: &str = "meshplan";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "mshp";
