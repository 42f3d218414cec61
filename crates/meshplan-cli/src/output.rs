//! Formatted output helpers for CLI commands.

use meshplan_compose::plan::ContainerPlan;

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const CYAN: &str = "\x1b[36m";
pub const RESET: &str = "\x1b[0m";

const FINGERPRINT_WIDTH: usize = 12;

/// Shortens a hex fingerprint for display.
#[must_use]
pub fn short_fingerprint(fingerprint: &str) -> &str {
    fingerprint
        .get(..FINGERPRINT_WIDTH)
        .unwrap_or(fingerprint)
}

/// One-line description of a container: name, role, image and start order.
#[must_use]
pub fn format_container(container: &ContainerPlan) -> String {
    let spec = &container.spec;
    let mut line = format!(
        "{:<20} {:<12} {}",
        spec.name.as_str(),
        spec.role.to_string(),
        spec.image
    );
    if !container.start_after.is_empty() {
        let after: Vec<String> = container.start_after.iter().map(ToString::to_string).collect();
        line.push_str("  (after ");
        line.push_str(&after.join(", "));
        line.push(')');
    }
    line
}

/// Pluralizes `noun` for `count`.
#[must_use]
pub fn count(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use meshplan_common::types::{ContainerRef, ContainerRole};
    use meshplan_compose::contribution::ContainerSpec;

    use super::*;

    #[test]
    fn short_fingerprint_truncates() {
        assert_eq!(short_fingerprint("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_fingerprint("abc"), "abc");
    }

    #[test]
    fn count_pluralizes() {
        assert_eq!(count(1, "service"), "1 service");
        assert_eq!(count(3, "service"), "3 services");
        assert_eq!(count(0, "upstream"), "0 upstreams");
    }

    #[test]
    fn format_container_lists_start_order() {
        let container = ContainerPlan {
            spec: ContainerSpec {
                name: ContainerRef::new("greeter-proxy"),
                role: ContainerRole::MeshProxy,
                image: "consul:1.9.1".into(),
                cpu: None,
                memory_mib: None,
                entry_point: Vec::new(),
                command: Vec::new(),
                environment: BTreeMap::new(),
                mount_points: Vec::new(),
                essential: false,
            },
            start_after: vec![ContainerRef::new("greeter-agent")],
        };
        let line = format_container(&container);
        assert!(line.contains("mesh-proxy"), "got: {line}");
        assert!(line.ends_with("(after greeter-agent)"), "got: {line}");
    }
}
