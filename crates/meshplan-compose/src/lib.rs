//! # meshplan-compose
//!
//! Compiles declarative service-mesh topologies into deployable plans.
//!
//! Handles:
//! - **Units**: workload, mesh sidecar, ingress and addressing capabilities.
//! - **Descriptor**: an ordered set of units making up one service.
//! - **Graph**: services and their directed `connect` edges.
//! - **Retry join**: discovery parameters derived from the cluster identity.
//! - **Synthesis**: one merged, validated plan per service.
//! - **Manifest**: YAML/JSON documents loaded into a topology graph.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod contribution;
pub mod descriptor;
pub mod graph;
pub mod manifest;
pub mod plan;
pub mod retry_join;
pub mod synthesis;
pub mod trust;
pub mod unit;

use meshplan_common::config::CompilerConfig;
use meshplan_common::error::Result;

use crate::graph::TopologyGraph;
use crate::plan::DeployablePlan;
use crate::synthesis::SynthesisEngine;

/// Synthesizes `graph` with the given settings.
///
/// # Errors
///
/// Returns the first validation error found in the topology.
pub fn compile(graph: &mut TopologyGraph, config: CompilerConfig) -> Result<Vec<DeployablePlan>> {
    SynthesisEngine::new(config).synthesize(graph)
}
