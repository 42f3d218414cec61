//! # meshplan-common
//!
//! Shared types, error definitions, compiler configuration, and constants
//! used across the entire meshplan workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the foundational primitives that the topology
//! compiler, the plan emitter, and the CLI build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
