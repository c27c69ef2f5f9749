// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Chorus Core
//!
//! Coordination primitives for the Chorus task orchestrator: a registry of
//! heterogeneous workers, a single-flight coordinator that fans a task out to
//! a selected subset, and the coherence model that fuses their contributions.
//!
//! # Architecture
//!
//! - **Domain:** value types, the worker aggregate, configuration manifest
//! - **Application:** selection, synthesis and the coordinator service
//! - **Infrastructure:** event bus and audit-log backends

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::coordinator::Coordinator;
pub use domain::*;
