// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Value types and the worker aggregate. Nothing in here performs I/O except
//! the configuration manifest loaders.

pub mod state;
pub mod contribution;
pub mod worker;
pub mod orchestration;
pub mod events;
pub mod audit_log;
pub mod chance;
pub mod coordinator_config;
