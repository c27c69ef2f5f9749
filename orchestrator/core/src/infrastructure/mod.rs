// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod audit_log;

pub use audit_log::{InMemoryAuditLog, JsonlAuditLog};
pub use event_bus::{EventBus, EventBusError};
