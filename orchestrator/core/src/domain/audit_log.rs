// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Audit Log Interface
//!
//! Append-only persistence contract for [`OrchestrationRecord`]s. The
//! coordinator appends exactly one record per completed run and reads the
//! tail for status reporting. There is no compaction or query surface beyond
//! `append`/`tail`/`len`.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | `InMemoryAuditLog` | `RwLock<Vec<_>>`, for development and tests |
//! | `JsonlAuditLog` | append-only JSON-lines file |
//!
//! Audit-log failures are never fatal to orchestration: the coordinator logs
//! them and continues.

use async_trait::async_trait;

use crate::domain::orchestration::OrchestrationRecord;

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one record.
    async fn append(&self, record: &OrchestrationRecord) -> Result<(), AuditLogError>;

    /// The most recent `n` records, oldest first.
    async fn tail(&self, n: usize) -> Result<Vec<OrchestrationRecord>, AuditLogError>;

    /// Number of records appended so far.
    async fn len(&self) -> Result<usize, AuditLogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("Audit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit log did not respond within {0} ms")]
    TimedOut(u64),
}
