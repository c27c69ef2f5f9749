// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Audit log backends.
//!
//! - [`InMemoryAuditLog`]: process-lifetime log for tests and one-shot CLI runs.
//! - [`JsonlAuditLog`]: one JSON object per line, append-only. A partially
//!   written trailing line (crash mid-append) is terminated before the next
//!   append and skipped on read. `tail` reads backwards from the end of the
//!   file, so its cost scales with `n` rather than with the log size.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::domain::audit_log::{AuditLog, AuditLogError};
use crate::domain::orchestration::OrchestrationRecord;

const TAIL_CHUNK_BYTES: u64 = 8 * 1024;

#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    records: Arc<RwLock<Vec<OrchestrationRecord>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, record: &OrchestrationRecord) -> Result<(), AuditLogError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn tail(&self, n: usize) -> Result<Vec<OrchestrationRecord>, AuditLogError> {
        let records = self.records.read().await;
        let start = records.len().saturating_sub(n);
        Ok(records[start..].to_vec())
    }

    async fn len(&self) -> Result<usize, AuditLogError> {
        Ok(self.records.read().await.len())
    }
}

pub struct JsonlAuditLog {
    path: PathBuf,
    // serialises appends so lines never interleave
    write_lock: Mutex<()>,
    // readable records, counted once on open and bumped per append
    record_count: AtomicUsize,
}

impl JsonlAuditLog {
    /// Open (creating if needed) the log at `path`, including parent directories.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditLogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        terminate_partial_line(&mut file).await?;
        let record_count = count_records(&path).await?;
        debug!(path = %path.display(), records = record_count, "Opened JSONL audit log");

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            record_count: AtomicUsize::new(record_count),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_line(&self, line: &[u8]) -> Option<OrchestrationRecord> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_slice::<OrchestrationRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Skipping unreadable audit log line"
                );
                None
            }
        }
    }

    /// Newest-last records from the end of the file, reading it in chunks.
    async fn read_tail(&self, n: usize) -> Result<Vec<OrchestrationRecord>, AuditLogError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut pos = file.metadata().await?.len();
        let mut carry: Vec<u8> = Vec::new();
        let mut newest_first = Vec::new();
        loop {
            let start = pos.saturating_sub(TAIL_CHUNK_BYTES);
            let mut chunk = vec![0u8; (pos - start) as usize];
            file.seek(SeekFrom::Start(start)).await?;
            file.read_exact(&mut chunk).await?;
            chunk.extend_from_slice(&carry);
            pos = start;

            let mut lines: Vec<&[u8]> = chunk.split(|&b| b == b'\n').collect();
            // the first piece may continue in the previous chunk
            let head = if pos > 0 { Some(lines.remove(0)) } else { None };
            for line in lines.iter().rev() {
                if let Some(record) = self.parse_line(line) {
                    newest_first.push(record);
                    if newest_first.len() == n {
                        break;
                    }
                }
            }

            match head {
                Some(head) if newest_first.len() < n => carry = head.to_vec(),
                _ => break,
            }
        }

        newest_first.reverse();
        Ok(newest_first)
    }
}

/// Appends a newline when the file ends mid-line, so the fragment stays on
/// its own line and the next record starts clean.
async fn terminate_partial_line(file: &mut File) -> Result<(), AuditLogError> {
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1)).await?;
    file.read_exact(&mut last).await?;
    if last[0] != b'\n' {
        warn!("Audit log ends with a partial line; terminating it");
        file.write_all(b"\n").await?;
        file.flush().await?;
    }
    Ok(())
}

async fn count_records(path: &Path) -> Result<usize, AuditLogError> {
    let mut reader = BufReader::new(File::open(path).await?);
    let mut line = Vec::new();
    let mut count = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim_ascii();
        if !trimmed.is_empty() && serde_json::from_slice::<OrchestrationRecord>(trimmed).is_ok() {
            count += 1;
        }
    }
    Ok(count)
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn append(&self, record: &OrchestrationRecord) -> Result<(), AuditLogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await?;
        terminate_partial_line(&mut file).await?;
        file.write_all(&line).await?;
        file.flush().await?;
        self.record_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn tail(&self, n: usize) -> Result<Vec<OrchestrationRecord>, AuditLogError> {
        self.read_tail(n).await
    }

    async fn len(&self) -> Result<usize, AuditLogError> {
        Ok(self.record_count.load(Ordering::Acquire))
    }
}
