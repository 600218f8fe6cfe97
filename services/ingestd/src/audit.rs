//! Audit log pipeline.
//!
//! Guarantees a durable, queryable record of every inbound message
//! independent of decode/persist success. The `RECEIVED` write happens
//! before any decoding and is the one persistence call the hot path waits
//! on, bounded by a short timeout; every later transition updates the same
//! entry from a detached task. Errors inside the audit writer are caught
//! and logged — they never propagate back into the ingestion path.

use crate::store::{IngestStore, RawInboundMessage, StoreError};
use chrono::{DateTime, Utc};
use rastro_protocol::{ProcessingStatus, SourceType};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Audit log entry
// ---------------------------------------------------------------------------

/// One audit entry per raw inbound message, carrying the processing-status
/// state machine `RECEIVED → PROCESSING → SUCCESS | FAILED`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// Loose reference: the raw message may have failed to persist while
    /// this entry still must land.
    pub raw_message_id: Uuid,
    pub payload: String,
    pub source_type: SourceType,
    pub source_identifier: Option<String>,
    pub device_serial_number: Option<String>,
    pub remote_address: Option<String>,
    pub remote_port: Option<u16>,
    pub http_method: Option<String>,
    pub http_path: Option<String>,
    pub user_agent: Option<String>,
    pub status: ProcessingStatus,
    pub error_message: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl AuditLogEntry {
    /// Create the `RECEIVED` entry for a raw message.
    pub fn received(raw: &RawInboundMessage) -> Self {
        AuditLogEntry {
            id: Uuid::new_v4(),
            raw_message_id: raw.id,
            payload: raw.payload.clone(),
            source_type: raw.source_type,
            source_identifier: raw.source_identifier.clone(),
            device_serial_number: raw.device_serial_number.clone(),
            remote_address: None,
            remote_port: None,
            http_method: None,
            http_path: None,
            user_agent: None,
            status: ProcessingStatus::Received,
            error_message: None,
            metadata: raw.metadata.clone(),
            received_at: raw.received_at,
            processed_at: None,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = ProcessingStatus::Processing;
    }

    pub fn mark_success(&mut self) {
        self.status = ProcessingStatus::Success;
        self.processed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ProcessingStatus::Failed;
        self.error_message = Some(error.into());
        self.processed_at = Some(Utc::now());
    }

    /// Merge extra keys into the entry's metadata map.
    pub fn merge_metadata(&mut self, extra: serde_json::Map<String, serde_json::Value>) {
        for (k, v) in extra {
            self.metadata.insert(k, v);
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Writes audit entries without ever throwing back into ingestion.
#[derive(Clone)]
pub struct AuditPipeline {
    store: Arc<dyn IngestStore>,
    write_timeout: Duration,
}

impl AuditPipeline {
    pub fn new(store: Arc<dyn IngestStore>, write_timeout: Duration) -> Self {
        AuditPipeline {
            store,
            write_timeout,
        }
    }

    /// Synchronously persist the `RECEIVED` entry, bounded by the write
    /// timeout. Failure is critical for forensics but must not stop the
    /// telemetry flow: it is logged loudly and retried once, detached.
    pub async fn record_received(&self, entry: &AuditLogEntry) {
        match timeout(self.write_timeout, self.store.upsert_audit_log(entry)).await {
            Ok(Ok(())) => {
                debug!(audit_id = %entry.id, "audit RECEIVED persisted");
            }
            Ok(Err(e)) => {
                error!(
                    audit_id = %entry.id,
                    error = %e,
                    "CRITICAL: audit RECEIVED write failed; forensic trail at risk"
                );
                self.spawn_retry(entry.clone());
            }
            Err(_elapsed) => {
                error!(
                    audit_id = %entry.id,
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "CRITICAL: audit RECEIVED write timed out; forensic trail at risk"
                );
                self.spawn_retry(entry.clone());
            }
        }
    }

    /// Fire-and-forget status transition. Runs detached so a slow backend
    /// cannot stall message acceptance; each failed attempt is logged.
    pub fn record_transition(&self, entry: AuditLogEntry) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.upsert_audit_log(&entry).await {
                warn!(
                    audit_id = %entry.id,
                    status = %entry.status,
                    error = %e,
                    "audit transition write failed"
                );
            }
        });
    }

    fn spawn_retry(&self, entry: AuditLogEntry) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = retry_once(store.as_ref(), &entry).await {
                error!(audit_id = %entry.id, error = %e, "audit RECEIVED retry failed");
            }
        });
    }
}

async fn retry_once(store: &dyn IngestStore, entry: &AuditLogEntry) -> Result<(), StoreError> {
    store.upsert_audit_log(entry).await
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn raw_message() -> RawInboundMessage {
        RawInboundMessage {
            id: Uuid::new_v4(),
            payload: "AABBCC".to_owned(),
            source_type: SourceType::GsmApn,
            source_identifier: Some("10.0.0.1:40000".to_owned()),
            device_serial_number: None,
            metadata: serde_json::Map::new(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn state_machine_transitions() {
        let mut entry = AuditLogEntry::received(&raw_message());
        assert_eq!(entry.status, ProcessingStatus::Received);
        assert!(entry.processed_at.is_none());

        entry.mark_processing();
        assert_eq!(entry.status, ProcessingStatus::Processing);
        assert!(entry.processed_at.is_none());

        entry.mark_failed("decoder ModelA failed");
        assert_eq!(entry.status, ProcessingStatus::Failed);
        assert_eq!(entry.error_message.as_deref(), Some("decoder ModelA failed"));
        assert!(entry.processed_at.is_some());
    }

    #[tokio::test]
    async fn record_received_persists_entry() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = AuditPipeline::new(store.clone(), Duration::from_secs(1));
        let entry = AuditLogEntry::received(&raw_message());

        pipeline.record_received(&entry).await;

        let stored = store.audit_log(entry.id).await.expect("entry stored");
        assert_eq!(stored.status, ProcessingStatus::Received);
    }

    #[tokio::test]
    async fn record_received_swallows_store_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_audit(true).await;
        let pipeline = AuditPipeline::new(store.clone(), Duration::from_secs(1));
        let entry = AuditLogEntry::received(&raw_message());

        // Must not panic or propagate the store error.
        pipeline.record_received(&entry).await;
        assert!(store.audit_log(entry.id).await.is_none());
    }

    #[tokio::test]
    async fn transition_upsert_is_idempotent_by_id() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = AuditPipeline::new(store.clone(), Duration::from_secs(1));
        let mut entry = AuditLogEntry::received(&raw_message());

        pipeline.record_received(&entry).await;
        entry.mark_processing();
        pipeline.record_transition(entry.clone());
        entry.mark_success();
        pipeline.record_transition(entry.clone());

        // Detached writes: poll until the terminal state lands.
        let mut status = None;
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if let Some(stored) = store.audit_log(entry.id).await {
                status = Some(stored.status);
                if stored.status == ProcessingStatus::Success {
                    break;
                }
            }
        }
        assert_eq!(status, Some(ProcessingStatus::Success));
        assert_eq!(store.audit_log_count().await, 1, "no duplicate entries");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_hits_timeout_and_detached_retry_lands() {
        let store = Arc::new(MemoryStore::new());
        store.set_audit_delay(Duration::from_secs(5)).await;
        let pipeline = AuditPipeline::new(store.clone(), Duration::from_millis(100));
        let entry = AuditLogEntry::received(&raw_message());

        // Bounded wait: returns despite the 5s store latency.
        pipeline.record_received(&entry).await;

        // The detached retry eventually completes on the paused clock.
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if store.audit_log(entry.id).await.is_some() {
                return;
            }
        }
        panic!("detached retry never persisted the entry");
    }
}
