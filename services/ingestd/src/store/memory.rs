//! In-memory store and directory.
//!
//! Backs unit and end-to-end tests without a database. Mirrors the
//! Postgres implementations' observable behavior (audit upsert-by-id,
//! insertion-ordered last-state lookup) and adds failure/latency injection
//! hooks for exercising the audit pipeline's degraded paths.

use super::{
    AuditLogQuery, DeviceDirectory, DeviceRecord, IngestStore, LastDeviceState, RawInboundMessage,
    StoreError, TelemetryRecord,
};
use crate::audit::AuditLogEntry;
use async_trait::async_trait;
use rastro_protocol::DomainEvent;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    raw_messages: Vec<RawInboundMessage>,
    audit_logs: HashMap<Uuid, AuditLogEntry>,
    audit_order: Vec<Uuid>,
    telemetry: Vec<TelemetryRecord>,
    events: Vec<DomainEvent>,
    fail_audit: bool,
    audit_delay: Option<Duration>,
}

/// In-memory [`IngestStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Make subsequent audit writes fail with a database error.
    pub async fn set_fail_audit(&self, fail: bool) {
        self.inner.lock().await.fail_audit = fail;
    }

    /// Add artificial latency to audit writes.
    pub async fn set_audit_delay(&self, delay: Duration) {
        self.inner.lock().await.audit_delay = Some(delay);
    }

    pub async fn audit_log(&self, id: Uuid) -> Option<AuditLogEntry> {
        self.inner.lock().await.audit_logs.get(&id).cloned()
    }

    pub async fn audit_log_count(&self) -> usize {
        self.inner.lock().await.audit_logs.len()
    }

    pub async fn raw_messages(&self) -> Vec<RawInboundMessage> {
        self.inner.lock().await.raw_messages.clone()
    }

    pub async fn telemetry(&self) -> Vec<TelemetryRecord> {
        self.inner.lock().await.telemetry.clone()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.inner.lock().await.events.clone()
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn save_raw_message(&self, message: &RawInboundMessage) -> Result<(), StoreError> {
        self.inner.lock().await.raw_messages.push(message.clone());
        Ok(())
    }

    async fn upsert_audit_log(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let delay = self.inner.lock().await.audit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock().await;
        if inner.fail_audit {
            return Err(StoreError::Database("injected audit failure".to_owned()));
        }
        if inner.audit_logs.insert(entry.id, entry.clone()).is_none() {
            inner.audit_order.push(entry.id);
        }
        Ok(())
    }

    async fn save_telemetry(&self, record: &TelemetryRecord) -> Result<(), StoreError> {
        self.inner.lock().await.telemetry.push(record.clone());
        Ok(())
    }

    async fn save_event(&self, event: &DomainEvent) -> Result<(), StoreError> {
        self.inner.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn last_device_state(
        &self,
        device_serial_number: &str,
    ) -> Result<Option<LastDeviceState>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .telemetry
            .iter()
            .rev()
            .find(|t| t.reading.device_serial_number == device_serial_number)
            .map(|t| LastDeviceState {
                ignition: t.reading.ignition,
            }))
    }

    async fn recent_audit_logs(
        &self,
        query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<AuditLogEntry> = inner
            .audit_order
            .iter()
            .rev()
            .filter_map(|id| inner.audit_logs.get(id))
            .filter(|e| query.status.is_none_or(|s| e.status == s))
            .filter(|e| {
                query
                    .device_serial_number
                    .as_deref()
                    .is_none_or(|serial| e.device_serial_number.as_deref() == Some(serial))
            })
            .cloned()
            .collect();
        entries.truncate(usize::try_from(query.limit.max(0)).unwrap_or(0));
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// In-memory device directory
// ---------------------------------------------------------------------------

/// In-memory [`DeviceDirectory`] for tests.
#[derive(Default)]
pub struct MemoryDirectory {
    devices: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        MemoryDirectory::default()
    }

    pub async fn register(&self, serial_number: &str, model_id: &str) {
        self.devices
            .write()
            .await
            .insert(serial_number.to_owned(), model_id.to_owned());
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory {
    async fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self
            .devices
            .read()
            .await
            .get(serial_number)
            .map(|model_id| DeviceRecord {
                serial_number: serial_number.to_owned(),
                model_id: model_id.clone(),
            }))
    }
}
