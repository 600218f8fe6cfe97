//! Persistence seams for the ingestion pipeline.
//!
//! Components never touch a database handle directly; they receive trait
//! objects at construction (`IngestStore` for writes/queries,
//! `DeviceDirectory` for identity resolution). Production wires the
//! Postgres implementations from [`postgres`]; tests use [`memory`] or
//! mockall mocks. Transactional semantics are the implementation's
//! concern, not the pipeline's.

pub mod cache;
pub mod memory;
pub mod postgres;

use crate::audit::AuditLogEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rastro_protocol::{DomainEvent, NormalizedTelemetry, ProcessingStatus, SourceType};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// An immutable record of bytes as received: created once per framed unit,
/// never mutated, persisted permanently for traceability.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RawInboundMessage {
    pub id: Uuid,
    /// Payload as text: the original text for UTF-8 input, hex otherwise.
    pub payload: String,
    pub source_type: SourceType,
    pub source_identifier: Option<String>,
    pub device_serial_number: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub received_at: DateTime<Utc>,
}

/// A persisted telemetry reading, traceable to exactly one raw message.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TelemetryRecord {
    pub id: Uuid,
    pub raw_message_id: Option<Uuid>,
    pub reading: NormalizedTelemetry,
}

/// Last stored state for a device, used by event derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LastDeviceState {
    pub ignition: Option<bool>,
}

/// A registered device as the directory knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub serial_number: String,
    pub model_id: String,
}

/// Filter for the audit-log query surface.
#[derive(Debug, Clone, Default)]
pub struct AuditLogQuery {
    pub status: Option<ProcessingStatus>,
    pub device_serial_number: Option<String>,
    pub limit: i64,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("device not registered: {0}")]
    UnknownDevice(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Write/query contract the ingestion core needs from persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IngestStore: Send + Sync {
    async fn save_raw_message(&self, message: &RawInboundMessage) -> Result<(), StoreError>;

    /// Upsert by entry id: re-submitting the same id never creates a
    /// duplicate; the stored row reflects the latest transition.
    async fn upsert_audit_log(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// Persist a reading. The device must already be registered.
    async fn save_telemetry(&self, record: &TelemetryRecord) -> Result<(), StoreError>;

    async fn save_event(&self, event: &DomainEvent) -> Result<(), StoreError>;

    async fn last_device_state(
        &self,
        device_serial_number: &str,
    ) -> Result<Option<LastDeviceState>, StoreError>;

    async fn recent_audit_logs(
        &self,
        query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogEntry>, StoreError>;
}

/// Device identity lookup, owned by the device-management subsystem.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<DeviceRecord>, StoreError>;
}
