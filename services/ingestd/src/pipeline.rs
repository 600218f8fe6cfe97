//! Ingestion orchestrator.
//!
//! Wires framer output (or a webhook body) through identity resolution,
//! decoder dispatch, the audit log, telemetry persistence, and event
//! derivation. The audit `RECEIVED` write lands before decoding begins;
//! everything after updates that same entry. Nothing in here ever
//! propagates an error past the per-connection/per-request boundary —
//! every failure becomes a logged outcome plus a terminal audit state.

use crate::audit::{AuditLogEntry, AuditPipeline};
use crate::config::IngestdConfig;
use crate::dispatch::Dispatcher;
use crate::events::{EventRules, derive_events};
use crate::store::cache::CachedDeviceDirectory;
use crate::store::{DeviceDirectory, IngestStore, RawInboundMessage, TelemetryRecord};
use chrono::Utc;
use rastro_protocol::{DecoderKind, SourceType};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// HTTP request context captured into the audit entry.
#[derive(Debug, Clone)]
pub struct HttpRequestMeta {
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
}

/// One framed unit handed to the pipeline by an ingress.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub payload: Vec<u8>,
    pub source_type: SourceType,
    /// address:port for TCP, gateway id for webhooks.
    pub source_identifier: Option<String>,
    /// Device identity the transport already knows (webhook `dev_eui`);
    /// TCP connections are anonymous until a decoder recovers one.
    pub declared_serial: Option<String>,
    pub remote_address: Option<String>,
    pub remote_port: Option<u16>,
    pub http: Option<HttpRequestMeta>,
    pub metadata: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Tunables lifted from config.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub fallback_decoders: Vec<DecoderKind>,
    pub audit_write_timeout: Duration,
    pub event_rules: EventRules,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            fallback_decoders: vec![DecoderKind::IscaFk, DecoderKind::ModelA],
            audit_write_timeout: Duration::from_millis(1000),
            event_rules: EventRules::default(),
        }
    }
}

impl PipelineOptions {
    pub fn from_config(cfg: &IngestdConfig) -> Self {
        PipelineOptions {
            fallback_decoders: cfg.ingest.fallback_decoders.clone(),
            audit_write_timeout: Duration::from_millis(cfg.ingest.audit_write_timeout_ms),
            event_rules: EventRules {
                speed_alert_threshold: cfg.events.speed_alert_threshold,
            },
        }
    }
}

pub struct IngestPipeline {
    store: Arc<dyn IngestStore>,
    directory: Arc<dyn DeviceDirectory>,
    dispatcher: Dispatcher,
    audit: AuditPipeline,
    rules: EventRules,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn IngestStore>,
        directory: Arc<dyn DeviceDirectory>,
        options: PipelineOptions,
    ) -> Self {
        // One shared read-through cache in front of the directory serves
        // both dispatch and the registration check before save.
        let directory: Arc<dyn DeviceDirectory> =
            Arc::new(CachedDeviceDirectory::new(directory));
        IngestPipeline {
            store: Arc::clone(&store),
            directory: Arc::clone(&directory),
            dispatcher: Dispatcher::new(directory, options.fallback_decoders),
            audit: AuditPipeline::new(store, options.audit_write_timeout),
            rules: options.event_rules,
        }
    }

    /// Ingest one framed unit end to end. Returns the raw-message id used
    /// as the opaque acceptance identifier. Infallible by contract.
    pub async fn ingest_message(&self, msg: IncomingMessage) -> Uuid {
        let (payload_text, payload_encoding) = render_payload(&msg.payload);

        let mut metadata = msg.metadata;
        metadata.insert("payload_encoding".to_owned(), json!(payload_encoding));
        metadata.insert("buffer_length".to_owned(), json!(msg.payload.len()));

        let raw = RawInboundMessage {
            id: Uuid::new_v4(),
            payload: payload_text,
            source_type: msg.source_type,
            source_identifier: msg.source_identifier,
            device_serial_number: msg.declared_serial.clone(),
            metadata,
            received_at: Utc::now(),
        };
        if let Err(e) = self.store.save_raw_message(&raw).await {
            error!(message_id = %raw.id, error = %e, "failed to persist raw inbound message");
        }

        let mut entry = AuditLogEntry::received(&raw);
        entry.remote_address = msg.remote_address;
        entry.remote_port = msg.remote_port;
        if let Some(http) = msg.http {
            entry.http_method = Some(http.method);
            entry.http_path = Some(http.path);
            entry.user_agent = http.user_agent;
        }

        // Awaited, bounded: the one write the hot path waits for.
        self.audit.record_received(&entry).await;

        entry.mark_processing();
        self.audit.record_transition(entry.clone());

        match self
            .dispatcher
            .dispatch(&msg.payload, msg.declared_serial.as_deref(), msg.source_type)
            .await
        {
            Ok(Some(telemetry)) => {
                self.persist_reading(&raw, &mut entry, telemetry).await;
            }
            Ok(None) => {
                entry.merge_metadata(decoded_marker(false, 0));
                entry.mark_success();
                debug!(message_id = %raw.id, "message recorded undecoded");
            }
            Err(e) => {
                entry.mark_failed(e.to_string());
                warn!(message_id = %raw.id, error = %e, "decode failed");
            }
        }

        self.audit.record_transition(entry);
        raw.id
    }

    async fn persist_reading(
        &self,
        raw: &RawInboundMessage,
        entry: &mut AuditLogEntry,
        telemetry: rastro_protocol::NormalizedTelemetry,
    ) {
        let serial = telemetry.device_serial_number.clone();
        entry.device_serial_number = Some(serial.clone());

        // Identity must be resolved by now; an unregistered device is a
        // hard failure at this stage.
        match self.directory.find_by_serial_number(&serial).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                entry.mark_failed(format!("device not registered: {serial}"));
                warn!(message_id = %raw.id, serial = %serial, "decoded reading from unregistered device");
                return;
            }
            Err(e) => {
                entry.mark_failed(format!("device lookup failed: {e}"));
                error!(message_id = %raw.id, error = %e, "device directory unavailable");
                return;
            }
        }

        let last = match self.store.last_device_state(&serial).await {
            Ok(last) => last,
            Err(e) => {
                warn!(serial = %serial, error = %e, "last-state lookup failed; deriving no transition events");
                None
            }
        };
        let events = derive_events(&telemetry, last, &self.rules);

        let record = TelemetryRecord {
            id: Uuid::new_v4(),
            raw_message_id: Some(raw.id),
            reading: telemetry,
        };
        if let Err(e) = self.store.save_telemetry(&record).await {
            entry.mark_failed(format!("telemetry persist failed: {e}"));
            error!(message_id = %raw.id, serial = %serial, error = %e, "telemetry persist failed");
            return;
        }

        for event in &events {
            if let Err(e) = self.store.save_event(event).await {
                warn!(
                    serial = %serial,
                    event_type = event.event_type.as_str(),
                    error = %e,
                    "event persist failed"
                );
            }
        }

        entry.merge_metadata(decoded_marker(true, events.len()));
        entry.mark_success();
        info!(
            message_id = %raw.id,
            serial = %serial,
            events = events.len(),
            "telemetry persisted"
        );
    }
}

fn decoded_marker(decoded: bool, events: usize) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("decoded".to_owned(), json!(decoded));
    if decoded {
        extra.insert("events_derived".to_owned(), json!(events));
    }
    extra
}

/// Raw payloads are stored as text: verbatim for UTF-8 input, hex
/// otherwise.
fn render_payload(payload: &[u8]) -> (String, &'static str) {
    match std::str::from_utf8(payload) {
        Ok(text) => (text.to_owned(), "utf8"),
        Err(_) => (hex::encode(payload), "hex"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryDirectory, MemoryStore};
    use rastro_protocol::ProcessingStatus;

    fn tcp_message(payload: &[u8]) -> IncomingMessage {
        IncomingMessage {
            payload: payload.to_vec(),
            source_type: SourceType::GsmApn,
            source_identifier: Some("10.0.0.9:50000".to_owned()),
            declared_serial: None,
            remote_address: Some("10.0.0.9".to_owned()),
            remote_port: Some(50000),
            http: None,
            metadata: Map::new(),
        }
    }

    async fn wait_for_terminal(
        store: &MemoryStore,
        id: Uuid,
    ) -> Option<AuditLogEntry> {
        for _ in 0..100 {
            tokio::task::yield_now().await;
            if let Some(entry) = audit_for_raw(store, id).await {
                if entry.status.is_terminal() {
                    return Some(entry);
                }
            }
        }
        audit_for_raw(store, id).await
    }

    async fn audit_for_raw(store: &MemoryStore, raw_id: Uuid) -> Option<AuditLogEntry> {
        let query = crate::store::AuditLogQuery {
            status: None,
            device_serial_number: None,
            limit: 100,
        };
        store
            .recent_audit_logs(&query)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.raw_message_id == raw_id)
    }

    #[tokio::test]
    async fn decoded_but_unregistered_device_is_a_hard_failure() {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let pipeline = IngestPipeline::new(
            store.clone(),
            directory,
            PipelineOptions::default(),
        );

        // ModelA fallback recovers identity "123" but nobody registered it.
        let id = pipeline
            .ingest_message(tcp_message(b"IMEI:123|LAT:-23.5|LON:-46.6|SPD:80|IGN:1"))
            .await;

        let entry = wait_for_terminal(&store, id).await.expect("audit entry");
        assert_eq!(entry.status, ProcessingStatus::Failed);
        assert!(entry.error_message.unwrap().contains("not registered"));
        assert!(store.telemetry().await.is_empty());
    }

    #[tokio::test]
    async fn known_device_decode_failure_lands_failed_with_error() {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        directory.register("55", "MODEL_B").await;
        let pipeline = IngestPipeline::new(
            store.clone(),
            directory,
            PipelineOptions::default(),
        );

        let mut msg = tcp_message(b"definitely not json");
        msg.declared_serial = Some("55".to_owned());
        let id = pipeline.ingest_message(msg).await;

        let entry = wait_for_terminal(&store, id).await.expect("audit entry");
        assert_eq!(entry.status, ProcessingStatus::Failed);
        assert!(entry.error_message.unwrap().contains("MODEL_B"));
    }

    #[tokio::test]
    async fn non_utf8_payload_is_stored_as_hex() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = IngestPipeline::new(
            store.clone(),
            Arc::new(MemoryDirectory::new()),
            PipelineOptions::default(),
        );

        pipeline.ingest_message(tcp_message(&[0xff, 0x01, 0xa5])).await;

        let raws = store.raw_messages().await;
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].payload, "ff01a5");
        assert_eq!(raws[0].metadata["payload_encoding"], "hex");
        assert_eq!(raws[0].metadata["buffer_length"], 3);
    }
}
