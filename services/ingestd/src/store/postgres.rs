//! Postgres implementations of the persistence seams.
//!
//! All statements are runtime-checked `sqlx::query` calls; the schema
//! lives in `migrations/` and is applied at startup.

use super::{
    AuditLogQuery, DeviceDirectory, DeviceRecord, IngestStore, LastDeviceState, RawInboundMessage,
    StoreError, TelemetryRecord,
};
use crate::audit::AuditLogEntry;
use async_trait::async_trait;
use rastro_protocol::{DomainEvent, ProcessingStatus, SourceType};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

pub async fn create_pool(database_url: &str) -> PgPool {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .expect("failed to connect to Postgres")
}

pub async fn run_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .expect("failed to run migrations");
}

/// Postgres-backed store and device directory.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl IngestStore for PgStore {
    async fn save_raw_message(&self, message: &RawInboundMessage) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO ingress_messages_raw
                  (id, payload, source_type, source_identifier,
                   device_serial_number, metadata, received_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(&message.payload)
        .bind(message.source_type.as_str())
        .bind(&message.source_identifier)
        .bind(&message.device_serial_number)
        .bind(serde_json::Value::Object(message.metadata.clone()))
        .bind(message.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_audit_log(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO ingress_audit_logs
                  (id, raw_message_id, payload, source_type, source_identifier,
                   device_serial_number, remote_address, remote_port,
                   http_method, http_path, user_agent,
                   processing_status, error_message, metadata,
                   received_at, processed_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
              ON CONFLICT (id) DO UPDATE SET
                  device_serial_number = EXCLUDED.device_serial_number,
                  processing_status = EXCLUDED.processing_status,
                  error_message = EXCLUDED.error_message,
                  metadata = EXCLUDED.metadata,
                  processed_at = EXCLUDED.processed_at",
        )
        .bind(entry.id)
        .bind(entry.raw_message_id)
        .bind(&entry.payload)
        .bind(entry.source_type.as_str())
        .bind(&entry.source_identifier)
        .bind(&entry.device_serial_number)
        .bind(&entry.remote_address)
        .bind(entry.remote_port.map(i32::from))
        .bind(&entry.http_method)
        .bind(&entry.http_path)
        .bind(&entry.user_agent)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(serde_json::Value::Object(entry.metadata.clone()))
        .bind(entry.received_at)
        .bind(entry.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_telemetry(&self, record: &TelemetryRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO telemetry
                  (id, device_serial_number, "timestamp", latitude, longitude,
                   speed, heading, altitude, ignition, additional_data, raw_message_id)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(record.id)
        .bind(&record.reading.device_serial_number)
        .bind(record.reading.timestamp)
        .bind(record.reading.latitude)
        .bind(record.reading.longitude)
        .bind(record.reading.speed)
        .bind(record.reading.heading)
        .bind(record.reading.altitude)
        .bind(record.reading.ignition)
        .bind(serde_json::Value::Object(
            record.reading.additional_data.clone(),
        ))
        .bind(record.raw_message_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_event(&self, event: &DomainEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO events
                  (id, device_serial_number, event_type, "timestamp",
                   latitude, longitude, metadata)
              VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(event.id)
        .bind(&event.device_serial_number)
        .bind(event.event_type.as_str())
        .bind(event.timestamp)
        .bind(event.latitude)
        .bind(event.longitude)
        .bind(serde_json::Value::Object(event.metadata.clone()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn last_device_state(
        &self,
        device_serial_number: &str,
    ) -> Result<Option<LastDeviceState>, StoreError> {
        let row = sqlx::query(
            r"SELECT ignition FROM telemetry
              WHERE device_serial_number = $1
              ORDER BY created_at DESC
              LIMIT 1",
        )
        .bind(device_serial_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| LastDeviceState {
            ignition: r.get("ignition"),
        }))
    }

    async fn recent_audit_logs(
        &self,
        query: &AuditLogQuery,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let rows = sqlx::query(
            r"SELECT id, raw_message_id, payload, source_type, source_identifier,
                     device_serial_number, remote_address, remote_port,
                     http_method, http_path, user_agent,
                     processing_status, error_message, metadata,
                     received_at, processed_at
              FROM ingress_audit_logs
              WHERE ($1::text IS NULL OR processing_status = $1)
                AND ($2::text IS NULL OR device_serial_number = $2)
              ORDER BY received_at DESC
              LIMIT $3",
        )
        .bind(query.status.map(ProcessingStatus::as_str))
        .bind(&query.device_serial_number)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(audit_entry_from_row(&row)?);
        }
        Ok(entries)
    }
}

fn audit_entry_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditLogEntry, StoreError> {
    let source_type: String = row.get("source_type");
    let source_type = SourceType::parse(&source_type)
        .ok_or_else(|| StoreError::Database(format!("unknown source_type '{source_type}'")))?;
    let status: String = row.get("processing_status");
    let status = ProcessingStatus::parse(&status)
        .ok_or_else(|| StoreError::Database(format!("unknown processing_status '{status}'")))?;
    let metadata: serde_json::Value = row.get("metadata");
    let metadata = metadata.as_object().cloned().unwrap_or_default();
    let remote_port: Option<i32> = row.get("remote_port");

    Ok(AuditLogEntry {
        id: row.get("id"),
        raw_message_id: row.get("raw_message_id"),
        payload: row.get("payload"),
        source_type,
        source_identifier: row.get("source_identifier"),
        device_serial_number: row.get("device_serial_number"),
        remote_address: row.get("remote_address"),
        remote_port: remote_port.and_then(|p| u16::try_from(p).ok()),
        http_method: row.get("http_method"),
        http_path: row.get("http_path"),
        user_agent: row.get("user_agent"),
        status,
        error_message: row.get("error_message"),
        metadata,
        received_at: row.get("received_at"),
        processed_at: row.get("processed_at"),
    })
}

#[async_trait]
impl DeviceDirectory for PgStore {
    async fn find_by_serial_number(
        &self,
        serial_number: &str,
    ) -> Result<Option<DeviceRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT serial_number, model_id FROM devices WHERE serial_number = $1",
        )
        .bind(serial_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| DeviceRecord {
            serial_number: r.get("serial_number"),
            model_id: r.get("model_id"),
        }))
    }
}
