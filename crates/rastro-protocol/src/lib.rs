// rastro-protocol: Shared domain types for the rastro ingestion suite.
//
// Every value that crosses a component boundary (decoder output, audit
// status, derived events, the static device-model capability table) lives
// here so the decoder crates and the ingestion daemon agree on shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Source transport
// ---------------------------------------------------------------------------

/// Transport a raw inbound message arrived over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// GSM modem streaming over a raw TCP connection (carrier APN).
    GsmApn,
    /// Everynet LoRaWAN gateway posting an HTTP webhook.
    LorawanEverynet,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::GsmApn => "GSM_APN",
            SourceType::LorawanEverynet => "LORAWAN_EVERYNET",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GSM_APN" => Some(SourceType::GsmApn),
            "LORAWAN_EVERYNET" => Some(SourceType::LorawanEverynet),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Audit processing status
// ---------------------------------------------------------------------------

/// Lifecycle of an audit-log entry.
///
/// `Received` is written before decoding starts; every later state is an
/// update to the same entry, never a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Received,
    Processing,
    Success,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Received => "RECEIVED",
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Success => "SUCCESS",
            ProcessingStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RECEIVED" => Some(ProcessingStatus::Received),
            "PROCESSING" => Some(ProcessingStatus::Processing),
            "SUCCESS" => Some(ProcessingStatus::Success),
            "FAILED" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states carry a `processed_at` timestamp.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessingStatus::Success | ProcessingStatus::Failed
        )
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Normalized telemetry
// ---------------------------------------------------------------------------

/// The protocol-agnostic reading shape every decoder must produce.
///
/// Fields the protocol has no sensor for are emitted as zero (`latitude`/
/// `longitude` for GSM-only frames, with a `location_source` marker in
/// `additional_data`) or `None`, never omitted, so downstream consumers see
/// a stable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTelemetry {
    pub device_serial_number: String,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
    /// Ignition, or the movement flag as a proxy on devices without an
    /// ignition line.
    pub ignition: Option<bool>,
    /// Protocol-specific extras: battery, temperature, checksum
    /// diagnostics, RF metrics. Open map for forward compatibility.
    #[serde(default)]
    pub additional_data: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Derived domain events
// ---------------------------------------------------------------------------

/// Kind of event derived from comparing a reading to the last known state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    IgnitionOn,
    IgnitionOff,
    SpeedAlert,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::IgnitionOn => "IGNITION_ON",
            EventType::IgnitionOff => "IGNITION_OFF",
            EventType::SpeedAlert => "SPEED_ALERT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IGNITION_ON" => Some(EventType::IgnitionOn),
            "IGNITION_OFF" => Some(EventType::IgnitionOff),
            "SPEED_ALERT" => Some(EventType::SpeedAlert),
            _ => None,
        }
    }
}

/// An event derived from a telemetry reading. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub device_serial_number: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Device model capabilities (static reference data)
// ---------------------------------------------------------------------------

/// Connectivity a device model supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectivityType {
    Gsm,
    Lora,
    Both,
}

/// Sensors a device model carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorType {
    Gps,
    Accelerometer,
    Temperature,
    Fuel,
    Door,
    Ignition,
}

/// Which protocol decoder handles a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoderKind {
    /// `KEY:VALUE|...` pipe-delimited text frames.
    ModelA,
    /// JSON object frames.
    ModelB,
    /// Isca binary family (GSM frame over TCP, LoRa frame in a webhook).
    IscaFk,
    /// Generic Everynet envelope without a device-specific frame parser.
    Everynet,
}

impl DecoderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DecoderKind::ModelA => "ModelA",
            DecoderKind::ModelB => "ModelB",
            DecoderKind::IscaFk => "IscaFk",
            DecoderKind::Everynet => "Everynet",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ModelA" => Some(DecoderKind::ModelA),
            "ModelB" => Some(DecoderKind::ModelB),
            "IscaFk" => Some(DecoderKind::IscaFk),
            "Everynet" => Some(DecoderKind::Everynet),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration for one device model: connectivity, sensors, and
/// the decoder that understands its payloads. Read-only reference data,
/// never mutated at runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceModelCapability {
    pub model_id: &'static str,
    pub name: &'static str,
    pub connectivity: ConnectivityType,
    pub sensors: &'static [SensorType],
    pub decoder: DecoderKind,
}

/// All known device models.
pub const DEVICE_MODEL_CAPABILITIES: &[DeviceModelCapability] = &[
    DeviceModelCapability {
        model_id: "MODEL_A",
        name: "Model A (GSM)",
        connectivity: ConnectivityType::Gsm,
        sensors: &[SensorType::Gps, SensorType::Ignition, SensorType::Door],
        decoder: DecoderKind::ModelA,
    },
    DeviceModelCapability {
        model_id: "MODEL_B",
        name: "Model B (GSM)",
        connectivity: ConnectivityType::Gsm,
        sensors: &[SensorType::Gps, SensorType::Ignition, SensorType::Fuel],
        decoder: DecoderKind::ModelB,
    },
    DeviceModelCapability {
        model_id: "LORA_MODEL_1",
        name: "LoRa Model 1",
        connectivity: ConnectivityType::Lora,
        sensors: &[SensorType::Gps, SensorType::Temperature],
        decoder: DecoderKind::Everynet,
    },
    DeviceModelCapability {
        model_id: "ISCAFK",
        name: "IscaFK LoRaWAN",
        connectivity: ConnectivityType::Lora,
        sensors: &[SensorType::Gps, SensorType::Temperature],
        decoder: DecoderKind::IscaFk,
    },
    DeviceModelCapability {
        model_id: "ISCAFK_GSM",
        name: "IscaFK GSM",
        connectivity: ConnectivityType::Gsm,
        sensors: &[SensorType::Gps, SensorType::Temperature],
        decoder: DecoderKind::IscaFk,
    },
];

/// Look up the capability entry for a model id.
pub fn capability_for(model_id: &str) -> Option<&'static DeviceModelCapability> {
    DEVICE_MODEL_CAPABILITIES
        .iter()
        .find(|c| c.model_id == model_id)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_round_trips_wire_names() {
        for st in [SourceType::GsmApn, SourceType::LorawanEverynet] {
            assert_eq!(SourceType::parse(st.as_str()), Some(st));
        }
        assert_eq!(SourceType::parse("CARRIER_PIGEON"), None);
    }

    #[test]
    fn processing_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ProcessingStatus::Received).unwrap();
        assert_eq!(json, "\"RECEIVED\"");
        assert!(ProcessingStatus::Failed.is_terminal());
        assert!(!ProcessingStatus::Processing.is_terminal());
    }

    #[test]
    fn capability_table_resolves_known_models() {
        let cap = capability_for("ISCAFK_GSM").expect("ISCAFK_GSM registered");
        assert_eq!(cap.decoder, DecoderKind::IscaFk);
        assert_eq!(cap.connectivity, ConnectivityType::Gsm);
        assert!(capability_for("MODEL_C").is_none());
    }

    #[test]
    fn decoder_kind_parses_capability_names() {
        for cap in DEVICE_MODEL_CAPABILITIES {
            assert_eq!(DecoderKind::parse(cap.decoder.as_str()), Some(cap.decoder));
        }
    }

    #[test]
    fn normalized_telemetry_json_shape_is_stable() {
        let reading = NormalizedTelemetry {
            device_serial_number: "123".to_owned(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            latitude: 0.0,
            longitude: 0.0,
            speed: 0.0,
            heading: None,
            altitude: None,
            ignition: Some(true),
            additional_data: serde_json::Map::new(),
        };
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["latitude"], 0.0);
        assert_eq!(value["ignition"], true);
        // Absent sensors serialize as null, not missing keys.
        assert!(value.get("heading").is_some());
        assert!(value["heading"].is_null());
    }
}
