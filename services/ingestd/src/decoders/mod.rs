//! Protocol decoders for the simpler text/JSON device families, plus the
//! entry point that routes a payload to the right decoder.
//!
//! Every decoder is a pure function `(payload, device_serial_number) ->
//! NormalizedTelemetry | DecodeError`. The Isca binary family lives in
//! `isca-core`; this module adapts it to the common signature.

pub mod everynet;
pub mod modela;
pub mod modelb;

use chrono::{DateTime, Utc};
use rastro_protocol::{DecoderKind, NormalizedTelemetry, SourceType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("GSM frame: {0}")]
    GsmFrame(#[from] isca_core::gsm::GsmDecodeError),
    #[error("LoRa frame: {0}")]
    LoraFrame(#[from] isca_core::lora::LoraDecodeError),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Run the decoder `kind` selects. For the Isca family the source
/// transport picks the frame variant: TCP traffic carries the GSM frame,
/// webhook traffic the LoRa frame inside an Everynet envelope.
pub fn run_decoder(
    kind: DecoderKind,
    source: SourceType,
    payload: &[u8],
    device_serial_number: &str,
) -> Result<NormalizedTelemetry, DecodeError> {
    match kind {
        DecoderKind::ModelA => modela::decode(payload, device_serial_number),
        DecoderKind::ModelB => modelb::decode(payload, device_serial_number),
        DecoderKind::Everynet => everynet::decode_generic(payload, device_serial_number),
        DecoderKind::IscaFk => match source {
            SourceType::GsmApn => Ok(isca_core::gsm::decode(payload, device_serial_number)?),
            SourceType::LorawanEverynet => everynet::decode_isca(payload, device_serial_number),
        },
    }
}

// ---------------------------------------------------------------------------
// Shared field helpers
// ---------------------------------------------------------------------------

/// Accept a number or a numeric string; device firmwares disagree.
pub(crate) fn lenient_f64(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Timestamp from a JSON field: numbers are epoch milliseconds, strings
/// RFC 3339. Anything else falls back to `now`.
pub(crate) fn lenient_datetime(value: Option<&serde_json::Value>) -> DateTime<Utc> {
    match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now),
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        _ => Utc::now(),
    }
}
