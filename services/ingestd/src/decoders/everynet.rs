//! Everynet gateway envelope parsing.
//!
//! Two envelope shapes exist in the wild — the WebSocket uplink message
//! (`{"type":"uplink","params":{...},"meta":{...}}`) and the flatter HTTP
//! webhook body — and the same logical field hides in different places in
//! each. The accessors below probe every known location.
//!
//! `decode_isca` runs the embedded application payload through the Isca
//! LoRa frame parser; `decode_generic` accepts any payload and records it
//! undecoded, locating the device at the gateway when the envelope carries
//! gateway GPS.

use super::DecodeError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rastro_protocol::NormalizedTelemetry;
use serde_json::{Map, Value, json};

// ---------------------------------------------------------------------------
// Envelope accessors
// ---------------------------------------------------------------------------

fn parse_envelope(raw_payload: &[u8]) -> Result<Value, DecodeError> {
    serde_json::from_slice(raw_payload)
        .map_err(|e| DecodeError::Malformed(format!("envelope is not JSON: {e}")))
}

/// Base64 application payload: `params.payload`, `payload`, or `data`.
fn application_payload(envelope: &Value) -> Option<&str> {
    envelope
        .get("params")
        .and_then(|p| p.get("payload"))
        .or_else(|| envelope.get("payload"))
        .or_else(|| envelope.get("data"))
        .and_then(Value::as_str)
}

fn payload_bytes(envelope: &Value) -> Result<(Vec<u8>, String), DecodeError> {
    let text =
        application_payload(envelope).ok_or(DecodeError::MissingField("payload"))?;
    let bytes = BASE64
        .decode(text.trim())
        .map_err(|e| DecodeError::Malformed(format!("payload is not base64: {e}")))?;
    if bytes.is_empty() {
        return Err(DecodeError::Malformed("payload decodes to zero bytes".to_owned()));
    }
    Ok((bytes, text.to_owned()))
}

/// Gateway GPS fix: `params.radio.hardware.gps`, `radio.hardware.gps`, or
/// a top-level `gps`.
fn gateway_gps(envelope: &Value) -> Option<(f64, f64)> {
    let gps = envelope
        .get("params")
        .and_then(|p| p.get("radio"))
        .or_else(|| envelope.get("radio"))
        .and_then(|r| r.get("hardware"))
        .and_then(|h| h.get("gps"))
        .or_else(|| envelope.get("gps"))?;
    let lat = super::lenient_f64(gps.get("lat"))?;
    let lng = super::lenient_f64(gps.get("lng"))?;
    Some((lat, lng))
}

/// Uplink timestamp: `meta.time`, `params.timestamp`, or `timestamp`.
fn envelope_timestamp(envelope: &Value) -> DateTime<Utc> {
    let field = envelope
        .get("meta")
        .and_then(|m| m.get("time"))
        .or_else(|| envelope.get("params").and_then(|p| p.get("timestamp")))
        .or_else(|| envelope.get("timestamp"));
    super::lenient_datetime(field)
}

/// RF metrics and gateway identity, inserted only where present.
fn radio_metrics(envelope: &Value) -> Map<String, Value> {
    let params = envelope.get("params");
    let radio = params
        .and_then(|p| p.get("radio"))
        .or_else(|| envelope.get("radio"));
    let hardware = radio.and_then(|r| r.get("hardware"));
    let modulation = radio
        .and_then(|r| r.get("modulation"))
        .or_else(|| envelope.get("modulation"));

    let mut out = Map::new();
    let mut put = |key: &str, value: Option<&Value>| {
        if let Some(v) = value {
            out.insert(key.to_owned(), v.clone());
        }
    };

    put(
        "rssi",
        hardware
            .and_then(|h| h.get("rssi"))
            .or_else(|| envelope.get("rssi")),
    );
    put(
        "snr",
        hardware
            .and_then(|h| h.get("snr"))
            .or_else(|| envelope.get("snr")),
    );
    put(
        "datarate",
        radio
            .and_then(|r| r.get("datarate"))
            .or_else(|| envelope.get("datarate")),
    );
    put(
        "freq",
        radio
            .and_then(|r| r.get("freq"))
            .or_else(|| envelope.get("freq")),
    );
    put(
        "spreading_factor",
        modulation.and_then(|m| m.get("spreading")),
    );
    put("bandwidth", modulation.and_then(|m| m.get("bandwidth")));
    put("coderate", modulation.and_then(|m| m.get("coderate")));
    put(
        "gateway_id",
        envelope
            .get("meta")
            .and_then(|m| m.get("gateway"))
            .or_else(|| envelope.get("gateway_id"))
            .or_else(|| envelope.get("gatewayEui")),
    );
    put(
        "fcnt",
        params
            .and_then(|p| p.get("counter_up"))
            .or_else(|| envelope.get("fcnt")),
    );
    put(
        "port",
        params
            .and_then(|p| p.get("port"))
            .or_else(|| envelope.get("port")),
    );
    out
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Decode an Isca LoRa frame carried in an Everynet envelope.
pub fn decode_isca(
    raw_payload: &[u8],
    device_serial_number: &str,
) -> Result<NormalizedTelemetry, DecodeError> {
    let envelope = parse_envelope(raw_payload)?;
    let (bytes, _) = payload_bytes(&envelope)?;
    let frame = isca_core::lora::decode_frame(&bytes)?;

    let gps = gateway_gps(&envelope);
    let (latitude, longitude) = gps.unwrap_or((0.0, 0.0));

    let mut additional = Map::new();
    additional.insert("protocol".to_owned(), json!(frame.protocol));
    additional.insert(
        "lora_id".to_owned(),
        json!(format!("0x{:X}", frame.lora_id)),
    );
    additional.insert("lora_id_decimal".to_owned(), json!(frame.lora_id));
    additional.insert("temperature_c".to_owned(), json!(frame.temperature_c));
    additional.insert("vbat_v".to_owned(), json!(frame.battery_v));
    additional.insert("vbat_raw".to_owned(), json!(frame.battery_raw));
    additional.insert(
        "flags".to_owned(),
        serde_json::to_value(&frame.flags).unwrap_or(Value::Null),
    );
    for (k, v) in radio_metrics(&envelope) {
        additional.insert(k, v);
    }
    additional.insert(
        "location_source".to_owned(),
        json!(if gps.is_some() { "gateway" } else { "unknown" }),
    );
    additional.insert("payload_hex".to_owned(), json!(hex::encode(&bytes)));

    Ok(NormalizedTelemetry {
        device_serial_number: device_serial_number.to_owned(),
        timestamp: envelope_timestamp(&envelope),
        latitude,
        longitude,
        speed: 0.0, // no speed sensor on this family
        heading: None,
        altitude: None,
        ignition: Some(frame.flags.movement),
        additional_data: additional,
    })
}

/// Generic fallback: record the payload undecoded with gateway location
/// and RF context.
pub fn decode_generic(
    raw_payload: &[u8],
    device_serial_number: &str,
) -> Result<NormalizedTelemetry, DecodeError> {
    let envelope = parse_envelope(raw_payload)?;
    let (bytes, text) = payload_bytes(&envelope)?;

    let gps = gateway_gps(&envelope);
    let (latitude, longitude) = gps.unwrap_or((0.0, 0.0));

    let mut additional = Map::new();
    additional.insert("payload_hex".to_owned(), json!(hex::encode(&bytes)));
    additional.insert("payload_base64".to_owned(), json!(text));
    for (k, v) in radio_metrics(&envelope) {
        additional.insert(k, v);
    }
    additional.insert(
        "location_source".to_owned(),
        json!(if gps.is_some() { "gateway" } else { "unknown" }),
    );

    Ok(NormalizedTelemetry {
        device_serial_number: device_serial_number.to_owned(),
        timestamp: envelope_timestamp(&envelope),
        latitude,
        longitude,
        speed: 0.0,
        heading: None,
        altitude: None,
        ignition: None,
        additional_data: additional,
    })
}
