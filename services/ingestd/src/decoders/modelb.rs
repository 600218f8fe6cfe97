//! Model B decoder: JSON object frames.
//!
//! Example: `{"lat": -23.5, "lng": -46.6, "speed": 62, "ignition": true}`

use super::{DecodeError, lenient_datetime, lenient_f64};
use rastro_protocol::NormalizedTelemetry;
use serde_json::{Map, Value};

pub fn decode(
    raw_payload: &[u8],
    device_serial_number: &str,
) -> Result<NormalizedTelemetry, DecodeError> {
    let value: Value = serde_json::from_slice(raw_payload)
        .map_err(|e| DecodeError::Malformed(format!("invalid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError::Malformed("payload is not a JSON object".to_owned()))?;

    let latitude = lenient_f64(obj.get("lat")).ok_or(DecodeError::MissingField("lat"))?;
    let longitude = lenient_f64(obj.get("lng")).ok_or(DecodeError::MissingField("lng"))?;
    let timestamp = lenient_datetime(obj.get("timestamp"));
    let speed = lenient_f64(obj.get("speed")).unwrap_or(0.0);
    let heading = lenient_f64(obj.get("heading"));
    let altitude = lenient_f64(obj.get("altitude"));
    let ignition = match obj.get("ignition") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    };

    // The whole object rides along for forward compatibility (fuel level,
    // vendor extras).
    let additional: Map<String, Value> = obj.clone();

    Ok(NormalizedTelemetry {
        device_serial_number: device_serial_number.to_owned(),
        timestamp,
        latitude,
        longitude,
        speed,
        heading,
        altitude,
        ignition: Some(ignition),
        additional_data: additional,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_frame() {
        let payload = br#"{"lat": -23.5, "lng": -46.6, "speed": 62.5,
                           "ignition": true, "fuelLevel": 70,
                           "timestamp": "2026-03-01T10:00:00Z"}"#;
        let reading = decode(payload, "dev-1").unwrap();
        assert_eq!(reading.latitude, -23.5);
        assert_eq!(reading.longitude, -46.6);
        assert_eq!(reading.speed, 62.5);
        assert_eq!(reading.ignition, Some(true));
        assert_eq!(reading.additional_data["fuelLevel"], 70);
        assert_eq!(reading.timestamp.to_rfc3339(), "2026-03-01T10:00:00+00:00");
    }

    #[test]
    fn numeric_ignition_and_string_coordinates() {
        let payload = br#"{"lat": "-1.25", "lng": "2.5", "ignition": 1}"#;
        let reading = decode(payload, "dev-1").unwrap();
        assert_eq!(reading.latitude, -1.25);
        assert_eq!(reading.ignition, Some(true));
    }

    #[test]
    fn missing_coordinates_fail() {
        assert!(matches!(
            decode(br#"{"lng": 2.0}"#, "d"),
            Err(DecodeError::MissingField("lat"))
        ));
        assert!(matches!(
            decode(br#"{"lat": 2.0}"#, "d"),
            Err(DecodeError::MissingField("lng"))
        ));
    }

    #[test]
    fn non_json_fails() {
        assert!(matches!(
            decode(b"LAT:1|LON:2", "d"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(b"[1,2,3]", "d"),
            Err(DecodeError::Malformed(_))
        ));
    }
}
