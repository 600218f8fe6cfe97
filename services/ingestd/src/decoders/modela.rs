//! Model A decoder: pipe-delimited `KEY:VALUE` text frames.
//!
//! Example: `IMEI:123456789|LAT:-23.5505|LON:-46.6333|SPD:60|IGN:1`

use super::DecodeError;
use chrono::Utc;
use rastro_protocol::NormalizedTelemetry;
use serde_json::{Map, json};
use std::collections::BTreeMap;

pub fn decode(
    raw_payload: &[u8],
    device_serial_number: &str,
) -> Result<NormalizedTelemetry, DecodeError> {
    let text = std::str::from_utf8(raw_payload).map_err(|_| DecodeError::InvalidUtf8)?;

    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    for part in text.trim().split('|') {
        if let Some((key, value)) = part.split_once(':') {
            if !key.is_empty() && !value.is_empty() {
                fields.insert(key.to_ascii_lowercase(), value.to_owned());
            }
        }
    }

    let latitude = parse_field(&fields, "lat")?.ok_or(DecodeError::MissingField("lat"))?;
    let longitude = parse_field(&fields, "lon")?.ok_or(DecodeError::MissingField("lon"))?;
    let speed = parse_field(&fields, "spd")?.unwrap_or(0.0);
    let heading = parse_field(&fields, "hdg")?;
    let altitude = parse_field(&fields, "alt")?;
    let ignition = fields.get("ign").map(|v| v == "1").unwrap_or(false);

    // The frame's IMEI doubles as device identity when the transport could
    // not provide one (anonymous TCP connections).
    let device_serial_number = if device_serial_number.is_empty() {
        fields.get("imei").cloned().unwrap_or_default()
    } else {
        device_serial_number.to_owned()
    };

    let mut additional = Map::new();
    for (key, value) in &fields {
        additional.insert(key.clone(), json!(value));
    }

    Ok(NormalizedTelemetry {
        device_serial_number,
        timestamp: Utc::now(),
        latitude,
        longitude,
        speed,
        heading,
        altitude,
        ignition: Some(ignition),
        additional_data: additional,
    })
}

fn parse_field(
    fields: &BTreeMap<String, String>,
    key: &'static str,
) -> Result<Option<f64>, DecodeError> {
    match fields.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| DecodeError::Malformed(format!("field '{key}' is not a number: '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_frame() {
        let reading = decode(
            b"IMEI:123|LAT:-23.5|LON:-46.6|SPD:80|IGN:1",
            "",
        )
        .unwrap();
        assert_eq!(reading.device_serial_number, "123");
        assert_eq!(reading.latitude, -23.5);
        assert_eq!(reading.longitude, -46.6);
        assert_eq!(reading.speed, 80.0);
        assert_eq!(reading.ignition, Some(true));
        assert_eq!(reading.additional_data["imei"], "123");
    }

    #[test]
    fn declared_serial_wins_over_frame_imei() {
        let reading = decode(b"IMEI:999|LAT:1.0|LON:2.0", "device-42").unwrap();
        assert_eq!(reading.device_serial_number, "device-42");
    }

    #[test]
    fn missing_coordinates_fail() {
        assert!(matches!(
            decode(b"IMEI:123|SPD:10", ""),
            Err(DecodeError::MissingField("lat"))
        ));
        assert!(matches!(
            decode(b"LAT:1.0|IMEI:123", ""),
            Err(DecodeError::MissingField("lon"))
        ));
    }

    #[test]
    fn non_numeric_coordinate_fails() {
        assert!(matches!(
            decode(b"LAT:north|LON:2.0", ""),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn optional_fields_default() {
        let reading = decode(b"LAT:1.0|LON:2.0", "abc").unwrap();
        assert_eq!(reading.speed, 0.0);
        assert_eq!(reading.heading, None);
        assert_eq!(reading.altitude, None);
        assert_eq!(reading.ignition, Some(false));
    }
}
