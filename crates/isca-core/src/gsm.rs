//! Isca GSM frame decoder.
//!
//! Fixed-offset 35-byte layout:
//!
//! ```text
//! off  len  field
//!   0    1  header
//!   1    5  hardware serial (NS), packed BCD
//!   6    7  IMEI, packed BCD
//!  13    2  firmware version, u16 BE
//!  15    1  hardware version
//!  16    1  protocol
//!  17    2  message counter, u16 BE
//!  19    4  timestamp, u32 BE epoch seconds
//!  23    1  frame type
//!  24    3  LoRa id, u24 BE
//!  27    1  temperature (raw/3 - 20 °C)
//!  28    2  battery (raw * 0.01 V), u16 BE
//!  30    1  CRC-8 over a firmware-dependent span
//!  31    2  status flags, MSB-first 16-bit word
//!  33    1  last-reset reason
//!  34    1  nErbs (cell count)
//! ```
//!
//! The frame has no GPS: latitude/longitude are emitted as 0.0 with
//! `location_source: "unknown"` so the output shape stays stable.

use crate::bcd::bcd_to_digits;
use crate::crc::crc8;
use crate::flags::{GsmStatusFlags, reset_reason_name};
use crate::payload::{self, PayloadError};
use chrono::DateTime;
use rastro_protocol::NormalizedTelemetry;
use serde_json::{Map, Value, json};

/// Shortest frame worth attempting field extraction on.
pub const MIN_FRAME_LEN: usize = 30;

const VBAT_SCALE: f64 = 0.01;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GsmDecodeError {
    Payload(PayloadError),
    TooShort { len: usize },
    Truncated { field: &'static str },
}

impl std::fmt::Display for GsmDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GsmDecodeError::Payload(e) => write!(f, "payload encoding: {e}"),
            GsmDecodeError::TooShort { len } => {
                write!(f, "frame too short: {len} bytes, need {MIN_FRAME_LEN}")
            }
            GsmDecodeError::Truncated { field } => write!(f, "frame truncated at {field}"),
        }
    }
}

impl std::error::Error for GsmDecodeError {}

impl From<PayloadError> for GsmDecodeError {
    fn from(e: PayloadError) -> Self {
        GsmDecodeError::Payload(e)
    }
}

// ---------------------------------------------------------------------------
// Byte cursor
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    buf: &'a [u8],
    off: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, off: 0 }
    }

    fn offset(&self) -> usize {
        self.off
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], GsmDecodeError> {
        if self.off + n > self.buf.len() {
            return Err(GsmDecodeError::Truncated { field });
        }
        let slice = &self.buf[self.off..self.off + n];
        self.off += n;
        Ok(slice)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, GsmDecodeError> {
        Ok(self.take(1, field)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16, GsmDecodeError> {
        let b = self.take(2, field)?;
        Ok(u16::from(b[0]) << 8 | u16::from(b[1]))
    }

    fn u24(&mut self, field: &'static str) -> Result<u32, GsmDecodeError> {
        let b = self.take(3, field)?;
        Ok(u32::from(b[0]) << 16 | u32::from(b[1]) << 8 | u32::from(b[2]))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, GsmDecodeError> {
        let b = self.take(4, field)?;
        Ok(u32::from(b[0]) << 24 | u32::from(b[1]) << 16 | u32::from(b[2]) << 8 | u32::from(b[3]))
    }
}

// ---------------------------------------------------------------------------
// CRC validation across firmware span variants
// ---------------------------------------------------------------------------

/// Result of checksum validation. A mismatch marks the frame unverified;
/// it never discards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcOutcome {
    pub ok: bool,
    pub note: &'static str,
    pub calc: u8,
}

fn validate_crc(buf: &[u8], crc_pos: usize, crc_field: u8) -> CrcOutcome {
    let std_calc = crc8(&buf[..crc_pos]);
    if std_calc == crc_field {
        return CrcOutcome {
            ok: true,
            note: "std(header..battery)",
            calc: std_calc,
        };
    }

    // Firmware revisions disagree on the covered span; try the known
    // alternates in a fixed order and accept the first match.
    let alternates: [(usize, usize, &'static str); 4] = [
        (1, crc_pos, "no-header(ns..battery)"),
        (23, crc_pos, "tail(type..battery)"),
        (2, crc_pos - 4, "vendor-variant-a"),
        (4, crc_pos + 1, "vendor-variant-b(incl-crc)"),
    ];
    for (start, end, note) in alternates {
        if start >= end || end > buf.len() {
            continue;
        }
        let calc = crc8(&buf[start..end]);
        if calc == crc_field {
            return CrcOutcome {
                ok: true,
                note,
                calc,
            };
        }
    }

    CrcOutcome {
        ok: false,
        note: "unverified",
        calc: std_calc,
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decode a GSM frame presented as hex text, base64 text, or raw bytes.
///
/// `device_serial_number` is the caller's best identity guess; the IMEI
/// embedded in the frame wins when present, which also makes this decoder
/// usable as an identity-extracting fallback for unknown devices.
pub fn decode(
    raw_payload: &[u8],
    device_serial_number: &str,
) -> Result<NormalizedTelemetry, GsmDecodeError> {
    let (buf, format) = payload::normalize(raw_payload)?;
    if buf.len() < MIN_FRAME_LEN {
        return Err(GsmDecodeError::TooShort { len: buf.len() });
    }

    let mut cur = Cursor::new(&buf);
    let header = cur.u8("header")?;
    let ns = bcd_to_digits(cur.take(5, "ns")?);
    let imei = bcd_to_digits(cur.take(7, "imei")?);
    let fw_version = cur.u16("fw_version")?;
    let hw_version = cur.u8("hw_version")?;
    let protocol = cur.u8("protocol")?;
    let counter = cur.u16("counter")?;
    let timestamp_raw = cur.u32("timestamp")?;
    let frame_type = cur.u8("frame_type")?;
    let lora_id = cur.u24("lora_id")?;
    let temperature_raw = cur.u8("temperature")?;
    let battery_raw = cur.u16("battery")?;

    let crc_pos = cur.offset();
    let crc_field = cur.u8("crc")?;
    let crc = validate_crc(&buf, crc_pos, crc_field);

    let flags_hi = cur.u8("flags_hi")?;
    let flags_lo = cur.u8("flags_lo")?;
    let flags = GsmStatusFlags::from_word(u16::from(flags_hi) << 8 | u16::from(flags_lo));
    let last_reset = cur.u8("last_reset")?;
    let n_erbs = cur.u8("n_erbs")?;

    let temperature_c = round2(f64::from(temperature_raw) / 3.0 - 20.0);
    let battery_v = round2(f64::from(battery_raw) * VBAT_SCALE);
    let timestamp =
        DateTime::from_timestamp(i64::from(timestamp_raw), 0).unwrap_or(DateTime::UNIX_EPOCH);

    let mut additional = Map::new();
    additional.insert("ns".to_owned(), json!(ns));
    additional.insert("imei".to_owned(), json!(imei));
    additional.insert("fw_version".to_owned(), json!(fw_version));
    additional.insert("hw_version".to_owned(), json!(hw_version));
    additional.insert("protocol".to_owned(), json!(protocol));
    additional.insert("counter".to_owned(), json!(counter));
    additional.insert("timestamp".to_owned(), json!(timestamp_raw));
    additional.insert("timestamp_iso".to_owned(), json!(timestamp.to_rfc3339()));
    additional.insert("frame_type".to_owned(), json!(frame_type));
    additional.insert("lora_id".to_owned(), json!(format!("0x{lora_id:X}")));
    additional.insert("lora_id_decimal".to_owned(), json!(lora_id));
    additional.insert("temperature_c".to_owned(), json!(temperature_c));
    additional.insert("temperature_raw".to_owned(), json!(temperature_raw));
    additional.insert("battery_v".to_owned(), json!(battery_v));
    additional.insert("battery_raw".to_owned(), json!(battery_raw));
    additional.insert(
        "flags".to_owned(),
        serde_json::to_value(&flags).unwrap_or(Value::Null),
    );
    additional.insert("last_reset".to_owned(), json!(last_reset));
    additional.insert(
        "last_reset_reason".to_owned(),
        json!(reset_reason_name(last_reset)),
    );
    additional.insert("n_erbs".to_owned(), json!(n_erbs));
    additional.insert("crc_ok".to_owned(), json!(crc.ok));
    additional.insert("crc_note".to_owned(), json!(crc.note));
    additional.insert("crc_field".to_owned(), json!(crc_field));
    additional.insert("crc_calc".to_owned(), json!(crc.calc));
    additional.insert("header".to_owned(), json!(header));
    additional.insert("payload_format".to_owned(), json!(format.as_str()));
    additional.insert("payload_hex".to_owned(), json!(hex::encode(&buf)));
    additional.insert("location_source".to_owned(), json!("unknown"));

    let device_serial_number = if imei.is_empty() {
        device_serial_number.to_owned()
    } else {
        imei
    };

    Ok(NormalizedTelemetry {
        device_serial_number,
        timestamp,
        latitude: 0.0,
        longitude: 0.0,
        speed: 0.0,
        heading: None,
        altitude: None,
        ignition: Some(flags.movement),
        additional_data: additional,
    })
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
