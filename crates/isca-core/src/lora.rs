//! Isca LoRa application frame decoder.
//!
//! Nine-byte fixed layout, already extracted from the gateway envelope:
//!
//! ```text
//! off  len  field
//!   0    1  protocol
//!   1    3  LoRa id, u24 BE
//!   4    1  temperature, i8 °C
//!   5    2  battery (raw * 0.001 V), u16 BE
//!   7    1  status byte 1 (battery status, reset reason)
//!   8    1  status byte 0 (event flags)
//! ```
//!
//! The frame carries no GPS; location comes from the gateway, merged in by
//! the envelope parser.

use crate::flags::LoraStatusFlags;

/// Minimum frame size before field extraction is attempted.
pub const MIN_FRAME_LEN: usize = 9;

const VBAT_SCALE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoraDecodeError {
    TooShort { len: usize },
}

impl std::fmt::Display for LoraDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoraDecodeError::TooShort { len } => {
                write!(f, "frame too short: {len} bytes, need {MIN_FRAME_LEN}")
            }
        }
    }
}

impl std::error::Error for LoraDecodeError {}

/// Parsed LoRa frame fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LoraFrame {
    pub protocol: u8,
    pub lora_id: u32,
    pub temperature_c: i8,
    pub battery_v: f64,
    pub battery_raw: u16,
    pub flags: LoraStatusFlags,
}

/// Decode a raw LoRa application frame.
pub fn decode_frame(buf: &[u8]) -> Result<LoraFrame, LoraDecodeError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(LoraDecodeError::TooShort { len: buf.len() });
    }

    let protocol = buf[0];
    let lora_id = u32::from(buf[1]) << 16 | u32::from(buf[2]) << 8 | u32::from(buf[3]);
    let temperature_c = buf[4] as i8;
    let battery_raw = u16::from(buf[5]) << 8 | u16::from(buf[6]);
    let battery_v = (f64::from(battery_raw) * VBAT_SCALE * 1000.0).round() / 1000.0;
    // Flag bytes are swapped on the wire: event flags trail the frame.
    let flags = LoraStatusFlags::from_bytes(buf[8], buf[7]);

    Ok(LoraFrame {
        protocol,
        lora_id,
        temperature_c,
        battery_v,
        battery_raw,
        flags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::build_lora_frame;

    #[test]
    fn decodes_nominal_frame() {
        // 3.712 V, -5 °C, movement + emergency set.
        let frame = build_lora_frame(0x01, 0x00AB_CD, -5, 3712, 0b0000_1001, 0b0000_0001);
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.protocol, 0x01);
        assert_eq!(parsed.lora_id, 0x00AB_CD);
        assert_eq!(parsed.temperature_c, -5);
        assert_eq!(parsed.battery_raw, 3712);
        assert!((parsed.battery_v - 3.712).abs() < f64::EPSILON);
        assert!(parsed.flags.emergency);
        assert!(parsed.flags.movement);
        assert_eq!(parsed.flags.battery_status, 0b01);
    }

    #[test]
    fn short_frames_fail_for_every_length() {
        for len in 0..MIN_FRAME_LEN {
            let buf = vec![0u8; len];
            assert_eq!(
                decode_frame(&buf),
                Err(LoraDecodeError::TooShort { len }),
                "len {len}"
            );
        }
    }

    #[test]
    fn longer_frames_ignore_trailing_bytes() {
        let mut frame = build_lora_frame(0x02, 1, 20, 3000, 0, 0);
        frame.extend_from_slice(&[0xDE, 0xAD]);
        let parsed = decode_frame(&frame).unwrap();
        assert_eq!(parsed.protocol, 0x02);
        assert_eq!(parsed.lora_id, 1);
    }
}
