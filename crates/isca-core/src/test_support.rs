//! Frame builders for tests.
//!
//! Compiled for this crate's own tests and, via the `test-support` feature,
//! for downstream crates that need valid frames without hand-rolling byte
//! layouts.

use crate::crc::crc8;

// ---------------------------------------------------------------------------
// BCD encoding
// ---------------------------------------------------------------------------

/// Pack a digit string into `width` bytes of BCD, padding with `0xF`
/// nibbles. Digits beyond the field width are dropped.
pub fn bcd_encode(digits: &str, width: usize) -> Vec<u8> {
    let mut nibbles: Vec<u8> = digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as u8)
        .take(width * 2)
        .collect();
    while nibbles.len() < width * 2 {
        nibbles.push(0x0f);
    }
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect()
}

// ---------------------------------------------------------------------------
// GSM frame builder
// ---------------------------------------------------------------------------

/// Which span the builder computes the trailing CRC over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcMode {
    /// Canonical span: header through battery.
    Std,
    /// Alternate firmware span: NS through battery.
    NoHeader,
    /// Deliberately wrong checksum.
    Corrupt,
}

/// Builds syntactically valid GSM frames for tests.
#[derive(Debug, Clone)]
pub struct GsmFrameBuilder {
    header: u8,
    ns: String,
    imei: String,
    fw_version: u16,
    hw_version: u8,
    protocol: u8,
    counter: u16,
    timestamp: u32,
    frame_type: u8,
    lora_id: u32,
    temperature_raw: u8,
    battery_raw: u16,
    flags: u16,
    last_reset: u8,
    n_erbs: u8,
    crc_mode: CrcMode,
}

impl Default for GsmFrameBuilder {
    fn default() -> Self {
        GsmFrameBuilder {
            header: 0xA0,
            ns: "1020304050".to_owned(),
            imei: "35693803564380".to_owned(),
            fw_version: 0x0102,
            hw_version: 0x03,
            protocol: 0x01,
            counter: 7,
            timestamp: 1_700_000_000,
            frame_type: 0x00,
            lora_id: 0x00_1234,
            temperature_raw: 60,
            battery_raw: 400,
            flags: 0,
            last_reset: 0x01,
            n_erbs: 2,
            crc_mode: CrcMode::Std,
        }
    }
}

impl GsmFrameBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn imei(mut self, imei: &str) -> Self {
        self.imei = imei.to_owned();
        self
    }

    pub fn ns(mut self, ns: &str) -> Self {
        self.ns = ns.to_owned();
        self
    }

    pub fn timestamp(mut self, epoch_secs: u32) -> Self {
        self.timestamp = epoch_secs;
        self
    }

    pub fn temperature_raw(mut self, raw: u8) -> Self {
        self.temperature_raw = raw;
        self
    }

    pub fn battery_raw(mut self, raw: u16) -> Self {
        self.battery_raw = raw;
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn last_reset(mut self, code: u8) -> Self {
        self.last_reset = code;
        self
    }

    pub fn crc_mode(mut self, mode: CrcMode) -> Self {
        self.crc_mode = mode;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(35);
        buf.push(self.header);
        buf.extend(bcd_encode(&self.ns, 5));
        buf.extend(bcd_encode(&self.imei, 7));
        buf.extend(self.fw_version.to_be_bytes());
        buf.push(self.hw_version);
        buf.push(self.protocol);
        buf.extend(self.counter.to_be_bytes());
        buf.extend(self.timestamp.to_be_bytes());
        buf.push(self.frame_type);
        buf.extend(&self.lora_id.to_be_bytes()[1..]);
        buf.push(self.temperature_raw);
        buf.extend(self.battery_raw.to_be_bytes());

        let crc = match self.crc_mode {
            CrcMode::Std => crc8(&buf),
            CrcMode::NoHeader => crc8(&buf[1..]),
            CrcMode::Corrupt => crc8(&buf) ^ 0x5A,
        };
        buf.push(crc);

        buf.extend(self.flags.to_be_bytes());
        buf.push(self.last_reset);
        buf.push(self.n_erbs);
        buf
    }

    pub fn build_hex(&self) -> String {
        hex::encode(self.build())
    }

    pub fn build_base64(&self) -> String {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD.encode(self.build())
    }
}

// ---------------------------------------------------------------------------
// LoRa frame builder
// ---------------------------------------------------------------------------

/// Assemble a 9-byte LoRa application frame.
pub fn build_lora_frame(
    protocol: u8,
    lora_id: u32,
    temperature_c: i8,
    battery_raw: u16,
    event_flags: u8,
    status_byte: u8,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    buf.push(protocol);
    buf.extend(&lora_id.to_be_bytes()[1..]);
    buf.push(temperature_c as u8);
    buf.extend(battery_raw.to_be_bytes());
    // Status byte precedes the event flags on the wire.
    buf.push(status_byte);
    buf.push(event_flags);
    buf
}
