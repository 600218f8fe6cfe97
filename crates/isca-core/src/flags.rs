//! Status bit-flag decoding for both Isca frame variants.

use serde::Serialize;

// ---------------------------------------------------------------------------
// GSM frame: 16-bit flag word, MSB-first bit indexing
// ---------------------------------------------------------------------------

/// Flags carried in the GSM frame's two status bytes.
///
/// Bit index is MSB-first over the combined 16-bit word: bit 0 is the most
/// significant bit of the high byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GsmStatusFlags {
    pub emergency: bool,
    pub low_battery: bool,
    pub jammer_gsm: bool,
    pub jammer_lora: bool,
    pub movement: bool,
    pub bluetooth: bool,
    pub stock: bool,
    pub out1: bool,
    pub in1: bool,
    /// Two-bit battery status code (bits 9-10).
    pub battery_status: u8,
    pub online_packet: bool,
    /// Raw word, `0x`-prefixed uppercase, kept for diagnostics.
    pub flags_hex: String,
}

impl GsmStatusFlags {
    pub fn from_word(flags16: u16) -> Self {
        let bit = |i: u8| -> bool { (flags16 >> (15 - i)) & 1 == 1 };
        let battery_status = (u8::from(bit(9)) << 1) | u8::from(bit(10));
        GsmStatusFlags {
            emergency: bit(0),
            low_battery: bit(1),
            jammer_gsm: bit(2),
            jammer_lora: bit(3),
            movement: bit(4),
            bluetooth: bit(5),
            stock: bit(6),
            out1: bit(7),
            in1: bit(8),
            battery_status,
            online_packet: bit(11),
            flags_hex: format!("0x{flags16:04X}"),
        }
    }
}

// ---------------------------------------------------------------------------
// LoRa frame: two independent status bytes
// ---------------------------------------------------------------------------

/// Flags carried in the LoRa frame's two status bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoraStatusFlags {
    pub emergency: bool,
    pub low_battery: bool,
    pub jammer: bool,
    pub movement: bool,
    pub ble_status: bool,
    pub stock_mode: bool,
    pub output: bool,
    pub input: bool,
    /// Two-bit battery status code from byte 1.
    pub battery_status: u8,
    /// Five-bit last-reset-reason code from byte 1.
    pub last_reset_reason: u8,
    pub reserved: bool,
}

impl LoraStatusFlags {
    pub fn from_bytes(byte0: u8, byte1: u8) -> Self {
        LoraStatusFlags {
            emergency: byte0 & 0b0000_0001 != 0,
            low_battery: byte0 & 0b0000_0010 != 0,
            jammer: byte0 & 0b0000_0100 != 0,
            movement: byte0 & 0b0000_1000 != 0,
            ble_status: byte0 & 0b0001_0000 != 0,
            stock_mode: byte0 & 0b0010_0000 != 0,
            output: byte0 & 0b0100_0000 != 0,
            input: byte0 & 0b1000_0000 != 0,
            battery_status: byte1 & 0b0000_0011,
            last_reset_reason: (byte1 >> 2) & 0b0001_1111,
            reserved: byte1 & 0b1000_0000 != 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Last-reset reason lookup (ESP-class firmware)
// ---------------------------------------------------------------------------

/// Name for a last-reset reason byte. Unknown codes render as
/// `UNKNOWN_0x..`.
pub fn reset_reason_name(code: u8) -> String {
    let name = match code {
        0x00 => "ESP_RST_UNKNOWN",
        0x01 => "ESP_RST_POWERON",
        0x02 => "ESP_RST_EXT",
        0x03 => "ESP_RST_SW",
        0x04 => "ESP_RST_PANIC",
        0x05 => "ESP_RST_INT_WDT",
        0x06 => "ESP_RST_TASK_WDT",
        0x07 => "ESP_RST_WDT",
        0x08 => "ESP_RST_DEEPSLEEP",
        0x09 => "ESP_RST_BROWNOUT",
        0x0a => "ESP_RST_SDIO",
        0x0b => "ESP_RST_USB",
        0x0c => "ESP_RST_JTAG",
        0x0d => "ESP_RST_EFUSE",
        0x0e => "ESP_RST_PWR_GLITCH",
        0x0f => "ESP_RST_CPU_LOCKUP",
        other => return format!("UNKNOWN_0x{other:02x}"),
    };
    name.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gsm_word_decodes_msb_first() {
        // Bit 0 (emergency) is the MSB; bit 4 (movement) follows.
        let flags = GsmStatusFlags::from_word(0b1000_1000_0000_0000);
        assert!(flags.emergency);
        assert!(flags.movement);
        assert!(!flags.low_battery);
        assert_eq!(flags.flags_hex, "0x8800");
    }

    #[test]
    fn gsm_battery_status_combines_bits_9_and_10() {
        // Bit 9 set, bit 10 clear -> code 0b10.
        let flags = GsmStatusFlags::from_word(1 << (15 - 9));
        assert_eq!(flags.battery_status, 0b10);
        let flags = GsmStatusFlags::from_word(1 << (15 - 10));
        assert_eq!(flags.battery_status, 0b01);
    }

    #[test]
    fn lora_bytes_decode_lsb_first() {
        let flags = LoraStatusFlags::from_bytes(0b0000_1001, 0b0000_0111);
        assert!(flags.emergency);
        assert!(flags.movement);
        assert!(!flags.jammer);
        assert_eq!(flags.battery_status, 0b11);
        assert_eq!(flags.last_reset_reason, 0b00001);
        assert!(!flags.reserved);
    }

    #[test]
    fn reset_reason_lookup_covers_table_and_unknowns() {
        assert_eq!(reset_reason_name(0x01), "ESP_RST_POWERON");
        assert_eq!(reset_reason_name(0x09), "ESP_RST_BROWNOUT");
        assert_eq!(reset_reason_name(0x42), "UNKNOWN_0x42");
    }
}
