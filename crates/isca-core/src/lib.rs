//! Isca binary protocol parsing.
//!
//! The Isca device family ships two wire frames: a 35-byte GSM frame sent
//! over raw TCP (hex or base64 text) and a 9-byte LoRa application frame
//! delivered inside a gateway webhook. Both are fixed-offset binary layouts
//! with packed-BCD identifiers, big-endian counters, and status bit-flags;
//! the GSM frame additionally carries a trailing CRC-8 byte.
//!
//! Everything in this crate is a pure function over byte slices — no I/O,
//! no clocks beyond interpreting an embedded epoch timestamp.

pub mod bcd;
pub mod crc;
pub mod flags;
pub mod gsm;
pub mod lora;
pub mod payload;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
