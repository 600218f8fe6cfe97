//! Payload encoding auto-detection.
//!
//! Devices present the same binary frame as base64 text, hex text (often
//! with a `HEX=` or `ASCII=...|` transport prefix), or a raw byte buffer.
//! Detection order: base64 when the cleaned text matches the base64
//! alphabet and its length is a multiple of 4, hex otherwise (after
//! stripping non-hex characters). A string that is valid in both alphabets
//! decodes as base64 — callers relying on hex must keep an odd byte count
//! or a separator in the text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Which encoding the payload arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Base64,
    Hex,
    /// Non-UTF-8 buffer passed through untouched.
    Raw,
}

impl PayloadFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadFormat::Base64 => "base64",
            PayloadFormat::Hex => "hex",
            PayloadFormat::Raw => "raw",
        }
    }
}

/// Why a payload could not be normalized to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    Empty,
    /// Text that is neither base64 nor an even-length hex sequence.
    UnknownEncoding,
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::Empty => write!(f, "empty payload"),
            PayloadError::UnknownEncoding => {
                write!(f, "payload is neither base64 nor even-length hex")
            }
        }
    }
}

impl std::error::Error for PayloadError {}

/// Normalize a payload to its underlying bytes.
///
/// UTF-8 input is cleaned (whitespace trimmed, `HEX=`/`ASCII=...|`
/// prefixes stripped) and decoded per the detection order above. Non-UTF-8
/// input is treated as an already-raw frame.
pub fn normalize(raw: &[u8]) -> Result<(Vec<u8>, PayloadFormat), PayloadError> {
    if raw.is_empty() {
        return Err(PayloadError::Empty);
    }

    let Ok(text) = std::str::from_utf8(raw) else {
        return Ok((raw.to_vec(), PayloadFormat::Raw));
    };

    let cleaned = clean_text(text);
    if looks_like_base64(&cleaned) {
        if let Ok(bytes) = BASE64.decode(cleaned.as_bytes()) {
            if !bytes.is_empty() {
                return Ok((bytes, PayloadFormat::Base64));
            }
        }
    }

    let hex_only: String = cleaned.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex_only.is_empty() || hex_only.len() % 2 != 0 {
        return Err(PayloadError::UnknownEncoding);
    }
    match hex::decode(&hex_only) {
        Ok(bytes) => Ok((bytes, PayloadFormat::Hex)),
        Err(_) => Err(PayloadError::UnknownEncoding),
    }
}

/// Strip transport prefixes some modem firmwares wrap around the frame.
fn clean_text(text: &str) -> String {
    let trimmed = text.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() > 4 && bytes[..4].eq_ignore_ascii_case(b"HEX=") {
        return trimmed[4..].trim().to_owned();
    }
    if bytes.len() > 6 && bytes[..6].eq_ignore_ascii_case(b"ASCII=") {
        if let Some(pipe) = trimmed.find('|') {
            return trimmed[pipe + 1..].trim().to_owned();
        }
    }
    trimmed.to_owned()
}

/// Base64 shape test: non-empty, length divisible by 4, alphabet chars
/// with at most two trailing `=` pads.
fn looks_like_base64(s: &str) -> bool {
    if s.is_empty() || s.len() % 4 != 0 {
        return false;
    }
    let stripped = s.trim_end_matches('=');
    if s.len() - stripped.len() > 2 {
        return false;
    }
    stripped
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_base64_of_same_bytes_decode_identically() {
        // 35 bytes -> 70 hex chars (70 % 4 != 0), so the hex text cannot be
        // mistaken for base64.
        let bytes: Vec<u8> = (0u8..35).collect();
        let as_hex = hex::encode(&bytes);
        let as_b64 = BASE64.encode(&bytes);

        let (from_hex, fmt_hex) = normalize(as_hex.as_bytes()).unwrap();
        let (from_b64, fmt_b64) = normalize(as_b64.as_bytes()).unwrap();

        assert_eq!(from_hex, bytes);
        assert_eq!(from_b64, bytes);
        assert_eq!(fmt_hex, PayloadFormat::Hex);
        assert_eq!(fmt_b64, PayloadFormat::Base64);
    }

    #[test]
    fn hex_prefix_is_stripped() {
        let (bytes, fmt) = normalize(b"HEX=0a0B0c").unwrap();
        assert_eq!(bytes, vec![0x0a, 0x0b, 0x0c]);
        assert_eq!(fmt, PayloadFormat::Hex);
    }

    #[test]
    fn ascii_prefix_keeps_payload_after_pipe() {
        // Six hex chars: not a multiple of 4, so the base64 branch cannot
        // claim the text.
        let (bytes, fmt) = normalize(b"ASCII=ignored|010203").unwrap();
        assert_eq!(bytes, vec![0x01, 0x02, 0x03]);
        assert_eq!(fmt, PayloadFormat::Hex);
    }

    #[test]
    fn hex_with_separators_is_accepted() {
        let (bytes, _) = normalize(b"01:02:03:04:05").unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn non_utf8_passes_through_raw() {
        let input = [0xff, 0x00, 0xa5];
        let (bytes, fmt) = normalize(&input).unwrap();
        assert_eq!(bytes, input.to_vec());
        assert_eq!(fmt, PayloadFormat::Raw);
    }

    #[test]
    fn empty_and_undecodable_inputs_are_rejected() {
        assert_eq!(normalize(b"").unwrap_err(), PayloadError::Empty);
        assert_eq!(
            normalize(b"   ").unwrap_err(),
            PayloadError::UnknownEncoding
        );
        // Odd number of hex digits.
        assert_eq!(
            normalize(b"abc").unwrap_err(),
            PayloadError::UnknownEncoding
        );
    }

    #[test]
    fn base64_wins_when_text_fits_both_alphabets() {
        // "deadbeef" is valid hex AND base64-shaped (8 chars); base64 wins.
        let (_, fmt) = normalize(b"deadbeef").unwrap();
        assert_eq!(fmt, PayloadFormat::Base64);
    }
}
