//! Stream framing for TCP ingress.
//!
//! Turns a connection's byte stream into discrete candidate payloads with
//! no knowledge of payload semantics. Two disciplines exist, selected per
//! listener in config:
//!
//! - **Delimiter**: split on `\n`/`\r\n`, keeping the trailing partial line
//!   buffered for the next read. An unterminated tail left at connection
//!   close is discarded, never force-flushed.
//! - **Opaque**: each socket-level read is one complete message; nothing is
//!   ever buffered across reads.
//!
//! Candidates are ASCII-whitespace-trimmed and never empty. Framing never
//! reacts to downstream decode errors — the same bytes are not resegmented
//! or retried.

/// Framing discipline for a TCP listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    Delimiter,
    Opaque,
}

impl FramingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delimiter" => Some(FramingMode::Delimiter),
            "opaque" => Some(FramingMode::Opaque),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FramingMode::Delimiter => "delimiter",
            FramingMode::Opaque => "opaque",
        }
    }
}

/// Per-connection frame accumulator. The only mutable state a connection
/// keeps for partially received frames.
#[derive(Debug)]
pub struct FrameAccumulator {
    mode: FramingMode,
    buf: Vec<u8>,
}

impl FrameAccumulator {
    pub fn new(mode: FramingMode) -> Self {
        FrameAccumulator {
            mode,
            buf: Vec::new(),
        }
    }

    /// Feed one socket read; returns zero or more complete candidates.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        match self.mode {
            FramingMode::Opaque => {
                let trimmed = trim_ascii(chunk);
                if trimmed.is_empty() {
                    Vec::new()
                } else {
                    vec![trimmed.to_vec()]
                }
            }
            FramingMode::Delimiter => {
                self.buf.extend_from_slice(chunk);
                let mut candidates = Vec::new();
                while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                    let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                    line.pop(); // the \n itself
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    let trimmed = trim_ascii(&line);
                    if !trimmed.is_empty() {
                        candidates.push(trimmed.to_vec());
                    }
                }
                candidates
            }
        }
    }

    /// Consume the accumulator at connection close, returning whatever was
    /// left unterminated. Callers discard it (logging the loss); it is
    /// surfaced only so the discard is observable.
    pub fn into_remainder(self) -> Vec<u8> {
        self.buf
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}
