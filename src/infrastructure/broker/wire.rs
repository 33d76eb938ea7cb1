//! Minimal reusable framer for the broker's binary wire protocol: each
//! message is NUL-separated fields prefixed by a 4-byte big-endian length,
//! grounded on `sparkstartconsulting-IBKR-API-Rust`'s `EMessage`/`read_msg`
//! pair. This is the generic framing shape only — not a replica of TWS's
//! numbered message catalogue, since the session here speaks a small
//! request/response vocabulary of our own (first field = operation name).

use byteorder::{BigEndian, ByteOrder};

/// Encodes `fields` as one wire frame: `[len: u32 BE][field\0 field\0 ...]`.
pub fn encode_frame(fields: &[&str]) -> Vec<u8> {
    let mut payload = Vec::new();
    for field in fields {
        payload.extend_from_slice(field.as_bytes());
        payload.push(0);
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    let mut len_bytes = [0u8; 4];
    BigEndian::write_u32(&mut len_bytes, payload.len() as u32);
    out.extend_from_slice(&len_bytes);
    out.extend_from_slice(&payload);
    out
}

/// Accumulates bytes read off the wire and yields complete frames, each
/// split on the NUL field separator (trailing empty field dropped).
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops and decodes the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<Vec<String>> {
        if self.buf.len() < 4 {
            return None;
        }
        let len = BigEndian::read_u32(&self.buf[0..4]) as usize;
        if self.buf.len() < 4 + len {
            return None;
        }
        let payload = self.buf[4..4 + len].to_vec();
        self.buf.drain(0..4 + len);

        let text = String::from_utf8_lossy(&payload);
        let mut fields: Vec<String> = text.split('\0').map(|s| s.to_string()).collect();
        if fields.last().map(|s| s.is_empty()).unwrap_or(false) {
            fields.pop();
        }
        Some(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let frame = encode_frame(&["ACCOUNT_SUMMARY", "req-1"]);
        let mut reader = FrameReader::new();
        reader.feed(&frame);
        let fields = reader.next_frame().unwrap();
        assert_eq!(fields, vec!["ACCOUNT_SUMMARY".to_string(), "req-1".to_string()]);
    }

    #[test]
    fn partial_frame_yields_nothing_until_complete() {
        let frame = encode_frame(&["QUALIFY", "SPY"]);
        let mut reader = FrameReader::new();
        reader.feed(&frame[..frame.len() - 2]);
        assert!(reader.next_frame().is_none());
        reader.feed(&frame[frame.len() - 2..]);
        assert!(reader.next_frame().is_some());
    }

    #[test]
    fn two_frames_fed_together_decode_in_order() {
        let mut reader = FrameReader::new();
        reader.feed(&encode_frame(&["A"]));
        reader.feed(&encode_frame(&["B"]));
        assert_eq!(reader.next_frame().unwrap(), vec!["A".to_string()]);
        assert_eq!(reader.next_frame().unwrap(), vec!["B".to_string()]);
        assert!(reader.next_frame().is_none());
    }
}
