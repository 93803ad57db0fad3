//! Wire protocol framing — parser state machine, CRC16-CCITT, and
//! the matching frame builder.
//!
//! A small bit/byte-level protocol state machine paired with a CRC
//! check, built around a variable-length, sync-delimited frame.

use heapless::Vec;

use crate::error::ProtocolError;

pub const SYNC1: u8 = 0xAA;
pub const SYNC2: u8 = 0x55;
pub const MAX_PAYLOAD: usize = 1024;
pub const FRAME_OVERHEAD: usize = 7;

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no
/// final XOR.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Sync1,
    Sync2,
    Cmd,
    LenLo,
    LenHi,
    Payload,
    CrcLo,
    CrcHi,
}

/// A byte-at-a-time frame parser. Feed bytes via [`Self::feed`]; a
/// completed frame is returned as `Ok(Some(Frame))`, a protocol error as
/// `Err`, and `Ok(None)` while a frame is still in progress.
pub struct FrameParser {
    state: ParserState,
    cmd: u8,
    len: u16,
    payload: Vec<u8, MAX_PAYLOAD>,
    crc: u16,
}

#[derive(Debug, Clone)]
pub struct ParsedFrame {
    pub cmd: u8,
    pub payload: Vec<u8, MAX_PAYLOAD>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Sync1,
            cmd: 0,
            len: 0,
            payload: Vec::new(),
            crc: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = ParserState::Sync1;
        self.payload.clear();
    }

    /// Feeds one byte. Returns `Ok(Some(frame))` the instant a frame
    /// completes and validates; `Err(e)` resets the parser to `Sync1`
    /// so it always resynchronizes on the next valid frame.
    pub fn feed(&mut self, byte: u8) -> Result<Option<ParsedFrame>, ProtocolError> {
        match self.state {
            ParserState::Sync1 => {
                if byte == SYNC1 {
                    self.state = ParserState::Sync2;
                }
                // else: stay in Sync1.
                Ok(None)
            }
            ParserState::Sync2 => {
                self.state = if byte == SYNC2 { ParserState::Cmd } else { ParserState::Sync1 };
                Ok(None)
            }
            ParserState::Cmd => {
                self.cmd = byte;
                self.state = ParserState::LenLo;
                Ok(None)
            }
            ParserState::LenLo => {
                self.len = byte as u16;
                self.state = ParserState::LenHi;
                Ok(None)
            }
            ParserState::LenHi => {
                self.len |= (byte as u16) << 8;
                if self.len as usize > MAX_PAYLOAD {
                    self.reset();
                    return Err(ProtocolError::InvalidLength);
                }
                self.payload.clear();
                self.state = if self.len == 0 { ParserState::CrcLo } else { ParserState::Payload };
                Ok(None)
            }
            ParserState::Payload => {
                // Capacity is bounded by the LenHi check above, so this
                // push cannot fail.
                let _ = self.payload.push(byte);
                if self.payload.len() == self.len as usize {
                    self.state = ParserState::CrcLo;
                }
                Ok(None)
            }
            ParserState::CrcLo => {
                self.crc = byte as u16;
                self.state = ParserState::CrcHi;
                Ok(None)
            }
            ParserState::CrcHi => {
                self.crc |= (byte as u16) << 8;
                let result = self.finish();
                self.reset();
                result
            }
        }
    }

    fn finish(&self) -> Result<Option<ParsedFrame>, ProtocolError> {
        let mut header = [0u8; 3];
        header[0] = self.cmd;
        header[1..3].copy_from_slice(&self.len.to_le_bytes());

        let mut check = Vec::<u8, { 3 + MAX_PAYLOAD }>::new();
        check.extend_from_slice(&header).ok();
        check.extend_from_slice(&self.payload).ok();
        let computed = crc16_ccitt(&check);

        if computed != self.crc {
            return Err(ProtocolError::CrcMismatch);
        }

        Ok(Some(ParsedFrame { cmd: self.cmd, payload: self.payload.clone() }))
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a complete on-wire frame for `cmd`/`payload` (mirrors
/// [`FrameParser`] byte-for-byte, used by both directions of the link
/// and by the host-link property tests).
pub fn build_frame(cmd: u8, payload: &[u8]) -> Result<Vec<u8, { FRAME_OVERHEAD + MAX_PAYLOAD }>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::InvalidLength);
    }

    let mut header = [0u8; 3];
    header[0] = cmd;
    header[1..3].copy_from_slice(&(payload.len() as u16).to_le_bytes());

    let mut check = Vec::<u8, { 3 + MAX_PAYLOAD }>::new();
    check.extend_from_slice(&header).ok();
    check.extend_from_slice(payload).ok();
    let crc = crc16_ccitt(&check);

    let mut out = Vec::new();
    out.push(SYNC1).ok();
    out.push(SYNC2).ok();
    out.extend_from_slice(&header).ok();
    out.extend_from_slice(payload).ok();
    out.extend_from_slice(&crc.to_le_bytes()).ok();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_parse_round_trips_empty_payload() {
        let frame = build_frame(0x01, &[]).unwrap();
        let mut parser = FrameParser::new();
        let mut result = None;
        for &b in frame.iter() {
            if let Some(f) = parser.feed(b).unwrap() {
                result = Some(f);
            }
        }
        let f = result.unwrap();
        assert_eq!(f.cmd, 0x01);
        assert!(f.payload.is_empty());
    }

    #[test]
    fn build_then_parse_round_trips_with_payload() {
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let frame = build_frame(0x30, &payload).unwrap();
        let mut parser = FrameParser::new();
        let mut result = None;
        for &b in frame.iter() {
            if let Some(f) = parser.feed(b).unwrap() {
                result = Some(f);
            }
        }
        let f = result.unwrap();
        assert_eq!(f.cmd, 0x30);
        assert_eq!(&f.payload[..], &payload[..]);
    }

    #[test]
    fn corrupted_crc_is_rejected_and_resyncs() {
        let mut frame = build_frame(0x01, &[]).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let mut parser = FrameParser::new();
        let mut saw_error = false;
        for &b in frame.iter() {
            match parser.feed(b) {
                Err(ProtocolError::CrcMismatch) => saw_error = true,
                _ => {}
            }
        }
        assert!(saw_error);

        // Parser must resynchronize: feeding a fresh valid frame after the
        // corrupted one still completes.
        let good = build_frame(0x02, &[1, 2, 3]).unwrap();
        let mut result = None;
        for &b in good.iter() {
            if let Ok(Some(f)) = parser.feed(b) {
                result = Some(f);
            }
        }
        assert!(result.is_some());
    }

    #[test]
    fn garbage_prefix_before_sync_is_ignored() {
        let frame = build_frame(0x01, &[]).unwrap();
        let mut parser = FrameParser::new();
        for b in [0x00, 0xFF, 0x12, 0xAA, 0x00] {
            let _ = parser.feed(b);
        }
        parser.reset();
        let mut result = None;
        for &b in frame.iter() {
            if let Ok(Some(f)) = parser.feed(b) {
                result = Some(f);
            }
        }
        assert!(result.is_some());
    }

    #[test]
    fn oversized_length_is_rejected() {
        let mut parser = FrameParser::new();
        parser.feed(SYNC1).unwrap();
        parser.feed(SYNC2).unwrap();
        parser.feed(0x01).unwrap();
        parser.feed(0xFF).unwrap(); // len lo
        let r = parser.feed(0xFF); // len hi -> len = 0xFFFF > 1024
        assert!(matches!(r, Err(ProtocolError::InvalidLength)));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(256))]
        #[test]
        fn round_trip_holds_for_any_cmd_and_payload(
            cmd in proptest::prelude::any::<u8>(),
            payload in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..=MAX_PAYLOAD),
        ) {
            let frame = build_frame(cmd, &payload).unwrap();

            let mut parser = FrameParser::new();
            let mut result = None;
            for &b in frame.iter() {
                if let Some(f) = parser.feed(b).unwrap() {
                    result = Some(f);
                }
            }
            let f = result.unwrap();
            proptest::prop_assert_eq!(f.cmd, cmd);
            proptest::prop_assert_eq!(&f.payload[..], &payload[..]);
        }
    }
}
