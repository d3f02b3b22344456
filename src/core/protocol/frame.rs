// src/core/protocol/frame.rs

//! Implements the line framing of the status protocol and the corresponding
//! `Encoder` and `Decoder` for network communication.
//!
//! The remote terminates every message with CRLF. The framing layer overwrites
//! the CR with NUL and consumes both bytes, so a decoded frame is the message
//! text followed by a single NUL byte, and the next message starts at NUL+2 in
//! the wire stream. The parser relies on that trailing NUL as its end marker.

use crate::core::FleetMonError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const NUL: u8 = 0;

// Longest legal message is a job-list line; anything beyond this is garbage
// and must not be buffered forever.
const MAX_LINE_LENGTH: usize = 8 * 1024;

/// Codec for NUL-framed protocol lines. Decoding yields the message bytes
/// with the CR replaced by NUL; encoding appends CRLF to outbound commands.
#[derive(Debug, Default)]
pub struct TagLineCodec;

impl Decoder for TagLineCodec {
    type Item = Bytes;
    type Error = FleetMonError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        let Some(pos) = src.iter().position(|&b| b == CR || b == NUL) else {
            if src.len() > MAX_LINE_LENGTH {
                return Err(FleetMonError::ProtocolError(format!(
                    "Message exceeds {MAX_LINE_LENGTH} bytes without a line terminator"
                )));
            }
            return Ok(None);
        };

        // The byte after CR must be present before the frame is complete.
        if pos + 1 >= src.len() {
            return Ok(None);
        }

        let mut line = src.split_to(pos + 1);
        // Resume from NUL+2: drop the LF that follows the overwritten CR.
        if src[0] == LF {
            src.advance(1);
        }
        line[pos] = NUL;
        Ok(Some(line.freeze()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                // A final unterminated message; hand it over with the NUL the
                // parser expects.
                let mut line = src.split_off(0);
                line.put_u8(NUL);
                Ok(Some(line.freeze()))
            }
        }
    }
}

impl Encoder<&str> for TagLineCodec {
    type Error = FleetMonError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 2);
        dst.extend_from_slice(item.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}
