//! Line encoding and unframed UTF-8 decoding
//!
//! Outbound text is written as:
//! ```text
//! [ N bytes: UTF-8 text ][ '\n' ]
//! ```
//!
//! Inbound bytes carry no framing. A read may hold part of an application
//! message or several of them; the decoder only guarantees that a
//! multi-byte character split across two reads is delivered whole.

use bytes::{BufMut, Bytes, BytesMut};

/// Line terminator appended to every text message
pub const LINE_TERMINATOR: u8 = b'\n';

/// Encode a text message as a newline-terminated line
pub fn encode_line(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(LINE_TERMINATOR);
    buf.freeze()
}

/// Length of an unfinished multi-byte sequence at the end of `buf`
fn incomplete_tail_len(buf: &[u8]) -> usize {
    let mut rest = buf;
    loop {
        match std::str::from_utf8(rest) {
            Ok(_) => return 0,
            Err(e) => match e.error_len() {
                None => return rest.len() - e.valid_up_to(),
                Some(invalid) => rest = &rest[e.valid_up_to() + invalid..],
            },
        }
    }
}

/// Incremental decoder for a raw byte stream
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Trailing bytes of a character that hasn't fully arrived yet
    pending: BytesMut,
}

impl Utf8Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self {
            pending: BytesMut::with_capacity(4),
        }
    }

    /// Decode the next chunk of received bytes
    ///
    /// Returns `None` when the chunk only contained part of a character.
    /// Invalid sequences are replaced with U+FFFD.
    pub fn decode(&mut self, data: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(data);

        let keep = incomplete_tail_len(&self.pending);
        let complete = self.pending.split_to(self.pending.len() - keep);
        if complete.is_empty() {
            return None;
        }

        Some(String::from_utf8_lossy(&complete).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_line_appends_newline() {
        let encoded = encode_line("{\"sn\":\"SN1\"}");
        assert_eq!(&encoded[..], b"{\"sn\":\"SN1\"}\n");
        assert_eq!(&encode_line("")[..], b"\n");
    }

    #[test]
    fn test_decode_ascii_passthrough() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"status:ok\nstat").as_deref(), Some("status:ok\nstat"));
        assert_eq!(decoder.decode(b"e").as_deref(), Some("e"));
    }

    #[test]
    fn test_split_multibyte_character() {
        // "温度" split in the middle of the second character
        let bytes = "温度".as_bytes();
        let mut decoder = Utf8Decoder::new();

        assert_eq!(decoder.decode(&bytes[..4]).as_deref(), Some("温"));
        assert_eq!(decoder.decode(&bytes[4..]).as_deref(), Some("度"));
        assert_eq!(decoder.decode(b"!").as_deref(), Some("!"));
    }

    #[test]
    fn test_partial_only_yields_nothing() {
        let bytes = "é".as_bytes();
        let mut decoder = Utf8Decoder::new();
        assert!(decoder.decode(&bytes[..1]).is_none());
        assert_eq!(decoder.decode(&bytes[1..]).as_deref(), Some("é"));
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut decoder = Utf8Decoder::new();
        let text = decoder.decode(&[b'a', 0xFF, b'b']).expect("text");
        assert_eq!(text, "a\u{FFFD}b");
    }
}
