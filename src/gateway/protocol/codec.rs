//! Request framing over a connection buffer.

use super::{Command, ParseResult, Resp2Encoder, Resp2Parser, RespValue};
use bytes::{Bytes, BytesMut};

/// Result of decoding a frame from the wire.
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// A complete frame was decoded.
    Complete(T),
    /// More data is needed to complete the frame.
    Incomplete,
    /// The input is invalid.
    Invalid(String),
}

/// RESP2 request decoder and reply encoder.
#[derive(Debug, Default)]
pub struct RespCodec {
    parser: Resp2Parser,
}

impl RespCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next command, consuming its bytes from `buffer`.
    ///
    /// Blank inline lines are consumed silently. On `Invalid` nothing is
    /// consumed; the caller decides how to resynchronize.
    pub fn decode(&mut self, buffer: &mut BytesMut) -> DecodeResult<Command> {
        loop {
            if buffer.is_empty() {
                return DecodeResult::Incomplete;
            }

            let (value, consumed) = match self.parser.parse(buffer) {
                ParseResult::Ok(value, consumed) => (value, consumed),
                ParseResult::Incomplete => return DecodeResult::Incomplete,
                ParseResult::Error(e) => return DecodeResult::Invalid(e),
            };

            match value {
                RespValue::Array(items) if items.is_empty() => {
                    let _ = buffer.split_to(consumed);
                }
                RespValue::Array(items) => {
                    return match Command::from_array(items) {
                        Ok(cmd) => {
                            let _ = buffer.split_to(consumed);
                            DecodeResult::Complete(cmd)
                        }
                        Err(detail) => DecodeResult::Invalid(detail),
                    };
                }
                _ => return DecodeResult::Invalid("expected a command array".to_string()),
            }
        }
    }

    /// Encode a reply.
    pub fn encode(&self, response: &RespValue) -> Bytes {
        Bytes::from(Resp2Encoder::encode(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pipelined_commands() {
        let mut codec = RespCodec::new();
        let mut buffer = BytesMut::from(&b"*1\r\n$5\r\nbegin\r\nset foo bar\r\n*1\r\n$3\r\nget"[..]);

        let first = codec.decode(&mut buffer);
        assert!(matches!(first, DecodeResult::Complete(ref c) if c.verb == "begin"));

        match codec.decode(&mut buffer) {
            DecodeResult::Complete(cmd) => {
                assert_eq!(cmd.verb, "set");
                assert_eq!(cmd.args, vec![Bytes::from("foo"), Bytes::from("bar")]);
            }
            other => panic!("expected command, got {:?}", other),
        }

        assert!(matches!(codec.decode(&mut buffer), DecodeResult::Incomplete));
        assert_eq!(&buffer[..], b"*1\r\n$3\r\nget");
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        let mut codec = RespCodec::new();
        let mut buffer = BytesMut::from(&b"\r\n  \r\nping\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buffer),
            DecodeResult::Complete(ref c) if c.verb == "ping" && c.args.is_empty()
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_rejects_non_array() {
        let mut codec = RespCodec::new();
        let mut buffer = BytesMut::from(&b":1\r\n"[..]);
        assert!(matches!(codec.decode(&mut buffer), DecodeResult::Invalid(_)));
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_encode() {
        let codec = RespCodec::new();
        assert_eq!(&codec.encode(&RespValue::pong())[..], b"+PONG\r\n");
    }
}
