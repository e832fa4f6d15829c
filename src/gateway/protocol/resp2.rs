//! RESP2 parser and encoder.

use super::{
    ParseResult, RespError, RespValue, MAX_BULK_SIZE, MAX_ELEMENTS, MAX_INLINE_SIZE,
    MAX_NESTING_DEPTH,
};
use bytes::Bytes;

/// RESP2 parser.
#[derive(Debug, Default)]
pub struct Resp2Parser {
    /// Current nesting depth.
    depth: usize,
}

impl Resp2Parser {
    /// Create a new parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one value from the front of the buffer.
    pub fn parse(&mut self, data: &[u8]) -> ParseResult {
        self.depth = 0;
        self.parse_value(data)
    }

    fn parse_value(&mut self, data: &[u8]) -> ParseResult {
        let Some(&prefix) = data.first() else {
            return ParseResult::Incomplete;
        };

        if self.depth > MAX_NESTING_DEPTH {
            return ParseResult::Error("maximum nesting depth exceeded".to_string());
        }

        let body = &data[1..];
        let result = match prefix {
            b'+' => parse_simple_string(body),
            b'-' => parse_error(body),
            b':' => parse_integer(body),
            b'$' => parse_bulk_string(body),
            b'*' => self.parse_array(body),
            _ => return parse_inline(data),
        };

        // Account for the prefix byte.
        match result {
            ParseResult::Ok(value, consumed) => ParseResult::Ok(value, consumed + 1),
            other => other,
        }
    }

    fn parse_array(&mut self, data: &[u8]) -> ParseResult {
        let Some(len_pos) = find_crlf(data) else {
            return ParseResult::Incomplete;
        };

        let len = match parse_length(&data[..len_pos]) {
            Some(-1) => return ParseResult::Ok(RespValue::Null, len_pos + 2),
            Some(len) if len >= 0 => len as usize,
            _ => return ParseResult::Error("invalid multibulk length".to_string()),
        };
        if len > MAX_ELEMENTS {
            return ParseResult::Error(format!("array too large: {} > {}", len, MAX_ELEMENTS));
        }

        self.depth += 1;
        let mut elements = Vec::with_capacity(len.min(64));
        let mut offset = len_pos + 2;

        for _ in 0..len {
            match self.parse_value(&data[offset..]) {
                ParseResult::Ok(value, consumed) => {
                    elements.push(value);
                    offset += consumed;
                }
                other => {
                    self.depth -= 1;
                    return other;
                }
            }
        }

        self.depth -= 1;
        ParseResult::Ok(RespValue::Array(elements), offset)
    }
}

fn parse_simple_string(data: &[u8]) -> ParseResult {
    match find_crlf(data) {
        Some(pos) => {
            let s = String::from_utf8_lossy(&data[..pos]).to_string();
            ParseResult::Ok(RespValue::SimpleString(s), pos + 2)
        }
        None => ParseResult::Incomplete,
    }
}

fn parse_error(data: &[u8]) -> ParseResult {
    match find_crlf(data) {
        Some(pos) => {
            let s = String::from_utf8_lossy(&data[..pos]);
            let (kind, message) = match s.split_once(' ') {
                Some((kind, message)) => (kind.to_string(), message.to_string()),
                None => (s.to_string(), String::new()),
            };
            ParseResult::Ok(RespValue::Error(RespError { kind, message }), pos + 2)
        }
        None => ParseResult::Incomplete,
    }
}

fn parse_integer(data: &[u8]) -> ParseResult {
    match find_crlf(data) {
        Some(pos) => match parse_length(&data[..pos]) {
            Some(n) => ParseResult::Ok(RespValue::Integer(n), pos + 2),
            None => ParseResult::Error("invalid integer".to_string()),
        },
        None => ParseResult::Incomplete,
    }
}

fn parse_bulk_string(data: &[u8]) -> ParseResult {
    let Some(len_pos) = find_crlf(data) else {
        return ParseResult::Incomplete;
    };

    let len = match parse_length(&data[..len_pos]) {
        Some(-1) => return ParseResult::Ok(RespValue::Null, len_pos + 2),
        Some(len) if len >= 0 => len as usize,
        _ => return ParseResult::Error("invalid bulk length".to_string()),
    };
    if len > MAX_BULK_SIZE {
        return ParseResult::Error(format!(
            "bulk string too large: {} > {}",
            len, MAX_BULK_SIZE
        ));
    }

    let start = len_pos + 2;
    let end = start + len;
    if data.len() < end + 2 {
        return ParseResult::Incomplete;
    }
    if &data[end..end + 2] != b"\r\n" {
        return ParseResult::Error("missing CRLF after bulk string".to_string());
    }

    let bytes = Bytes::copy_from_slice(&data[start..end]);
    ParseResult::Ok(RespValue::BulkString(bytes), end + 2)
}

/// Parse an inline command (`get foo\r\n`). A bare `\n` also ends the line.
fn parse_inline(data: &[u8]) -> ParseResult {
    let Some(newline) = data.iter().position(|&b| b == b'\n') else {
        if data.len() > MAX_INLINE_SIZE {
            return ParseResult::Error("too big inline request".to_string());
        }
        return ParseResult::Incomplete;
    };

    let mut line = &data[..newline];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }

    let parts: Vec<RespValue> = line
        .split(|b| *b == b' ' || *b == b'\t')
        .filter(|p| !p.is_empty())
        .map(|p| RespValue::BulkString(Bytes::copy_from_slice(p)))
        .collect();

    // Blank lines decode to an empty array, which the caller skips.
    ParseResult::Ok(RespValue::Array(parts), newline + 1)
}

/// RESP2 encoder.
#[derive(Debug, Default)]
pub struct Resp2Encoder;

impl Resp2Encoder {
    /// Encode a value to bytes.
    pub fn encode(value: &RespValue) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        Self::encode_into(value, &mut buf);
        buf
    }

    /// Encode a value into a buffer.
    pub fn encode_into(value: &RespValue, buf: &mut Vec<u8>) {
        match value {
            RespValue::SimpleString(s) => {
                buf.push(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Error(e) => {
                buf.push(b'-');
                buf.extend_from_slice(e.kind.as_bytes());
                if !e.message.is_empty() {
                    buf.push(b' ');
                    // Line breaks would split the frame.
                    buf.extend(
                        e.message
                            .bytes()
                            .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
                    );
                }
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.push(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::BulkString(data) => {
                buf.push(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            RespValue::Array(elements) => {
                buf.push(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.extend_from_slice(b"\r\n");
                for elem in elements {
                    Self::encode_into(elem, buf);
                }
            }
            RespValue::Null => {
                buf.extend_from_slice(b"$-1\r\n");
            }
        }
    }
}

/// Find CRLF in data, returning position of the `\r`.
fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn parse_length(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.parse().ok()
}
