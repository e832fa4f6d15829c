//! Order-preserving tuple encoding.
//!
//! Encodes a sequence of typed elements into bytes such that the byte-wise
//! ordering of encoded tuples matches the element-wise ordering of the
//! tuples themselves. Every element is self-delimiting, which makes
//! concatenation under a prefix and prefix stripping unambiguous.
//!
//! | Type   | Code          | Payload                                     |
//! |--------|---------------|---------------------------------------------|
//! | Bytes  | `0x01`        | bytes, `0x00` escaped as `0x00 0xFF`, `0x00` |
//! | String | `0x02`        | UTF-8, escaped like bytes, `0x00`            |
//! | Int    | `0x0C..=0x1C` | big-endian magnitude, length in the code     |

use thiserror::Error;

const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const INT_ZERO_CODE: u8 = 0x14;
const ESCAPE: u8 = 0xFF;

/// Tuple decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TupleError {
    /// Unknown type code.
    #[error("unknown type code 0x{code:02x} at offset {offset}")]
    UnknownCode { code: u8, offset: usize },

    /// Input ended inside an element.
    #[error("truncated element at offset {offset}")]
    Truncated { offset: usize },

    /// String element is not valid UTF-8.
    #[error("invalid utf-8 in string element at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// Integer does not fit in 64 bits.
    #[error("integer overflow at offset {offset}")]
    IntegerOverflow { offset: usize },
}

/// A single tuple element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    /// Raw byte string.
    Bytes(Vec<u8>),
    /// Unicode string.
    String(String),
    /// Signed 64-bit integer.
    Int(i64),
}

impl Element {
    /// Borrow the payload of a byte string element.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrow the payload of a string element.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&[u8]> for Element {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Element {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Element {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// Encode a tuple.
pub fn pack(elements: &[Element]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    pack_into(elements, &mut buf);
    buf
}

/// Encode a tuple, appending to `buf`.
pub fn pack_into(elements: &[Element], buf: &mut Vec<u8>) {
    for element in elements {
        match element {
            Element::Bytes(b) => {
                buf.push(BYTES_CODE);
                encode_escaped(b, buf);
            }
            Element::String(s) => {
                buf.push(STRING_CODE);
                encode_escaped(s.as_bytes(), buf);
            }
            Element::Int(n) => encode_int(*n, buf),
        }
    }
}

/// Decode a complete tuple.
pub fn unpack(data: &[u8]) -> Result<Vec<Element>, TupleError> {
    let mut elements = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let code = data[offset];
        let start = offset;
        offset += 1;

        match code {
            BYTES_CODE => {
                let (payload, next) = decode_escaped(data, offset)?;
                elements.push(Element::Bytes(payload));
                offset = next;
            }
            STRING_CODE => {
                let (payload, next) = decode_escaped(data, offset)?;
                let s = String::from_utf8(payload)
                    .map_err(|_| TupleError::InvalidUtf8 { offset: start })?;
                elements.push(Element::String(s));
                offset = next;
            }
            0x0C..=0x1C => {
                let (n, next) = decode_int(code, data, offset)?;
                elements.push(Element::Int(n));
                offset = next;
            }
            _ => return Err(TupleError::UnknownCode { code, offset: start }),
        }
    }

    Ok(elements)
}

fn encode_escaped(payload: &[u8], buf: &mut Vec<u8>) {
    for &b in payload {
        buf.push(b);
        if b == 0x00 {
            buf.push(ESCAPE);
        }
    }
    buf.push(0x00);
}

/// Returns the unescaped payload and the offset just past the terminator.
fn decode_escaped(data: &[u8], mut offset: usize) -> Result<(Vec<u8>, usize), TupleError> {
    let mut payload = Vec::new();

    loop {
        match data.get(offset) {
            None => return Err(TupleError::Truncated { offset }),
            Some(0x00) => {
                if data.get(offset + 1) == Some(&ESCAPE) {
                    payload.push(0x00);
                    offset += 2;
                } else {
                    return Ok((payload, offset + 1));
                }
            }
            Some(&b) => {
                payload.push(b);
                offset += 1;
            }
        }
    }
}

fn encode_int(n: i64, buf: &mut Vec<u8>) {
    if n == 0 {
        buf.push(INT_ZERO_CODE);
        return;
    }

    let magnitude = n.unsigned_abs();
    let len = 8 - (magnitude.leading_zeros() / 8) as usize;

    if n > 0 {
        buf.push(INT_ZERO_CODE + len as u8);
        buf.extend_from_slice(&magnitude.to_be_bytes()[8 - len..]);
    } else {
        // Ones' complement keeps negatives ordered below zero.
        buf.push(INT_ZERO_CODE - len as u8);
        buf.extend_from_slice(&(!magnitude).to_be_bytes()[8 - len..]);
    }
}

fn decode_int(code: u8, data: &[u8], offset: usize) -> Result<(i64, usize), TupleError> {
    if code == INT_ZERO_CODE {
        return Ok((0, offset));
    }

    let negative = code < INT_ZERO_CODE;
    let len = if negative {
        (INT_ZERO_CODE - code) as usize
    } else {
        (code - INT_ZERO_CODE) as usize
    };

    let end = offset + len;
    let raw = data
        .get(offset..end)
        .ok_or(TupleError::Truncated { offset })?;

    let mut word = [0u8; 8];
    word[8 - len..].copy_from_slice(raw);
    let value = u64::from_be_bytes(word);

    if negative {
        let mask = if len == 8 {
            u64::MAX
        } else {
            (1u64 << (len * 8)) - 1
        };
        let magnitude = mask - value;
        if magnitude > i64::MAX as u64 + 1 {
            return Err(TupleError::IntegerOverflow { offset });
        }
        Ok(((magnitude as i64).wrapping_neg(), end))
    } else {
        if value > i64::MAX as u64 {
            return Err(TupleError::IntegerOverflow { offset });
        }
        Ok((value as i64, end))
    }
}
