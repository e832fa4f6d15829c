//! RESP2 wire protocol.
//!
//! Requests are RESP arrays of bulk strings, or inline lines
//! (`verb arg arg\r\n`) for hand-typed sessions. Replies use the five RESP2
//! types:
//!
//! | Prefix | Type          | Example                 |
//! |--------|---------------|-------------------------|
//! | `+`    | Simple string | `+OK\r\n`               |
//! | `-`    | Error         | `-ERR no open transaction\r\n` |
//! | `:`    | Integer       | `:42\r\n`               |
//! | `$`    | Bulk string   | `$3\r\nbar\r\n`, `$-1\r\n` |
//! | `*`    | Array         | `*2\r\n+COMMIT\r\n:7\r\n` |

pub mod codec;
pub mod resp2;

pub use codec::{DecodeResult, RespCodec};
pub use resp2::{Resp2Encoder, Resp2Parser};

use bytes::Bytes;

/// Maximum nesting depth for arrays.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum bulk string size (512MB).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array elements.
pub const MAX_ELEMENTS: usize = 1_000_000;

/// Maximum length of an inline command line.
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// A RESP2 value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string (+OK\r\n)
    SimpleString(String),

    /// Error (-ERR message\r\n)
    Error(RespError),

    /// Integer (:1000\r\n)
    Integer(i64),

    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Bytes),

    /// Array (*2\r\n...)
    Array(Vec<RespValue>),

    /// Null bulk string ($-1\r\n)
    Null,
}

impl RespValue {
    /// Create a simple string.
    pub fn simple_string(s: impl Into<String>) -> Self {
        Self::SimpleString(s.into())
    }

    /// Create an OK response.
    pub fn ok() -> Self {
        Self::SimpleString("OK".to_string())
    }

    /// Create a PONG response.
    pub fn pong() -> Self {
        Self::SimpleString("PONG".to_string())
    }

    /// Create a generic error.
    pub fn err(message: impl Into<String>) -> Self {
        Self::Error(RespError::generic(message))
    }

    /// Create an integer.
    pub fn integer(n: i64) -> Self {
        Self::Integer(n)
    }

    /// Create a bulk string.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::BulkString(data.into())
    }

    /// Create an array.
    pub fn array(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Try to get as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Try to get as bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::SimpleString(s) => Some(s.as_bytes()),
            Self::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get as error.
    pub fn as_error(&self) -> Option<&RespError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// An error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespError {
    /// Error kind, the first word on the wire.
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl RespError {
    /// Create a new error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a generic `ERR` error.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new("ERR", message)
    }

    /// Create a wrong number of arguments error.
    pub fn wrong_arity(verb: &str) -> Self {
        Self::generic(format!("wrong number of arguments for '{}' command", verb))
    }

    /// Create an unknown command error.
    pub fn unknown_command(verb: &str) -> Self {
        Self::generic(format!("unknown command '{}'", verb))
    }

    /// Create a protocol error.
    pub fn protocol(detail: impl std::fmt::Display) -> Self {
        Self::generic(format!("Protocol error: {}", detail))
    }
}

impl std::fmt::Display for RespError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.message)
    }
}

impl std::error::Error for RespError {}

/// A decoded client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Verb as sent by the client.
    pub verb: String,

    /// Arguments, excluding the verb.
    pub args: Vec<Bytes>,
}

impl Command {
    /// Create a new command.
    pub fn new(verb: impl Into<String>, args: Vec<Bytes>) -> Self {
        Self {
            verb: verb.into(),
            args,
        }
    }

    /// Parse from the elements of a RESP array. Errors carry a protocol
    /// error detail.
    pub fn from_array(values: Vec<RespValue>) -> Result<Self, String> {
        let mut values = values.into_iter();

        let verb = match values.next() {
            Some(RespValue::BulkString(b)) => String::from_utf8(b.to_vec())
                .map_err(|_| "command verb is not valid UTF-8".to_string())?,
            Some(RespValue::SimpleString(s)) => s,
            Some(_) => return Err("command verb must be a string".to_string()),
            None => return Err("empty command".to_string()),
        };

        let args = values
            .map(|v| match v {
                RespValue::BulkString(b) => Ok(b),
                RespValue::SimpleString(s) => Ok(Bytes::from(s)),
                RespValue::Integer(n) => Ok(Bytes::from(n.to_string())),
                _ => Err("command arguments must be strings".to_string()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(verb, args))
    }

    /// Lower-cased verb, used for dispatch.
    pub fn normalized_verb(&self) -> String {
        self.verb.to_ascii_lowercase()
    }

    /// Get argument as bytes.
    pub fn arg(&self, index: usize) -> Option<&Bytes> {
        self.args.get(index)
    }

    /// Get argument as string.
    pub fn arg_str(&self, index: usize) -> Option<&str> {
        self.args
            .get(index)
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Number of elements including the verb.
    pub fn arity(&self) -> usize {
        self.args.len() + 1
    }
}

/// Parse result.
#[derive(Debug)]
pub enum ParseResult {
    /// Parsed a value, consuming the given number of bytes.
    Ok(RespValue, usize),
    /// Need more data.
    Incomplete,
    /// Parse error.
    Error(String),
}
