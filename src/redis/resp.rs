/// Redis RESP (Redis Serialization Protocol) parsing and generation

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::str;

/// RESP data types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple String (+OK\r\n)
    SimpleString(String),
    /// Error (-ERR message\r\n)
    Error(String),
    /// Integer (:123\r\n)
    Integer(i64),
    /// Bulk String ($5\r\nhello\r\n)
    BulkString(Option<Bytes>), // None represents NULL
    /// Array (*2\r\n$5\r\nhello\r\n$5\r\nworld\r\n)
    Array(Option<Vec<RespValue>>), // None represents NULL array
}

impl RespValue {
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn bulk<B: Into<Bytes>>(data: B) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

/// RESP parser for reading Redis protocol messages
pub struct RespParser;

/// RESP encoder for writing Redis protocol messages
pub struct RespEncoder;

/// Parse error types
#[derive(Debug, thiserror::Error)]
pub enum RespParseError {
    #[error("Invalid RESP format: {0}")]
    InvalidFormat(String),
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] str::Utf8Error),
    #[error("Invalid integer: {0}")]
    InvalidInteger(String),
}

impl RespParser {
    /// Parse one complete RESP value from the front of `buf`.
    ///
    /// Returns `Ok(None)` and leaves `buf` untouched when the value is not
    /// complete yet.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespParseError> {
        if buf.is_empty() {
            return Ok(None);
        }

        match Self::parse_at(buf, 0)? {
            Some((value, end)) => {
                buf.advance(end);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Parse multiple values from a buffer
    pub fn parse_all(buf: &mut BytesMut) -> Result<Vec<RespValue>, RespParseError> {
        let mut values = Vec::new();

        while let Some(value) = Self::parse(buf)? {
            values.push(value);
        }

        Ok(values)
    }

    /// Parse the value starting at `pos`, returning it with the offset just past it
    fn parse_at(buf: &[u8], pos: usize) -> Result<Option<(RespValue, usize)>, RespParseError> {
        let Some((line, next)) = Self::read_line(buf, pos) else {
            return Ok(None);
        };

        let Some((&type_byte, body)) = line.split_first() else {
            return Err(RespParseError::InvalidFormat("Empty RESP line".to_string()));
        };

        match type_byte {
            b'+' => Ok(Some((
                RespValue::SimpleString(str::from_utf8(body)?.to_string()),
                next,
            ))),
            b'-' => Ok(Some((RespValue::Error(str::from_utf8(body)?.to_string()), next))),
            b':' => Ok(Some((RespValue::Integer(Self::parse_integer(body)?), next))),
            b'$' => Self::parse_bulk_string(buf, body, next),
            b'*' => Self::parse_array(buf, body, next),
            other => Err(RespParseError::InvalidFormat(format!(
                "Unknown RESP type: {}",
                other as char
            ))),
        }
    }

    fn parse_bulk_string(
        buf: &[u8],
        size_line: &[u8],
        start: usize,
    ) -> Result<Option<(RespValue, usize)>, RespParseError> {
        let size = Self::parse_integer(size_line)?;

        if size == -1 {
            return Ok(Some((RespValue::BulkString(None), start)));
        }

        if size < 0 {
            return Err(RespParseError::InvalidFormat(
                "Invalid bulk string size".to_string(),
            ));
        }

        let end = start + size as usize;

        // Payload plus trailing \r\n
        if buf.len() < end + 2 {
            return Ok(None);
        }

        if &buf[end..end + 2] != b"\r\n" {
            return Err(RespParseError::InvalidFormat(
                "Missing \\r\\n after bulk string".to_string(),
            ));
        }

        let content = Bytes::copy_from_slice(&buf[start..end]);
        Ok(Some((RespValue::BulkString(Some(content)), end + 2)))
    }

    fn parse_array(
        buf: &[u8],
        size_line: &[u8],
        start: usize,
    ) -> Result<Option<(RespValue, usize)>, RespParseError> {
        let size = Self::parse_integer(size_line)?;

        if size == -1 {
            return Ok(Some((RespValue::Array(None), start)));
        }

        if size < 0 {
            return Err(RespParseError::InvalidFormat(
                "Invalid array size".to_string(),
            ));
        }

        let mut elements = Vec::with_capacity((size as usize).min(1024));
        let mut cursor = start;

        for _ in 0..size {
            match Self::parse_at(buf, cursor)? {
                Some((element, next)) => {
                    elements.push(element);
                    cursor = next;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(Some(elements)), cursor)))
    }

    fn parse_integer(digits: &[u8]) -> Result<i64, RespParseError> {
        btoi::btoi::<i64>(digits)
            .map_err(|_| RespParseError::InvalidInteger(String::from_utf8_lossy(digits).into_owned()))
    }

    /// Find the line starting at `pos`, without its \r\n terminator
    fn read_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
        let rest = buf.get(pos..)?;
        rest.windows(2)
            .position(|window| window == b"\r\n")
            .map(|i| (&rest[..i], pos + i + 2))
    }
}

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_into(&mut buf, value);
        buf.freeze()
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_into(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.extend_from_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::Error(s) => {
                buf.put_u8(b'-');
                buf.extend_from_slice(s.as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::Integer(n) => {
                buf.put_u8(b':');
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            RespValue::BulkString(Some(data)) => {
                buf.put_u8(b'$');
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.extend_from_slice(data);
                buf.put_slice(b"\r\n");
            }
            RespValue::BulkString(None) => {
                buf.extend_from_slice(b"$-1\r\n");
            }
            RespValue::Array(Some(elements)) => {
                buf.put_u8(b'*');
                buf.extend_from_slice(elements.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                for element in elements {
                    Self::encode_into(buf, element);
                }
            }
            RespValue::Array(None) => {
                buf.extend_from_slice(b"*-1\r\n");
            }
        }
    }

    /// Create a Redis command from command name and arguments
    pub fn create_command(command: &str, args: &[Bytes]) -> RespValue {
        let mut elements = Vec::with_capacity(args.len() + 1);
        elements.push(RespValue::BulkString(Some(Bytes::copy_from_slice(
            command.as_bytes(),
        ))));

        for arg in args {
            elements.push(RespValue::BulkString(Some(arg.clone())));
        }

        RespValue::Array(Some(elements))
    }
}
