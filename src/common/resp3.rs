use std::{fmt::Display, str};

use bytes::{BufMut, BytesMut};
use itertools::Itertools;

use super::error::Resp3Error;

type Result<T> = std::result::Result<T, Resp3Error>;

/// Largest bulk string or array length a frame may declare.
pub const MAX_LENGTH: usize = 512 * 1024 * 1024;

/// Deepest array nesting a frame may use.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RESP3Value {
    SimpleString(String),
    SimpleError(String),
    Integer(i64),
    BulkString(Vec<u8>),
    Array(Vec<RESP3Value>),
    Null,
}

impl RESP3Value {
    pub fn ok() -> Self {
        RESP3Value::SimpleString("OK".to_string())
    }

    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        RESP3Value::BulkString(data.into())
    }
}

/// Renders a value the way an interactive client prints it.
impl Display for RESP3Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RESP3Value::SimpleString(s) => write!(f, "{}", s),
            RESP3Value::SimpleError(s) => write!(f, "(error) {}", s),
            RESP3Value::Integer(n) => write!(f, "(integer) {}", n),
            RESP3Value::BulkString(data) => write!(f, "\"{}\"", data.escape_ascii()),
            RESP3Value::Array(data) => {
                let values = data.iter().map(|v| v.to_string()).join(", ");
                write!(f, "[{}]", values)
            }
            RESP3Value::Null => write!(f, "(nil)"),
        }
    }
}

pub fn encode_resp3(value: &RESP3Value, dst: &mut BytesMut) {
    match value {
        RESP3Value::SimpleString(s) => put_line(dst, b'+', s.as_bytes()),
        RESP3Value::SimpleError(s) => put_line(dst, b'-', s.as_bytes()),
        RESP3Value::Integer(n) => put_line(dst, b':', n.to_string().as_bytes()),
        RESP3Value::BulkString(data) => {
            put_line(dst, b'$', data.len().to_string().as_bytes());
            dst.put_slice(data);
            dst.put_slice(b"\r\n");
        }
        RESP3Value::Array(data) => {
            put_line(dst, b'*', data.len().to_string().as_bytes());
            data.iter().for_each(|value| encode_resp3(value, dst));
        }
        RESP3Value::Null => dst.put_slice(b"_\r\n"),
    }
}

fn put_line(dst: &mut BytesMut, prefix: u8, line: &[u8]) {
    dst.reserve(line.len() + 3);
    dst.put_u8(prefix);
    dst.put_slice(line);
    dst.put_slice(b"\r\n");
}

/// Decode one frame from the front of `input`, returning it together with the
/// unconsumed remainder. Returns [`Resp3Error::Incomplete`] when `input` holds
/// only a prefix of a valid frame.
pub fn decode_resp3(input: &[u8]) -> Result<(RESP3Value, &[u8])> {
    decode_value(input, 0)
}

fn decode_value(input: &[u8], depth: usize) -> Result<(RESP3Value, &[u8])> {
    match input.first() {
        Some(b'+') => decode_simple_string(&input[1..]),
        Some(b'-') => decode_simple_error(&input[1..]),
        Some(b':') => decode_integer(&input[1..]),
        Some(b'$') => decode_bulk_string(&input[1..]),
        Some(b'*') => decode_array(&input[1..], depth),
        Some(b'_') => decode_null(&input[1..]),
        Some(other) => Err(Resp3Error::invalid(format!(
            "unexpected type byte '{}'",
            other.escape_ascii()
        ))),
        None => Err(Resp3Error::Incomplete),
    }
}

fn decode_simple_string(input: &[u8]) -> Result<(RESP3Value, &[u8])> {
    let (s, rest) = read_until_crlf(input)?;

    Ok((RESP3Value::SimpleString(s), rest))
}

fn decode_simple_error(input: &[u8]) -> Result<(RESP3Value, &[u8])> {
    let (s, rest) = read_until_crlf(input)?;

    Ok((RESP3Value::SimpleError(s), rest))
}

fn decode_integer(input: &[u8]) -> Result<(RESP3Value, &[u8])> {
    let (s, rest) = read_until_crlf(input)?;
    let n = s
        .parse::<i64>()
        .map_err(|e| Resp3Error::invalid(format!("bad integer '{}': {}", s, e)))?;

    Ok((RESP3Value::Integer(n), rest))
}

fn decode_bulk_string(input: &[u8]) -> Result<(RESP3Value, &[u8])> {
    let (len_str, rest) = read_until_crlf(input)?;
    if len_str == "-1" {
        return Ok((RESP3Value::Null, rest));
    }
    let len = parse_length(&len_str)?;
    let end = len + 2;
    if rest.len() < end {
        return Err(Resp3Error::Incomplete);
    }
    if &rest[len..end] != b"\r\n" {
        return Err(Resp3Error::invalid("bulk string is not terminated by CRLF"));
    }
    let data = rest[..len].to_vec();

    Ok((RESP3Value::BulkString(data), &rest[end..]))
}

fn decode_array(input: &[u8], depth: usize) -> Result<(RESP3Value, &[u8])> {
    let (len_str, mut rest) = read_until_crlf(input)?;
    if len_str == "-1" {
        return Ok((RESP3Value::Null, rest));
    }
    if depth >= MAX_DEPTH {
        return Err(Resp3Error::invalid("nesting too deep"));
    }
    let len = parse_length(&len_str)?;
    let mut values = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        let (value, new_rest) = decode_value(rest, depth + 1)?;
        values.push(value);
        rest = new_rest;
    }

    Ok((RESP3Value::Array(values), rest))
}

fn decode_null(input: &[u8]) -> Result<(RESP3Value, &[u8])> {
    match input.get(..2) {
        Some(b"\r\n") => Ok((RESP3Value::Null, &input[2..])),
        Some(_) => Err(Resp3Error::invalid("bad null value")),
        None => Err(Resp3Error::Incomplete),
    }
}

/// Lengths are capped at [`MAX_LENGTH`], so `len + 2` cannot overflow.
fn parse_length(len_str: &str) -> Result<usize> {
    let len = len_str
        .parse::<usize>()
        .map_err(|e| Resp3Error::invalid(format!("bad length '{}': {}", len_str, e)))?;
    if len > MAX_LENGTH {
        return Err(Resp3Error::invalid(format!("length {} exceeds {}", len, MAX_LENGTH)));
    }

    Ok(len)
}

fn read_until_crlf(input: &[u8]) -> Result<(String, &[u8])> {
    let Some((pos, _)) = input.iter().find_position(|&&b| b == b'\r') else {
        return Err(Resp3Error::Incomplete);
    };

    match input.get(pos + 1) {
        Some(b'\n') => {
            let s = str::from_utf8(&input[..pos]).map_err(|e| Resp3Error::invalid(e.to_string()))?;
            Ok((s.to_string(), &input[pos + 2..]))
        }
        Some(_) => Err(Resp3Error::invalid("LF not found after CR")),
        None => Err(Resp3Error::Incomplete),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &RESP3Value) -> Vec<u8> {
        let mut dst = BytesMut::new();
        encode_resp3(value, &mut dst);
        dst.to_vec()
    }

    #[test]
    fn test_simple_string() {
        let input = b"+OK\r\n";
        let (value, rest) = decode_resp3(input).unwrap();
        assert_eq!(value, RESP3Value::ok());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_error() {
        let input = b"-ERR syntax error\r\n";
        let (value, rest) = decode_resp3(input).unwrap();
        assert_eq!(value, RESP3Value::SimpleError("ERR syntax error".to_string()));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_integer() {
        let input = b":-1000\r\n";
        let (value, rest) = decode_resp3(input).unwrap();
        assert_eq!(value, RESP3Value::Integer(-1000));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_bulk_string() {
        let input = b"$5\r\nhello\r\n";
        let (value, rest) = decode_resp3(input).unwrap();
        assert_eq!(value, RESP3Value::bulk("hello"));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_null() {
        let (value, rest) = decode_resp3(b"_\r\n").unwrap();
        assert_eq!(value, RESP3Value::Null);
        assert!(rest.is_empty());

        let (value, rest) = decode_resp3(b"$-1\r\n:1\r\n").unwrap();
        assert_eq!(value, RESP3Value::Null);
        assert_eq!(rest, b":1\r\n");
    }

    #[test]
    fn test_array() {
        let input = b"*2\r\n$5\r\nhello\r\n:10\r\n";
        let (value, rest) = decode_resp3(input).unwrap();
        assert_eq!(
            value,
            RESP3Value::Array(vec![RESP3Value::bulk("hello"), RESP3Value::Integer(10)])
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn test_partial_frames_are_incomplete() {
        let frame = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n";
        for end in 0..frame.len() {
            assert_eq!(
                decode_resp3(&frame[..end]).unwrap_err(),
                Resp3Error::Incomplete,
                "prefix of length {end}"
            );
        }
        assert!(decode_resp3(frame).is_ok());
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(
            decode_resp3(b"?what\r\n"),
            Err(Resp3Error::Invalid(_))
        ));
        assert!(matches!(
            decode_resp3(b"$3\r\nabcde\r\n"),
            Err(Resp3Error::Invalid(_))
        ));
        assert!(matches!(decode_resp3(b":12x\r\n"), Err(Resp3Error::Invalid(_))));
    }

    #[test]
    fn test_deep_nesting_is_invalid() {
        let input = b"*1\r\n".repeat(200_000);
        assert_eq!(
            decode_resp3(&input).unwrap_err(),
            Resp3Error::invalid("nesting too deep")
        );

        let mut nested = b"*1\r\n".repeat(MAX_DEPTH);
        nested.extend_from_slice(b":1\r\n");
        assert!(decode_resp3(&nested).is_ok());
    }

    #[test]
    fn test_oversized_lengths_are_invalid() {
        assert!(matches!(
            decode_resp3(b"$18446744073709551615\r\nabc\r\n"),
            Err(Resp3Error::Invalid(_))
        ));
        assert!(matches!(
            decode_resp3(b"$536870913\r\nabc"),
            Err(Resp3Error::Invalid(_))
        ));
        assert!(matches!(
            decode_resp3(b"*536870913\r\n"),
            Err(Resp3Error::Invalid(_))
        ));
        assert_eq!(
            decode_resp3(b"$536870912\r\nabc").unwrap_err(),
            Resp3Error::Incomplete
        );
    }

    #[test]
    fn test_encode_binary_bulk_string() {
        let value = RESP3Value::BulkString(vec![0xff, b'\r', b'\n', 0x00]);
        assert_eq!(encode(&value), b"$4\r\n\xff\r\n\x00\r\n");

        let encoded = encode(&value);
        let (decoded, rest) = decode_resp3(&encoded).unwrap();
        assert_eq!(decoded, value);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_display_matches_client_rendering() {
        assert_eq!(RESP3Value::ok().to_string(), "OK");
        assert_eq!(RESP3Value::Null.to_string(), "(nil)");
        assert_eq!(RESP3Value::Integer(1).to_string(), "(integer) 1");
        assert_eq!(RESP3Value::bulk("v").to_string(), "\"v\"");
        assert_eq!(
            RESP3Value::SimpleError("ERR syntax error".to_string()).to_string(),
            "(error) ERR syntax error"
        );
    }
}
