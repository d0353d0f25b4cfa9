use bytes::{Buf, Bytes, BytesMut};
use std::{fmt::Display, io, str};
use tokio_util::codec::{Decoder, Encoder};

use super::{
    error::{CommandError, Resp3Error},
    resp3::{decode_resp3, encode_resp3, RESP3Value},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping(Option<Bytes>),
    Set {
        key: Bytes,
        value: Bytes,
        options: SetOptions,
    },
    Get(Bytes),
    Del(Vec<Bytes>),
    Sleep(u64),
    DbSize,
}

/// Conditional execution modifier of a SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Only set the key if it does not already exist.
    Nx,
    /// Only set the key if it already exists.
    Xx,
}

/// Expiry modifier of a SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Seconds from now.
    Ex(u64),
    /// Milliseconds from now.
    Px(u64),
    /// Absolute unix time in seconds.
    ExAt(u64),
    /// Absolute unix time in milliseconds.
    PxAt(u64),
    /// Retain the expiry of the entry being replaced.
    KeepTtl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    pub condition: Option<Condition>,
    pub expiry: Option<Expiry>,
}

impl SetOptions {
    pub fn nx() -> Self {
        SetOptions {
            condition: Some(Condition::Nx),
            ..Default::default()
        }
    }

    pub fn xx() -> Self {
        SetOptions {
            condition: Some(Condition::Xx),
            ..Default::default()
        }
    }

    pub fn with_expiry(self, expiry: Expiry) -> Self {
        SetOptions {
            expiry: Some(expiry),
            ..self
        }
    }

    fn to_args(self) -> Vec<Vec<u8>> {
        let mut args = Vec::new();

        match self.condition {
            Some(Condition::Nx) => args.push(b"NX".to_vec()),
            Some(Condition::Xx) => args.push(b"XX".to_vec()),
            None => {}
        }

        match self.expiry {
            Some(Expiry::Ex(s)) => args.extend([b"EX".to_vec(), s.to_string().into_bytes()]),
            Some(Expiry::Px(ms)) => args.extend([b"PX".to_vec(), ms.to_string().into_bytes()]),
            Some(Expiry::ExAt(s)) => args.extend([b"EXAT".to_vec(), s.to_string().into_bytes()]),
            Some(Expiry::PxAt(ms)) => {
                args.extend([b"PXAT".to_vec(), ms.to_string().into_bytes()])
            }
            Some(Expiry::KeepTtl) => args.push(b"KEEPTTL".to_vec()),
            None => {}
        }

        args
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Ping(None) => write!(f, "PING"),
            Request::Ping(Some(message)) => write!(f, "PING {}", message.escape_ascii()),
            Request::Set {
                key,
                value,
                options,
            } => {
                write!(f, "SET {} {}", key.escape_ascii(), value.escape_ascii())?;
                for arg in options.to_args() {
                    write!(f, " {}", arg.escape_ascii())?;
                }
                Ok(())
            }
            Request::Get(key) => write!(f, "GET {}", key.escape_ascii()),
            Request::Del(keys) => {
                write!(f, "DEL")?;
                for key in keys {
                    write!(f, " {}", key.escape_ascii())?;
                }
                Ok(())
            }
            Request::Sleep(seconds) => write!(f, "SLEEP {}", seconds),
            Request::DbSize => write!(f, "DBSIZE"),
        }
    }
}

pub struct RESP3Codec;

impl Encoder<RESP3Value> for RESP3Codec {
    type Error = io::Error;

    fn encode(&mut self, item: RESP3Value, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_resp3(&item, dst);
        Ok(())
    }
}

impl Decoder for RESP3Codec {
    type Item = RESP3Value;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let (resp3, consumed) = match decode_resp3(src) {
            Ok((resp3, rest)) => (resp3, src.len() - rest.len()),
            Err(Resp3Error::Incomplete) => return Ok(None),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };

        src.advance(consumed);
        Ok(Some(resp3))
    }
}

fn bulk(data: impl Into<Vec<u8>>) -> RESP3Value {
    RESP3Value::BulkString(data.into())
}

pub fn encode_request(request: &Request) -> RESP3Value {
    let args = match request {
        Request::Ping(None) => vec![bulk("PING")],
        Request::Ping(Some(message)) => vec![bulk("PING"), bulk(message.to_vec())],
        Request::Set {
            key,
            value,
            options,
        } => [bulk("SET"), bulk(key.to_vec()), bulk(value.to_vec())]
            .into_iter()
            .chain(options.to_args().into_iter().map(bulk))
            .collect(),
        Request::Get(key) => vec![bulk("GET"), bulk(key.to_vec())],
        Request::Del(keys) => std::iter::once(bulk("DEL"))
            .chain(keys.iter().map(|key| bulk(key.to_vec())))
            .collect(),
        Request::Sleep(seconds) => vec![bulk("SLEEP"), bulk(seconds.to_string())],
        Request::DbSize => vec![bulk("DBSIZE")],
    };

    RESP3Value::Array(args)
}

/// Validate a request frame and turn it into a [`Request`].
///
/// Commands and options are matched case-insensitively. Every argument
/// problem is reported as a [`CommandError`] before anything is executed.
pub fn decode_request(data: RESP3Value) -> Result<Request, CommandError> {
    let args = match data {
        RESP3Value::Array(values) if !values.is_empty() => values
            .into_iter()
            .map(|value| match value {
                RESP3Value::BulkString(data) => Ok(Bytes::from(data)),
                RESP3Value::SimpleString(s) => Ok(Bytes::from(s)),
                _ => Err(CommandError::InvalidRequest),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(CommandError::InvalidRequest),
    };

    let command = args[0].to_ascii_uppercase();

    match command.as_slice() {
        b"PING" => decode_ping_request(&args),
        b"SET" => decode_set_request(&args),
        b"GET" => decode_get_request(&args),
        b"DEL" => decode_del_request(&args),
        b"SLEEP" => decode_sleep_request(&args),
        b"DBSIZE" => decode_dbsize_request(&args),
        _ => Err(CommandError::UnknownCommand(
            String::from_utf8_lossy(&args[0]).into_owned(),
        )),
    }
}

fn decode_ping_request(data: &[Bytes]) -> Result<Request, CommandError> {
    match data {
        [_] => Ok(Request::Ping(None)),
        [_, message] => Ok(Request::Ping(Some(message.clone()))),
        _ => Err(CommandError::WrongArity("ping")),
    }
}

fn decode_set_request(data: &[Bytes]) -> Result<Request, CommandError> {
    let [_, key, value, options @ ..] = data else {
        return Err(CommandError::WrongArity("set"));
    };

    Ok(Request::Set {
        key: key.clone(),
        value: value.clone(),
        options: decode_set_options(options)?,
    })
}

fn decode_set_options(data: &[Bytes]) -> Result<SetOptions, CommandError> {
    let mut options = SetOptions::default();
    let mut args = data.iter();

    while let Some(arg) = args.next() {
        let flag = arg.to_ascii_uppercase();

        match flag.as_slice() {
            b"NX" => set_condition(&mut options, Condition::Nx)?,
            b"XX" => set_condition(&mut options, Condition::Xx)?,
            b"KEEPTTL" => set_expiry(&mut options, Expiry::KeepTtl)?,
            b"EX" => {
                let seconds = decode_expire_time(args.next(), 1000)?;
                set_expiry(&mut options, Expiry::Ex(seconds))?
            }
            b"PX" => {
                let millis = decode_expire_time(args.next(), 1)?;
                set_expiry(&mut options, Expiry::Px(millis))?
            }
            b"EXAT" => {
                let seconds = decode_expire_time(args.next(), 1000)?;
                set_expiry(&mut options, Expiry::ExAt(seconds))?
            }
            b"PXAT" => {
                let millis = decode_expire_time(args.next(), 1)?;
                set_expiry(&mut options, Expiry::PxAt(millis))?
            }
            _ => return Err(CommandError::Syntax),
        }
    }

    Ok(options)
}

fn set_condition(options: &mut SetOptions, condition: Condition) -> Result<(), CommandError> {
    if options.condition.is_some() {
        return Err(CommandError::Syntax);
    }
    options.condition = Some(condition);
    Ok(())
}

fn set_expiry(options: &mut SetOptions, expiry: Expiry) -> Result<(), CommandError> {
    if options.expiry.is_some() {
        return Err(CommandError::Syntax);
    }
    options.expiry = Some(expiry);
    Ok(())
}

/// Parse the numeric argument of an expiry option. The value must be positive
/// and still fit in signed milliseconds once multiplied by `unit_millis`.
fn decode_expire_time(arg: Option<&Bytes>, unit_millis: i64) -> Result<u64, CommandError> {
    let arg = arg.ok_or(CommandError::Syntax)?;
    let amount = decode_integer(arg)?;

    if amount <= 0 || amount.checked_mul(unit_millis).is_none() {
        return Err(CommandError::InvalidExpireTime("set"));
    }

    Ok(amount as u64)
}

fn decode_integer(arg: &[u8]) -> Result<i64, CommandError> {
    str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotAnInteger)
}

fn decode_get_request(data: &[Bytes]) -> Result<Request, CommandError> {
    match data {
        [_, key] => Ok(Request::Get(key.clone())),
        _ => Err(CommandError::WrongArity("get")),
    }
}

fn decode_del_request(data: &[Bytes]) -> Result<Request, CommandError> {
    if data.len() < 2 {
        return Err(CommandError::WrongArity("del"));
    }

    Ok(Request::Del(data[1..].to_vec()))
}

fn decode_sleep_request(data: &[Bytes]) -> Result<Request, CommandError> {
    let [_, seconds] = data else {
        return Err(CommandError::WrongArity("sleep"));
    };

    let seconds = decode_integer(seconds)?;
    u64::try_from(seconds)
        .map(Request::Sleep)
        .map_err(|_| CommandError::NotAnInteger)
}

fn decode_dbsize_request(data: &[Bytes]) -> Result<Request, CommandError> {
    match data {
        [_] => Ok(Request::DbSize),
        _ => Err(CommandError::WrongArity("dbsize")),
    }
}
