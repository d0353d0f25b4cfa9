/// Failure to decode a RESP3 frame from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Resp3Error {
    /// The buffer ends before the frame does; more bytes are needed.
    #[error("incomplete RESP3 frame")]
    Incomplete,
    /// The buffer holds bytes that can never become a valid frame.
    #[error("invalid RESP3 frame: {0}")]
    Invalid(String),
}

impl Resp3Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Resp3Error::Invalid(message.into())
    }
}

/// A request that was framed correctly but cannot be executed.
///
/// These are reported back to the client as simple errors and never touch the
/// store. The display strings are the exact wire messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("ERR Protocol error: expected an array of bulk strings")]
    InvalidRequest,
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),
    #[error("ERR syntax error")]
    Syntax,
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(&'static str),
}
