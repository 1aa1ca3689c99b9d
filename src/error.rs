use std::io;
use thiserror::Error;

/// type alias for all operations on the whoson server that could fail with a [`WhosonError`]
pub type Result<T> = std::result::Result<T, WhosonError>;

/// The Error variants used throughout the whoson crate.
/// It wraps lower level errors from std and third party crates, plus the protocol level errors
/// that are reported back to clients as bad requests.
#[derive(Error, Debug)]
pub enum WhosonError {
    /// errors caused by socket or file IO
    #[error("{0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("{0}")]
    Serde(#[from] serde_json::Error),

    /// a request line could not be parsed, or its IP argument was not a valid IP literal
    #[error("command parse error")]
    CommandParse,

    /// the first token of a request line is not a known command
    #[error("command not found")]
    CommandNotFound,

    /// a stream request was not framed as a content line followed by a blank line
    #[error("session read error")]
    SessionRead,

    /// the id generator could not produce an id
    #[error("id generator error: {0}")]
    IdGenerator(String),

    /// the outbound replication channel has no receiver
    #[error("replication channel closed")]
    ReplicationClosed,

    /// a replication or dump RPC was answered with a non OK code
    #[error("rpc failed with code {code}: {msg}")]
    Rpc {
        /// the result code returned by the remote service
        code: i32,
        /// the message returned by the remote service
        msg: String,
    },

    /// a line protocol response could not be parsed
    #[error("response parse error: {0}")]
    Response(String),

    /// invalid configuration values
    #[error("config error: {0}")]
    Config(String),

    /// command line or address parsing errors
    #[error("{0}")]
    Parsing(String),

    /// general purpose error that contains a message
    #[error("{0}")]
    StringErr(String),
}

/// returns `true` if `err` means the peer went away or the idle deadline elapsed.
/// Such errors end a session quietly instead of being reported.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
    )
}
