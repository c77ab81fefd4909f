use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while framing or unframing a message on the wire.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown frame version: {0}")]
    UnknownVersion(u8),

    #[error("frame body ({0} bytes) is greater than the maximum allowed size ({1} bytes)")]
    BodyTooLarge(u32, u32),

    #[error("received a compressed frame but no compressor is configured")]
    MissingCompressor,

    #[error("failed to compress frame body")]
    CompressFailure(#[source] anyhow::Error),

    #[error("failed to decompress frame body")]
    DecompressFailure(#[source] anyhow::Error),

    #[error("failed to encode message payload")]
    EncodeFailure(#[source] anyhow::Error),

    #[error("failed to decode message payload")]
    DecodeFailure(#[source] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the underlying byte-stream transport (connect, bind, accept).
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to connect to {0}:{1}")]
    ConnectFailed(String, u16, #[source] std::io::Error),

    #[error("connect to {0}:{1} timed out")]
    ConnectTimeout(String, u16),

    #[error("failed to bind listener on {0}:{1}")]
    BindFailed(std::net::IpAddr, u16, #[source] std::io::Error),

    #[error("failed to accept incoming connection")]
    AcceptFailed(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The unified error type returned across the public API.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `send_message` was called on an already-closed connection, or the
    /// connection closed while the request was still sitting in the queue.
    #[error("request was not sent: {0}")]
    RequestNotSent(&'static str),

    /// A request was in flight on a channel when the connection closed.
    #[error("connection closed while request was in flight")]
    ConnectionClosed,

    /// The per-request timer fired before a response arrived.
    #[error("request timed out before a response was received")]
    Timeout,

    /// The supervisor had no live connection to route the request to.
    #[error("no connection available to route the request")]
    NoConnection,

    /// A user-provided request handler returned an error.
    #[error("request handler failed: {0}")]
    RequestHandlerFailure(String),

    /// `max_channels` exceeded the protocol's hard ceiling of 2^15.
    #[error("max_channels ({0}) exceeds the maximum of {1}")]
    TooManyChannels(usize, usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
