//! Error types shared by the decoder and the HTTP client.

use crate::frame::FramingError;
use crate::wire::PayloadType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Set of errors that can occur while decoding a sample stream or talking
/// to an appliance.
///
/// Stream errors (framing, header, sample, type change) are fatal for the
/// stream that produced them: the decoder makes no attempt to resynchronize
/// and should be discarded.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Escape or terminator violation in the framed byte stream.
    #[error("malformed framing: {0}")]
    MalformedFraming(#[from] FramingError),

    /// A frame that had to be a segment header failed to parse as one.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A frame failed to parse as a sample of the active segment's type,
    /// and is not a header either.
    #[error("malformed {ptype:?} sample: {source}")]
    MalformedSample {
        ptype: PayloadType,
        source: prost::DecodeError,
    },

    /// The stream switched to an incompatible shape mid-flight.
    #[error("type change mid-stream: expected {expected}, got {got}")]
    TypeChange { expected: String, got: String },

    /// The server answered with an error status.
    #[error("HTTP error {status} from {url}")]
    Http { status: u16, url: String },

    /// The request never completed (connect failure, broken body, ...).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A deadline given to an operation expired.
    #[error("operation timed out after {0}s")]
    TimedOut(f64),

    /// Bad or missing configuration, including appliance info replies
    /// without the required URLs.
    #[error("configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
