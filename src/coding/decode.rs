use std::num::TryFromIntError;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Decode a type from a buffer.
pub trait Decode: Sized {
    /// Decode a value from the given reader.
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError>;

    /// Make sure at least `size` bytes are available in `r`, returning
    /// [DecodeError::More] with the shortfall otherwise.
    fn decode_remaining<R: bytes::Buf>(r: &R, size: usize) -> Result<(), DecodeError> {
        let remaining = r.remaining();
        if remaining < size {
            return Err(DecodeError::More(size - remaining));
        }
        Ok(())
    }
}

/// An error that occurs when decoding a message.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("not enough bytes, need {0} more")]
    More(usize),

    #[error("invalid value")]
    InvalidValue,

    #[error("invalid message type: {0}")]
    InvalidMessage(u64),

    #[error("invalid parameter")]
    InvalidParameter,

    #[error("missing parameter")]
    MissingParameter,

    #[error("duplicate parameter: {0}")]
    DuplicateParameter(u64),

    #[error("field bounds exceeded: {0}")]
    FieldBoundsExceeded(String),

    #[error("key/value pair length exceeded")]
    KeyValuePairLengthExceeded(),

    #[error("invalid stream header type")]
    InvalidHeaderType,

    #[error("invalid object status")]
    InvalidObjectStatus,

    #[error("invalid datagram type")]
    InvalidDatagramType,

    #[error("invalid fetch type")]
    InvalidFetchType,

    #[error("invalid filter type")]
    InvalidFilterType,

    #[error("invalid group order")]
    InvalidGroupOrder,

    #[error("bounds exceeded")]
    BoundsExceeded(#[from] TryFromIntError),

    #[error("invalid utf-8 string")]
    InvalidString(#[from] FromUtf8Error),
}
