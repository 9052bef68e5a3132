use thiserror::Error;

/// Encode a type to a buffer.
pub trait Encode: Sized {
    /// Encode this value to the given writer.
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError>;

    /// Make sure at least `size` bytes of capacity remain in `w`, returning
    /// [EncodeError::More] with the shortfall otherwise.
    fn encode_remaining<W: bytes::BufMut>(w: &W, size: usize) -> Result<(), EncodeError> {
        let remaining = w.remaining_mut();
        if remaining < size {
            return Err(EncodeError::More(size - remaining));
        }
        Ok(())
    }
}

/// An error that occurs when encoding a message.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("field bounds exceeded: {0}")]
    FieldBoundsExceeded(String),

    #[error("invalid value")]
    InvalidValue,

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("not enough space, need {0} more")]
    More(usize),

    #[error("message bounds exceeded")]
    MsgBoundsExceeded,
}
