use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Unsubscribe Namespace
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnsubscribeNamespace {
    /// The request ID of the original SUBSCRIBE_NAMESPACE.
    pub id: u64,
}

impl Decode for UnsubscribeNamespace {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let id = u64::decode(r)?;
        Ok(Self { id })
    }
}

impl Encode for UnsubscribeNamespace {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.id.encode(w)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();

        let msg = UnsubscribeNamespace { id: 42 };
        msg.encode(&mut buf).unwrap();
        let decoded = UnsubscribeNamespace::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
