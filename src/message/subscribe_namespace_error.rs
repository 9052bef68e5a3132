use crate::coding::{Decode, DecodeError, Encode, EncodeError, ReasonPhrase};

/// Sent by the publisher to reject a SUBSCRIBE_NAMESPACE.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubscribeNamespaceError {
    /// The request ID of the SUBSCRIBE_NAMESPACE this message is replying to.
    pub id: u64,

    /// An error code.
    pub error_code: u64,

    /// An optional, human-readable reason.
    pub reason_phrase: ReasonPhrase,
}

impl Decode for SubscribeNamespaceError {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let id = u64::decode(r)?;
        let error_code = u64::decode(r)?;
        let reason_phrase = ReasonPhrase::decode(r)?;

        Ok(Self {
            id,
            error_code,
            reason_phrase,
        })
    }
}

impl Encode for SubscribeNamespaceError {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.id.encode(w)?;
        self.error_code.encode(w)?;
        self.reason_phrase.encode(w)?;

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

        let msg = SubscribeNamespaceError {
            id: 42,
            error_code: 0x01,
            reason_phrase: ReasonPhrase("namespace not found".to_string()),
        };
        msg.encode(&mut buf).unwrap();
        let decoded = SubscribeNamespaceError::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
