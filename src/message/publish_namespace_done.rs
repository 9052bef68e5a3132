use crate::coding::{Decode, DecodeError, Encode, EncodeError, ReasonPhrase, TrackNamespace};

/// Sent by the publisher to terminate a PUBLISH_NAMESPACE.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishNamespaceDone {
    pub track_namespace: TrackNamespace,

    /// The status code indicating why the namespace was unpublished.
    pub status_code: u64,

    /// Provides the reason for the termination.
    pub reason: ReasonPhrase,
}

impl Decode for PublishNamespaceDone {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let track_namespace = TrackNamespace::decode(r)?;
        let status_code = u64::decode(r)?;
        let reason = ReasonPhrase::decode(r)?;

        Ok(Self {
            track_namespace,
            status_code,
            reason,
        })
    }
}

impl Encode for PublishNamespaceDone {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.track_namespace.encode(w)?;
        self.status_code.encode(w)?;
        self.reason.encode(w)?;

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

        let msg = PublishNamespaceDone {
            track_namespace: TrackNamespace::from_utf8_path("test/path/to/resource"),
            status_code: 0x0,
            reason: ReasonPhrase("ended".to_string()),
        };
        msg.encode(&mut buf).unwrap();
        let decoded = PublishNamespaceDone::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}
