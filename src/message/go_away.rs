use crate::coding::{Decode, DecodeError, Encode, EncodeError, SessionUri};
use bytes::Buf;

/// Sent by either endpoint to begin closing the session gracefully.
///
/// `last_request_id` is the highest request ID the sender will act on; the
/// peer may still receive responses for requests at or below it but must not
/// open any new ones. `new_uri`, if present, is a relay hint for where to
/// reconnect.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GoAway {
    pub last_request_id: u64,
    pub new_uri: Option<SessionUri>,
}

impl Decode for GoAway {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let last_request_id = u64::decode(r)?;
        let new_uri = if r.has_remaining() {
            Some(SessionUri::decode(r)?)
        } else {
            None
        };
        Ok(Self {
            last_request_id,
            new_uri,
        })
    }
}

impl Encode for GoAway {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.last_request_id.encode(w)?;
        if let Some(uri) = &self.new_uri {
            uri.encode(w)?;
        }
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

        let msg = GoAway {
            last_request_id: 42,
            new_uri: Some(SessionUri("moq://example.com:1234".to_string())),
        };
        msg.encode(&mut buf).unwrap();
        let decoded = GoAway::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn encode_decode_no_uri() {
        let mut buf = BytesMut::new();

        let msg = GoAway {
            last_request_id: 7,
            new_uri: None,
        };
        msg.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x07]);
        let decoded = GoAway::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
    }
}

