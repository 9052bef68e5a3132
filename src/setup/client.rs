use super::Versions;
use crate::coding::{Decode, DecodeError, Encode, EncodeError, KeyValuePairs};

/// Sent by the client to setup the session.
/// This CLIENT_SETUP message is used by moq-transport draft versions 11 and later.
/// Id = 0x20 vs 0x40 for versions <= 10.
#[derive(Debug)]
pub struct Client {
    /// The list of supported versions in preferred order.
    pub versions: Versions,

    /// Setup Parameters, ie: MAX_SUBSCRIBE_ID, MAX_TRACK_ALIAS, etc.
    pub params: KeyValuePairs,
}

impl Decode for Client {
    /// Decode the client setup.
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let typ = u64::decode(r)?;
        if typ != 0x20 {
            // CLIENT_SETUP message ID for draft versions 11 and later
            return Err(DecodeError::InvalidMessage(typ));
        }

        let _len = u16::decode(r)?;
        // TODO: Check the length of the message.

        let versions = Versions::decode(r)?;
        let params = KeyValuePairs::decode(r)?;

        Ok(Self { versions, params })
    }
}

impl Encode for Client {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        (0x20_u64).encode(w)?; // CLIENT_SETUP message ID for draft versions 11 and later

        // Find out the length of the message
        // by encoding it into a buffer and then encoding the length.
        // This is a bit wasteful, but it's the only way to know the length.
        let mut buf = Vec::new();

        self.versions.encode(&mut buf).unwrap();
        self.params.encode(&mut buf).unwrap();

        if buf.len() > u16::MAX as usize {
            return Err(EncodeError::MsgBoundsExceeded);
        }
        (buf.len() as u16).encode(w)?;

        Self::encode_remaining(w, buf.len())?;
        w.put_slice(&buf);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::Version;
    use bytes::BytesMut;

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();
        let client = Client {
            versions: [Version::DRAFT_14].into(),
            params: KeyValuePairs::default(),
        };

        client.encode(&mut buf).unwrap();

        #[rustfmt::skip]
        assert_eq!(
            buf.to_vec(),
            vec![
                0x20, // Type
                0x00, 0x0a, // Length
                0x01, // 1 Version
                0xC0, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x0E, // Version DRAFT_14 (0xff00000E)
                0x00, // 0 params
            ]
        );

        let decoded = Client::decode(&mut buf).unwrap();
        assert_eq!(decoded.versions, client.versions);
        assert_eq!(decoded.params, client.params);
    }

    #[test]
    fn decode_wrong_type() {
        let data: Vec<u8> = vec![0x40, 0x00, 0x00];
        let mut buf = bytes::Bytes::from(data);
        let decoded = Client::decode(&mut buf);
        assert!(matches!(decoded.unwrap_err(), DecodeError::InvalidMessage(0x40)));
    }
}
