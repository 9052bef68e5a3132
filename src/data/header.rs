use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::data::{FetchHeader, SubgroupHeader};
use std::fmt;

/// Discriminates the two data-stream shapes multiplexed over unidirectional QUIC streams.
/// Every stream opens with one of these type codes before any other bytes are sent.
#[repr(u64)]
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum StreamHeaderType {
    Subgroup = 0x10,
    Fetch = 0x5,
}

impl StreamHeaderType {
    pub fn is_subgroup(&self) -> bool {
        matches!(self, StreamHeaderType::Subgroup)
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, StreamHeaderType::Fetch)
    }
}

impl Encode for StreamHeaderType {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let val = *self as u64;
        log::trace!("[ENCODE] StreamHeaderType: encoding {:?} as {:#x}", self, val);
        val.encode(w)?;
        Ok(())
    }
}

impl Decode for StreamHeaderType {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let type_value = u64::decode(r)?;
        log::trace!("[DECODE] StreamHeaderType: decoded type value={:#x}", type_value);

        match type_value {
            0x10_u64 => Ok(Self::Subgroup),
            0x05_u64 => Ok(Self::Fetch),
            _ => {
                log::error!("[DECODE] StreamHeaderType: INVALID type value={:#x}", type_value);
                Err(DecodeError::InvalidHeaderType)
            }
        }
    }
}

impl fmt::Display for StreamHeaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#x})", self, *self as u64)
    }
}

/// The header written once at the start of a data stream, dispatched to either shape
/// based on [StreamHeaderType].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StreamHeader {
    pub header_type: StreamHeaderType,

    /// Present when `header_type` is [StreamHeaderType::Subgroup].
    pub subgroup_header: Option<SubgroupHeader>,

    /// Present when `header_type` is [StreamHeaderType::Fetch].
    pub fetch_header: Option<FetchHeader>,
}

impl Decode for StreamHeader {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let header_type = StreamHeaderType::decode(r)?;

        let (subgroup_header, fetch_header) = match header_type {
            StreamHeaderType::Subgroup => (Some(SubgroupHeader::decode(r)?), None),
            StreamHeaderType::Fetch => (None, Some(FetchHeader::decode(r)?)),
        };

        Ok(Self {
            header_type,
            subgroup_header,
            fetch_header,
        })
    }
}

impl Encode for StreamHeader {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.header_type.encode(w)?;

        match self.header_type {
            StreamHeaderType::Subgroup => {
                let header = self
                    .subgroup_header
                    .as_ref()
                    .ok_or_else(|| EncodeError::MissingField("SubgroupHeader".to_string()))?;
                header.encode(w)?;
            }
            StreamHeaderType::Fetch => {
                let header = self
                    .fetch_header
                    .as_ref()
                    .ok_or_else(|| EncodeError::MissingField("FetchHeader".to_string()))?;
                header.encode(w)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use bytes::BytesMut;

    #[test]
    fn encode_decode_stream_header_type() {
        let mut buf = BytesMut::new();

        let ht = StreamHeaderType::Fetch;
        ht.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x05]);
        let decoded = StreamHeaderType::decode(&mut buf).unwrap();
        assert_eq!(decoded, ht);
        assert!(ht.is_fetch());
        assert!(!ht.is_subgroup());

        let ht = StreamHeaderType::Subgroup;
        ht.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x10]);
        let decoded = StreamHeaderType::decode(&mut buf).unwrap();
        assert_eq!(decoded, ht);
        assert!(ht.is_subgroup());
        assert!(!ht.is_fetch());
    }

    #[test]
    fn decode_bad_stream_header_type() {
        let data: Vec<u8> = vec![0x00];
        let mut buf: Bytes = data.into();
        let result = StreamHeaderType::decode(&mut buf);
        assert!(matches!(result, Err(DecodeError::InvalidHeaderType)));
    }

    #[test]
    fn encode_decode_stream_header() {
        let mut buf = BytesMut::new();

        let sh = StreamHeader {
            header_type: StreamHeaderType::Fetch,
            subgroup_header: None,
            fetch_header: Some(FetchHeader { request_id: 10 }),
        };
        sh.encode(&mut buf).unwrap();
        let decoded = StreamHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded, sh);

        let sh = StreamHeader {
            header_type: StreamHeaderType::Subgroup,
            subgroup_header: Some(SubgroupHeader {
                track_alias: 10,
                group_id: 0,
                subgroup_id: 1,
                publisher_priority: 100,
            }),
            fetch_header: None,
        };
        sh.encode(&mut buf).unwrap();
        let decoded = StreamHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded, sh);
    }
}
