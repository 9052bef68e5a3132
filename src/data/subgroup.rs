use crate::coding::{Decode, DecodeError, Encode, EncodeError, KeyValuePairs};
use crate::data::ObjectStatus;
use bytes::Buf;

/// Header written once at the start of a unidirectional data stream carrying a subgroup.
/// The stream type code (0x10) is handled by [crate::data::StreamHeaderType] and is not
/// part of this structure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubgroupHeader {
    /// The track alias.
    pub track_alias: u64,

    /// The group sequence number.
    pub group_id: u64,

    /// The subgroup sequence number.
    pub subgroup_id: u64,

    /// Publisher priority, where **smaller** values are sent first.
    pub publisher_priority: u8,
}

impl Decode for SubgroupHeader {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let track_alias = u64::decode(r)?;
        let group_id = u64::decode(r)?;
        let subgroup_id = u64::decode(r)?;
        let publisher_priority = u8::decode(r)?;

        Ok(Self {
            track_alias,
            group_id,
            subgroup_id,
            publisher_priority,
        })
    }
}

impl Encode for SubgroupHeader {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.track_alias.encode(w)?;
        self.group_id.encode(w)?;
        self.subgroup_id.encode(w)?;
        self.publisher_priority.encode(w)?;

        Ok(())
    }
}

/// A single object record within a subgroup stream.
///
/// `object_id` is the absolute sequence number within the group (not a delta), extension
/// headers are always present on the wire (an empty list encodes as a zero count), and the
/// payload is carried inline rather than on a side channel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubgroupObject {
    pub object_id: u64,
    pub extension_headers: KeyValuePairs,
    pub status: ObjectStatus,
    pub payload: bytes::Bytes,
}

impl Decode for SubgroupObject {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let object_id = u64::decode(r)?;
        let extension_headers = KeyValuePairs::decode(r)?;
        let status = ObjectStatus::decode(r)?;
        let payload_length = usize::decode(r)?;

        Self::decode_remaining(r, payload_length)?;
        let payload = r.copy_to_bytes(payload_length);

        Ok(Self {
            object_id,
            extension_headers,
            status,
            payload,
        })
    }
}

impl Encode for SubgroupObject {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.object_id.encode(w)?;
        self.extension_headers.encode(w)?;
        self.status.encode(w)?;

        Self::encode_remaining(w, self.payload.len())?;
        w.put_slice(&self.payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};

    #[test]
    fn encode_decode_subgroup_header() {
        let mut buf = BytesMut::new();

        let header = SubgroupHeader {
            track_alias: 7,
            group_id: 3,
            subgroup_id: 1,
            publisher_priority: 50,
        };
        header.encode(&mut buf).unwrap();
        let decoded = SubgroupHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn encode_decode_subgroup_object_with_payload() {
        let mut buf = BytesMut::new();

        let object = SubgroupObject {
            object_id: 1,
            extension_headers: KeyValuePairs::new(),
            status: ObjectStatus::NormalObject,
            payload: Bytes::from("hello world"),
        };
        object.encode(&mut buf).unwrap();
        let decoded = SubgroupObject::decode(&mut buf).unwrap();
        assert_eq!(decoded, object);
    }

    #[test]
    fn encode_decode_subgroup_object_status_only() {
        let mut buf = BytesMut::new();

        let object = SubgroupObject {
            object_id: 2,
            extension_headers: KeyValuePairs::new(),
            status: ObjectStatus::EndOfGroup,
            payload: Bytes::new(),
        };
        object.encode(&mut buf).unwrap();
        let decoded = SubgroupObject::decode(&mut buf).unwrap();
        assert_eq!(decoded.status, ObjectStatus::EndOfGroup);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn encode_decode_subgroup_object_with_extensions() {
        let mut buf = BytesMut::new();

        let mut kvps = KeyValuePairs::new();
        kvps.set_intvalue(0x3C, 5);

        let object = SubgroupObject {
            object_id: 4,
            extension_headers: kvps,
            status: ObjectStatus::NormalObject,
            payload: Bytes::from("payload"),
        };
        object.encode(&mut buf).unwrap();
        let decoded = SubgroupObject::decode(&mut buf).unwrap();
        assert_eq!(decoded.object_id, 4);
        assert!(decoded.extension_headers.has(0x3C));
        assert_eq!(decoded.payload, Bytes::from("payload"));
    }

    #[test]
    fn ids_within_a_group_must_be_increasing() {
        // Not enforced by this wire codec -- SubgroupObject::decode accepts any object_id.
        // Ordering is enforced one layer up, by the session subgroup-stream reader.
        let a = SubgroupObject {
            object_id: 5,
            extension_headers: KeyValuePairs::new(),
            status: ObjectStatus::NormalObject,
            payload: Bytes::new(),
        };
        let b = SubgroupObject {
            object_id: 4,
            extension_headers: KeyValuePairs::new(),
            status: ObjectStatus::NormalObject,
            payload: Bytes::new(),
        };
        assert!(a.object_id > b.object_id);
    }
}
