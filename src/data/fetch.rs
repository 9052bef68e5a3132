use crate::coding::{Decode, DecodeError, Encode, EncodeError, KeyValuePairs};
use crate::data::ObjectStatus;
use bytes::Buf;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchHeader {
    /// The fetch request Id number
    pub request_id: u64,
}

impl Decode for FetchHeader {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let request_id = u64::decode(r)?;

        Ok(Self {
            request_id,
        })
    }
}

impl Encode for FetchHeader {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.request_id.encode(w)?;

        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchObject {
    /// The group sequence number
    pub group_id: u64,

    /// The subgroup sequence number
    pub subgroup_id: u64,

    /// The object sequence number (absolute, not delta-encoded)
    pub object_id: u64,

    /// Publisher priority, where **smaller** values are sent first.
    pub publisher_priority: u8,

    pub extension_headers: KeyValuePairs,

    pub status: ObjectStatus,

    pub payload: bytes::Bytes,
}

impl Decode for FetchObject {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let group_id = u64::decode(r)?;
        let subgroup_id = u64::decode(r)?;
        let object_id = u64::decode(r)?;
        let publisher_priority = u8::decode(r)?;
        let extension_headers = KeyValuePairs::decode(r)?;
        let status = ObjectStatus::decode(r)?;
        let payload_length = usize::decode(r)?;

        Self::decode_remaining(r, payload_length)?;
        let payload = r.copy_to_bytes(payload_length);

        Ok(Self {
            group_id,
            subgroup_id,
            object_id,
            publisher_priority,
            extension_headers,
            status,
            payload,
        })
    }
}

impl Encode for FetchObject {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        self.group_id.encode(w)?;
        self.subgroup_id.encode(w)?;
        self.object_id.encode(w)?;
        self.publisher_priority.encode(w)?;
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
    fn encode_decode_fetch_header() {
        let mut buf = BytesMut::new();

        let header = FetchHeader { request_id: 10 };
        header.encode(&mut buf).unwrap();
        let decoded = FetchHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded.request_id, header.request_id);
    }

    #[test]
    fn encode_decode_fetch_object() {
        let mut buf = BytesMut::new();

        let mut kvps = KeyValuePairs::new();
        kvps.set_intvalue(5, 42);

        let object = FetchObject {
            group_id: 3,
            subgroup_id: 0,
            object_id: 12,
            publisher_priority: 10,
            extension_headers: kvps,
            status: ObjectStatus::NormalObject,
            payload: Bytes::from("fetched"),
        };
        object.encode(&mut buf).unwrap();
        let decoded = FetchObject::decode(&mut buf).unwrap();
        assert_eq!(decoded, object);
    }

    #[test]
    fn encode_decode_fetch_object_end_of_group() {
        let mut buf = BytesMut::new();

        let object = FetchObject {
            group_id: 3,
            subgroup_id: 0,
            object_id: 13,
            publisher_priority: 10,
            extension_headers: KeyValuePairs::new(),
            status: ObjectStatus::EndOfGroup,
            payload: Bytes::new(),
        };
        object.encode(&mut buf).unwrap();
        let decoded = FetchObject::decode(&mut buf).unwrap();
        assert_eq!(decoded.status, ObjectStatus::EndOfGroup);
        assert!(decoded.payload.is_empty());
    }
}
