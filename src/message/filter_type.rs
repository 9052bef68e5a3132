use crate::coding::{Decode, DecodeError, Encode, EncodeError};

/// Filter Types
///
/// Numbered per the spec's literal assignment (`largest_object=0,
/// next_group_start=1, absolute_start=2, absolute_range=3`), not the
/// teacher's draft-14 numbering, same policy as `param_types.rs`/`kvp.rs`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterType {
    LargestObject = 0x0,
    NextGroupStart = 0x1,
    AbsoluteStart = 0x2,
    AbsoluteRange = 0x3,
}

impl Encode for FilterType {
    fn encode<W: bytes::BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let val = *self as u64;
        val.encode(w)?;
        Ok(())
    }
}

impl Decode for FilterType {
    fn decode<R: bytes::Buf>(r: &mut R) -> Result<Self, DecodeError> {
        match u64::decode(r)? {
            0x0_u64 => Ok(Self::LargestObject),
            0x1_u64 => Ok(Self::NextGroupStart),
            0x2_u64 => Ok(Self::AbsoluteStart),
            0x3_u64 => Ok(Self::AbsoluteRange),
            _ => Err(DecodeError::InvalidFilterType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use bytes::BytesMut;

    #[test]
    fn encode_decode() {
        let mut buf = BytesMut::new();

        let ft = FilterType::LargestObject;
        ft.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x00]);
        let decoded = FilterType::decode(&mut buf).unwrap();
        assert_eq!(decoded, ft);

        let ft = FilterType::NextGroupStart;
        ft.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x01]);
        let decoded = FilterType::decode(&mut buf).unwrap();
        assert_eq!(decoded, ft);

        let ft = FilterType::AbsoluteStart;
        ft.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x02]);
        let decoded = FilterType::decode(&mut buf).unwrap();
        assert_eq!(decoded, ft);

        let ft = FilterType::AbsoluteRange;
        ft.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x03]);
        let decoded = FilterType::decode(&mut buf).unwrap();
        assert_eq!(decoded, ft);
    }

    #[test]
    fn decode_bad_value() {
        let data: Vec<u8> = vec![0x04]; // Invalid filter type
        let mut buf: Bytes = data.into();
        let result = FilterType::decode(&mut buf);
        assert!(matches!(result, Err(DecodeError::InvalidFilterType)));
    }
}
