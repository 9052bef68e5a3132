use super::{Decode, DecodeError, Encode, EncodeError};
use bytes::{Buf, BufMut};
use std::convert::TryFrom;

/// The largest value a [VarInt] can represent (2^62 - 1).
const MAX_VARINT: u64 = (1 << 62) - 1;

/// A variable-length integer, encoded in 1, 2, 4 or 8 bytes.
///
/// The top two bits of the first byte select the encoded length, the
/// remaining bits (of all bytes) hold the value. Values are always encoded
/// in the smallest width that fits them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct VarInt(pub(crate) u64);

impl VarInt {
    pub const MAX: VarInt = VarInt(MAX_VARINT);

    /// Build a VarInt from a u32, which always fits.
    pub fn from_u32(v: u32) -> Self {
        Self(v as u64)
    }
}

impl TryFrom<u64> for VarInt {
    type Error = std::num::TryFromIntError;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        if v > MAX_VARINT {
            // Force a genuine TryFromIntError; u32 can't hold more than 2^32-1.
            return Err(u32::try_from(u64::MAX).unwrap_err());
        }
        Ok(Self(v))
    }
}

impl TryFrom<VarInt> for u32 {
    type Error = std::num::TryFromIntError;

    fn try_from(v: VarInt) -> Result<Self, Self::Error> {
        u32::try_from(v.0)
    }
}

impl From<VarInt> for u64 {
    fn from(v: VarInt) -> Self {
        v.0
    }
}

impl Decode for VarInt {
    fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Self::decode_remaining(r, 1)?;
        let first = r.chunk()[0];
        let tag = first >> 6;
        let len = 1usize << tag;
        Self::decode_remaining(r, len)?;

        let mut v = (first & 0x3f) as u64;
        r.advance(1);
        for _ in 1..len {
            v = (v << 8) | r.get_u8() as u64;
        }

        Ok(VarInt(v))
    }
}

impl Encode for VarInt {
    fn encode<W: BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let v = self.0;

        if v <= 0x3f {
            Self::encode_remaining(w, 1)?;
            w.put_u8(v as u8);
        } else if v <= 0x3fff {
            Self::encode_remaining(w, 2)?;
            w.put_u16(0x4000 | v as u16);
        } else if v <= 0x3fff_ffff {
            Self::encode_remaining(w, 4)?;
            w.put_u32(0x8000_0000 | v as u32);
        } else if v <= MAX_VARINT {
            Self::encode_remaining(w, 8)?;
            w.put_u64(0xc000_0000_0000_0000 | v);
        } else {
            return Err(EncodeError::InvalidValue);
        }

        Ok(())
    }
}

impl Decode for u64 {
    fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(VarInt::decode(r)?.0)
    }
}

impl Encode for u64 {
    fn encode<W: BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        let v = VarInt::try_from(*self).map_err(|_| EncodeError::InvalidValue)?;
        v.encode(w)
    }
}

impl Decode for usize {
    fn decode<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
        let v = u64::decode(r)?;
        usize::try_from(v).map_err(DecodeError::BoundsExceeded)
    }
}

impl Encode for usize {
    fn encode<W: BufMut>(&self, w: &mut W) -> Result<(), EncodeError> {
        (*self as u64).encode(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn encode_decode_small() {
        let mut buf = BytesMut::new();
        100u64.encode(&mut buf).unwrap();
        assert_eq!(buf.to_vec(), vec![0x40, 0x64]);
        assert_eq!(u64::decode(&mut buf).unwrap(), 100);
    }

    #[test]
    fn encode_decode_widths() {
        for v in [0u64, 0x3f, 0x40, 0x3fff, 0x4000, 0x3fff_ffff, 0x4000_0000, MAX_VARINT] {
            let mut buf = BytesMut::new();
            v.encode(&mut buf).unwrap();
            assert_eq!(u64::decode(&mut buf).unwrap(), v);
        }
    }

    #[test]
    fn decode_short() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x80]); // claims a 4-byte value, only 1 byte present
        assert!(matches!(u64::decode(&mut buf), Err(DecodeError::More(3))));
    }

    #[test]
    fn encode_too_large() {
        let mut buf = BytesMut::new();
        let too_big = VarInt(MAX_VARINT + 1);
        assert!(matches!(too_big.encode(&mut buf), Err(EncodeError::InvalidValue)));
    }
}
