//! Binary serialization used for wakeup-pipe control frames.
//!
//! Fixed-width integers and floats are little-endian; strings, slices, and
//! arrays carry a `u64` little-endian count prefix followed by the raw
//! elements; tuples concatenate their fields in order. Composites implement
//! [`Encode`]/[`Decode`] by forwarding their fields, which keeps the wire
//! format a pure function of the field sequence.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// A value that can be appended to a byte buffer in the wire format.
pub trait Encode {
    fn encode(&self, buf: &mut BytesMut);
}

/// A value that can be reconstructed from the wire format.
pub trait Decode: Sized {
    fn decode(input: &mut BinaryDeserializer<'_>) -> Result<Self>;
}

/// Thin writer over a [`BytesMut`], mirroring the deserializer.
pub struct BinarySerializer<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> BinarySerializer<'a> {
    pub fn new(buf: &'a mut BytesMut) -> BinarySerializer<'a> {
        BinarySerializer { buf }
    }

    /// Appends one value; chain calls for a heterogeneous field sequence
    /// (tuples work too, they encode as plain field concatenation).
    pub fn apply<T: Encode + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.encode(self.buf);
        self
    }
}

/// Cursor over an encoded byte slice.
pub struct BinaryDeserializer<'a> {
    input: &'a [u8],
}

impl<'a> BinaryDeserializer<'a> {
    pub fn new(input: &'a [u8]) -> BinaryDeserializer<'a> {
        BinaryDeserializer { input }
    }

    pub fn remaining(&self) -> usize {
        self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Reads one value off the front of the input.
    pub fn apply<T: Decode>(&mut self) -> Result<T> {
        T::decode(self)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.input.len() < n {
            return Err(Error::InvalidArgument(format!(
                "truncated input: need {n} bytes, have {}",
                self.input.len()
            )));
        }
        let (head, tail) = self.input.split_at(n);
        self.input = tail;
        Ok(head)
    }

    /// Reads a `u64` count prefix, guarding against counts that exceed the
    /// remaining input.
    fn take_count(&mut self) -> Result<usize> {
        let count = u64::decode(self)?;
        if count > self.input.len() as u64 {
            return Err(Error::InvalidArgument(format!(
                "count prefix {count} exceeds remaining input ({})",
                self.input.len()
            )));
        }
        Ok(count as usize)
    }
}

macro_rules! impl_scalar {
    ($ty:ty, $put:ident, $from:ident, $size:expr) => {
        impl Encode for $ty {
            fn encode(&self, buf: &mut BytesMut) {
                buf.$put(*self);
            }
        }

        impl Decode for $ty {
            fn decode(input: &mut BinaryDeserializer<'_>) -> Result<$ty> {
                let bytes = input.take($size)?;
                Ok(<$ty>::$from(bytes.try_into().unwrap()))
            }
        }
    };
}

impl_scalar!(u8, put_u8, from_le_bytes, 1);
impl_scalar!(u16, put_u16_le, from_le_bytes, 2);
impl_scalar!(u32, put_u32_le, from_le_bytes, 4);
impl_scalar!(u64, put_u64_le, from_le_bytes, 8);
impl_scalar!(i8, put_i8, from_le_bytes, 1);
impl_scalar!(i16, put_i16_le, from_le_bytes, 2);
impl_scalar!(i32, put_i32_le, from_le_bytes, 4);
impl_scalar!(i64, put_i64_le, from_le_bytes, 8);
impl_scalar!(f32, put_f32_le, from_le_bytes, 4);
impl_scalar!(f64, put_f64_le, from_le_bytes, 8);

impl Encode for str {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u64).encode(buf);
        buf.extend_from_slice(self.as_bytes());
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut BytesMut) {
        self.as_str().encode(buf);
    }
}

impl Decode for String {
    fn decode(input: &mut BinaryDeserializer<'_>) -> Result<String> {
        let len = input.take_count()?;
        let bytes = input.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::InvalidArgument(format!("invalid utf-8 string: {e}")))
    }
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, buf: &mut BytesMut) {
        (self.len() as u64).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, buf: &mut BytesMut) {
        self[..].encode(buf);
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        self[..].encode(buf);
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut BinaryDeserializer<'_>) -> Result<Vec<T>> {
        let count = input.take_count()?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(T::decode(input)?);
        }
        Ok(out)
    }
}

macro_rules! impl_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            fn encode(&self, buf: &mut BytesMut) {
                $( self.$idx.encode(buf); )+
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode(input: &mut BinaryDeserializer<'_>) -> Result<Self> {
                Ok(( $( $name::decode(input)?, )+ ))
            }
        }
    };
}

impl_tuple!(A:0);
impl_tuple!(A:0, B:1);
impl_tuple!(A:0, B:1, C:2);
impl_tuple!(A:0, B:1, C:2, D:3);
impl_tuple!(A:0, B:1, C:2, D:3, E:4);
impl_tuple!(A:0, B:1, C:2, D:3, E:4, F:5);
impl_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6);
impl_tuple!(A:0, B:1, C:2, D:3, E:4, F:5, G:6, H:7);

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<T: Encode + ?Sized>(value: &T) -> Vec<u8> {
        let mut buf = BytesMut::new();
        BinarySerializer::new(&mut buf).apply(value);
        buf.to_vec()
    }

    #[test]
    fn integers() {
        let expected: &[u8] = &[
            0x01, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x05, 0x06, 0x00, 0x07, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        let value = (1u8, 2u16, 3u32, 4u64, 5i8, 6i16, 7i32, 8i64);
        assert_eq!(encoded(&value), expected);
    }

    #[test]
    fn bytes() {
        assert_eq!(encoded(&(42u8, 69u8)), [0x2A, 0x45]);
    }

    #[test]
    fn floats() {
        let expected: &[u8] = &[
            0xd7, 0xa3, 0x70, 0x3d, 0x0a, 0x4b, 0x7a, 0x40, 0x0a, 0xd7, 0x8a, 0x42,
        ];
        assert_eq!(encoded(&(420.69f64, 69.42f32)), expected);
    }

    #[test]
    fn strings() {
        let expected: &[u8] = &[
            0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, b'H', b'e', b'l', b'l', b'o', b' ',
            b'W', b'o', b'r', b'l', b'd',
        ];
        assert_eq!(encoded("Hello World"), expected);

        let mut multi = expected.to_vec();
        multi.extend_from_slice(&[0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        multi.extend_from_slice(b"World");
        multi.extend_from_slice(&[0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
        multi.extend_from_slice(b"Hello");
        let value = (
            "Hello World".to_string(),
            "World".to_string(),
            "Hello".to_string(),
        );
        assert_eq!(encoded(&value), multi);
    }

    #[test]
    fn pair_and_tuple() {
        let expected: &[u8] = &[
            0xA4, 0x01, 0x00, 0x00, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(encoded(&(420u32, 69u64)), expected);

        let expected: &[u8] = &[
            0xA4, 0x01, 0x00, 0x00, 0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A, 0x39,
            0x05,
        ];
        assert_eq!(encoded(&(420u32, 69u64, 42u8, 1337u16)), expected);
    }

    #[test]
    fn sequences() {
        let input: [u64; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let out = encoded(&input);
        assert_eq!(out.len(), 8 + 10 * 8);
        assert_eq!(&out[..8], &[0x0A, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&out[8..16], &[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&out[16..24], &[1, 0, 0, 0, 0, 0, 0, 0]);
        // Vec encodes identically to the fixed array.
        assert_eq!(encoded(&input.to_vec()), out);
    }

    #[test]
    fn composite_forwarding() {
        struct Greeting {
            text: String,
            counter: u32,
        }

        impl Encode for Greeting {
            fn encode(&self, buf: &mut BytesMut) {
                self.text.encode(buf);
                self.counter.encode(buf);
            }
        }

        let value = Greeting {
            text: "Hello".to_string(),
            counter: 3,
        };
        let expected: &[u8] = &[
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, b'H', b'e', b'l', b'l', b'o', 0x03,
            0x00, 0x00, 0x00,
        ];
        assert_eq!(encoded(&value), expected);
    }

    #[test]
    fn decode_round_trip() {
        let value = (7u8, 1337u16, 0xDEAD_BEEFu32, u64::MAX, -5i32, -9i64);
        let bytes = encoded(&value);
        let mut input = BinaryDeserializer::new(&bytes);
        let decoded: (u8, u16, u32, u64, i32, i64) = input.apply().unwrap();
        assert_eq!(decoded, value);
        assert!(input.is_empty());

        let value = ("Hello World".to_string(), vec![1u64, 2, 3]);
        let bytes = encoded(&value);
        let mut input = BinaryDeserializer::new(&bytes);
        let decoded: (String, Vec<u64>) = input.apply().unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_rejects_truncation() {
        let bytes = encoded(&42u32);
        let mut input = BinaryDeserializer::new(&bytes[..2]);
        assert!(input.apply::<u32>().is_err());

        // Count prefix pointing past the end of input.
        let mut bogus = Vec::new();
        bogus.extend_from_slice(&u64::MAX.to_le_bytes());
        let mut input = BinaryDeserializer::new(&bogus);
        assert!(input.apply::<String>().is_err());
    }
}
