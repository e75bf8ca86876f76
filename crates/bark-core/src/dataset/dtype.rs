//! Element types of sampled payloads.
//!
//! Payload samples are stored little-endian. [`Dtype`] is the tag recorded
//! in the sidecar; [`Sample`] is the sealed set of Rust types that can be
//! read from or written to a mapped payload.

use std::{fmt, str::FromStr};

use crate::dataset::error::DatasetError;

/// Element type tag of a sampled payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// IEEE 754 single precision.
    Float32,
    /// IEEE 754 double precision.
    Float64,
}

impl Dtype {
    /// Canonical tag persisted under `dtype`.
    pub const fn tag(self) -> &'static str {
        match self {
            Dtype::Int8 => "int8",
            Dtype::Int16 => "int16",
            Dtype::Int32 => "int32",
            Dtype::Int64 => "int64",
            Dtype::UInt8 => "uint8",
            Dtype::UInt16 => "uint16",
            Dtype::UInt32 => "uint32",
            Dtype::UInt64 => "uint64",
            Dtype::Float32 => "float32",
            Dtype::Float64 => "float64",
        }
    }

    /// Size of one element in bytes.
    pub const fn itemsize(self) -> usize {
        match self {
            Dtype::Int8 | Dtype::UInt8 => 1,
            Dtype::Int16 | Dtype::UInt16 => 2,
            Dtype::Int32 | Dtype::UInt32 | Dtype::Float32 => 4,
            Dtype::Int64 | Dtype::UInt64 | Dtype::Float64 => 8,
        }
    }

    fn from_descr(kind: char, size: usize) -> Option<Self> {
        Some(match (kind, size) {
            ('i', 1) => Dtype::Int8,
            ('i', 2) => Dtype::Int16,
            ('i', 4) => Dtype::Int32,
            ('i', 8) => Dtype::Int64,
            ('u', 1) => Dtype::UInt8,
            ('u', 2) => Dtype::UInt16,
            ('u', 4) => Dtype::UInt32,
            ('u', 8) => Dtype::UInt64,
            ('f', 4) => Dtype::Float32,
            ('f', 8) => Dtype::Float64,
            _ => return None,
        })
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Dtype {
    type Err = DatasetError;

    /// Accepts canonical tags (`int16`) and little-endian or
    /// byte-order-neutral NumPy descriptors (`<i2`, `=f8`, `|u1`, `i2`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || DatasetError::UnknownDtype { tag: s.to_string() };

        let tag = s.trim();
        if let Some(dt) = ALL_DTYPES.iter().find(|d| d.tag() == tag) {
            return Ok(*dt);
        }

        let descr = tag
            .strip_prefix(['<', '=', '|'])
            .unwrap_or(tag);
        let mut chars = descr.chars();
        let kind = chars.next().ok_or_else(unknown)?;
        let size: usize = chars.as_str().parse().map_err(|_| unknown())?;
        Dtype::from_descr(kind, size).ok_or_else(unknown)
    }
}

const ALL_DTYPES: [Dtype; 10] = [
    Dtype::Int8,
    Dtype::Int16,
    Dtype::Int32,
    Dtype::Int64,
    Dtype::UInt8,
    Dtype::UInt16,
    Dtype::UInt32,
    Dtype::UInt64,
    Dtype::Float32,
    Dtype::Float64,
];

mod private {
    pub trait Sealed {}
}

/// Rust element types that map onto a [`Dtype`].
pub trait Sample: private::Sealed + Copy + PartialEq + fmt::Debug + 'static {
    /// The tag of this element type.
    const DTYPE: Dtype;

    /// Decode one element from exactly `DTYPE.itemsize()` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode one element into exactly `DTYPE.itemsize()` bytes.
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_sample {
    ($($ty:ty => $dtype:ident),+ $(,)?) => {
        $(
            impl private::Sealed for $ty {}

            impl Sample for $ty {
                const DTYPE: Dtype = Dtype::$dtype;

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }

                fn write_le(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }
            }
        )+
    };
}

impl_sample! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for dt in ALL_DTYPES {
            assert_eq!(dt.tag().parse::<Dtype>().unwrap(), dt);
        }
    }

    #[test]
    fn numpy_descriptors_parse() {
        assert_eq!("<i2".parse::<Dtype>().unwrap(), Dtype::Int16);
        assert_eq!("i2".parse::<Dtype>().unwrap(), Dtype::Int16);
        assert_eq!("=f8".parse::<Dtype>().unwrap(), Dtype::Float64);
        assert_eq!("|u1".parse::<Dtype>().unwrap(), Dtype::UInt8);
        assert_eq!("<f4".parse::<Dtype>().unwrap(), Dtype::Float32);
    }

    #[test]
    fn big_endian_and_garbage_are_rejected() {
        for tag in [">i2", "i3", "complex64", "", "int"] {
            assert!(
                matches!(tag.parse::<Dtype>(), Err(DatasetError::UnknownDtype { .. })),
                "{tag} should not parse"
            );
        }
    }

    #[test]
    fn sample_encoding_is_little_endian() {
        let mut buf = [0u8; 2];
        0x0102i16.write_le(&mut buf);
        assert_eq!(buf, [0x02, 0x01]);
        assert_eq!(i16::read_le(&buf), 0x0102);

        let mut buf = [0u8; 8];
        (-1.5f64).write_le(&mut buf);
        assert_eq!(f64::read_le(&buf), -1.5);
        assert_eq!(<f64 as Sample>::DTYPE.itemsize(), 8);
    }
}
