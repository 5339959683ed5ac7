//! Byte encoding for `send` and reply decoding for `receive`.
//!
//! Multi-byte values travel big-endian. Text goes out as its UTF-8 bytes.

use crate::error::TransportError;
use std::fmt::Write as _;

/// Values that can be written to the line.
pub trait ToWire {
    fn to_wire(&self) -> Vec<u8>;

    /// How the value appears in a `TX:` trace.
    fn trace_text(&self) -> String {
        hex(&self.to_wire())
    }
}

/// Values a `receive` reply can be decoded into.
pub trait FromWire: Sized {
    fn from_wire(bytes: Vec<u8>) -> Result<Self, TransportError>;
}

/// Upper-case hex with a space between bytes, e.g. `50 49 4E 47`.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02X}");
    }
    out
}

impl ToWire for [u8] {
    fn to_wire(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl<const N: usize> ToWire for [u8; N] {
    fn to_wire(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl ToWire for Vec<u8> {
    fn to_wire(&self) -> Vec<u8> {
        self.clone()
    }
}

impl ToWire for str {
    fn to_wire(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn trace_text(&self) -> String {
        self.to_string()
    }
}

impl ToWire for String {
    fn to_wire(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn trace_text(&self) -> String {
        self.clone()
    }
}

impl ToWire for bool {
    fn to_wire(&self) -> Vec<u8> {
        vec![u8::from(*self)]
    }

    fn trace_text(&self) -> String {
        self.to_string()
    }
}

impl<T: ToWire + ?Sized> ToWire for &T {
    fn to_wire(&self) -> Vec<u8> {
        (**self).to_wire()
    }

    fn trace_text(&self) -> String {
        (**self).trace_text()
    }
}

macro_rules! numeric_wire {
    ($($ty:ty),* $(,)?) => {$(
        impl ToWire for $ty {
            fn to_wire(&self) -> Vec<u8> {
                self.to_be_bytes().to_vec()
            }

            fn trace_text(&self) -> String {
                self.to_string()
            }
        }

        impl FromWire for $ty {
            fn from_wire(bytes: Vec<u8>) -> Result<Self, TransportError> {
                let raw: [u8; std::mem::size_of::<$ty>()] =
                    bytes.as_slice().try_into().map_err(|_| {
                        TransportError::Decode(format!(
                            "{} needs {} bytes, got {}",
                            stringify!($ty),
                            std::mem::size_of::<$ty>(),
                            bytes.len()
                        ))
                    })?;
                Ok(<$ty>::from_be_bytes(raw))
            }
        }
    )*};
}

numeric_wire!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl FromWire for Vec<u8> {
    fn from_wire(bytes: Vec<u8>) -> Result<Self, TransportError> {
        Ok(bytes)
    }
}

impl FromWire for String {
    fn from_wire(bytes: Vec<u8>) -> Result<Self, TransportError> {
        String::from_utf8(bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl FromWire for bool {
    fn from_wire(bytes: Vec<u8>) -> Result<Self, TransportError> {
        match bytes.as_slice() {
            [b] => Ok(*b != 0),
            _ => Err(TransportError::Decode(format!(
                "bool needs 1 byte, got {}",
                bytes.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_rendering() {
        assert_eq!(hex(b"PING"), "50 49 4E 47");
        assert_eq!(hex(&[0x0a]), "0A");
        assert_eq!(hex(&[]), "");
    }

    #[test]
    fn test_numbers_are_big_endian() {
        assert_eq!(0x1234u16.to_wire(), vec![0x12, 0x34]);
        assert_eq!((-2i32).to_wire(), vec![0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(u32::from_wire(vec![0, 0, 1, 0]).unwrap(), 256);
        assert_eq!(1.5f32.to_wire(), 1.5f32.to_be_bytes().to_vec());
    }

    #[test]
    fn test_trace_text() {
        assert_eq!("PING\n".trace_text(), "PING\n");
        assert_eq!(b"\x01\x02".trace_text(), "01 02");
        assert_eq!(42u8.trace_text(), "42");
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            u16::from_wire(vec![1, 2, 3]),
            Err(TransportError::Decode(_))
        ));
        assert!(matches!(
            String::from_wire(vec![0xff, 0xfe]),
            Err(TransportError::Decode(_))
        ));
        assert!(bool::from_wire(vec![2]).unwrap());
        assert_eq!(String::from_wire(b"ok".to_vec()).unwrap(), "ok");
    }
}
