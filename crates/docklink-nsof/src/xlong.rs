//! Variable-length unsigned integers.
//!
//! Every length, count and id field in NSOF is an xlong: values `0..=254`
//! occupy one byte; anything larger is the marker byte `0xFF` followed by a
//! 4-byte big-endian word.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{NsofError, Result};

/// Marker byte introducing the 5-byte form.
const LONG_FORM: u8 = 0xFF;

/// Append an xlong to `dst`.
pub fn put_xlong(dst: &mut BytesMut, value: u32) {
    if value < u32::from(LONG_FORM) {
        dst.put_u8(value as u8);
    } else {
        dst.put_u8(LONG_FORM);
        dst.put_u32(value);
    }
}

/// Consume one xlong from `src`.
pub fn take_xlong(src: &mut Bytes) -> Result<u32> {
    if !src.has_remaining() {
        return Err(NsofError::UnexpectedEof);
    }
    let first = src.get_u8();
    if first < LONG_FORM {
        return Ok(u32::from(first));
    }
    if src.remaining() < 4 {
        return Err(NsofError::UnexpectedEof);
    }
    Ok(src.get_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: u32) -> u32 {
        let mut buf = BytesMut::new();
        put_xlong(&mut buf, value);
        let mut bytes = buf.freeze();
        take_xlong(&mut bytes).unwrap()
    }

    #[test]
    fn short_form_is_one_byte() {
        for value in [0u32, 1, 17, 254] {
            let mut buf = BytesMut::new();
            put_xlong(&mut buf, value);
            assert_eq!(buf.len(), 1);
            assert_eq!(roundtrip(value), value);
        }
    }

    #[test]
    fn long_form_is_five_bytes_with_marker() {
        for value in [255u32, 256, 0xDEAD, i32::MAX as u32] {
            let mut buf = BytesMut::new();
            put_xlong(&mut buf, value);
            assert_eq!(buf.len(), 5);
            assert_eq!(buf[0], 0xFF);
            assert_eq!(roundtrip(value), value);
        }
    }

    #[test]
    fn boundary_values() {
        let mut buf = BytesMut::new();
        put_xlong(&mut buf, 254);
        put_xlong(&mut buf, 255);
        assert_eq!(buf.len(), 1 + 5);
    }

    #[test]
    fn empty_input_is_eof() {
        let mut bytes = Bytes::new();
        assert!(matches!(
            take_xlong(&mut bytes),
            Err(NsofError::UnexpectedEof)
        ));
    }

    #[test]
    fn truncated_long_form_is_eof() {
        let mut bytes = Bytes::from_static(&[0xFF, 0x00, 0x01]);
        assert!(matches!(
            take_xlong(&mut bytes),
            Err(NsofError::UnexpectedEof)
        ));
    }
}
