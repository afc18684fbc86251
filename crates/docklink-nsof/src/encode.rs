use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{NsofError, Result};
use crate::tags;
use crate::value::{Symbol, Value};
use crate::xlong::put_xlong;

/// Encode a complete NSOF stream: one version byte, then the object tree.
///
/// The encoder writes every occurrence of a shared child in full — only the
/// decoder keeps a back-reference table.
pub fn encode(value: &Value, dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(tags::VERSION);
    encode_object(value, dst)
}

/// Convenience wrapper over [`encode`] returning a frozen buffer.
pub fn encode_to_bytes(value: &Value) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode(value, &mut dst)?;
    Ok(dst.freeze())
}

fn encode_object(value: &Value, dst: &mut BytesMut) -> Result<()> {
    match value {
        Value::Nil => dst.put_u8(tags::NIL),
        Value::True => {
            dst.put_u8(tags::IMMEDIATE);
            put_xlong(dst, tags::REF_TRUE);
        }
        Value::SmallInt(n) => {
            dst.put_u8(tags::IMMEDIATE);
            put_xlong(dst, (*n as u32) << 2);
        }
        Value::Character(c) => {
            dst.put_u8(tags::IMMEDIATE);
            put_xlong(dst, (u32::from(*c) << 4) | 0x6);
        }
        Value::MagicPointer(m) => {
            dst.put_u8(tags::IMMEDIATE);
            put_xlong(dst, (m << 2) | 0x3);
        }
        Value::Binary { class, data } => {
            dst.put_u8(tags::BINARY);
            put_xlong(dst, data.len() as u32);
            encode_symbol(class, dst)?;
            dst.put_slice(data);
        }
        Value::LargeBinary { class, data } => {
            dst.put_u8(tags::LARGE_BINARY);
            put_xlong(dst, data.len() as u32);
            encode_symbol(class, dst)?;
            dst.put_slice(data);
        }
        Value::Array { class, items } => {
            dst.put_u8(tags::ARRAY);
            put_xlong(dst, items.len() as u32);
            encode_symbol(class, dst)?;
            for item in items {
                encode_object(item, dst)?;
            }
        }
        Value::PlainArray(items) => {
            dst.put_u8(tags::PLAIN_ARRAY);
            put_xlong(dst, items.len() as u32);
            for item in items {
                encode_object(item, dst)?;
            }
        }
        Value::Frame(slots) => {
            dst.put_u8(tags::FRAME);
            put_xlong(dst, slots.len() as u32);
            // Keys first, then one value per slot, both in sorted key order.
            for slot in slots.keys() {
                encode_symbol(slot, dst)?;
            }
            for value in slots.values() {
                encode_object(value, dst)?;
            }
        }
        Value::String(s) => {
            dst.put_u8(tags::STRING);
            let units: Vec<u16> = s.encode_utf16().collect();
            put_xlong(dst, (units.len() as u32 + 1) * 2);
            for unit in units {
                dst.put_u16(unit);
            }
            dst.put_u16(0);
        }
        Value::Symbol(sym) => encode_symbol(sym, dst)?,
    }
    Ok(())
}

fn encode_symbol(sym: &Symbol, dst: &mut BytesMut) -> Result<()> {
    dst.put_u8(tags::SYMBOL);
    put_xlong(dst, sym.as_str().chars().count() as u32);
    for c in sym.as_str().chars() {
        let code = u32::from(c);
        if code > 0xFF {
            return Err(NsofError::InvalidSymbol(c));
        }
        dst.put_u8(code as u8);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_from_slice;

    #[test]
    fn small_int_packs_shifted_ref() {
        let wire = encode_to_bytes(&Value::int(5)).unwrap();
        assert_eq!(wire.as_ref(), &[tags::VERSION, tags::IMMEDIATE, 20]);
    }

    #[test]
    fn character_packs_marked_ref() {
        let wire = encode_to_bytes(&Value::Character('A')).unwrap();
        // (65 << 4) | 0x6 = 0x416 needs the 5-byte xlong form.
        assert_eq!(
            wire.as_ref(),
            &[tags::VERSION, tags::IMMEDIATE, 0xFF, 0x00, 0x00, 0x04, 0x16]
        );
    }

    #[test]
    fn true_packs_fixed_ref() {
        let wire = encode_to_bytes(&Value::True).unwrap();
        assert_eq!(wire.as_ref(), &[tags::VERSION, tags::IMMEDIATE, 0x1A]);
    }

    #[test]
    fn nil_is_bare_tag() {
        let wire = encode_to_bytes(&Value::Nil).unwrap();
        assert_eq!(wire.as_ref(), &[tags::VERSION, tags::NIL]);
    }

    #[test]
    fn string_length_includes_terminator() {
        let wire = encode_to_bytes(&Value::string("ab")).unwrap();
        // tag, xlong 6 (4 data bytes + 2-byte NUL), 3 UTF-16 units.
        assert_eq!(
            wire.as_ref(),
            &[
                tags::VERSION,
                tags::STRING,
                6,
                0x00,
                b'a',
                0x00,
                b'b',
                0x00,
                0x00
            ]
        );
    }

    #[test]
    fn frame_emits_sorted_slots() {
        let frame = Value::frame([("zed", Value::int(1)), ("abc", Value::int(2))]);
        let wire = encode_to_bytes(&frame).unwrap();
        let abc = wire.windows(3).position(|w| w == b"abc").unwrap();
        let zed = wire.windows(3).position(|w| w == b"zed").unwrap();
        assert!(abc < zed, "slots must be emitted in sorted order");
    }

    #[test]
    fn non_latin_symbol_rejected() {
        let err = encode_to_bytes(&Value::symbol("snÖwman\u{2603}")).unwrap_err();
        assert!(matches!(err, NsofError::InvalidSymbol('\u{2603}')));
    }

    #[test]
    fn shared_children_are_encoded_in_full() {
        use std::sync::Arc;

        let shared = Arc::new(Value::binary("bits", &b"xyz"[..]));
        let value = Value::PlainArray(vec![Arc::clone(&shared), shared]);
        let wire = encode_to_bytes(&value).unwrap();
        // No precedent tag on the wire: both occurrences carry the payload.
        let occurrences = wire.windows(3).filter(|w| w == b"xyz").count();
        assert_eq!(occurrences, 2);

        let decoded = decode_from_slice(&wire).unwrap();
        match decoded.as_ref() {
            Value::PlainArray(items) => assert_eq!(items[0], items[1]),
            other => panic!("expected plain array, got {other}"),
        }
    }

    #[test]
    fn deep_roundtrip() {
        let value = Value::array(
            "projects",
            [
                Value::frame([
                    ("title", Value::string("backup")),
                    ("done", Value::True),
                ]),
                Value::frame([("title", Value::string("restore")), ("done", Value::Nil)]),
            ],
        );
        let wire = encode_to_bytes(&value).unwrap();
        assert_eq!(*decode_from_slice(&wire).unwrap(), value);
    }
}
