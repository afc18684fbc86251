use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use tracing::trace;

use crate::error::{NsofError, Result};
use crate::tags;
use crate::value::{Symbol, Value};
use crate::xlong::take_xlong;

/// Decode a complete NSOF stream: one version byte, then exactly one object.
///
/// Consumes from `src`; trailing bytes are left for the caller. Any error is
/// fatal to the stream — the back-reference table is not recoverable after a
/// malformed object.
pub fn decode(src: &mut Bytes) -> Result<Arc<Value>> {
    if !src.has_remaining() {
        return Err(NsofError::UnexpectedEof);
    }
    let version = src.get_u8();
    if version != tags::VERSION {
        return Err(NsofError::VersionMismatch(version));
    }
    Decoder::default().decode_object(src)
}

/// Convenience wrapper over [`decode`] for borrowed input.
pub fn decode_from_slice(data: &[u8]) -> Result<Arc<Value>> {
    let mut bytes = Bytes::copy_from_slice(data);
    decode(&mut bytes)
}

/// Per-stream decoder state: the precedent arena.
///
/// Compound objects are registered in encounter order; ids are indices into
/// the arena. A slot is reserved before its object's body decodes, so child
/// objects observe the correct sequential numbering.
#[derive(Default)]
struct Decoder {
    precedents: Vec<Option<Arc<Value>>>,
}

impl Decoder {
    fn decode_object(&mut self, src: &mut Bytes) -> Result<Arc<Value>> {
        if !src.has_remaining() {
            return Err(NsofError::UnexpectedEof);
        }
        let tag = src.get_u8();
        trace!(tag, "decoding object");
        match tag {
            tags::IMMEDIATE => Ok(Arc::new(decode_immediate(take_xlong(src)?)?)),
            tags::NIL => Ok(Arc::new(Value::Nil)),
            tags::PRECEDENT => {
                let id = take_xlong(src)?;
                match self.precedents.get(id as usize) {
                    Some(Some(value)) => Ok(Arc::clone(value)),
                    _ => Err(NsofError::DanglingReference(id)),
                }
            }
            tags::BINARY => self.with_precedent(src, |this, src| {
                let len = take_xlong(src)? as usize;
                let class = this.decode_class(src)?;
                let data = take_bytes(src, len)?;
                Ok(Value::Binary { class, data })
            }),
            tags::LARGE_BINARY => self.with_precedent(src, |this, src| {
                let len = take_xlong(src)? as usize;
                let class = this.decode_class(src)?;
                let data = take_bytes(src, len)?;
                Ok(Value::LargeBinary { class, data })
            }),
            tags::ARRAY => self.with_precedent(src, |this, src| {
                let count = take_xlong(src)?;
                let class = this.decode_class(src)?;
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(this.decode_object(src)?);
                }
                Ok(Value::Array { class, items })
            }),
            tags::PLAIN_ARRAY => self.with_precedent(src, |this, src| {
                let count = take_xlong(src)?;
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(this.decode_object(src)?);
                }
                Ok(Value::PlainArray(items))
            }),
            tags::FRAME => self.with_precedent(src, |this, src| {
                let count = take_xlong(src)?;
                let mut slots = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    slots.push(this.decode_class(src)?);
                }
                // Exactly one value per declared slot, in key order.
                let mut frame = BTreeMap::new();
                for slot in slots {
                    let value = this.decode_object(src)?;
                    frame.insert(slot, value);
                }
                Ok(Value::Frame(frame))
            }),
            tags::SYMBOL => self.with_precedent(src, |_, src| {
                let len = take_xlong(src)? as usize;
                let data = take_bytes(src, len)?;
                Ok(Value::Symbol(decode_symbol_bytes(&data)))
            }),
            tags::STRING => self.with_precedent(src, |_, src| {
                let len = take_xlong(src)? as usize;
                if len < 2 || len % 2 != 0 {
                    return Err(NsofError::InvalidString);
                }
                let data = take_bytes(src, len)?;
                // The trailing code unit is the mandatory NUL terminator.
                let units: Vec<u16> = data[..len - 2]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                let text = String::from_utf16(&units).map_err(|_| NsofError::InvalidString)?;
                Ok(Value::String(text))
            }),
            other => Err(NsofError::InvalidTag(other)),
        }
    }

    /// Reserve the next precedent slot, decode the body, fill the slot.
    fn with_precedent(
        &mut self,
        src: &mut Bytes,
        body: impl FnOnce(&mut Self, &mut Bytes) -> Result<Value>,
    ) -> Result<Arc<Value>> {
        let id = self.precedents.len();
        self.precedents.push(None);
        let value = Arc::new(body(self, src)?);
        self.precedents[id] = Some(Arc::clone(&value));
        Ok(value)
    }

    /// Decode an object expected to be a class symbol, either inline or via
    /// a precedent reference to an earlier symbol.
    fn decode_class(&mut self, src: &mut Bytes) -> Result<Symbol> {
        let value = self.decode_object(src)?;
        match value.as_ref() {
            Value::Symbol(sym) => Ok(sym.clone()),
            _ => Err(NsofError::ClassNotSymbol),
        }
    }
}

fn decode_immediate(r: u32) -> Result<Value> {
    if r == tags::REF_NIL {
        return Ok(Value::Nil);
    }
    if r == tags::REF_TRUE {
        return Ok(Value::True);
    }
    if r & 0xF == 0x6 {
        let code = r >> 4;
        return char::from_u32(code)
            .map(Value::Character)
            .ok_or(NsofError::InvalidCharacter(code));
    }
    match r & 0x3 {
        0x0 => Ok(Value::SmallInt((r as i32) >> 2)),
        0x3 => Ok(Value::MagicPointer(r >> 2)),
        _ => Err(NsofError::InvalidImmediate(r)),
    }
}

fn decode_symbol_bytes(data: &[u8]) -> Symbol {
    // Legacy single-byte encoding; each byte maps to the same code point.
    Symbol::new(data.iter().map(|&b| char::from(b)).collect::<String>())
}

fn take_bytes(src: &mut Bytes, len: usize) -> Result<Bytes> {
    if src.remaining() < len {
        return Err(NsofError::UnexpectedEof);
    }
    Ok(src.split_to(len))
}
