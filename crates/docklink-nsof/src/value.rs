use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

/// A case-sensitive identifier in the legacy single-byte text encoding.
///
/// Symbols name frame slots and object classes. Ordering is byte order,
/// which is what the wire format's sorted frame emission relies on.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}", self.0)
    }
}

/// One encodable data item.
///
/// Children of compound variants are `Arc`-shared so that decoded precedent
/// back-references resolve to the same instance rather than a copy.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    True,
    SmallInt(i32),
    Character(char),
    MagicPointer(u32),
    Binary { class: Symbol, data: Bytes },
    LargeBinary { class: Symbol, data: Bytes },
    Array { class: Symbol, items: Vec<Arc<Value>> },
    PlainArray(Vec<Arc<Value>>),
    Frame(BTreeMap<Symbol, Arc<Value>>),
    String(String),
    Symbol(Symbol),
}

impl Value {
    pub fn int(n: i32) -> Self {
        Value::SmallInt(n)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(Symbol::new(name))
    }

    pub fn binary(class: &str, data: impl Into<Bytes>) -> Self {
        Value::Binary {
            class: Symbol::new(class),
            data: data.into(),
        }
    }

    pub fn array(class: &str, items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array {
            class: Symbol::new(class),
            items: items.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn plain_array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::PlainArray(items.into_iter().map(Arc::new).collect())
    }

    /// Build a frame from `(slot, value)` pairs. Duplicate slots overwrite.
    pub fn frame<'a>(entries: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Value::Frame(
            entries
                .into_iter()
                .map(|(k, v)| (Symbol::new(k), Arc::new(v)))
                .collect(),
        )
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::SmallInt(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(sym) => Some(sym),
            _ => None,
        }
    }

    /// Slot map of a frame value.
    pub fn as_slots(&self) -> Option<&BTreeMap<Symbol, Arc<Value>>> {
        match self {
            Value::Frame(slots) => Some(slots),
            _ => None,
        }
    }

    /// Look up a frame slot by name.
    pub fn get(&self, slot: &str) -> Option<&Arc<Value>> {
        match self {
            Value::Frame(slots) => slots.get(&Symbol::new(slot)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::True => write!(f, "true"),
            Value::SmallInt(n) => write!(f, "{n}"),
            Value::Character(c) => write!(f, "${c}"),
            Value::MagicPointer(m) => write!(f, "@{m}"),
            Value::Binary { class, data } => {
                write!(f, "<binary {class}, {} bytes>", data.len())
            }
            Value::LargeBinary { class, data } => {
                write!(f, "<large-binary {class}, {} bytes>", data.len())
            }
            Value::Array { class, items } => {
                write!(f, "[{class}:")?;
                for item in items {
                    write!(f, " {item}")?;
                }
                write!(f, "]")
            }
            Value::PlainArray(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Frame(slots) => {
                write!(f, "{{")?;
                for (i, (slot, value)) in slots.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{slot}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Symbol(sym) => write!(f, "'{sym}"),
        }
    }
}
