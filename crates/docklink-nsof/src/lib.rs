//! NSOF object serialization for the docking protocol.
//!
//! Every structured payload on the docking link is one NSOF stream: a
//! version byte followed by exactly one tagged object. Compound objects
//! decoded from a stream are assigned sequential precedent ids in encounter
//! order; a later `Precedent` tag resolves to the earlier object by shared
//! ownership instead of re-encoding it. The encoder never emits precedents.

pub mod decode;
pub mod encode;
pub mod error;
pub mod tags;
pub mod value;
pub mod xlong;

pub use decode::{decode, decode_from_slice};
pub use encode::{encode, encode_to_bytes};
pub use error::{NsofError, Result};
pub use value::{Symbol, Value};
