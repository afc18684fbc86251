//! NSOF type-tag byte constants.
//!
//! One tag byte precedes every encoded object. Tags 1, 2 and 11 belong to
//! object types the docking protocol never exchanges and decode as
//! `InvalidTag`.

/// Immediate value packed into one xlong ref word.
pub const IMMEDIATE: u8 = 0;

/// Binary object: length, class symbol, raw bytes.
pub const BINARY: u8 = 3;

/// Class-tagged ordered array.
pub const ARRAY: u8 = 4;

/// Ordered array without a class tag.
pub const PLAIN_ARRAY: u8 = 5;

/// Sorted symbol-to-object mapping.
pub const FRAME: u8 = 6;

/// Single-byte legacy-encoded identifier.
pub const SYMBOL: u8 = 7;

/// Big-endian UTF-16 text with a trailing NUL terminator.
pub const STRING: u8 = 8;

/// Back-reference to an earlier compound object in the same stream.
pub const PRECEDENT: u8 = 9;

/// Nil as a bare tag with no body.
pub const NIL: u8 = 10;

/// Large binary object; same body layout as `BINARY`.
pub const LARGE_BINARY: u8 = 12;

/// Stream version byte emitted before the single top-level object.
pub const VERSION: u8 = 2;

/// Packed immediate ref for nil.
pub const REF_NIL: u32 = 0x02;

/// Packed immediate ref for the canonical true value.
pub const REF_TRUE: u32 = 0x1A;
