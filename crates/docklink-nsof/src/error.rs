/// Errors that can occur while encoding or decoding NSOF streams.
///
/// All decode errors are fatal to the stream being decoded; there is no
/// partial-object recovery. The caller resynchronizes at the frame layer or
/// tears down the connection.
#[derive(Debug, thiserror::Error)]
pub enum NsofError {
    /// The stream's version byte is not one this codec speaks.
    #[error("unsupported NSOF version {0}")]
    VersionMismatch(u8),

    /// An object tag byte outside the known set.
    #[error("invalid object tag 0x{0:02x}")]
    InvalidTag(u8),

    /// A packed immediate ref whose low bits match no immediate sub-type.
    #[error("invalid immediate ref 0x{0:x}")]
    InvalidImmediate(u32),

    /// The stream ended before the current object was complete.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// A precedent id that no earlier object in this stream was assigned.
    #[error("dangling precedent reference {0}")]
    DanglingReference(u32),

    /// A class slot held something other than a symbol.
    #[error("object class is not a symbol")]
    ClassNotSymbol,

    /// A character immediate carrying an invalid scalar value.
    #[error("character code 0x{0:x} is not a valid scalar value")]
    InvalidCharacter(u32),

    /// String payload was not well-formed big-endian UTF-16.
    #[error("malformed UTF-16 string payload")]
    InvalidString,

    /// A symbol character that does not fit the single-byte legacy encoding.
    #[error("symbol character {0:?} outside the legacy encoding")]
    InvalidSymbol(char),
}

pub type Result<T> = std::result::Result<T, NsofError>;
