//! Error types for AMF3 encoding and decoding

use std::fmt;

/// Result type alias using the library's error type
pub type Result<T> = std::result::Result<T, AmfError>;

/// AMF3 encoding/decoding errors
///
/// Every decode error is fatal to the current call: the partial value tree is
/// discarded and no resynchronization is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    /// Reader would advance past the end of the input
    Truncated,
    /// Top-level marker byte outside the supported set
    UnsupportedMarker(u8),
    /// Object trait tag indicates an externalizable class
    UnsupportedExternalizable,
    /// String back-reference index beyond the string table
    BadStringRef(u32),
    /// Object back-reference index beyond the object table
    BadObjectRef(u32),
    /// Trait back-reference index beyond the trait table
    BadTraitRef(u32),
    /// String bytes are not valid UTF-8
    InvalidUtf8,
    /// U29 input outside the encodable range
    RangeError(i64),
    /// Value nesting exceeds the recursion limit
    NestingTooDeep,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::Truncated => write!(f, "Unexpected end of AMF3 data"),
            AmfError::UnsupportedMarker(m) => write!(f, "Unsupported AMF3 marker: 0x{:02x}", m),
            AmfError::UnsupportedExternalizable => {
                write!(f, "Externalizable traits not supported")
            }
            AmfError::BadStringRef(idx) => write!(f, "No string reference at index {}", idx),
            AmfError::BadObjectRef(idx) => write!(f, "No object reference at index {}", idx),
            AmfError::BadTraitRef(idx) => write!(f, "No trait reference at index {}", idx),
            AmfError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF3 string"),
            AmfError::RangeError(n) => write!(f, "U29 range error: {}", n),
            AmfError::NestingTooDeep => write!(f, "AMF3 nesting too deep"),
        }
    }
}

impl std::error::Error for AmfError {}
