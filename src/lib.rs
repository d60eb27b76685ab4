//! amf3-rs: AMF3 (Action Message Format 3) serialization library
//!
//! AMF3 is the compact binary format used by Flash Player remoting to ship
//! ActionScript values over the wire. This library converts between AMF3 byte
//! streams and an in-memory value tree, supporting:
//! - All scalar markers: undefined, null, booleans, 29-bit integers, doubles,
//!   strings and dates
//! - Dense arrays and trait-described objects with insertion-ordered
//!   properties
//! - The three AMF3 reference tables (strings, objects, traits) on decode,
//!   and object-identity back-references on encode
//! - Bit-exact NaN interop with legacy little-endian peers
//!
//! Externalizable traits, XML documents, ByteArray and Vector markers are
//! rejected as unsupported.
//!
//! # Example
//!
//! ```
//! use amf3_rs::{deserialize, serialize, AmfObject, AmfValue};
//!
//! let mut obj = AmfObject::with_class("Object");
//! obj.insert("title", AmfValue::String("inventory".into()));
//! obj.insert("count", AmfValue::Integer(2));
//!
//! let bytes = serialize(&obj.into())?;
//! let (value, consumed) = deserialize(&bytes)?;
//!
//! assert_eq!(consumed, bytes.len());
//! assert_eq!(value.get_string("title"), Some("inventory"));
//! assert_eq!(value.get_number("count"), Some(2.0));
//! # Ok::<(), amf3_rs::AmfError>(())
//! ```

pub mod amf3;
pub mod buffer;
pub mod error;
pub mod value;

// Re-export main types for convenience
pub use amf3::{deserialize, deserialize_all, serialize, serialize_all};
pub use amf3::{Amf3Decoder, Amf3Encoder};
pub use error::{AmfError, Result};
pub use value::{AmfObject, AmfValue};
