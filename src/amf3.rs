//! AMF3 encoder and decoder
//!
//! AMF3 is the ActionScript 3.0 revision of the Action Message Format.
//! Reference: AMF3 File Format Specification (amf3-file-format-spec.pdf)
//!
//! Type Markers:
//! ```text
//! 0x00 - Undefined
//! 0x01 - Null
//! 0x02 - False
//! 0x03 - True
//! 0x04 - Integer (29-bit signed, variable length)
//! 0x05 - Double (IEEE 754, big-endian)
//! 0x06 - String (UTF-8, length-prefixed or back-reference)
//! 0x07 - XML Document (not supported)
//! 0x08 - Date (double ms since epoch)
//! 0x09 - Array (associative + dense portions)
//! 0x0A - Object (trait-described)
//! 0x0B - XML (not supported)
//! 0x0C - ByteArray (not supported)
//! ```
//!
//! AMF3 deduplicates repeated strings, objects and trait descriptors through
//! three independent reference tables; later occurrences back-reference an
//! earlier entry by index, and the tables never cross-index. On decode, an
//! object slot stores the byte region of the first occurrence and a
//! back-reference is resolved by re-parsing that region, so back-referenced
//! values come out structurally equal but not identical. On encode, only
//! object identity is deduplicated; strings and traits are always written
//! inline, which keeps the output deterministic for a given traversal order.

use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;

use crate::buffer::{ByteReader, ByteWriter};
use crate::error::{AmfError, Result};
use crate::value::{AmfObject, AmfValue};

// AMF3 type markers
const MARKER_UNDEFINED: u8 = 0x00;
const MARKER_NULL: u8 = 0x01;
const MARKER_FALSE: u8 = 0x02;
const MARKER_TRUE: u8 = 0x03;
const MARKER_INTEGER: u8 = 0x04;
const MARKER_DOUBLE: u8 = 0x05;
const MARKER_STRING: u8 = 0x06;
const MARKER_DATE: u8 = 0x08;
const MARKER_ARRAY: u8 = 0x09;
const MARKER_OBJECT: u8 = 0x0A;

/// Maximum nesting depth for objects/arrays (prevent stack overflow)
const MAX_NESTING_DEPTH: usize = 64;

/// Trait tag for an inline dynamic object with zero sealed members
const DYNAMIC_NO_SEALED_TRAITS: i64 = 11;

/// Largest integer written with the Integer marker
///
/// Positive 29-bit values up to 2^28-1 are legal on the wire, but some peers
/// mishandle anything wider than 21 bits, so larger values are written as
/// doubles.
const MAX_INLINE_INTEGER: i32 = 0x0020_0000;

/// A recorded first occurrence of an array, object or date
///
/// The region is positioned right after the inline tag; replaying a
/// back-reference re-parses the region under the stored tag.
#[derive(Clone)]
struct ObjRef {
    region: ByteReader,
    tag: i32,
}

/// A trait descriptor: class name, dynamic flag, sealed property names
#[derive(Clone)]
struct Traits {
    class_name: String,
    dynamic: bool,
    properties: Vec<String>,
}

/// AMF3 decoder
///
/// Reference tables live for one payload: they are reset at the start of each
/// [`decode`](Amf3Decoder::decode) / [`decode_all`](Amf3Decoder::decode_all)
/// call and shared by every value within it.
pub struct Amf3Decoder {
    /// Previously decoded non-empty strings, in first-seen order
    string_refs: Vec<String>,
    /// Previously decoded array/object/date regions, in first-seen order
    object_refs: Vec<ObjRef>,
    /// Previously declared trait descriptors, in first-seen order
    trait_refs: Vec<Traits>,
    /// Current nesting depth
    depth: usize,
}

impl Amf3Decoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self {
            string_refs: Vec::new(),
            object_refs: Vec::new(),
            trait_refs: Vec::new(),
            depth: 0,
        }
    }

    /// Decode a single value from the front of `data`
    ///
    /// Returns the value and the number of bytes consumed; trailing bytes are
    /// ignored.
    pub fn decode(&mut self, data: Bytes) -> Result<(AmfValue, usize)> {
        self.reset();
        tracing::trace!("Decoding AMF3 value from {} bytes", data.len());
        let mut region = ByteReader::new(data);
        let value = self.read_value(&mut region)?;
        Ok((value, region.consumed()))
    }

    /// Decode values until the buffer is exhausted
    ///
    /// All values share one set of reference tables, so later values may
    /// back-reference strings, objects and traits from earlier ones.
    pub fn decode_all(&mut self, data: Bytes) -> Result<Vec<AmfValue>> {
        self.reset();
        let mut region = ByteReader::new(data);
        let mut values = Vec::new();
        while region.remaining() > 0 {
            values.push(self.read_value(&mut region)?);
        }
        Ok(values)
    }

    fn reset(&mut self) {
        self.string_refs.clear();
        self.object_refs.clear();
        self.trait_refs.clear();
        self.depth = 0;
    }

    fn read_value(&mut self, region: &mut ByteReader) -> Result<AmfValue> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }
        let result = self.read_marker_value(region);
        self.depth -= 1;
        result
    }

    fn read_marker_value(&mut self, region: &mut ByteReader) -> Result<AmfValue> {
        let marker = region.read_u8()?;
        match marker {
            MARKER_UNDEFINED => Ok(AmfValue::Undefined),
            MARKER_NULL => Ok(AmfValue::Null),
            MARKER_FALSE => Ok(AmfValue::Boolean(false)),
            MARKER_TRUE => Ok(AmfValue::Boolean(true)),
            MARKER_INTEGER => Ok(AmfValue::Integer(region.read_u29()?)),
            MARKER_DOUBLE => Ok(AmfValue::Double(region.read_f64_be()?)),
            MARKER_STRING => Ok(AmfValue::String(self.read_utf8(region)?)),
            MARKER_DATE => self.read_date(region),
            MARKER_ARRAY => self.read_array(region),
            MARKER_OBJECT => self.read_object(region),
            other => Err(AmfError::UnsupportedMarker(other)),
        }
    }

    /// Read a UTF-8 string (no marker byte)
    ///
    /// Inline non-empty strings are appended to the string table before
    /// returning; the empty string is always inline and never interned.
    fn read_utf8(&mut self, region: &mut ByteReader) -> Result<String> {
        let n = region.read_u29()?;
        if n & 1 == 1 {
            let len = (n >> 1) as u32 as usize;
            if len == 0 {
                return Ok(String::new());
            }
            let bytes = region.read_bytes(len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|_| AmfError::InvalidUtf8)?
                .to_string();
            self.string_refs.push(s.clone());
            Ok(s)
        } else {
            let index = (n >> 1) as u32;
            match self.string_refs.get(index as usize) {
                Some(s) => Ok(s.clone()),
                None => Err(AmfError::BadStringRef(index)),
            }
        }
    }

    fn read_array(&mut self, region: &mut ByteReader) -> Result<AmfValue> {
        let n = region.read_u29()?;
        if n & 1 == 1 {
            let len = (n >> 1) as u32 as usize;
            // Record the slot before the body so back-references to this
            // array resolve while it is still being decoded
            self.object_refs.push(ObjRef {
                region: region.sub_region(),
                tag: n,
            });
            self.read_array_body(region, len)
        } else {
            let index = (n >> 1) as u32;
            let slot = self.object_ref(index)?;
            let len = (slot.tag >> 1) as u32 as usize;
            let mut replay = slot.region;
            self.read_array_body(&mut replay, len)
        }
    }

    fn read_array_body(&mut self, region: &mut ByteReader, len: usize) -> Result<AmfValue> {
        // The associative portion is consumed and discarded; only the dense
        // portion is surfaced. Keys still pass through the string table.
        loop {
            let key = self.read_utf8(region)?;
            if key.is_empty() {
                break;
            }
            let _ = self.read_value(region)?;
        }
        let mut elements = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            elements.push(self.read_value(region)?);
        }
        Ok(AmfValue::Array(elements))
    }

    fn read_date(&mut self, region: &mut ByteReader) -> Result<AmfValue> {
        let n = region.read_u29()?;
        if n & 1 == 1 {
            self.object_refs.push(ObjRef {
                region: region.sub_region_len(8),
                tag: n,
            });
            Ok(AmfValue::Date(region.read_f64_be()?))
        } else {
            let index = (n >> 1) as u32;
            let slot = self.object_ref(index)?;
            let mut replay = slot.region;
            Ok(AmfValue::Date(replay.read_f64_be()?))
        }
    }

    fn read_object(&mut self, region: &mut ByteReader) -> Result<AmfValue> {
        let n = region.read_u29()?;
        if n & 1 == 0 {
            let index = (n >> 1) as u32;
            let slot = self.object_ref(index)?;
            let mut replay = slot.region;
            self.read_object_with_tag(&mut replay, slot.tag)
        } else {
            self.object_refs.push(ObjRef {
                region: region.sub_region(),
                tag: n,
            });
            self.read_object_with_tag(region, n)
        }
    }

    fn read_object_with_tag(&mut self, region: &mut ByteReader, n: i32) -> Result<AmfValue> {
        if n & 7 == 7 {
            Err(AmfError::UnsupportedExternalizable)
        } else if n & 7 == 3 {
            // Inline trait declaration
            let dynamic = n & 8 != 0;
            let sealed_count = (n >> 4) as u32 as usize;
            let class_name = self.read_utf8(region)?;
            let mut properties = Vec::with_capacity(sealed_count.min(1024));
            for _ in 0..sealed_count {
                properties.push(self.read_utf8(region)?);
            }
            let traits = Traits {
                class_name,
                dynamic,
                properties,
            };
            self.trait_refs.push(traits.clone());
            self.read_object_props(region, traits)
        } else if n & 3 == 1 {
            let index = (n >> 2) as u32;
            let traits = match self.trait_refs.get(index as usize) {
                Some(t) => t.clone(),
                None => return Err(AmfError::BadTraitRef(index)),
            };
            self.read_object_props(region, traits)
        } else {
            // Even tags never reach here from a well-formed stream: inline
            // object tags are odd and recorded slots only hold inline tags.
            Err(AmfError::BadObjectRef((n >> 1) as u32))
        }
    }

    fn read_object_props(&mut self, region: &mut ByteReader, traits: Traits) -> Result<AmfValue> {
        let Traits {
            class_name,
            dynamic,
            properties: names,
        } = traits;
        let mut object = AmfObject::with_class(class_name);
        for name in names {
            let value = self.read_value(region)?;
            object.insert(name, value);
        }
        if dynamic {
            loop {
                let key = self.read_utf8(region)?;
                if key.is_empty() {
                    break;
                }
                let value = self.read_value(region)?;
                object.insert(key, value);
            }
        }
        Ok(AmfValue::Object(Rc::new(object)))
    }

    fn object_ref(&self, index: u32) -> Result<ObjRef> {
        match self.object_refs.get(index as usize) {
            Some(slot) => Ok(slot.clone()),
            None => Err(AmfError::BadObjectRef(index)),
        }
    }
}

impl Default for Amf3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// AMF3 encoder
///
/// The only state carried between values in a payload is the object-identity
/// table; [`finish`](Amf3Encoder::finish) yields the bytes and resets it.
pub struct Amf3Encoder {
    buf: ByteWriter,
    /// Maps object pointer addresses to assigned reference indexes
    object_refs: HashMap<usize, u32>,
}

impl Amf3Encoder {
    /// Create a new encoder
    pub fn new() -> Self {
        Self {
            buf: ByteWriter::new(),
            object_refs: HashMap::new(),
        }
    }

    /// Create an encoder with a specific initial buffer capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: ByteWriter::with_capacity(capacity),
            object_refs: HashMap::new(),
        }
    }

    /// Get current encoded length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if encoder is empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Encode a single value into the buffer
    pub fn encode(&mut self, value: &AmfValue) -> Result<()> {
        self.write_value(value)
    }

    /// Encode multiple values into the buffer
    pub fn encode_all(&mut self, values: &[AmfValue]) -> Result<()> {
        for value in values {
            self.write_value(value)?;
        }
        Ok(())
    }

    /// Take the encoded bytes and reset per-payload state
    pub fn finish(&mut self) -> Bytes {
        self.object_refs.clear();
        self.buf.to_bytes()
    }

    fn write_value(&mut self, value: &AmfValue) -> Result<()> {
        match value {
            AmfValue::Undefined => {
                self.buf.write_u8(MARKER_UNDEFINED);
                Ok(())
            }
            AmfValue::Null => {
                self.buf.write_u8(MARKER_NULL);
                Ok(())
            }
            AmfValue::Boolean(b) => {
                self.buf.write_u8(if *b { MARKER_TRUE } else { MARKER_FALSE });
                Ok(())
            }
            AmfValue::Integer(i) => {
                if (0..MAX_INLINE_INTEGER).contains(i) {
                    self.buf.write_u8(MARKER_INTEGER);
                    self.buf.write_u29(*i as i64)
                } else {
                    self.write_double(*i as f64)
                }
            }
            AmfValue::Double(d) => self.write_double(*d),
            AmfValue::String(s) => {
                self.buf.write_u8(MARKER_STRING);
                self.write_utf8(s)
            }
            AmfValue::Date(ms) => {
                self.buf.write_u8(MARKER_DATE);
                self.buf.write_u29(1)?;
                self.buf.write_f64_be(*ms);
                Ok(())
            }
            AmfValue::Array(items) => {
                self.buf.write_u8(MARKER_ARRAY);
                self.buf.write_u29(((items.len() as i64) << 1) | 1)?;
                // Empty associative portion
                self.write_utf8("")?;
                for item in items {
                    self.write_value(item)?;
                }
                Ok(())
            }
            AmfValue::Object(obj) => self.write_object(obj),
        }
    }

    fn write_object(&mut self, obj: &Rc<AmfObject>) -> Result<()> {
        self.buf.write_u8(MARKER_OBJECT);
        let identity = Rc::as_ptr(obj) as usize;
        if let Some(&index) = self.object_refs.get(&identity) {
            return self.buf.write_u29((index as i64) << 1);
        }
        let index = self.object_refs.len() as u32;
        self.object_refs.insert(identity, index);

        self.buf.write_u29(DYNAMIC_NO_SEALED_TRAITS)?;
        self.write_utf8(&obj.class_name)?;
        for (name, value) in obj.iter() {
            self.write_utf8(name)?;
            self.write_value(value)?;
        }
        // Empty string terminates the dynamic properties
        self.write_utf8("")
    }

    fn write_double(&mut self, d: f64) -> Result<()> {
        self.buf.write_u8(MARKER_DOUBLE);
        self.buf.write_f64_be(d);
        Ok(())
    }

    /// Write a UTF-8 string (no marker byte), always inline
    fn write_utf8(&mut self, s: &str) -> Result<()> {
        self.buf.write_u29(((s.len() as i64) << 1) | 1)?;
        self.buf.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl Default for Amf3Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience function to encode a single value
pub fn serialize(value: &AmfValue) -> Result<Bytes> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode(value)?;
    let bytes = encoder.finish();
    tracing::trace!("Encoded AMF3 value into {} bytes", bytes.len());
    Ok(bytes)
}

/// Convenience function to encode multiple values into one payload
pub fn serialize_all(values: &[AmfValue]) -> Result<Bytes> {
    let mut encoder = Amf3Encoder::new();
    encoder.encode_all(values)?;
    Ok(encoder.finish())
}

/// Convenience function to decode a single value
///
/// Returns the value and the number of bytes consumed from the front of
/// `data`; trailing bytes are ignored.
pub fn deserialize(data: &[u8]) -> Result<(AmfValue, usize)> {
    Amf3Decoder::new().decode(Bytes::copy_from_slice(data))
}

/// Convenience function to decode all values in the buffer
pub fn deserialize_all(data: &[u8]) -> Result<Vec<AmfValue>> {
    Amf3Decoder::new().decode_all(Bytes::copy_from_slice(data))
}
