//! # Binary document codec
//!
//! A minimal BSON implementation covering the element types exchanged with
//! the Astarte broker and stored on flash by the property cache.
//!
//! A document is laid out as:
//!
//! ```text
//! ┌──────────────┬───────────────────────────────┬──────┐
//! │ total length │ element, element, ...         │ 0x00 │
//! │  u32 LE      │ type │ name\0 │ payload       │      │
//! └──────────────┴───────────────────────────────┴──────┘
//! ```
//!
//! The total length counts every byte, the prefix and the terminator
//! included. Arrays are encoded as documents whose element names are the
//! decimal indices `"0"`, `"1"`, ...
//!
//! # Building documents
//!
//! ```rust
//! use astarte_device_store::bson::{Document, Serializer};
//!
//! let mut ser = Serializer::new();
//! ser.append_int32("major", 1);
//! ser.append_string("name", "sensor");
//! let bytes = ser.finish().unwrap();
//!
//! let doc = Document::new(&bytes).unwrap();
//! assert_eq!(doc.lookup("major").unwrap().as_int32(), Ok(1));
//! ```
//!
//! # Parsing untrusted input
//!
//! Buffers received from the network must go through [`check_validity`]
//! before any element is looked at. [`Document::new`] performs the same
//! checks and is the preferred entry point.

#![allow(missing_docs)]
#![deny(unsafe_code)]

pub mod deserializer;
pub mod serializer;

#[cfg(test)]
mod tests;

pub use deserializer::{Document, Element, Elements, check_validity};
pub use serializer::Serializer;

/// Binary subtype used for every generic binary payload.
pub const BINARY_SUBTYPE_GENERIC: u8 = 0x00;

/// Size of the length prefix of a document.
pub(crate) const LEN_PREFIX_SIZE: usize = 4;
/// Size of the smallest valid document: prefix plus terminator.
pub(crate) const EMPTY_DOCUMENT_SIZE: usize = LEN_PREFIX_SIZE + 1;

/// Wire type tag of a document element.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum ElementType {
    /// 64-bit IEEE 754 floating point.
    Double = 0x01,
    /// UTF-8 string with length prefix and terminator.
    String = 0x02,
    /// Embedded document.
    Document = 0x03,
    /// Embedded document with numeric keys.
    Array = 0x04,
    /// Length-prefixed binary data with a subtype byte.
    Binary = 0x05,
    /// Single byte boolean.
    Boolean = 0x08,
    /// Milliseconds since the Unix epoch as a signed 64-bit integer.
    DateTime = 0x09,
    /// Signed 32-bit integer.
    Int32 = 0x10,
    /// Signed 64-bit integer.
    Int64 = 0x12,
}

impl ElementType {
    /// Decode a wire tag, returning `None` for unsupported types.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(ElementType::Double),
            0x02 => Some(ElementType::String),
            0x03 => Some(ElementType::Document),
            0x04 => Some(ElementType::Array),
            0x05 => Some(ElementType::Binary),
            0x08 => Some(ElementType::Boolean),
            0x09 => Some(ElementType::DateTime),
            0x10 => Some(ElementType::Int32),
            0x12 => Some(ElementType::Int64),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ElementType {
    fn format(&self, f: defmt::Formatter) {
        match self {
            ElementType::Double => defmt::write!(f, "Double"),
            ElementType::String => defmt::write!(f, "String"),
            ElementType::Document => defmt::write!(f, "Document"),
            ElementType::Array => defmt::write!(f, "Array"),
            ElementType::Binary => defmt::write!(f, "Binary"),
            ElementType::Boolean => defmt::write!(f, "Boolean"),
            ElementType::DateTime => defmt::write!(f, "DateTime"),
            ElementType::Int32 => defmt::write!(f, "Int32"),
            ElementType::Int64 => defmt::write!(f, "Int64"),
        }
    }
}
