//! # Typed value model
//!
//! Values exchanged with Astarte belong to a closed set of mapping types:
//! seven scalars and their seven homogeneous array counterparts. This module
//! defines the [`MappingType`] tag, the [`Individual`] value and the
//! aggregated [`ObjectEntry`], and converts them to and from the binary
//! document codec.
//!
//! # Ownership
//!
//! Ownership is part of the value's type. Values built with the `from_*`
//! constructors borrow the caller's memory. Values produced by
//! [`Individual::deserialize`] borrow strings and blobs from the source
//! document but own the storage of their arrays, since array elements are not
//! contiguous on the wire. Everything is released by `Drop`; use
//! [`Individual::into_owned`] to detach a value from its source buffer.
//!
//! # Type compatibility
//!
//! Each scalar mapping type accepts exactly one wire type, except
//! [`MappingType::LongInteger`] which also accepts a 32-bit integer and
//! sign-extends it. Array mapping types require a wire array whose elements
//! all share the wire type of the first one.
//!
//! ```rust
//! use astarte_device_store::bson::{Document, Serializer};
//! use astarte_device_store::data::{Individual, MappingType};
//!
//! let mut ser = Serializer::new();
//! ser.append_int32("v", -3);
//! let bytes = ser.finish().unwrap();
//!
//! let doc = Document::new(&bytes).unwrap();
//! let element = doc.lookup("v").unwrap();
//! let value = Individual::deserialize(&element, MappingType::LongInteger).unwrap();
//! assert_eq!(value, Individual::LongInteger(-3));
//! ```

#![allow(missing_docs)]
#![deny(unsafe_code)]

use serde::Deserialize;

use crate::bson::ElementType;
use crate::error::Error;

pub mod individual;
pub mod object;


pub use individual::Individual;
pub use object::ObjectEntry;

/// Type of the value carried by a mapping.
///
/// The discriminants are stable: they are persisted by the property cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum MappingType {
    Integer = 1,
    LongInteger = 2,
    Double = 3,
    String = 4,
    BinaryBlob = 5,
    Boolean = 6,
    DateTime = 7,
    IntegerArray = 8,
    LongIntegerArray = 9,
    DoubleArray = 10,
    StringArray = 11,
    BinaryBlobArray = 12,
    BooleanArray = 13,
    DateTimeArray = 14,
}

impl MappingType {
    pub fn is_array(&self) -> bool {
        (*self as u8) >= (MappingType::IntegerArray as u8)
    }

    /// Scalar type of the elements of an array type.
    ///
    /// # Errors
    ///
    /// [`Error::InternalError`] when called on a scalar type.
    pub fn array_to_scalar(&self) -> Result<MappingType, Error> {
        match self {
            MappingType::IntegerArray => Ok(MappingType::Integer),
            MappingType::LongIntegerArray => Ok(MappingType::LongInteger),
            MappingType::DoubleArray => Ok(MappingType::Double),
            MappingType::StringArray => Ok(MappingType::String),
            MappingType::BinaryBlobArray => Ok(MappingType::BinaryBlob),
            MappingType::BooleanArray => Ok(MappingType::Boolean),
            MappingType::DateTimeArray => Ok(MappingType::DateTime),
            _ => {
                error!("Array to scalar conversion requested on a scalar type");
                Err(Error::InternalError)
            }
        }
    }

    /// Wire type used to encode values of this mapping type.
    pub fn bson_type(&self) -> ElementType {
        match self {
            MappingType::Integer => ElementType::Int32,
            MappingType::LongInteger => ElementType::Int64,
            MappingType::Double => ElementType::Double,
            MappingType::String => ElementType::String,
            MappingType::BinaryBlob => ElementType::Binary,
            MappingType::Boolean => ElementType::Boolean,
            MappingType::DateTime => ElementType::DateTime,
            _ => ElementType::Array,
        }
    }

    /// Whether a wire element of type `wire` may be read as this type.
    ///
    /// A 32-bit integer is accepted where a 64-bit one is expected.
    pub fn is_compatible_with(&self, wire: ElementType) -> bool {
        match self {
            MappingType::LongInteger => {
                matches!(wire, ElementType::Int64 | ElementType::Int32)
            }
            _ => self.bson_type() == wire,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::Integer => "integer",
            MappingType::LongInteger => "longinteger",
            MappingType::Double => "double",
            MappingType::String => "string",
            MappingType::BinaryBlob => "binaryblob",
            MappingType::Boolean => "boolean",
            MappingType::DateTime => "datetime",
            MappingType::IntegerArray => "integerarray",
            MappingType::LongIntegerArray => "longintegerarray",
            MappingType::DoubleArray => "doublearray",
            MappingType::StringArray => "stringarray",
            MappingType::BinaryBlobArray => "binaryblobarray",
            MappingType::BooleanArray => "booleanarray",
            MappingType::DateTimeArray => "datetimearray",
        }
    }
}

impl TryFrom<i64> for MappingType {
    type Error = Error;

    fn try_from(tag: i64) -> Result<Self, Self::Error> {
        let mapping_type = match tag {
            1 => MappingType::Integer,
            2 => MappingType::LongInteger,
            3 => MappingType::Double,
            4 => MappingType::String,
            5 => MappingType::BinaryBlob,
            6 => MappingType::Boolean,
            7 => MappingType::DateTime,
            8 => MappingType::IntegerArray,
            9 => MappingType::LongIntegerArray,
            10 => MappingType::DoubleArray,
            11 => MappingType::StringArray,
            12 => MappingType::BinaryBlobArray,
            13 => MappingType::BooleanArray,
            14 => MappingType::DateTimeArray,
            _ => {
                warn!("Unknown mapping type tag {}", tag);
                return Err(Error::DocumentMalformed);
            }
        };
        Ok(mapping_type)
    }
}

impl From<MappingType> for i64 {
    fn from(mapping_type: MappingType) -> Self {
        mapping_type as u8 as i64
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MappingType {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}
