//! Aggregated objects: a set of values published together on a common path.

use alloc::vec::Vec;

use super::Individual;
use crate::bson::{Element, ElementType, Serializer};
use crate::error::Error;
use crate::interface::Interface;

/// One entry of an aggregated object.
///
/// `path` is the last segment of the mapping endpoint, relative to the path
/// the object is published on.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry<'a> {
    pub path: &'a str,
    pub value: Individual<'a>,
}

impl<'a> ObjectEntry<'a> {
    pub fn new(path: &'a str, value: Individual<'a>) -> Self {
        Self { path, value }
    }
}

/// Append every entry to `ser`, each as an element named after its path.
pub fn serialize_entries(ser: &mut Serializer, entries: &[ObjectEntry<'_>]) {
    for entry in entries {
        entry.value.serialize(ser, entry.path);
    }
}

/// Decode an aggregated object received on `path` of `interface`.
///
/// The type of every entry is taken from the interface mapping matching
/// `path/<entry name>`.
///
/// # Errors
///
/// - [`Error::TypeMismatch`] if `element` is not a document, or an entry
///   does not match its mapping type
/// - [`Error::DocumentMalformed`] if the object is empty or cannot be walked
/// - [`Error::MappingNotFound`] if an entry has no mapping in the interface
pub fn deserialize_entries<'a>(
    element: &Element<'a>,
    interface: &Interface,
    path: &str,
) -> Result<Vec<ObjectEntry<'a>>, Error> {
    if element.kind() != ElementType::Document {
        error!("Received an object that is not a document");
        return Err(Error::TypeMismatch);
    }
    let document = element.as_document()?;
    if document.is_empty() {
        error!("Received an empty object on {}", path);
        return Err(Error::DocumentMalformed);
    }

    let mut entries = Vec::new();
    for item in document.iter() {
        let item = item?;
        let mapping = interface.mapping_for_paths(path, item.name())?;
        let value = Individual::deserialize(&item, mapping.mapping_type)?;
        entries.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        entries.push(ObjectEntry::new(item.name(), value));
    }
    Ok(entries)
}
