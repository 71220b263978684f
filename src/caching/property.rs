//! Cached properties.

use alloc::string::String;
use alloc::vec::Vec;

use super::Cache;
use crate::bson::{Document, Serializer};
use crate::data::{Individual, MappingType};
use crate::error::Error;
use crate::interface::{Introspection, Ownership};
use crate::storage::journal::Journal;
use crate::storage::kv::KvIter;

/// Separator between the interface name and the path in a property key.
const KEY_SEPARATOR: char = ';';
/// Separator between the properties of a properties string.
const LIST_SEPARATOR: char = ';';

impl<'j, J: Journal> Cache<'j, J> {
    /// Store a property value along with the major version of its interface.
    ///
    /// # Arguments
    ///
    /// * `interface_name` - Name of the interface the property belongs to
    /// * `path` - Path of the property, starting with `/`
    /// * `major` - Major version of the interface
    /// * `value` - Property value
    ///
    /// # Errors
    ///
    /// - [`Error::DocumentTooLarge`] if the value cannot be encoded
    /// - any key-value store error
    pub fn store_property(
        &self,
        interface_name: &str,
        path: &str,
        major: u32,
        value: &Individual<'_>,
    ) -> Result<(), Error> {
        debug!("Caching property {}{}", interface_name, path);
        let key = property_key(interface_name, path)?;

        let mut ser = Serializer::new();
        ser.append_int32("major", major as i32);
        ser.append_int64("type", i64::from(value.mapping_type()));
        value.serialize(&mut ser, "data");
        let document = ser.finish()?;

        self.prop_storage
            .insert(&key, &document)
            .inspect_err(|err| error!("Error caching property: {}", *err))
    }

    /// Load a property and the interface major version it was stored with.
    ///
    /// The returned value owns its data.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the property is not cached
    /// - [`Error::DocumentMalformed`] or [`Error::TypeMismatch`] if the
    ///   cached document cannot be decoded
    pub fn load_property(
        &self,
        interface_name: &str,
        path: &str,
    ) -> Result<(u32, Individual<'static>), Error> {
        debug!("Loading cached property {}{}", interface_name, path);
        let key = property_key(interface_name, path)?;
        let stored = self.prop_storage.find_alloc(&key)?;
        parse_property(&stored).inspect_err(|err| {
            error!("Could not parse data from storage: {}", *err);
        })
    }

    /// Remove a cached property. Removing a missing property succeeds.
    pub fn delete_property(&self, interface_name: &str, path: &str) -> Result<(), Error> {
        debug!("Deleting cached property {}{}", interface_name, path);
        let key = property_key(interface_name, path)?;
        match self.prop_storage.delete(&key) {
            Ok(()) | Err(Error::NotFound) => Ok(()),
            Err(err) => {
                error!("Error deleting cached property: {}", err);
                Err(err)
            }
        }
    }

    /// Start iterating over the cached properties.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no property is cached.
    pub fn property_iter(&self) -> Result<PropertyIter<'_, 'j, J>, Error> {
        PropertyIter::new(self)
    }

    /// Delete the properties of interfaces missing from `introspection`.
    ///
    /// Returns the number of deleted properties.
    pub fn purge_orphaned_properties(&self, introspection: &Introspection) -> Result<usize, Error> {
        let mut purged = 0;
        self.for_each_property(|interface_name, path| {
            if introspection.get(interface_name).is_none() {
                debug!("Purging property from unknown interface {}{}", interface_name, path);
                self.delete_property(interface_name, path)?;
                purged += 1;
            }
            Ok(())
        })?;
        Ok(purged)
    }

    /// Render the cached device owned properties of `introspection` as
    /// `<interface><path>` entries separated by `;`.
    ///
    /// The cache is left untouched: properties of unknown interfaces are
    /// skipped.
    pub fn device_owned_properties_string(
        &self,
        introspection: &Introspection,
    ) -> Result<String, Error> {
        let mut output = String::new();
        self.for_each_property(|interface_name, path| {
            if is_device_owned(introspection, interface_name) {
                append_property(&mut output, interface_name, path)?;
            }
            Ok(())
        })?;
        Ok(output)
    }

    /// Render the device owned properties string like
    /// [`Cache::device_owned_properties_string`], deleting on the way the
    /// properties of interfaces missing from `introspection`.
    ///
    /// This is [`Cache::purge_orphaned_properties`] and the rendering in a
    /// single pass.
    pub fn get_device_owned_properties_string(
        &self,
        introspection: &Introspection,
    ) -> Result<String, Error> {
        let mut output = String::new();
        self.for_each_property(|interface_name, path| {
            match introspection.get(interface_name) {
                None => {
                    debug!("Purging property from unknown interface {}{}", interface_name, path);
                    self.delete_property(interface_name, path)?;
                }
                Some(interface) if interface.ownership == Ownership::Device => {
                    append_property(&mut output, interface_name, path)?;
                }
                Some(_) => {}
            }
            Ok(())
        })?;
        Ok(output)
    }

    /// Delete the server owned properties missing from `allow_list`, a `;`
    /// separated list of `<interface><path>` entries.
    ///
    /// Properties of interfaces missing from `introspection` are deleted too.
    /// Returns the number of deleted properties.
    pub fn purge_server_properties(
        &self,
        introspection: &Introspection,
        allow_list: &str,
    ) -> Result<usize, Error> {
        let allowed: Vec<&str> = allow_list
            .split(LIST_SEPARATOR)
            .filter(|entry| !entry.is_empty())
            .collect();

        let mut purged = 0;
        self.for_each_property(|interface_name, path| {
            let Some(interface) = introspection.get(interface_name) else {
                debug!("Purging property from unknown interface {}{}", interface_name, path);
                self.delete_property(interface_name, path)?;
                purged += 1;
                return Ok(());
            };
            if interface.ownership != Ownership::Server {
                return Ok(());
            }
            let listed = allowed.iter().any(|entry| {
                entry.len() == interface_name.len() + path.len()
                    && entry.starts_with(interface_name)
                    && entry.ends_with(path)
            });
            if !listed {
                debug!("Purging property not in allow list {}{}", interface_name, path);
                self.delete_property(interface_name, path)?;
                purged += 1;
            }
            Ok(())
        })?;
        Ok(purged)
    }

    /// Call `f` with the interface name and path of every cached property.
    ///
    /// `f` may delete the property it is called for: the iteration goes from
    /// the last pair to the first, and a deletion only moves an already
    /// visited pair.
    pub(crate) fn for_each_property<F>(&self, mut f: F) -> Result<(), Error>
    where
        F: FnMut(&str, &str) -> Result<(), Error>,
    {
        let mut iter = match self.property_iter() {
            Ok(iter) => iter,
            Err(Error::NotFound) => return Ok(()),
            Err(err) => {
                error!("Properties iterator init failed: {}", err);
                return Err(err);
            }
        };
        loop {
            let (interface_name, path) = iter.get()?;
            f(&interface_name, &path)?;
            match iter.advance() {
                Ok(()) => {}
                Err(Error::NotFound) => return Ok(()),
                Err(err) => {
                    error!("Properties iterator error: {}", err);
                    return Err(err);
                }
            }
        }
    }
}

/// Cursor over the cached properties, created by [`Cache::property_iter`].
#[derive(Debug)]
pub struct PropertyIter<'s, 'j, J: Journal> {
    inner: KvIter<'s, 'j, J>,
}

impl<'s, 'j, J: Journal> PropertyIter<'s, 'j, J> {
    pub fn new(cache: &'s Cache<'j, J>) -> Result<Self, Error> {
        Ok(Self {
            inner: cache.prop_storage.iter()?,
        })
    }

    /// Move to the next property.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] once every property has been visited.
    pub fn advance(&mut self) -> Result<(), Error> {
        self.inner.advance()
    }

    /// Interface name and path of the current property.
    pub fn get(&self) -> Result<(String, String), Error> {
        let key = self.inner.key()?;
        let Some((interface_name, path)) = key.split_once(KEY_SEPARATOR) else {
            error!("Cached property key {} has no separator", key.as_str());
            return Err(Error::InternalError);
        };
        Ok((String::from(interface_name), String::from(path)))
    }
}

fn property_key(interface_name: &str, path: &str) -> Result<String, Error> {
    let mut key = String::new();
    key.try_reserve_exact(interface_name.len() + 1 + path.len())
        .map_err(|_| Error::OutOfMemory)?;
    key.push_str(interface_name);
    key.push(KEY_SEPARATOR);
    key.push_str(path);
    Ok(key)
}

fn parse_property(stored: &[u8]) -> Result<(u32, Individual<'static>), Error> {
    let document = Document::new(stored)?;
    let field = |name: &str| {
        document.lookup(name).map_err(|err| {
            error!("Cannot parse the {} field of a cached property", name);
            match err {
                Error::NotFound => Error::DocumentMalformed,
                err => err,
            }
        })
    };
    let major = field("major")?.as_int32()? as u32;
    let mapping_type = MappingType::try_from(field("type")?.as_int64()?)?;
    let data = field("data")?;
    let value = Individual::deserialize(&data, mapping_type)?;
    Ok((major, value.into_owned()))
}

fn is_device_owned(introspection: &Introspection, interface_name: &str) -> bool {
    introspection
        .get(interface_name)
        .is_some_and(|interface| interface.ownership == Ownership::Device)
}

fn append_property(output: &mut String, interface_name: &str, path: &str) -> Result<(), Error> {
    output
        .try_reserve(1 + interface_name.len() + path.len())
        .map_err(|_| Error::OutOfMemory)?;
    if !output.is_empty() {
        output.push(LIST_SEPARATOR);
    }
    output.push_str(interface_name);
    output.push_str(path);
    Ok(())
}
