//! Data reception.

use alloc::string::String;
use alloc::vec::Vec;

use super::{CONSUMER_PROPERTIES_SUFFIX, CONTROL_SUFFIX, Device, Event};
use crate::bson::{Document, check_validity};
use crate::data::Individual;
use crate::data::object::deserialize_entries;
use crate::error::Error;
use crate::interface::{Aggregation, Interface, Validate};
use crate::storage::journal::Journal;

/// Size of the big endian uncompressed length leading a properties message.
const UNCOMPRESSED_SIZE_LEN: usize = 4;

impl<'a, J: Journal, V: Validate> Device<'a, J, V> {
    /// Route a message received on `topic`.
    ///
    /// Data messages are validated against the introspection and returned
    /// as an [`Event`]. Server property sets and unsets are applied to the
    /// cache first; a caching failure is logged and the event is still
    /// returned. Control messages are handled internally and yield
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if the topic does not belong to the
    ///   device or has no interface and path
    /// - [`Error::InterfaceNotFound`] if the interface is not in the
    ///   introspection
    /// - [`Error::DocumentMalformed`] if the payload is not a valid document
    ///   with a `v` element
    /// - any deserialization or validation error for the value
    pub fn on_incoming<'p>(
        &self,
        topic: &'p str,
        payload: &'p [u8],
    ) -> Result<Option<Event<'p>>, Error> {
        let Some(rest) = topic.strip_prefix(self.base_topic.as_str()) else {
            error!("Incoming message topic doesn't begin with <REALM>/<DEVICE ID>: {}", topic);
            return Err(Error::InvalidParameter);
        };

        let is_control = rest
            .strip_prefix(CONTROL_SUFFIX)
            .is_some_and(|tail| tail.is_empty() || tail.starts_with('/'));
        if is_control {
            debug!("Received control message on control topic {}", topic);
            self.on_control_message(rest, payload)?;
            return Ok(None);
        }

        let Some(rest) = rest.strip_prefix('/') else {
            error!("Missing '/' after base topic, can't find interface in topic: {}", topic);
            return Err(Error::InvalidParameter);
        };
        let Some(separator) = rest.find('/') else {
            error!("Missing '/' after interface name, can't find path in topic: {}", topic);
            return Err(Error::InvalidParameter);
        };
        let (interface_name, path) = rest.split_at(separator);

        self.on_data_message(interface_name, path, payload).map(Some)
    }

    fn on_control_message(&self, suffix: &str, payload: &[u8]) -> Result<(), Error> {
        if suffix != CONSUMER_PROPERTIES_SUFFIX {
            error!("Received unrecognized control message: {}", suffix);
            return Ok(());
        }
        let Some(cache) = &self.cache else {
            debug!("No cache, ignoring the purge properties message");
            return Ok(());
        };

        let allow_list = self.decompress_allow_list(payload)?;
        debug!("Received purge properties: '{}'", allow_list.as_str());
        let purged = cache.purge_server_properties(&self.introspection, &allow_list)?;
        debug!("Purged {} server properties", purged);
        Ok(())
    }

    /// Extract the `;` separated property list from a consumer properties
    /// message: a big endian `u32` uncompressed size followed by zlib data.
    fn decompress_allow_list(&self, payload: &[u8]) -> Result<String, Error> {
        let Some((size, compressed)) = payload.split_first_chunk::<UNCOMPRESSED_SIZE_LEN>() else {
            error!("Purge properties message too short: {} bytes", payload.len());
            return Err(Error::InvalidParameter);
        };
        let size = u32::from_be_bytes(*size) as usize;
        if size == 0 {
            return Ok(String::new());
        }

        let Some(decompressor) = self.decompressor else {
            error!("Received compressed purge properties without a decompressor");
            return Err(Error::InvalidParameter);
        };
        let decompressed: Vec<u8> = decompressor.decompress(compressed, size).inspect_err(|err| {
            error!("Decompression error {}", *err);
        })?;
        String::from_utf8(decompressed).map_err(|_| {
            error!("Purge properties message is not valid UTF-8");
            Error::InvalidParameter
        })
    }

    fn on_data_message<'p>(
        &self,
        interface_name: &'p str,
        path: &'p str,
        payload: &'p [u8],
    ) -> Result<Event<'p>, Error> {
        let interface = self.interface(interface_name)?;

        if interface.is_property() && payload.is_empty() {
            return self.on_unset_property(interface, interface_name, path);
        }

        if !check_validity(payload) {
            error!("Invalid BSON document in data");
            return Err(Error::DocumentMalformed);
        }
        let document = Document::new(payload)?;
        let v = document.lookup("v").map_err(|_| {
            error!("Cannot retrieve BSON value from data");
            Error::DocumentMalformed
        })?;

        if interface.aggregation == Aggregation::Object {
            let entries = deserialize_entries(&v, interface, path).inspect_err(|_| {
                error!("Failed in parsing the received BSON file. Interface: {}, path: {}", interface_name, path);
            })?;
            tolerate_missing_timestamp(
                self.validator.validate_aggregate(interface, path, &entries, None),
            )?;
            return Ok(Event::DatastreamObject {
                interface_name,
                path,
                entries,
            });
        }

        let mapping = interface.mapping_for_path(path).inspect_err(|_| {
            error!("Could not find received mapping in interface {}", interface_name);
        })?;
        let value = Individual::deserialize(&v, mapping.mapping_type).inspect_err(|_| {
            error!("Failed in parsing the received BSON file. Interface: {}, path: {}", interface_name, path);
        })?;

        if interface.is_property() {
            self.on_set_property(interface, interface_name, path, value)
        } else {
            tolerate_missing_timestamp(
                self.validator.validate_individual(interface, path, &value, None),
            )?;
            Ok(Event::DatastreamIndividual {
                interface_name,
                path,
                value,
            })
        }
    }

    fn on_unset_property<'p>(
        &self,
        interface: &Interface,
        interface_name: &'p str,
        path: &'p str,
    ) -> Result<Event<'p>, Error> {
        self.validator
            .validate_property_unset(interface, path)
            .inspect_err(|err| error!("Server property unset is invalid: {}", *err))?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.delete_property(interface_name, path) {
                error!("Failed deleting the stored server property: {}", err);
            }
        }

        Ok(Event::PropertyUnset {
            interface_name,
            path,
        })
    }

    fn on_set_property<'p>(
        &self,
        interface: &Interface,
        interface_name: &'p str,
        path: &'p str,
        value: Individual<'p>,
    ) -> Result<Event<'p>, Error> {
        self.validator
            .validate_property_set(interface, path, &value)
            .inspect_err(|_| error!("Server property data validation failed"))?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store_property(interface_name, path, interface.major_version, &value) {
                error!("Failed storing the server property: {}", err);
            }
        }

        Ok(Event::PropertySet {
            interface_name,
            path,
            value,
        })
    }
}

/// Astarte does not forward the explicit timestamp of server datastreams.
fn tolerate_missing_timestamp(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(Error::ExplicitTimestampRequired) => {
            warn!("Received a datastream with missing explicit timestamp");
            Ok(())
        }
        result => {
            if result.is_err() {
                error!("Server datastream data validation failed");
            }
            result
        }
    }
}
