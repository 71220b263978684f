//! Data transmission.

use super::{Device, Publish};
use crate::bson::Serializer;
use crate::data::object::serialize_entries;
use crate::data::{Individual, ObjectEntry};
use crate::error::Error;
use crate::interface::Validate;
use crate::network::mqtt::QoS;
use crate::storage::journal::Journal;

impl<'a, J: Journal, V: Validate> Device<'a, J, V> {
    /// Send a value on an individual interface.
    ///
    /// # Arguments
    ///
    /// * `publisher` - MQTT transport
    /// * `interface_name` - Interface of the value, part of the introspection
    /// * `path` - Mapping path, starting with `/`
    /// * `value` - Value to send
    /// * `timestamp` - Explicit timestamp in milliseconds since the epoch,
    ///   required by mappings with `explicit_timestamp`
    ///
    /// # Errors
    ///
    /// - [`Error::InterfaceNotFound`] if the interface is not in the
    ///   introspection
    /// - any validation error for the value or the timestamp
    /// - [`Error::Publish`] if the transport fails
    pub fn stream_individual<P: Publish + ?Sized>(
        &self,
        publisher: &mut P,
        interface_name: &str,
        path: &str,
        value: &Individual<'_>,
        timestamp: Option<i64>,
    ) -> Result<(), Error> {
        let interface = self.interface(interface_name)?;
        self.validator
            .validate_individual(interface, path, value, timestamp)
            .inspect_err(|_| error!("Device individual data validation failed"))?;
        let qos = interface.qos(path)?;

        let mut ser = Serializer::new();
        value.serialize(&mut ser, "v");
        if let Some(timestamp) = timestamp {
            ser.append_datetime("t", timestamp);
        }
        let payload = ser.finish().inspect_err(|_| {
            error!("BSON document is too long for MQTT publish ({}{})", interface_name, path);
        })?;

        self.publish_data(publisher, interface_name, path, &payload, qos)
    }

    /// Send an object on an object aggregated interface.
    ///
    /// `entries` must hold one value per mapping of the interface, each named
    /// after the last segment of its mapping endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::IncompleteAggregationObject`] if the number of entries
    ///   differs from the number of mappings
    /// - the errors of [`Device::stream_individual`]
    pub fn stream_aggregated<P: Publish + ?Sized>(
        &self,
        publisher: &mut P,
        interface_name: &str,
        path: &str,
        entries: &[ObjectEntry<'_>],
        timestamp: Option<i64>,
    ) -> Result<(), Error> {
        let interface = self.interface(interface_name)?;
        if interface.mappings.len() != entries.len() {
            error!("Incomplete aggregated datastream ({}{})", interface_name, path);
            return Err(Error::IncompleteAggregationObject);
        }
        self.validator
            .validate_aggregate(interface, path, entries, timestamp)
            .inspect_err(|_| error!("Device aggregated data validation failed"))?;
        let qos = interface.qos(path)?;

        let mut inner = Serializer::new();
        serialize_entries(&mut inner, entries);
        let inner = inner.finish()?;

        let mut outer = Serializer::new();
        outer.append_document("v", &inner);
        if let Some(timestamp) = timestamp {
            outer.append_datetime("t", timestamp);
        }
        let payload = outer.finish().inspect_err(|_| {
            error!("BSON document is too long for MQTT publish ({}{})", interface_name, path);
        })?;

        self.publish_data(publisher, interface_name, path, &payload, qos)
    }

    /// Set a device owned property.
    ///
    /// The value is cached before being sent. A caching failure is logged and
    /// does not prevent the transmission.
    pub fn set_property<P: Publish + ?Sized>(
        &self,
        publisher: &mut P,
        interface_name: &str,
        path: &str,
        value: &Individual<'_>,
    ) -> Result<(), Error> {
        let interface = self.interface(interface_name)?;
        self.validator
            .validate_property_set(interface, path, value)
            .inspect_err(|_| error!("Property data validation failed"))?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store_property(interface_name, path, interface.major_version, value) {
                error!("Failed storing the property: {}", err);
            }
        }

        self.stream_individual(publisher, interface_name, path, value, None)
    }

    /// Unset a device owned property, sending an empty payload at QoS 2.
    pub fn unset_property<P: Publish + ?Sized>(
        &self,
        publisher: &mut P,
        interface_name: &str,
        path: &str,
    ) -> Result<(), Error> {
        let interface = self.interface(interface_name)?;
        self.validator
            .validate_property_unset(interface, path)
            .inspect_err(|_| error!("Device property unset failed"))?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.delete_property(interface_name, path) {
                error!("Failed deleting the stored property: {}", err);
            }
        }

        self.publish_data(publisher, interface_name, path, &[], QoS::ExactlyOnce)
    }

    fn publish_data<P: Publish + ?Sized>(
        &self,
        publisher: &mut P,
        interface_name: &str,
        path: &str,
        payload: &[u8],
        qos: QoS,
    ) -> Result<(), Error> {
        let topic = self.data_topic(interface_name, path)?;
        trace!("Publishing {} bytes on {}", payload.len(), topic.as_str());
        publisher.publish(&topic, payload, qos)
    }
}
