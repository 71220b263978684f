//! Synchronization with Astarte after an MQTT connection.
//!
//! A full handshake subscribes to the server owned interfaces, announces the
//! introspection, asks Astarte to empty its cache and replays the device
//! owned properties. It is skipped when the broker resumed the previous
//! session, the previous handshake completed and the introspection did not
//! change since.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::{
    CONSUMER_PROPERTIES_SUFFIX, Device, EMPTY_CACHE_SUFFIX, PRODUCER_PROPERTIES_SUFFIX, Publish,
    Subscribe, join,
};
use crate::caching::Cache;
use crate::error::Error;
use crate::interface::{Ownership, Validate};
use crate::network::mqtt::QoS;
use crate::storage::journal::Journal;

impl<'a, J: Journal, V: Validate> Device<'a, J, V> {
    /// Topic filters the device subscribes to: the consumer properties
    /// control topic and one wildcard per server owned interface.
    pub fn subscriptions(&self) -> Result<Vec<String>, Error> {
        let mut topics = Vec::new();
        topics.push(self.control_topic(CONSUMER_PROPERTIES_SUFFIX)?);
        for interface in self.introspection.iter() {
            if interface.ownership == Ownership::Server {
                topics.push(join(&[&self.base_topic, "/", &interface.name, "/#"])?);
            }
        }
        Ok(topics)
    }

    /// Run the first half of the handshake.
    ///
    /// Returns `false` when the handshake was skipped. Once the transport
    /// has delivered every message, call [`Device::complete_handshake`]; on
    /// any failure call [`Device::fail_handshake`] and retry later.
    pub fn start_handshake<T: Publish + Subscribe + ?Sized>(
        &self,
        transport: &mut T,
        session_present: bool,
    ) -> Result<bool, Error> {
        let introspection = self.introspection.to_string();

        if session_present && self.synchronized {
            let unchanged = match &self.cache {
                Some(cache) => cache.introspection_check(&introspection).is_ok(),
                None => true,
            };
            if unchanged {
                debug!("Session resumed, skipping the handshake");
                return Ok(false);
            }
        }

        for topic in self.subscriptions()? {
            debug!("Subscribing to: {}", topic.as_str());
            transport.subscribe(&topic, QoS::ExactlyOnce)?;
        }

        debug!("Publishing introspection: {}", introspection.as_str());
        transport.publish(&self.base_topic, introspection.as_bytes(), QoS::ExactlyOnce)?;

        let empty_cache = self.control_topic(EMPTY_CACHE_SUFFIX)?;
        debug!("Sending emptyCache to {}", empty_cache.as_str());
        transport.publish(&empty_cache, b"1", QoS::ExactlyOnce)?;

        if let Some(cache) = &self.cache {
            self.send_purge_device_properties(transport, cache)?;
            self.send_device_owned_properties(transport, cache)?;
        }
        Ok(true)
    }

    /// Mark the device as synchronized and persist the introspection that
    /// was announced.
    ///
    /// Cache failures are logged: the device is synchronized regardless.
    pub fn complete_handshake(&mut self) {
        debug!("Device synchronization completed");
        self.synchronized = true;
        let Some(cache) = &self.cache else {
            return;
        };

        if let Err(err) = cache.synchronization_set(true) {
            error!("Synchronization state set failure {}", err);
        }

        let introspection = self.introspection.to_string();
        let updated = match cache.introspection_check(&introspection) {
            Err(Error::OutdatedIntrospection) => {
                debug!("Introspection requires updating");
                cache.introspection_store(&introspection)
            }
            checked => checked,
        };
        if let Err(err) = updated {
            debug!("Introspection update failed: {}", err);
        }
    }

    /// Forget a completed synchronization so the next handshake is a full
    /// one.
    pub fn fail_handshake(&mut self) {
        if !self.synchronized {
            return;
        }
        self.synchronized = false;
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.synchronization_set(false) {
                error!("Synchronization state set failure {}", err);
            }
        }
    }

    /// Tell Astarte which device owned properties are still set.
    ///
    /// Properties of interfaces no longer in the introspection are purged
    /// from the cache on the way.
    fn send_purge_device_properties<T: Publish + ?Sized>(
        &self,
        transport: &mut T,
        cache: &Cache<'a, J>,
    ) -> Result<(), Error> {
        let properties = cache
            .get_device_owned_properties_string(&self.introspection)
            .inspect_err(|err| error!("Error getting cached properties string: {}", *err))?;

        let Some(compressor) = self.compressor else {
            warn!("No compressor configured, device properties purge not sent");
            return Ok(());
        };
        let size = u32::try_from(properties.len()).map_err(|_| Error::InvalidParameter)?;
        let compressed = compressor.compress(properties.as_bytes()).inspect_err(|err| {
            error!("Error compressing the purge properties message {}", *err);
        })?;

        let mut payload = Vec::new();
        payload
            .try_reserve_exact(4 + compressed.len())
            .map_err(|_| Error::OutOfMemory)?;
        payload.extend_from_slice(&size.to_be_bytes());
        payload.extend_from_slice(&compressed);

        let topic = self.control_topic(PRODUCER_PROPERTIES_SUFFIX)?;
        info!(
            "Sending purge properties to: '{}', with uncompressed content: '{}'",
            topic.as_str(),
            properties.as_str()
        );
        transport.publish(&topic, &payload, QoS::ExactlyOnce)
    }

    /// Replay the cached device owned properties.
    ///
    /// Properties cached for another major version of their interface are
    /// dropped instead.
    fn send_device_owned_properties<T: Publish + ?Sized>(
        &self,
        transport: &mut T,
        cache: &Cache<'a, J>,
    ) -> Result<(), Error> {
        cache.for_each_property(|interface_name, path| {
            let (major, value) = cache.load_property(interface_name, path)?;
            match self.introspection.get(interface_name) {
                Some(interface) if interface.major_version == major => {
                    if interface.ownership == Ownership::Device {
                        if let Err(err) =
                            self.stream_individual(transport, interface_name, path, &value, None)
                        {
                            error!("Failed sending cached property: {}", err);
                        }
                    }
                }
                _ => {
                    debug!("Removing property from storage: '{}{}'", interface_name, path);
                    cache.delete_property(interface_name, path)?;
                }
            }
            Ok(())
        })
    }
}
