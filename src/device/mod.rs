//! # Device message glue
//!
//! A [`Device`] turns typed values into the MQTT messages Astarte expects
//! and routes the messages Astarte sends back. It owns the device
//! [`Introspection`] and, when persistent storage is available, the property
//! [`Cache`].
//!
//! Topics are built from the realm and the device id:
//!
//! | Topic                                       | Use                          |
//! |---------------------------------------------|------------------------------|
//! | `<realm>/<id>`                              | introspection                |
//! | `<realm>/<id>/<interface><path>`            | data, both directions        |
//! | `<realm>/<id>/control/emptyCache`           | sent on full handshakes      |
//! | `<realm>/<id>/control/producer/properties`  | device properties still set  |
//! | `<realm>/<id>/control/consumer/properties`  | server properties still set  |
//!
//! Data payloads are binary documents `{ v: <value>, t: <datetime> }` where
//! `t` is only present for explicit timestamps. An empty payload on a
//! properties interface unsets the property.
//!
//! The device does not own the MQTT client. Every sending operation takes
//! the transport as a [`Publish`] (and [`Subscribe`] for the handshake)
//! implementation, which the bundled [`Client`] provides.

#![allow(missing_docs)]
#![deny(unsafe_code)]

use alloc::string::String;
use alloc::vec::Vec;

use crate::caching::Cache;
use crate::data::{Individual, ObjectEntry};
use crate::error::Error;
use crate::interface::{Interface, Introspection, MappingValidator, Validate};
use crate::network::Connection;
use crate::network::mqtt::{Client, QoS};
use crate::storage::journal::Journal;

mod handshake;
mod rx;
mod tx;


const CONTROL_SUFFIX: &str = "/control";
const EMPTY_CACHE_SUFFIX: &str = "/control/emptyCache";
const CONSUMER_PROPERTIES_SUFFIX: &str = "/control/consumer/properties";
const PRODUCER_PROPERTIES_SUFFIX: &str = "/control/producer/properties";

/// Publishing side of the MQTT transport.
pub trait Publish {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Error>;
}

/// Subscribing side of the MQTT transport.
pub trait Subscribe {
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error>;
}

impl<C: Connection> Publish for Client<C> {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Error> {
        Client::publish(self, topic, payload, qos).map_err(|err| {
            error!("Failed publishing on {}: {}", topic, err.as_str());
            Error::Publish
        })
    }
}

impl<C: Connection> Subscribe for Client<C> {
    fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        Client::subscribe(self, topic, qos).map_err(|err| {
            error!("Failed subscribing to {}: {}", topic, err.as_str());
            Error::Publish
        })
    }
}

/// Compression of the producer properties message.
pub trait Compress {
    /// Compress `input` with zlib.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Decompression of the consumer properties message.
pub trait Decompress {
    /// Inflate zlib `input` whose uncompressed size is `size`.
    fn decompress(&self, input: &[u8], size: usize) -> Result<Vec<u8>, Error>;
}

/// Identity of the device on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig<'a> {
    pub realm: &'a str,
    pub device_id: &'a str,
}

/// A message received from Astarte.
///
/// Names, paths and values borrow the topic and payload they were parsed
/// from.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<'p> {
    PropertySet {
        interface_name: &'p str,
        path: &'p str,
        value: Individual<'p>,
    },
    PropertyUnset {
        interface_name: &'p str,
        path: &'p str,
    },
    DatastreamIndividual {
        interface_name: &'p str,
        path: &'p str,
        value: Individual<'p>,
    },
    DatastreamObject {
        interface_name: &'p str,
        path: &'p str,
        entries: Vec<ObjectEntry<'p>>,
    },
}

/// An Astarte device.
pub struct Device<'a, J: Journal, V: Validate = MappingValidator> {
    base_topic: String,
    introspection: Introspection,
    validator: V,
    cache: Option<Cache<'a, J>>,
    compressor: Option<&'a dyn Compress>,
    decompressor: Option<&'a dyn Decompress>,
    synchronized: bool,
}

impl<J: Journal, V: Validate> core::fmt::Debug for Device<'_, J, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Device")
            .field("base_topic", &self.base_topic)
            .field("introspection", &self.introspection)
            .field("cached", &self.cache.is_some())
            .field("compression", &self.compressor.is_some())
            .field("synchronized", &self.synchronized)
            .finish()
    }
}

impl<'a, J: Journal> Device<'a, J> {
    /// Create a device without persistent storage.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if the realm or the device id is empty or
    /// contains a `/`.
    pub fn new(config: DeviceConfig<'_>, introspection: Introspection) -> Result<Self, Error> {
        for part in [config.realm, config.device_id] {
            if part.is_empty() || part.contains('/') {
                error!("Invalid realm or device id: {}", part);
                return Err(Error::InvalidParameter);
            }
        }
        let base_topic = join(&[config.realm, "/", config.device_id])?;
        debug!("Device base topic {}", base_topic.as_str());

        Ok(Self {
            base_topic,
            introspection,
            validator: MappingValidator,
            cache: None,
            compressor: None,
            decompressor: None,
            synchronized: false,
        })
    }
}

impl<'a, J: Journal, V: Validate> Device<'a, J, V> {
    /// Attach persistent storage.
    ///
    /// The synchronization status is read back from the cache; a device that
    /// never completed a handshake starts unsynchronized.
    pub fn with_cache(mut self, cache: Cache<'a, J>) -> Result<Self, Error> {
        self.synchronized = match cache.synchronization_get() {
            Ok(synchronized) => synchronized,
            Err(Error::NotFound) => false,
            Err(err) => {
                error!("Synchronization state getter failure {}", err);
                return Err(err);
            }
        };
        self.cache = Some(cache);
        Ok(self)
    }

    /// Use `codec` for the compressed properties control messages.
    pub fn with_compression<C: Compress + Decompress>(mut self, codec: &'a C) -> Self {
        self.compressor = Some(codec);
        self.decompressor = Some(codec);
        self
    }

    /// Replace the validator applied to sent and received data.
    pub fn with_validator<W: Validate>(self, validator: W) -> Device<'a, J, W> {
        Device {
            base_topic: self.base_topic,
            introspection: self.introspection,
            validator,
            cache: self.cache,
            compressor: self.compressor,
            decompressor: self.decompressor,
            synchronized: self.synchronized,
        }
    }

    pub fn introspection(&self) -> &Introspection {
        &self.introspection
    }

    /// Mutable access to the introspection.
    ///
    /// Changes are announced to Astarte on the next full handshake.
    pub fn introspection_mut(&mut self) -> &mut Introspection {
        &mut self.introspection
    }

    pub fn cache(&self) -> Option<&Cache<'a, J>> {
        self.cache.as_ref()
    }

    /// `<realm>/<device id>`
    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    /// Whether the last handshake with Astarte completed.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Topic of the data of `interface_name` at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if `path` does not start with `/`.
    pub fn data_topic(&self, interface_name: &str, path: &str) -> Result<String, Error> {
        if !path.starts_with('/') {
            error!("Invalid path: {} (must be start with /)", path);
            return Err(Error::InvalidParameter);
        }
        join(&[&self.base_topic, "/", interface_name, path])
    }

    fn control_topic(&self, suffix: &str) -> Result<String, Error> {
        join(&[&self.base_topic, suffix])
    }

    fn interface(&self, interface_name: &str) -> Result<&Interface, Error> {
        self.introspection.get(interface_name).ok_or_else(|| {
            error!("Couldn't find interface in device introspection ({})", interface_name);
            Error::InterfaceNotFound
        })
    }
}

fn join(parts: &[&str]) -> Result<String, Error> {
    let mut joined = String::new();
    joined
        .try_reserve_exact(parts.iter().map(|part| part.len()).sum())
        .map_err(|_| Error::OutOfMemory)?;
    for part in parts {
        joined.push_str(part);
    }
    Ok(joined)
}
