//! # Interface definitions
//!
//! An [`Interface`] describes a named, versioned set of [`Mapping`]s. Each
//! mapping binds an endpoint pattern such as `/%{sensor_id}/value` to a
//! [`MappingType`] and to the delivery guarantees used when publishing.
//!
//! Interfaces are usually loaded from their JSON definition with
//! [`Interface::from_json`]:
//!
//! ```rust
//! use astarte_device_store::interface::{Interface, Ownership, InterfaceType};
//!
//! let json = r#"{
//!     "interface_name": "org.example.Sensors",
//!     "version_major": 1,
//!     "version_minor": 0,
//!     "type": "datastream",
//!     "ownership": "device",
//!     "mappings": [
//!         { "endpoint": "/%{sensor_id}/value", "type": "double", "explicit_timestamp": true }
//!     ]
//! }"#;
//!
//! let interface = Interface::from_json(json).unwrap();
//! assert_eq!(interface.ownership, Ownership::Device);
//! assert_eq!(interface.interface_type, InterfaceType::Datastream);
//! assert!(interface.mapping_for_path("/living_room/value").is_ok());
//! assert!(interface.mapping_for_path("/living_room/unit").is_err());
//! ```
//!
//! The interfaces a device declares form its [`Introspection`]. Values are
//! checked against their mapping by a [`Validate`] implementation before
//! they are sent and after they are received.

#![allow(missing_docs)]
#![deny(unsafe_code)]

use alloc::string::String;
use alloc::vec::Vec;

use serde::Deserialize;

use crate::data::MappingType;
use crate::error::Error;
use crate::network::mqtt::QoS;

pub mod introspection;
pub mod validation;


pub use introspection::Introspection;
pub use validation::{MappingValidator, Validate};

/// Upper bound on the number of mappings accepted from a JSON definition.
pub const MAX_INTERFACE_MAPPINGS: usize = 64;

/// Which side of the connection may write the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ownership {
    Device,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Datastream,
    Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Individual,
    Object,
}

/// Delivery guarantee of a mapping, mapped one to one on MQTT QoS levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    #[default]
    Unreliable,
    Guaranteed,
    Unique,
}

impl From<Reliability> for QoS {
    fn from(reliability: Reliability) -> Self {
        match reliability {
            Reliability::Unreliable => QoS::AtMostOnce,
            Reliability::Guaranteed => QoS::AtLeastOnce,
            Reliability::Unique => QoS::ExactlyOnce,
        }
    }
}

/// A single endpoint of an interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    /// Endpoint pattern, `%{name}` segments match any non-empty segment.
    pub endpoint: String,
    pub mapping_type: MappingType,
    pub reliability: Reliability,
    /// Whether values must carry an explicit timestamp.
    pub explicit_timestamp: bool,
    /// Whether the property may be unset.
    pub allow_unset: bool,
}

impl Mapping {
    /// Create a mapping with unreliable delivery, no explicit timestamp and
    /// unset disallowed.
    pub fn new(endpoint: &str, mapping_type: MappingType) -> Self {
        Self {
            endpoint: String::from(endpoint),
            mapping_type,
            reliability: Reliability::Unreliable,
            explicit_timestamp: false,
            allow_unset: false,
        }
    }

    pub fn with_reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn with_explicit_timestamp(mut self, explicit_timestamp: bool) -> Self {
        self.explicit_timestamp = explicit_timestamp;
        self
    }

    pub fn with_allow_unset(mut self, allow_unset: bool) -> Self {
        self.allow_unset = allow_unset;
        self
    }

    /// Check whether `path` matches the endpoint pattern.
    ///
    /// Both must start with `/` and have the same number of segments. A
    /// parametric segment matches any non-empty segment, every other
    /// segment must match exactly.
    pub fn matches(&self, path: &str) -> bool {
        let (Some(endpoint), Some(path)) =
            (self.endpoint.strip_prefix('/'), path.strip_prefix('/'))
        else {
            return false;
        };
        let mut pattern = endpoint.split('/');
        let mut segments = path.split('/');
        loop {
            match (pattern.next(), segments.next()) {
                (None, None) => return true,
                (Some(p), Some(s)) => {
                    let parametric = p.starts_with("%{") && p.ends_with('}');
                    if s.is_empty() || (!parametric && p != s) {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
}

/// A versioned Astarte interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub ownership: Ownership,
    pub interface_type: InterfaceType,
    pub aggregation: Aggregation,
    pub mappings: Vec<Mapping>,
}

#[derive(Deserialize)]
struct InterfaceJson<'a> {
    #[serde(borrow)]
    interface_name: &'a str,
    version_major: u32,
    version_minor: u32,
    #[serde(rename = "type")]
    interface_type: InterfaceType,
    ownership: Ownership,
    #[serde(default)]
    aggregation: Aggregation,
    #[serde(borrow)]
    mappings: heapless::Vec<MappingJson<'a>, MAX_INTERFACE_MAPPINGS>,
}

#[derive(Deserialize)]
struct MappingJson<'a> {
    #[serde(borrow)]
    endpoint: &'a str,
    #[serde(rename = "type")]
    mapping_type: MappingType,
    #[serde(default)]
    reliability: Reliability,
    #[serde(default)]
    explicit_timestamp: bool,
    #[serde(default)]
    allow_unset: bool,
}

impl Interface {
    /// Parse an interface from its JSON definition.
    ///
    /// Unknown fields such as `doc` or `description` are ignored. Strings
    /// containing JSON escape sequences are not supported.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] if the JSON cannot be parsed, or if the
    /// resulting interface fails [`Interface::validate`].
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let (parsed, _) = serde_json_core::from_str::<InterfaceJson<'_>>(json).map_err(|_| {
            error!("Could not parse the interface definition");
            Error::InvalidParameter
        })?;

        let mut mappings = Vec::new();
        mappings
            .try_reserve(parsed.mappings.len())
            .map_err(|_| Error::OutOfMemory)?;
        for mapping in parsed.mappings.iter() {
            mappings.push(Mapping {
                endpoint: String::from(mapping.endpoint),
                mapping_type: mapping.mapping_type,
                reliability: mapping.reliability,
                explicit_timestamp: mapping.explicit_timestamp,
                allow_unset: mapping.allow_unset,
            });
        }

        let interface = Interface {
            name: String::from(parsed.interface_name),
            major_version: parsed.version_major,
            minor_version: parsed.version_minor,
            ownership: parsed.ownership,
            interface_type: parsed.interface_type,
            aggregation: parsed.aggregation,
            mappings,
        };
        interface.validate()?;
        Ok(interface)
    }

    /// Check the interface can be added to an introspection.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameter`] for an empty name or for a `0.0` version.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            error!("Interface name is empty");
            return Err(Error::InvalidParameter);
        }
        if self.major_version == 0 && self.minor_version == 0 {
            error!("Interface {} has both major and minor version equal to 0", self.name.as_str());
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }

    /// Find the mapping whose endpoint matches `path`.
    ///
    /// # Errors
    ///
    /// [`Error::MappingNotFound`] if no mapping matches.
    pub fn mapping_for_path(&self, path: &str) -> Result<&Mapping, Error> {
        self.mappings
            .iter()
            .find(|mapping| mapping.matches(path))
            .ok_or_else(|| {
                debug!("Mapping not found in interface {} for {}", self.name.as_str(), path);
                Error::MappingNotFound
            })
    }

    /// Find the mapping for the entry `entry` of an object published on
    /// `path`, i.e. the mapping of `path/entry`.
    ///
    /// # Errors
    ///
    /// - [`Error::MappingNotFound`] if no mapping matches
    /// - [`Error::OutOfMemory`] if the full path cannot be built
    pub fn mapping_for_paths(&self, path: &str, entry: &str) -> Result<&Mapping, Error> {
        let mut full = String::new();
        full.try_reserve(path.len() + 1 + entry.len())
            .map_err(|_| Error::OutOfMemory)?;
        full.push_str(path);
        full.push('/');
        full.push_str(entry);
        self.mapping_for_path(&full).inspect_err(|_| {
            error!(
                "Could not find mapping for {} in interface {}",
                full.as_str(),
                self.name.as_str()
            );
        })
    }

    /// QoS to publish `path` with.
    ///
    /// Every mapping of an object aggregated interface shares the same
    /// reliability, so the first mapping is used for objects.
    ///
    /// # Errors
    ///
    /// [`Error::MappingNotFound`] for an individual interface without a
    /// mapping for `path`, or for an object interface without mappings.
    pub fn qos(&self, path: &str) -> Result<QoS, Error> {
        let mapping = match self.aggregation {
            Aggregation::Individual => self.mapping_for_path(path)?,
            Aggregation::Object => self.mappings.first().ok_or(Error::MappingNotFound)?,
        };
        Ok(mapping.reliability.into())
    }

    pub fn is_property(&self) -> bool {
        self.interface_type == InterfaceType::Properties
    }
}
