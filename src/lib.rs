//! # astarte-device-store
//!
//! Persistence and messaging core of an embedded Astarte device SDK. The
//! crate keeps the state a device needs across reboots in a flash journal,
//! encodes values in the binary document format Astarte speaks, and glues
//! both to an MQTT transport.
//!
//! ## Layers
//!
//! - [`bson`]: serializer and zero-copy reader for binary documents
//! - [`data`]: typed values ([`data::Individual`], [`data::ObjectEntry`])
//!   and their mapping types
//! - [`storage`]: an append-only journal over sector storage and a
//!   namespaced key-value store on top of it
//! - [`caching`]: synchronization flag, introspection and property cache
//! - [`interface`]: interface definitions, introspection and validation
//! - [`network`]: connection traits and a blocking MQTT 3.1.1 client
//! - [`device`]: topics, payloads, handshake and message routing
//!
//! ## Usage
//!
//! ```rust
//! use astarte_device_store::caching::Cache;
//! use astarte_device_store::data::Individual;
//! use astarte_device_store::device::{Device, DeviceConfig, Publish};
//! use astarte_device_store::error::Error;
//! use astarte_device_store::interface::{Interface, Introspection};
//! use astarte_device_store::network::mqtt::QoS;
//! use astarte_device_store::storage::journal::RamJournal;
//! use astarte_device_store::storage::kv::StoreConfig;
//!
//! struct Printer;
//!
//! impl Publish for Printer {
//!     fn publish(&mut self, topic: &str, payload: &[u8], _qos: QoS) -> Result<(), Error> {
//!         println!("{topic}: {} bytes", payload.len());
//!         Ok(())
//!     }
//! }
//!
//! let interface = Interface::from_json(r#"{
//!     "interface_name": "org.example.Settings",
//!     "version_major": 1,
//!     "version_minor": 0,
//!     "type": "properties",
//!     "ownership": "device",
//!     "mappings": [{ "endpoint": "/%{id}/enabled", "type": "boolean" }]
//! }"#).unwrap();
//! let mut introspection = Introspection::new();
//! introspection.add(interface).unwrap();
//!
//! let journal = RamJournal::new();
//! let cache = Cache::new(&journal, StoreConfig::default()).unwrap();
//! let config = DeviceConfig { realm: "realm", device_id: "device" };
//! let device = Device::new(config, introspection).unwrap().with_cache(cache).unwrap();
//!
//! device
//!     .set_property(&mut Printer, "org.example.Settings", "/led/enabled", &Individual::Boolean(true))
//!     .unwrap();
//! let (_, cached) = device
//!     .cache()
//!     .unwrap()
//!     .load_property("org.example.Settings", "/led/enabled")
//!     .unwrap();
//! assert_eq!(cached, Individual::Boolean(true));
//! ```
//!
//! ## Optional Features
//!
//! - `std`: Enable standard library support (default: disabled)
//! - `defmt`: Route the crate logs to `defmt`
//! - `log`: Route the crate logs to the `log` facade

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

extern crate alloc;

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

/// Binary document encoding and decoding.
pub mod bson;

/// Property cache and synchronization state persisted in the journal.
pub mod caching;

/// Typed values exchanged with Astarte.
pub mod data;

/// Device level glue between values, cache and MQTT.
pub mod device;

/// Error type shared by every module.
pub mod error;

/// Interface definitions, introspection and data validation.
pub mod interface;

/// Connection abstraction and MQTT client.
pub mod network;

/// Storage abstraction layer, flash journal and key-value store.
///
/// Provides unified interfaces for sector based storage devices and the
/// namespaced store the cache is built on.
pub mod storage;
