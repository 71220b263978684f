//! # Device caching
//!
//! Persistent state of a device, kept in three namespaces of a single
//! journal:
//!
//! | Namespace                   | Keys                                     |
//! |-----------------------------|------------------------------------------|
//! | `synchronization_namespace` | `synchronization_status`, `"true"` or `"false"` |
//! | `introspection_namespace`   | `introspection_string`, the last introspection sent |
//! | `properties_namespace`      | one `<interface>;<path>` key per property |
//!
//! Each property value is a binary document `{ major: int32, type: int64,
//! data: <value> }`, where `type` is the [`MappingType`](crate::data::MappingType)
//! tag driving the decoding of `data`.
//!
//! ```rust
//! use astarte_device_store::caching::Cache;
//! use astarte_device_store::data::Individual;
//! use astarte_device_store::storage::journal::RamJournal;
//! use astarte_device_store::storage::kv::StoreConfig;
//!
//! let journal = RamJournal::new();
//! let cache = Cache::new(&journal, StoreConfig::default()).unwrap();
//!
//! cache
//!     .store_property("com.example.Sensor", "/value", 1, &Individual::Integer(42))
//!     .unwrap();
//! let (major, value) = cache.load_property("com.example.Sensor", "/value").unwrap();
//! assert_eq!((major, value), (1, Individual::Integer(42)));
//! ```

#![allow(missing_docs)]
#![deny(unsafe_code)]

use alloc::vec::Vec;

use crate::error::Error;
use crate::storage::journal::Journal;
use crate::storage::kv::{KvStore, StoreConfig};

pub mod property;

#[cfg(test)]
mod tests;

pub use property::PropertyIter;

pub const SYNCHRONIZATION_NAMESPACE: &str = "synchronization_namespace";
pub const INTROSPECTION_NAMESPACE: &str = "introspection_namespace";
pub const PROPERTIES_NAMESPACE: &str = "properties_namespace";

const SYNCHRONIZATION_KEY: &str = "synchronization_status";
const INTROSPECTION_KEY: &str = "introspection_string";

/// Handle on the persistent state of a device.
#[derive(Debug)]
pub struct Cache<'j, J: Journal> {
    sync_storage: KvStore<'j, J>,
    intro_storage: KvStore<'j, J>,
    prop_storage: KvStore<'j, J>,
}

impl<'j, J: Journal> Cache<'j, J> {
    /// Open the three cache namespaces on `journal`.
    pub fn new(journal: &'j J, config: StoreConfig) -> Result<Self, Error> {
        Ok(Self {
            sync_storage: KvStore::open(journal, SYNCHRONIZATION_NAMESPACE, config)?,
            intro_storage: KvStore::open(journal, INTROSPECTION_NAMESPACE, config)?,
            prop_storage: KvStore::open(journal, PROPERTIES_NAMESPACE, config)?,
        })
    }

    /// Whether the device completed a synchronization with Astarte.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if no synchronization status was ever stored.
    pub fn synchronization_get(&self) -> Result<bool, Error> {
        let stored = match self.sync_storage.find_alloc(SYNCHRONIZATION_KEY) {
            Ok(stored) => stored,
            Err(Error::NotFound) => {
                info!("No previous synchronization with Astarte present");
                return Err(Error::NotFound);
            }
            Err(err) => {
                error!("Fetch error for cached synchronization: {}", err);
                return Err(err);
            }
        };
        match stored.as_slice() {
            b"true" => Ok(true),
            b"false" => {
                info!("No previous synchronization with Astarte present");
                Ok(false)
            }
            _ => {
                error!("Cached synchronization status is malformed");
                Err(Error::InternalError)
            }
        }
    }

    pub fn synchronization_set(&self, sync: bool) -> Result<(), Error> {
        let value: &str = if sync { "true" } else { "false" };
        debug!("Storing synchronization status {}", value);
        self.sync_storage
            .insert(SYNCHRONIZATION_KEY, value.as_bytes())
            .inspect_err(|err| error!("Error caching synchronization: {}", *err))
    }

    /// Store the introspection string last sent to Astarte.
    pub fn introspection_store(&self, introspection: &str) -> Result<(), Error> {
        debug!("Storing introspection {}", introspection);
        self.intro_storage
            .insert(INTROSPECTION_KEY, introspection.as_bytes())
            .inspect_err(|err| error!("Error caching introspection: {}", *err))
    }

    /// Compare `introspection` with the stored one.
    ///
    /// # Errors
    ///
    /// [`Error::OutdatedIntrospection`] if no introspection is stored or the
    /// stored one differs.
    pub fn introspection_check(&self, introspection: &str) -> Result<(), Error> {
        let stored: Vec<u8> = match self.intro_storage.find_alloc(INTROSPECTION_KEY) {
            Ok(stored) => stored,
            Err(Error::NotFound) => return Err(Error::OutdatedIntrospection),
            Err(err) => {
                error!("Fetch error for cached introspection: {}", err);
                return Err(err);
            }
        };
        if stored != introspection.as_bytes() {
            info!("Found outdated introspection");
            return Err(Error::OutdatedIntrospection);
        }
        Ok(())
    }
}
