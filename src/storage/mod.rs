//! # Persistent storage for embedded devices
//!
//! This module layers a namespaced key-value store over raw storage devices.
//! It is organized in three levels, each one only depending on the one below:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Key-value store (kv::KvStore)                │
//! │   namespace │ key │ value triples, global pair count        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Record journal (journal)                   │
//! │   u16 record IDs → byte blobs, atomic per-record writes     │
//! │   FlashJournal (wear leveling)        RamJournal (volatile) │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Device traits (this module)                    │
//! │   ReadStorage, Storage, BlockingErase, SectorStorage        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Device Traits
//!
//! - [`ReadStorage`]: Read data from storage
//! - [`Storage`]: Read and write operations
//! - [`BlockingErase`]: Synchronous erase operations
//! - [`SectorStorage`]: Sector-oriented geometry (NOR flash)
//!
//! Any device implementing [`Storage`] and [`BlockingErase`] can host a
//! [`journal::FlashJournal`].
//!
//! # Usage Examples
//!
//! ```rust
//! use astarte_device_store::storage::journal::RamJournal;
//! use astarte_device_store::storage::kv::{KvStore, StoreConfig};
//!
//! let journal = RamJournal::new();
//! let store = KvStore::open(&journal, "settings", StoreConfig::default()).unwrap();
//!
//! store.insert("mode", b"eco").unwrap();
//! assert_eq!(store.find_alloc("mode").unwrap(), b"eco");
//!
//! store.delete("mode").unwrap();
//! assert!(store.find_alloc("mode").unwrap_err().is_not_found());
//! ```

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for storage operations
pub mod error;

/// Record journals addressed by 16-bit IDs
pub mod journal;

/// Namespaced key-value store built on a journal
pub mod kv;


/// Re-exports of common traits for convenient importing
pub mod prelude {
    pub use super::journal::Journal;
    pub use super::{BlockingErase, ReadStorage, SectorStorage, Storage};
}

/// Trait for reading data from storage devices.
///
/// This is the fundamental trait for all readable storage devices. It provides
/// a simple interface for reading data at specific offsets without requiring
/// write capabilities.
///
/// # Examples
///
/// ```rust,no_run
/// use astarte_device_store::storage::ReadStorage;
///
/// fn read_device_id<S: ReadStorage>(storage: &mut S) -> Result<u32, S::Error> {
///     let mut id_bytes = [0u8; 4];
///     storage.read(0, &mut id_bytes)?;
///     Ok(u32::from_le_bytes(id_bytes))
/// }
/// ```
pub trait ReadStorage {
    /// Associated error type for read operations
    type Error: core::fmt::Debug;

    /// Read data from the storage device.
    ///
    /// Reads data from the specified offset into the provided buffer.
    /// The entire buffer will be filled unless an error occurs.
    ///
    /// # Arguments
    ///
    /// * `offset` - Byte offset from the start of the storage device
    /// * `bytes` - Buffer to read data into
    ///
    /// # Errors
    ///
    /// - `OutOfBounds` if offset + buffer length exceeds device capacity
    /// - `ReadError` if hardware read operation fails
    /// - `NotInitialized` if device is not properly initialized
    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error>;

    /// Get the total capacity of the storage device in bytes.
    fn capacity(&self) -> usize;
}

/// Trait for storage devices that support both read and write operations.
pub trait Storage: ReadStorage {
    /// Write data to the storage device.
    ///
    /// Flash devices can only clear bits: callers must only write to
    /// locations that have been erased since they were last written.
    ///
    /// # Arguments
    ///
    /// * `offset` - Byte offset from the start of the storage device
    /// * `bytes` - Data to write to the device
    ///
    /// # Errors
    ///
    /// - `OutOfBounds` if offset + data length exceeds device capacity
    /// - `WriteError` if hardware write operation fails
    /// - `NotInitialized` if device is not properly initialized
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Trait for storage devices that support erase operations.
///
/// # Examples
///
/// ```rust,no_run
/// use astarte_device_store::storage::{Storage, BlockingErase};
///
/// fn clear_log_area<S: Storage + BlockingErase>(storage: &mut S) -> Result<(), S::Error> {
///     let log_start = 0x10000;
///     let log_end = 0x20000;
///
///     storage.erase(log_start, log_end)?;
///     storage.write(log_start, b"Log cleared\n")?;
///     Ok(())
/// }
/// ```
pub trait BlockingErase: Storage {
    /// Erase a region of storage.
    ///
    /// After erasing, the region reads as `0xFF` bytes.
    ///
    /// # Arguments
    ///
    /// * `from` - Start address of the region to erase (inclusive)
    /// * `to` - End address of the region to erase (exclusive)
    ///
    /// # Errors
    ///
    /// - `OutOfBounds` if the address range is invalid
    /// - `EraseError` if the hardware erase operation fails
    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error>;
}

/// Sector-oriented storage interface.
///
/// NOR flash is erased one sector at a time. Devices exposing their
/// geometry can be mounted with
/// [`JournalConfig::from_device`](journal::JournalConfig::from_device).
pub trait SectorStorage {
    /// Get the size of each sector in bytes.
    fn sector_size(&self) -> usize;

    /// Get the total number of sectors on the device.
    fn sector_count(&self) -> usize;
}
