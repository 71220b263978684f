//! # Record journals
//!
//! A journal maps small integer record IDs to variable-length byte blobs.
//! Writing a record is atomic: after a power loss the record holds either
//! its previous content or the new one, never a mix of both.
//!
//! Two journals are provided:
//!
//! - [`FlashJournal`]: log-structured and wear-leveled, mounted on a flash
//!   region of any [`Storage`](super::Storage) +
//!   [`BlockingErase`](super::BlockingErase) device
//! - [`RamJournal`]: volatile, for hosts and tests
//!
//! ```rust
//! use astarte_device_store::storage::journal::{Journal, RamJournal};
//!
//! let journal = RamJournal::new();
//! journal.write(7, b"hello").unwrap();
//!
//! // Probe the size first, then read.
//! let len = journal.read(7, None).unwrap();
//! let mut buf = vec![0u8; len];
//! journal.read(7, Some(&mut buf)).unwrap();
//! assert_eq!(buf, b"hello");
//! ```

use crate::error::Error;

pub mod flash;
pub mod ram;

pub use flash::FlashJournal;
pub use ram::RamJournal;

/// Highest usable record ID. `0xFFFF` is the content of erased flash.
pub const MAX_ID: u16 = u16::MAX - 1;

/// Record storage addressed by 16-bit IDs.
///
/// Methods take `&self`: implementations serialize their own accesses, so a
/// journal can be shared by several store handles.
pub trait Journal {
    /// Associated error type, convertible into the crate error.
    ///
    /// A missing record must be reported as [`Error::NotFound`] once
    /// converted.
    type Error: Into<Error> + core::fmt::Debug;

    /// Atomically replace the content of record `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::StorageFull`] if `id` exceeds [`MAX_ID`] or the journal has
    ///   no room left
    /// - [`Error::JournalIo`] if the device failed
    fn write(&self, id: u16, data: &[u8]) -> Result<(), Self::Error>;

    /// Read record `id`.
    ///
    /// With `None` this is a size probe: the record length is returned and
    /// nothing is copied. With a buffer, up to `buf.len()` bytes are copied
    /// and the full record length is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the record does not exist
    /// - [`Error::JournalIo`] if the device failed
    fn read(&self, id: u16, buf: Option<&mut [u8]>) -> Result<usize, Self::Error>;

    /// Remove record `id`. Removing a missing record succeeds.
    fn delete(&self, id: u16) -> Result<(), Self::Error>;
}

/// Location and geometry of a flash journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalConfig {
    /// Offset of the first sector on the device.
    pub offset: u32,
    /// Erase unit of the device, in bytes.
    pub sector_size: u32,
    /// Number of sectors used by the journal, at least 2.
    pub sector_count: u16,
}

impl JournalConfig {
    /// Use the whole device, with its native sector geometry.
    pub fn from_device<S: super::SectorStorage>(device: &S) -> Self {
        Self {
            offset: 0,
            sector_size: u32::try_from(device.sector_size()).unwrap_or(u32::MAX),
            sector_count: u16::try_from(device.sector_count()).unwrap_or(u16::MAX),
        }
    }

    /// Total size of the journal region in bytes.
    pub fn region_size(&self) -> u64 {
        u64::from(self.sector_size) * u64::from(self.sector_count)
    }
}
