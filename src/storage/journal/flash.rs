//! Log-structured, wear-leveling journal for NOR flash.
//!
//! The journal region is split in sectors used as a ring. Records are only
//! ever appended to the active sector; rewriting or deleting a record
//! appends a newer version, and the newest valid version wins.
//!
//! ```text
//! sector:  ┌──────────────┬────────────────────────────────────────────┐
//!          │ magic │ seq  │ record │ record │ ...         │ 0xFF ...   │
//!          └──────────────┴────────────────────────────────────────────┘
//! record:  ┌──────┬───────┬────────┬─────────────────┐
//!          │ id   │ len   │ crc32  │ data (len bytes) │
//!          │ u16  │ u16   │ u32    │                  │
//!          └──────┴───────┴────────┴─────────────────┘
//! ```
//!
//! All integers are little-endian. `len == 0xFFFF` marks a deletion. The
//! CRC covers `id`, `len` and the data: a record torn by a power loss fails
//! the check and is ignored, leaving the previous version in force.
//!
//! The sector following the active one is always kept erased. When the
//! active sector is full, that reserve sector becomes active, the live
//! records of the oldest sector (the one after the new active sector) are
//! copied into it, and the oldest sector is erased to become the new
//! reserve. Every sector is therefore erased in turn.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use spin::Mutex;

use super::{Journal, JournalConfig, MAX_ID};
use crate::error::Error;
use crate::storage::BlockingErase;

const SECTOR_MAGIC: u32 = 0x4C4E_524A;
const SECTOR_HEADER_SIZE: u32 = 8;
const RECORD_HEADER_SIZE: u32 = 8;
const ERASED_WORD: u32 = 0xFFFF_FFFF;
const ERASED_ID: u16 = 0xFFFF;
const TOMBSTONE_LEN: u16 = 0xFFFF;
const ERASED_BYTE: u8 = 0xFF;

/// Smallest sector able to hold a header and a few records.
pub const MIN_SECTOR_SIZE: u32 = 64;

/// Size of the stack buffer used to checksum and compare records.
const CHUNK_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectorState {
    Erased,
    Formatted(u32),
    Corrupt,
}

#[derive(Debug, Clone, Copy)]
struct Location {
    sector: u16,
    /// Absolute address of the record data.
    addr: u32,
    len: u16,
}

/// A [`Journal`] stored on a flash device.
///
/// # Examples
///
/// ```rust,ignore
/// use astarte_device_store::storage::journal::{FlashJournal, Journal, JournalConfig};
///
/// let config = JournalConfig { offset: 0x8000, sector_size: 4096, sector_count: 4 };
/// let journal = FlashJournal::mount(flash, config)?;
/// journal.write(1, b"value")?;
/// ```
pub struct FlashJournal<S> {
    inner: Mutex<Inner<S>>,
}

struct Inner<S> {
    device: S,
    config: JournalConfig,
    index: BTreeMap<u16, Location>,
    active: u16,
    write_pos: u32,
    sequence: u32,
}

impl<S> core::fmt::Debug for FlashJournal<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FlashJournal")
            .field("config", &inner.config)
            .field("records", &inner.index.len())
            .field("active", &inner.active)
            .finish()
    }
}

impl<S> FlashJournal<S>
where
    S: BlockingErase,
    S::Error: Into<Error>,
{
    /// Mount the journal found in the region described by `config`.
    ///
    /// An erased region is formatted. Records are replayed from the oldest
    /// sector to the newest to rebuild the index, and an interrupted sector
    /// rotation is completed. Sectors with an erased header but leftover
    /// data from an interrupted erase are erased again.
    ///
    /// # Arguments
    ///
    /// * `device` - Flash device holding the journal region
    /// * `config` - Offset and geometry of the region
    ///
    /// # Errors
    ///
    /// - [`Error::MountFailed`] if the geometry is unusable or the region
    ///   does not fit in the device
    /// - [`Error::DeviceNotReady`] if the device cannot be read
    pub fn mount(mut device: S, config: JournalConfig) -> Result<Self, Error> {
        check_geometry(&config, device.capacity())?;

        let mut probe = [0u8; 1];
        if device.read(config.offset, &mut probe).is_err() {
            error!("Flash device at {} is not ready", config.offset);
            return Err(Error::DeviceNotReady);
        }

        let mut inner = Inner {
            device,
            config,
            index: BTreeMap::new(),
            active: 0,
            write_pos: 0,
            sequence: 0,
        };
        inner.recover()?;
        info!(
            "Journal mounted with {} records, active sector {}",
            inner.index.len(),
            inner.active
        );
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Release the underlying device.
    pub fn unmount(self) -> S {
        self.inner.into_inner().device
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().index.is_empty()
    }

    /// Largest record the journal can hold.
    pub fn max_record_size(&self) -> usize {
        max_record_size(&self.inner.lock().config)
    }
}

impl<S> Journal for FlashJournal<S>
where
    S: BlockingErase,
    S::Error: Into<Error>,
{
    type Error = Error;

    fn write(&self, id: u16, data: &[u8]) -> Result<(), Self::Error> {
        if id > MAX_ID {
            error!("Record ID {} is out of range", id);
            return Err(Error::StorageFull);
        }
        let mut inner = self.inner.lock();
        if data.len() > max_record_size(&inner.config) {
            error!("Record of {} bytes does not fit in a sector", data.len());
            return Err(Error::StorageFull);
        }
        if inner.holds(id, data)? {
            trace!("Record {} unchanged, skipping write", id);
            return Ok(());
        }
        inner.append(id, Some(data))
    }

    fn read(&self, id: u16, buf: Option<&mut [u8]>) -> Result<usize, Self::Error> {
        let mut inner = self.inner.lock();
        let location = *inner.index.get(&id).ok_or(Error::NotFound)?;
        let len = usize::from(location.len);
        if let Some(buf) = buf {
            let n = len.min(buf.len());
            inner.read_device(location.addr, &mut buf[..n])?;
        }
        Ok(len)
    }

    fn delete(&self, id: u16) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock();
        if !inner.index.contains_key(&id) {
            return Ok(());
        }
        inner.append(id, None)
    }
}

fn check_geometry(config: &JournalConfig, capacity: usize) -> Result<(), Error> {
    if config.sector_count < 2 {
        error!("A journal needs at least 2 sectors, got {}", config.sector_count);
        return Err(Error::MountFailed);
    }
    if config.sector_size < MIN_SECTOR_SIZE {
        error!("Sector size {} is too small", config.sector_size);
        return Err(Error::MountFailed);
    }
    let end = u64::from(config.offset) + config.region_size();
    if end > capacity as u64 || end > u64::from(u32::MAX) {
        error!("Journal region ends at {} past the device capacity", end);
        return Err(Error::MountFailed);
    }
    Ok(())
}

fn max_record_size(config: &JournalConfig) -> usize {
    let size = config.sector_size - SECTOR_HEADER_SIZE - RECORD_HEADER_SIZE;
    (size as usize).min(usize::from(TOMBSTONE_LEN - 1))
}

fn record_crc(id: u16, len: u16, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&id.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

impl<S> Inner<S>
where
    S: BlockingErase,
    S::Error: Into<Error>,
{
    fn sector_start(&self, sector: u16) -> u32 {
        self.config.offset + u32::from(sector) * self.config.sector_size
    }

    fn sector_end(&self, sector: u16) -> u32 {
        self.sector_start(sector) + self.config.sector_size
    }

    fn next_sector(&self, sector: u16) -> u16 {
        (sector + 1) % self.config.sector_count
    }

    fn read_device(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), Error> {
        let len = buf.len();
        self.device.read(addr, buf).map_err(|err| {
            let err: Error = err.into();
            error!("Flash read of {} bytes at {}: {}", len, addr, err);
            err
        })
    }

    fn write_device(&mut self, addr: u32, data: &[u8]) -> Result<(), Error> {
        self.device.write(addr, data).map_err(|err| {
            let err: Error = err.into();
            error!("Flash write of {} bytes at {}: {}", data.len(), addr, err);
            err
        })
    }

    fn erase_sector(&mut self, sector: u16) -> Result<(), Error> {
        let (start, end) = (self.sector_start(sector), self.sector_end(sector));
        debug!("Erasing journal sector {}", sector);
        self.device.erase(start, end).map_err(|err| {
            let err: Error = err.into();
            error!("Erase of journal sector {}: {}", sector, err);
            err
        })
    }

    fn sector_state(&mut self, sector: u16) -> Result<SectorState, Error> {
        let mut header = [0u8; SECTOR_HEADER_SIZE as usize];
        self.read_device(self.sector_start(sector), &mut header)?;
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let sequence = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        Ok(match (magic, sequence) {
            (ERASED_WORD, ERASED_WORD) => SectorState::Erased,
            (SECTOR_MAGIC, seq) => SectorState::Formatted(seq),
            _ => SectorState::Corrupt,
        })
    }

    /// Whether every byte of `sector` reads erased.
    fn is_blank(&mut self, sector: u16) -> Result<bool, Error> {
        let end = self.sector_end(sector);
        let mut pos = self.sector_start(sector);
        let mut chunk = [0u8; CHUNK_SIZE];
        while pos < end {
            let n = (end - pos).min(CHUNK_SIZE as u32) as usize;
            self.read_device(pos, &mut chunk[..n])?;
            if chunk[..n].iter().any(|b| *b != ERASED_BYTE) {
                return Ok(false);
            }
            pos += n as u32;
        }
        Ok(true)
    }

    /// Erase `sector` unless it is already blank.
    ///
    /// An erase cut short by a power loss can leave the header erased while
    /// the record area still holds programmed bytes.
    fn ensure_blank(&mut self, sector: u16) -> Result<(), Error> {
        if !self.is_blank(sector)? {
            warn!("Journal sector {} holds data behind an erased header", sector);
            self.erase_sector(sector)?;
        }
        Ok(())
    }

    /// Stamp an erased sector with `sequence`.
    ///
    /// The magic is written last so a header interrupted by a power loss is
    /// detected as corrupt on the next mount.
    fn format_sector(&mut self, sector: u16, sequence: u32) -> Result<(), Error> {
        let start = self.sector_start(sector);
        self.write_device(start + 4, &sequence.to_le_bytes())?;
        self.write_device(start, &SECTOR_MAGIC.to_le_bytes())
    }

    fn recover(&mut self) -> Result<(), Error> {
        let mut formatted = Vec::new();
        for sector in 0..self.config.sector_count {
            match self.sector_state(sector)? {
                SectorState::Erased => self.ensure_blank(sector)?,
                SectorState::Formatted(seq) => formatted.push((seq, sector)),
                SectorState::Corrupt => {
                    warn!("Journal sector {} has a corrupted header", sector);
                    self.erase_sector(sector)?;
                }
            }
        }

        let Some(&(sequence, active)) = formatted.iter().max() else {
            debug!("Formatting an empty journal");
            self.format_sector(0, 0)?;
            self.active = 0;
            self.sequence = 0;
            self.write_pos = self.sector_start(0) + SECTOR_HEADER_SIZE;
            return Ok(());
        };

        formatted.sort_unstable();
        let mut write_pos = 0;
        for &(_, sector) in formatted.iter() {
            write_pos = self.scan_sector(sector)?;
        }
        self.active = active;
        self.sequence = sequence;
        self.write_pos = write_pos;

        let reserve = self.next_sector(active);
        if self.sector_state(reserve)? != SectorState::Erased {
            info!("Completing the rotation of journal sector {}", reserve);
            self.collect(reserve)?;
        }
        Ok(())
    }

    /// Replay the records of `sector` into the index and return the address
    /// following the last record.
    fn scan_sector(&mut self, sector: u16) -> Result<u32, Error> {
        let end = self.sector_end(sector);
        let mut pos = self.sector_start(sector) + SECTOR_HEADER_SIZE;

        while pos + RECORD_HEADER_SIZE <= end {
            let mut header = [0u8; RECORD_HEADER_SIZE as usize];
            self.read_device(pos, &mut header)?;
            if header.iter().all(|b| *b == ERASED_BYTE) {
                break;
            }

            let id = u16::from_le_bytes([header[0], header[1]]);
            let len = u16::from_le_bytes([header[2], header[3]]);
            let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            let data_len = if len == TOMBSTONE_LEN { 0 } else { u32::from(len) };
            let next = pos + RECORD_HEADER_SIZE + data_len;
            if id == ERASED_ID || next > end {
                // The header itself is torn, nothing after it can be trusted.
                warn!("Torn record header in journal sector {} at {}", sector, pos);
                return Ok(end);
            }

            if self.checksum(pos + RECORD_HEADER_SIZE, id, len, data_len)? == crc {
                if len == TOMBSTONE_LEN {
                    self.index.remove(&id);
                } else {
                    self.index.insert(
                        id,
                        Location {
                            sector,
                            addr: pos + RECORD_HEADER_SIZE,
                            len,
                        },
                    );
                }
            } else {
                warn!("Discarding corrupted record {} at {}", id, pos);
            }
            pos = next;
        }
        Ok(pos)
    }

    fn checksum(&mut self, addr: u32, id: u16, len: u16, data_len: u32) -> Result<u32, Error> {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&id.to_le_bytes());
        hasher.update(&len.to_le_bytes());
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut done = 0;
        while done < data_len {
            let n = (data_len - done).min(CHUNK_SIZE as u32) as usize;
            self.read_device(addr + done, &mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            done += n as u32;
        }
        Ok(hasher.finalize())
    }

    /// Whether record `id` already holds exactly `data`.
    fn holds(&mut self, id: u16, data: &[u8]) -> Result<bool, Error> {
        let Some(location) = self.index.get(&id).copied() else {
            return Ok(false);
        };
        if usize::from(location.len) != data.len() {
            return Ok(false);
        }
        let mut chunk = [0u8; CHUNK_SIZE];
        for (i, expected) in data.chunks(CHUNK_SIZE).enumerate() {
            let stored = &mut chunk[..expected.len()];
            self.read_device(location.addr + (i * CHUNK_SIZE) as u32, stored)?;
            if stored != expected {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Append a record, rotating sectors until it fits.
    fn append(&mut self, id: u16, data: Option<&[u8]>) -> Result<(), Error> {
        let needed = RECORD_HEADER_SIZE + data.map_or(0, |d| d.len() as u32);
        let mut rotations = 0;
        while self.write_pos + needed > self.sector_end(self.active) {
            if rotations == self.config.sector_count {
                error!("Journal is full, record {} cannot be written", id);
                return Err(Error::StorageFull);
            }
            self.rotate()?;
            rotations += 1;
        }
        self.append_in_active(id, data)
    }

    fn append_in_active(&mut self, id: u16, data: Option<&[u8]>) -> Result<(), Error> {
        let (len, bytes) = match data {
            Some(bytes) => (bytes.len() as u16, bytes),
            None => (TOMBSTONE_LEN, &[][..]),
        };
        let needed = RECORD_HEADER_SIZE + bytes.len() as u32;
        if self.write_pos + needed > self.sector_end(self.active) {
            return Err(Error::StorageFull);
        }

        let mut header = [0u8; RECORD_HEADER_SIZE as usize];
        header[0..2].copy_from_slice(&id.to_le_bytes());
        header[2..4].copy_from_slice(&len.to_le_bytes());
        header[4..8].copy_from_slice(&record_crc(id, len, bytes).to_le_bytes());

        let pos = self.write_pos;
        // Claim the space first so a failed write is never overwritten.
        self.write_pos = pos + needed;
        self.write_device(pos, &header)?;
        self.write_device(pos + RECORD_HEADER_SIZE, bytes)?;

        if data.is_some() {
            self.index.insert(
                id,
                Location {
                    sector: self.active,
                    addr: pos + RECORD_HEADER_SIZE,
                    len,
                },
            );
        } else {
            self.index.remove(&id);
        }
        Ok(())
    }

    /// Move to the reserve sector and recycle the oldest one.
    fn rotate(&mut self) -> Result<(), Error> {
        let next = self.next_sector(self.active);
        let sequence = self.sequence.wrapping_add(1);
        self.ensure_blank(next)?;
        self.format_sector(next, sequence)?;
        self.active = next;
        self.sequence = sequence;
        self.write_pos = self.sector_start(next) + SECTOR_HEADER_SIZE;
        debug!("Journal sector {} is now active", next);

        let oldest = self.next_sector(next);
        if self.sector_state(oldest)? != SectorState::Erased {
            self.collect(oldest)?;
        }
        Ok(())
    }

    /// Copy the live records of `sector` into the active sector, then erase
    /// it.
    fn collect(&mut self, sector: u16) -> Result<(), Error> {
        let live: Vec<(u16, Location)> = self
            .index
            .iter()
            .filter(|(_, location)| location.sector == sector)
            .map(|(id, location)| (*id, *location))
            .collect();

        let mut data = Vec::new();
        for (id, location) in live {
            data.clear();
            data.try_reserve(usize::from(location.len))
                .map_err(|_| Error::OutOfMemory)?;
            data.resize(usize::from(location.len), 0);
            self.read_device(location.addr, &mut data)?;
            self.append_in_active(id, Some(&data))?;
        }
        self.erase_sector(sector)
    }
}
