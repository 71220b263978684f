//! # Namespaced key-value store
//!
//! Key-value pairs are stored as three consecutive journal records. Record
//! `0` holds the number of stored pairs, over every namespace:
//!
//! ```text
//! ID:      0        1          2      3        4          5      6     ...
//!        ┌───────┬──────────┬──────┬───────┬──────────┬──────┬───────┬─────
//!        │ count │ namespace│ key  │ value │ namespace│ key  │ value │ ...
//!        │ u16 LE│ pair 0                  │ pair 1                  │
//!        └───────┴──────────┴──────┴───────┴──────────┴──────┴───────┴─────
//! ```
//!
//! Pair `N` starts at ID `1 + 3 * N`. Namespaces and keys are stored as
//! NUL-terminated strings. Pairs of different namespaces are interleaved and
//! told apart by their namespace record.
//!
//! Lookups are linear scans in insertion order. Deleting a pair moves the
//! last pair of the journal, whatever its namespace, into the freed slot.
//! Iteration walks pairs from the last one to the first.
//!
//! # Locking
//!
//! Every operation of every store holds a single process-wide lock for its
//! whole duration, so all store mutations are totally ordered. Iterators
//! release the lock between steps: a concurrent deletion may or may not be
//! observed by an iterator in progress.

use alloc::string::String;
use alloc::vec::Vec;

use spin::{Mutex, MutexGuard};

use super::journal::Journal;
use crate::error::Error;

/// Record holding the number of stored pairs.
const STORED_PAIRS_ID: u16 = 0;
/// Records used by a single pair.
const ENTRIES_PER_PAIR: u16 = 3;
const OFFSET_NAMESPACE: u16 = 0;
const OFFSET_KEY: u16 = 1;
const OFFSET_VALUE: u16 = 2;

/// Lock shared by every store, whatever its journal or namespace.
pub(super) static STORE_LOCK: Mutex<()> = Mutex::new(());

/// How long a store operation waits for the global lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockTimeout {
    /// Wait until the lock is free.
    #[default]
    Forever,
    /// Give up with [`Error::LockTimeout`] after this many attempts.
    Spins(u32),
}

/// Configuration of a [`KvStore`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreConfig {
    pub lock_timeout: LockTimeout,
}

/// A handle on the pairs of one namespace of a journal.
///
/// # Examples
///
/// ```rust
/// use astarte_device_store::storage::journal::RamJournal;
/// use astarte_device_store::storage::kv::{KvStore, StoreConfig};
///
/// let journal = RamJournal::new();
/// let wifi = KvStore::open(&journal, "wifi", StoreConfig::default()).unwrap();
/// let mqtt = KvStore::open(&journal, "mqtt", StoreConfig::default()).unwrap();
///
/// wifi.insert("ssid", b"home").unwrap();
/// mqtt.insert("ssid", b"unused").unwrap();
///
/// let mut buf = [0u8; 16];
/// let len = wifi.find("ssid", Some(&mut buf)).unwrap();
/// assert_eq!(&buf[..len], b"home");
/// assert_eq!(wifi.count().unwrap(), 2);
/// ```
#[derive(Debug)]
pub struct KvStore<'j, J: Journal> {
    journal: &'j J,
    namespace: String,
    config: StoreConfig,
}

impl<'j, J: Journal> KvStore<'j, J> {
    /// Open a store for `namespace` on `journal`.
    ///
    /// The namespace is copied. The journal must already be mounted.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] for an empty namespace
    /// - [`Error::OutOfMemory`] if the namespace cannot be copied
    pub fn open(journal: &'j J, namespace: &str, config: StoreConfig) -> Result<Self, Error> {
        if namespace.is_empty() {
            error!("Key-value store namespace can't be empty");
            return Err(Error::InvalidParameter);
        }
        let mut owned = String::new();
        owned
            .try_reserve_exact(namespace.len())
            .map_err(|_| Error::OutOfMemory)?;
        owned.push_str(namespace);
        debug!("Opened key-value store, namespace {}", namespace);
        Ok(Self {
            journal,
            namespace: owned,
            config,
        })
    }

    /// Close the store. Dropping the handle is equivalent.
    pub fn close(self) {
        debug!("Closed key-value store, namespace {}", self.namespace.as_str());
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Insert a pair, replacing the value if `key` is already present.
    ///
    /// # Arguments
    ///
    /// * `key` - Key, unique within the namespace
    /// * `value` - Bytes stored for the key
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] for an empty key
    /// - [`Error::StorageFull`] if the journal ID space is exhausted
    /// - [`Error::LockTimeout`] if the global lock could not be taken
    /// - any journal error
    pub fn insert(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        check_key(key)?;
        let _guard = self.lock()?;

        let stored_pairs = self.stored_pairs()?;
        let (base_id, append) = match self.find_pair(stored_pairs, key) {
            Ok(base_id) => (base_id, false),
            Err(Error::NotFound) => {
                let unbound = 1 + usize::from(stored_pairs) * usize::from(ENTRIES_PER_PAIR);
                if unbound + usize::from(OFFSET_VALUE) >= usize::from(u16::MAX) {
                    error!("Key-value store is full, {} pairs stored", stored_pairs);
                    return Err(Error::StorageFull);
                }
                (unbound as u16, true)
            }
            Err(err) => {
                error!("Check for old values failed: {}", err);
                return Err(err);
            }
        };

        debug!("Inserting key {} at base id {}", key, base_id);
        self.write_pair(base_id, key, value)?;
        if append {
            self.update_stored_pairs(stored_pairs + 1)?;
        }
        Ok(())
    }

    /// Find the value stored for `key`.
    ///
    /// With `None` this is a size probe. With a buffer, up to `buf.len()`
    /// bytes are copied. The full value length is returned in both cases.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `key` is not in the namespace
    /// - [`Error::LockTimeout`] if the global lock could not be taken
    /// - any journal error
    pub fn find(&self, key: &str, buf: Option<&mut [u8]>) -> Result<usize, Error> {
        let _guard = self.lock()?;
        let base_id = self.find_pair(self.stored_pairs()?, key)?;
        self.read(base_id + OFFSET_VALUE, buf).inspect_err(|err| {
            error!("Reading the value of {} failed: {}", key, *err);
        })
    }

    /// Find the value stored for `key` and copy it in a new buffer.
    ///
    /// The size probe and the read happen under a single lock acquisition.
    pub fn find_alloc(&self, key: &str) -> Result<Vec<u8>, Error> {
        let _guard = self.lock()?;
        let base_id = self.find_pair(self.stored_pairs()?, key)?;
        self.read_alloc(base_id + OFFSET_VALUE)
    }

    /// Delete the pair stored for `key`.
    ///
    /// The last pair of the journal is moved into the freed slot, then the
    /// pair count is decremented and the records of the vacated last slot
    /// are released. If the count update fails after the move,
    /// the moved pair is left duplicated; lookups still find the right value
    /// and [`KvStore::remove_duplicates`] repairs it.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `key` is not in the namespace
    /// - [`Error::LockTimeout`] if the global lock could not be taken
    /// - any journal error
    pub fn delete(&self, key: &str) -> Result<(), Error> {
        let _guard = self.lock()?;
        let stored_pairs = self.stored_pairs()?;
        let base_id = self.find_pair(stored_pairs, key)?;

        debug!("Deleting key {} at base id {}", key, base_id);
        let last_base_id = base_id_of(stored_pairs - 1);
        if base_id != last_base_id {
            self.relocate_pair(base_id, last_base_id).inspect_err(|err| {
                error!("Relocation failed: {}", *err);
            })?;
        }
        self.update_stored_pairs(stored_pairs - 1)?;
        self.release_pair(last_base_id);
        Ok(())
    }

    /// Number of pairs stored in the journal, over every namespace.
    pub fn count(&self) -> Result<u16, Error> {
        let _guard = self.lock()?;
        self.stored_pairs()
    }

    /// Drop the last pair of the journal if it duplicates an earlier one.
    ///
    /// This is left behind by a deletion interrupted between the relocation
    /// of the last pair and the count update. Returns `true` if a duplicate
    /// was dropped.
    pub fn remove_duplicates(&self) -> Result<bool, Error> {
        let _guard = self.lock()?;
        let stored_pairs = self.stored_pairs()?;
        if stored_pairs < 2 {
            return Ok(false);
        }
        let last_base_id = base_id_of(stored_pairs - 1);
        let namespace = self.read_alloc(last_base_id + OFFSET_NAMESPACE)?;
        let key = self.read_alloc(last_base_id + OFFSET_KEY)?;

        for pair in 0..stored_pairs - 1 {
            let base_id = base_id_of(pair);
            if self.read_alloc(base_id + OFFSET_NAMESPACE)? == namespace
                && self.read_alloc(base_id + OFFSET_KEY)? == key
            {
                warn!("Dropping duplicated pair at base id {}", last_base_id);
                self.update_stored_pairs(stored_pairs - 1)?;
                self.release_pair(last_base_id);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Start iterating over the pairs of the namespace, last pair first.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the namespace holds no pair.
    pub fn iter(&self) -> Result<KvIter<'_, 'j, J>, Error> {
        KvIter::new(self)
    }

    /// Iterate over the keys of the namespace, last pair first.
    pub fn keys(&self) -> Keys<'_, 'j, J> {
        Keys {
            store: self,
            iter: None,
            done: false,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'static, ()>, Error> {
        match self.config.lock_timeout {
            LockTimeout::Forever => Ok(STORE_LOCK.lock()),
            LockTimeout::Spins(spins) => {
                for _ in 0..spins {
                    if let Some(guard) = STORE_LOCK.try_lock() {
                        return Ok(guard);
                    }
                    core::hint::spin_loop();
                }
                STORE_LOCK.try_lock().ok_or_else(|| {
                    error!("Key-value store lock not acquired after {} attempts", spins);
                    Error::LockTimeout
                })
            }
        }
    }

    fn read(&self, id: u16, buf: Option<&mut [u8]>) -> Result<usize, Error> {
        self.journal.read(id, buf).map_err(Into::into)
    }

    fn write(&self, id: u16, data: &[u8]) -> Result<(), Error> {
        self.journal.write(id, data).map_err(|err| {
            let err = err.into();
            error!("Writing journal record {} failed: {}", id, err);
            err
        })
    }

    fn read_alloc(&self, id: u16) -> Result<Vec<u8>, Error> {
        let len = self.read(id, None)?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
        data.resize(len, 0);
        self.read(id, Some(&mut data))?;
        Ok(data)
    }

    /// Whether record `id` holds `expected` followed by a NUL.
    fn holds_str(&self, id: u16, expected: &str) -> Result<bool, Error> {
        if self.read(id, None)? != expected.len() + 1 {
            return Ok(false);
        }
        let stored = self.read_alloc(id)?;
        Ok(stored.strip_suffix(&[0]) == Some(expected.as_bytes()))
    }

    fn stored_pairs(&self) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        match self.read(STORED_PAIRS_ID, Some(&mut buf)) {
            Ok(2) => Ok(u16::from_le_bytes(buf)),
            Ok(len) => {
                error!("Stored pairs record has an invalid size {}", len);
                Err(Error::InternalError)
            }
            Err(Error::NotFound) => Ok(0),
            Err(err) => {
                error!("Get total stored pairs failed: {}", err);
                Err(err)
            }
        }
    }

    fn update_stored_pairs(&self, stored_pairs: u16) -> Result<(), Error> {
        self.write(STORED_PAIRS_ID, &stored_pairs.to_le_bytes())
    }

    fn find_pair(&self, stored_pairs: u16, key: &str) -> Result<u16, Error> {
        for pair in 0..stored_pairs {
            let base_id = base_id_of(pair);
            if self.holds_str(base_id + OFFSET_NAMESPACE, &self.namespace)?
                && self.holds_str(base_id + OFFSET_KEY, key)?
            {
                return Ok(base_id);
            }
        }
        Err(Error::NotFound)
    }

    fn write_pair(&self, base_id: u16, key: &str, value: &[u8]) -> Result<(), Error> {
        self.write(base_id + OFFSET_NAMESPACE, &terminated(&self.namespace)?)?;
        self.write(base_id + OFFSET_KEY, &terminated(key)?)?;
        self.write(base_id + OFFSET_VALUE, value)
    }

    fn relocate_pair(&self, dst_base_id: u16, src_base_id: u16) -> Result<(), Error> {
        debug!("Relocating pair from {} to {}", src_base_id, dst_base_id);
        for offset in [OFFSET_NAMESPACE, OFFSET_KEY, OFFSET_VALUE] {
            let data = self.read_alloc(src_base_id + offset)?;
            self.write(dst_base_id + offset, &data)?;
        }
        Ok(())
    }

    /// Delete the records of a slot past the pair count.
    ///
    /// Failures are only logged: the count no longer covers the slot and the
    /// next insertion there overwrites it.
    fn release_pair(&self, base_id: u16) {
        for offset in [OFFSET_NAMESPACE, OFFSET_KEY, OFFSET_VALUE] {
            if let Err(err) = self.journal.delete(base_id + offset) {
                let err: Error = err.into();
                warn!("Releasing journal record {} failed: {}", base_id + offset, err);
            }
        }
    }

    /// Search backwards from pair `from` (exclusive) for a pair of this
    /// namespace.
    fn previous_pair(&self, from: u16) -> Result<u16, Error> {
        for pair in (0..from).rev() {
            if self.holds_str(base_id_of(pair) + OFFSET_NAMESPACE, &self.namespace)? {
                return Ok(pair);
            }
        }
        Err(Error::NotFound)
    }
}

/// Backward cursor over the pairs of a namespace.
///
/// The store lock is only held while the cursor moves or reads, not for the
/// whole iteration.
#[derive(Debug)]
pub struct KvIter<'s, 'j, J: Journal> {
    store: &'s KvStore<'j, J>,
    current: u16,
}

impl<'s, 'j, J: Journal> KvIter<'s, 'j, J> {
    /// Position the cursor on the last pair of the namespace.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the namespace holds no pair.
    pub fn new(store: &'s KvStore<'j, J>) -> Result<Self, Error> {
        let _guard = store.lock()?;
        let current = store.previous_pair(store.stored_pairs()?)?;
        trace!("Initialized iterator on pair {}", current);
        Ok(Self { store, current })
    }

    /// Move to the previous pair of the namespace.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] once every pair has been visited. The cursor is
    /// left in place.
    pub fn advance(&mut self) -> Result<(), Error> {
        let _guard = self.store.lock()?;
        self.current = self.store.previous_pair(self.current)?;
        trace!("Advanced iterator to pair {}", self.current);
        Ok(())
    }

    /// Read the key of the current pair, without its terminator.
    ///
    /// With `None` this is a size probe.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParameter`] if `buf` is too small for the key
    /// - any journal error
    pub fn get(&self, buf: Option<&mut [u8]>) -> Result<usize, Error> {
        let _guard = self.store.lock()?;
        let stored = self.store.read_alloc(base_id_of(self.current) + OFFSET_KEY)?;
        let key = stored.strip_suffix(&[0]).unwrap_or(&stored);
        if let Some(buf) = buf {
            let dst = buf.get_mut(..key.len()).ok_or_else(|| {
                error!("Key size is too large for provided buffer");
                Error::InvalidParameter
            })?;
            dst.copy_from_slice(key);
        }
        Ok(key.len())
    }

    /// Read the key of the current pair.
    pub fn key(&self) -> Result<String, Error> {
        let _guard = self.store.lock()?;
        let mut stored = self.store.read_alloc(base_id_of(self.current) + OFFSET_KEY)?;
        if stored.last() == Some(&0) {
            stored.pop();
        }
        String::from_utf8(stored).map_err(|_| {
            error!("Stored key is not valid UTF-8");
            Error::InternalError
        })
    }
}

/// Iterator over the keys of a namespace, created by [`KvStore::keys`].
///
/// Yields at most one error, then stops.
#[derive(Debug)]
pub struct Keys<'s, 'j, J: Journal> {
    store: &'s KvStore<'j, J>,
    iter: Option<KvIter<'s, 'j, J>>,
    done: bool,
}

impl<J: Journal> Iterator for Keys<'_, '_, J> {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = match self.iter.as_mut() {
            None => KvIter::new(self.store).map(|iter| {
                self.iter = Some(iter);
            }),
            Some(iter) => iter.advance(),
        };
        let item = step.and_then(|_| match self.iter.as_ref() {
            Some(iter) => iter.key(),
            None => Err(Error::InternalError),
        });
        match item {
            Ok(key) => Some(Ok(key)),
            Err(Error::NotFound) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn base_id_of(pair: u16) -> u16 {
    1 + pair * ENTRIES_PER_PAIR
}

fn check_key(key: &str) -> Result<(), Error> {
    if key.is_empty() {
        error!("Key-value store key can't be empty");
        return Err(Error::InvalidParameter);
    }
    Ok(())
}

fn terminated(s: &str) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(s.len() + 1)
        .map_err(|_| Error::OutOfMemory)?;
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    Ok(bytes)
}
