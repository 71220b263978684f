//! Volatile journal kept in RAM.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use spin::Mutex;

use super::{Journal, MAX_ID};
use crate::error::Error;

/// A [`Journal`] holding its records in memory.
///
/// Content is lost when the journal is dropped. Writes are trivially atomic
/// since they happen under the internal lock.
#[derive(Debug, Default)]
pub struct RamJournal {
    records: Mutex<BTreeMap<u16, Vec<u8>>>,
}

impl RamJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Journal for RamJournal {
    type Error = Error;

    fn write(&self, id: u16, data: &[u8]) -> Result<(), Self::Error> {
        if id > MAX_ID {
            error!("Record ID {} is out of range", id);
            return Err(Error::StorageFull);
        }
        let mut record = Vec::new();
        record
            .try_reserve_exact(data.len())
            .map_err(|_| Error::OutOfMemory)?;
        record.extend_from_slice(data);
        self.records.lock().insert(id, record);
        Ok(())
    }

    fn read(&self, id: u16, buf: Option<&mut [u8]>) -> Result<usize, Self::Error> {
        let records = self.records.lock();
        let record = records.get(&id).ok_or(Error::NotFound)?;
        if let Some(buf) = buf {
            let n = record.len().min(buf.len());
            buf[..n].copy_from_slice(&record[..n]);
        }
        Ok(record.len())
    }

    fn delete(&self, id: u16) -> Result<(), Self::Error> {
        self.records.lock().remove(&id);
        Ok(())
    }
}
