//! Errors reported by sector storage devices

/// Failure of a raw storage device operation.
///
/// The journal maps these to [`crate::error::Error::JournalIo`], except
/// [`Error::NotInitialized`] which becomes
/// [`crate::error::Error::DeviceNotReady`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// The address range lies outside the device.
    OutOfBounds,
    /// The device rejected a program operation.
    WriteError,
    /// The device rejected a read operation.
    ReadError,
    /// The device failed to erase a sector.
    EraseError,
    /// The device is not ready for use.
    NotInitialized,
}

impl Error {
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::OutOfBounds => "Address out of bounds",
            Error::WriteError => "Flash write failed",
            Error::ReadError => "Flash read failed",
            Error::EraseError => "Sector erase failed",
            Error::NotInitialized => "Device not ready",
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}
