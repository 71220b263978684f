//! Common error type for the codec, value model, journal, store and glue layers

/// The error taxonomy shared by every layer of the crate.
///
/// Variants describe the *kind* of failure. [`Error::NotFound`] is special: it
/// is the normal control-flow signal for a missing key or an exhausted
/// iterator and should be checked with [`Error::is_not_found`] before treating
/// a result as a real failure.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// A caller broke an API contract (empty key, malformed path, bad QoS).
    InvalidParameter,
    /// An allocation could not be satisfied.
    OutOfMemory,
    /// The requested entry does not exist, or an iterator is exhausted.
    NotFound,
    /// The 16-bit journal ID space or the journal's sectors are exhausted.
    StorageFull,
    /// The storage device did not respond when the journal was mounted.
    DeviceNotReady,
    /// The journal could not be mounted on the given region.
    MountFailed,
    /// A journal read or write failed at the device level.
    JournalIo,
    /// A binary document failed validation or could not be walked.
    DocumentMalformed,
    /// A binary document grew past the maximum encodable length.
    DocumentTooLarge,
    /// A value or element had a different type than the one expected.
    TypeMismatch,
    /// An array contained elements of more than one type.
    ArrayHeterogeneous,
    /// An internal inconsistency that should never happen.
    InternalError,
    /// The store lock could not be acquired within the configured bound.
    LockTimeout,
    /// The interface is not part of the device introspection.
    InterfaceNotFound,
    /// The interface conflicts with the version already in the introspection.
    InterfaceConflicting,
    /// No mapping of the interface matches the given path.
    MappingNotFound,
    /// The mapping does not allow unsetting the property.
    UnsetNotAllowed,
    /// The mapping requires an explicit timestamp and none was given.
    ExplicitTimestampRequired,
    /// The mapping does not accept an explicit timestamp.
    ExplicitTimestampNotSupported,
    /// An aggregated object did not provide a value for every mapping.
    IncompleteAggregationObject,
    /// The cached introspection differs from the current one.
    OutdatedIntrospection,
    /// The message could not be handed over to the MQTT client.
    Publish,
}

impl Error {
    /// Returns `true` for the non-exceptional [`Error::NotFound`] signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    /// A short stable name for the error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::InvalidParameter => "InvalidParameter",
            Error::OutOfMemory => "OutOfMemory",
            Error::NotFound => "NotFound",
            Error::StorageFull => "StorageFull",
            Error::DeviceNotReady => "DeviceNotReady",
            Error::MountFailed => "MountFailed",
            Error::JournalIo => "JournalIo",
            Error::DocumentMalformed => "DocumentMalformed",
            Error::DocumentTooLarge => "DocumentTooLarge",
            Error::TypeMismatch => "TypeMismatch",
            Error::ArrayHeterogeneous => "ArrayHeterogeneous",
            Error::InternalError => "InternalError",
            Error::LockTimeout => "LockTimeout",
            Error::InterfaceNotFound => "InterfaceNotFound",
            Error::InterfaceConflicting => "InterfaceConflicting",
            Error::MappingNotFound => "MappingNotFound",
            Error::UnsetNotAllowed => "UnsetNotAllowed",
            Error::ExplicitTimestampRequired => "ExplicitTimestampRequired",
            Error::ExplicitTimestampNotSupported => "ExplicitTimestampNotSupported",
            Error::IncompleteAggregationObject => "IncompleteAggregationObject",
            Error::OutdatedIntrospection => "OutdatedIntrospection",
            Error::Publish => "Publish",
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<crate::storage::error::Error> for Error {
    fn from(err: crate::storage::error::Error) -> Self {
        match err {
            crate::storage::error::Error::NotInitialized => Error::DeviceNotReady,
            _ => Error::JournalIo,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}
