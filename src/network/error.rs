//! Common error types for network operations

/// A common error type for network operations.
///
/// This enum defines a set of common errors that can occur when talking to
/// the broker over a [`Connection`](crate::network::Connection). It is
/// designed to be simple and portable for `no_std` environments.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a connection that is not open.
    NotOpen,
    /// An error occurred during a write operation.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// A connection attempt was refused.
    ConnectionRefused,
    /// A timeout occurred.
    Timeout,
    /// The connection was closed.
    ConnectionClosed,
    /// A protocol-specific error occurred.
    ProtocolError,
    /// A topic or payload does not fit the client buffers.
    PacketTooLarge,
    /// The broker refused a subscription.
    SubscriptionRefused,
}

impl Error {
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::NotOpen => "NotOpen",
            Error::WriteError => "WriteError",
            Error::ReadError => "ReadError",
            Error::ConnectionRefused => "ConnectionRefused",
            Error::Timeout => "Timeout",
            Error::ConnectionClosed => "ConnectionClosed",
            Error::ProtocolError => "ProtocolError",
            Error::PacketTooLarge => "PacketTooLarge",
            Error::SubscriptionRefused => "SubscriptionRefused",
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
