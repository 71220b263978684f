//! A network abstraction layer for embedded systems
//!
//! The device glue talks to the broker through the MQTT 3.1.1 client in
//! [`mqtt`], which runs over any transport implementing [`Connection`].
//! Opening the transport (TCP, TLS, a modem socket) is left to the
//! application.

#![allow(missing_docs)]
#![deny(unsafe_code)]

/// Common error types for network operations
pub mod error;

/// MQTT 3.1.1 client
pub mod mqtt;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connection, Read, Write};
}

pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}
