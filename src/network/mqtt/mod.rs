//! MQTT 3.1.1 protocol implementation for embedded systems.
//!
//! Astarte devices exchange every message over MQTT: data is published on
//! `<realm>/<device id>/<interface><path>`, the introspection on the bare
//! `<realm>/<device id>` topic and control messages below
//! `<realm>/<device id>/control`.
//!
//! The main entry point is the [`Client`] which provides methods for
//! connecting, publishing, subscribing, and receiving messages.
//!
//! ```rust,no_run
//! use astarte_device_store::network::mqtt::{Client, Options, QoS};
//! # use astarte_device_store::network::Connection;
//! # struct MockConnection;
//! # impl Connection for MockConnection {}
//! # impl astarte_device_store::network::Read for MockConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! # }
//! # impl astarte_device_store::network::Write for MockConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl astarte_device_store::network::Close for MockConnection {
//! #     type Error = ();
//! #     fn close(self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//!
//! let connection = MockConnection;
//! let options = Options {
//!     client_id: "test/2TBn-jNESuuHamE2Zo1anA",
//!     keep_alive_seconds: 60,
//!     clean_session: false,
//! };
//!
//! let mut client = Client::connect(connection, options).unwrap();
//! client
//!     .subscribe("test/2TBn-jNESuuHamE2Zo1anA/control/consumer/properties", QoS::ExactlyOnce)
//!     .unwrap();
//! ```

pub mod client;

#[cfg(test)]
mod tests;

pub use client::{Client, MAX_PAYLOAD_LEN, MAX_TOPIC_LEN, Options, PublishPacket, QoS};
