use alloc::collections::VecDeque;
use alloc::format;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;

use super::*;
use crate::network::error::Error;
use crate::network::{Close, Connection, Read, Write};

/// Bytes the broker sends and bytes the client wrote, shared with the test.
#[derive(Debug, Default)]
struct Wire {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct MockConnection {
    wire: Rc<RefCell<Wire>>,
}

impl MockConnection {
    fn with_incoming(bytes: &[u8]) -> Self {
        let connection = Self::default();
        connection.feed(bytes);
        connection
    }

    fn feed(&self, bytes: &[u8]) {
        self.wire.borrow_mut().incoming.extend(bytes.iter().copied());
    }

    fn take_written(&self) -> Vec<u8> {
        core::mem::take(&mut self.wire.borrow_mut().written)
    }
}

impl Read for MockConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut wire = self.wire.borrow_mut();
        let len = buf.len().min(wire.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(wire.incoming.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for MockConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.wire.borrow_mut().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for MockConnection {}

fn options() -> Options<'static> {
    Options {
        client_id: "dev",
        keep_alive_seconds: 60,
        clean_session: true,
    }
}

fn connected(session_present: bool) -> (Client<MockConnection>, MockConnection) {
    let connection = MockConnection::with_incoming(&[0x20, 0x02, session_present as u8, 0x00]);
    let handle = connection.clone();
    let client = Client::connect(connection, options()).unwrap();
    handle.take_written();
    (client, handle)
}

#[test]
fn test_connect() {
    let connection = MockConnection::with_incoming(&[0x20, 0x02, 0x01, 0x00]);
    let handle = connection.clone();
    let client = Client::connect(connection, options()).unwrap();
    assert!(client.session_present());

    let expected = [
        0x10, 15, 0, 4, b'M', b'Q', b'T', b'T', 4, 0x02, 0, 60, 0, 3, b'd', b'e', b'v',
    ];
    assert_eq!(handle.take_written(), expected);
}

#[test]
fn test_client_debug() {
    let (client, _) = connected(true);
    assert_eq!(
        format!("{:?}", client),
        "Client { session_present: true, next_packet_id: 1 }"
    );
}

#[test]
fn test_connect_refused() {
    let connection = MockConnection::with_incoming(&[0x20, 0x02, 0x00, 0x05]);
    assert_eq!(
        Client::connect(connection, options()).err(),
        Some(Error::ConnectionRefused)
    );

    let connection = MockConnection::with_incoming(&[0x20, 0x02]);
    assert_eq!(
        Client::connect(connection, options()).err(),
        Some(Error::ConnectionClosed)
    );
}

#[test]
fn test_publish() {
    let (mut client, handle) = connected(false);

    client.publish("a/b", b"hi", QoS::AtMostOnce).unwrap();
    assert_eq!(handle.take_written(), [0x30, 7, 0, 3, b'a', b'/', b'b', b'h', b'i']);

    client.publish("a/b", b"", QoS::ExactlyOnce).unwrap();
    assert_eq!(handle.take_written(), [0x34, 7, 0, 3, b'a', b'/', b'b', 0, 1]);

    client.publish("a/b", b"", QoS::AtLeastOnce).unwrap();
    assert_eq!(handle.take_written(), [0x32, 7, 0, 3, b'a', b'/', b'b', 0, 2]);
}

#[test]
fn test_publish_long_payload() {
    let (mut client, handle) = connected(false);
    let payload = vec![0xAB; 200];
    client.publish("a/b", &payload, QoS::AtMostOnce).unwrap();

    let written = handle.take_written();
    // 205 bytes of remaining length take two bytes.
    assert_eq!(&written[..3], &[0x30, 0xCD, 0x01]);
    assert_eq!(written.len(), 3 + 205);

    let payload = vec![0; MAX_PAYLOAD_LEN + 1];
    assert_eq!(
        client.publish("a/b", &payload, QoS::AtMostOnce),
        Err(Error::PacketTooLarge)
    );
}

#[test]
fn test_subscribe() {
    let (mut client, handle) = connected(false);

    handle.feed(&[0x90, 0x03, 0x00, 0x01, 0x02]);
    client.subscribe("a/#", QoS::ExactlyOnce).unwrap();
    assert_eq!(
        handle.take_written(),
        [0x82, 8, 0, 1, 0, 3, b'a', b'/', b'#', 2]
    );

    handle.feed(&[0x90, 0x03, 0x00, 0x02, 0x80]);
    assert_eq!(
        client.subscribe("b/#", QoS::ExactlyOnce),
        Err(Error::SubscriptionRefused)
    );

    handle.feed(&[0x90, 0x03, 0x00, 0x09, 0x00]);
    assert_eq!(
        client.subscribe("c/#", QoS::AtMostOnce),
        Err(Error::ProtocolError)
    );
}

#[test]
fn test_poll_publish() {
    let (mut client, handle) = connected(false);
    assert_eq!(client.poll(), Ok(None));

    handle.feed(&[0x30, 5, 0, 1, b't', b'o', b'k']);
    let packet = client.poll().unwrap().unwrap();
    assert_eq!(packet.topic.as_str(), "t");
    assert_eq!(&packet.payload[..], b"ok");
    assert_eq!(packet.qos, QoS::AtMostOnce);
    assert!(handle.take_written().is_empty());

    handle.feed(&[0x32, 5, 0, 1, b't', 0, 7]);
    let packet = client.poll().unwrap().unwrap();
    assert!(packet.payload.is_empty());
    assert_eq!(handle.take_written(), [0x40, 2, 0, 7]);

    handle.feed(&[0x34, 6, 0, 1, b't', 0, 8, b'x']);
    let packet = client.poll().unwrap().unwrap();
    assert_eq!(&packet.payload[..], b"x");
    assert_eq!(handle.take_written(), [0x50, 2, 0, 8]);

    handle.feed(&[0x62, 2, 0, 8]);
    assert_eq!(client.poll(), Ok(None));
    assert_eq!(handle.take_written(), [0x70, 2, 0, 8]);
}

#[test]
fn test_poll_acknowledgements() {
    let (mut client, handle) = connected(false);

    handle.feed(&[0x50, 2, 0, 3]);
    assert_eq!(client.poll(), Ok(None));
    assert_eq!(handle.take_written(), [0x62, 2, 0, 3]);

    handle.feed(&[0x40, 2, 0, 4, 0x70, 2, 0, 3]);
    assert_eq!(client.poll(), Ok(None));
    assert_eq!(client.poll(), Ok(None));
    assert!(handle.take_written().is_empty());
}

#[test]
fn test_poll_malformed_publish() {
    let (mut client, handle) = connected(false);
    handle.feed(&[0x30, 3, 0, 9, b't']);
    assert_eq!(client.poll(), Err(Error::ProtocolError));
}

#[test]
fn test_disconnect() {
    let (client, handle) = connected(false);
    client.disconnect().unwrap();
    assert_eq!(handle.take_written(), [0xE0, 0]);
}
