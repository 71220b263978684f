use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use astarte_device_store::bson::{Document, Serializer};
use astarte_device_store::caching::Cache;
use astarte_device_store::data::Individual;
use astarte_device_store::device::{Device, DeviceConfig, Event, Publish, Subscribe};
use astarte_device_store::error::Error;
use astarte_device_store::interface::{Interface, Introspection};
use astarte_device_store::network::mqtt::{Client, Options, QoS};
use astarte_device_store::network::prelude::*;
use astarte_device_store::storage::error::Error as FlashError;
use astarte_device_store::storage::journal::{FlashJournal, JournalConfig, RamJournal};
use astarte_device_store::storage::kv::StoreConfig;
use astarte_device_store::storage::prelude::*;

const COMMANDS_JSON: &str = r#"{
    "interface_name": "org.example.Commands",
    "version_major": 1,
    "version_minor": 0,
    "type": "properties",
    "ownership": "server",
    "mappings": [
        { "endpoint": "/%{motor}/speed", "type": "integer", "allow_unset": true }
    ]
}"#;

const SETTINGS_JSON: &str = r#"{
    "interface_name": "org.example.Settings",
    "version_major": 1,
    "version_minor": 0,
    "type": "properties",
    "ownership": "device",
    "mappings": [
        { "endpoint": "/%{id}/enabled", "type": "boolean", "reliability": "unique" }
    ]
}"#;

const CONFIG: DeviceConfig<'static> = DeviceConfig {
    realm: "realm",
    device_id: "device",
};

fn introspection() -> Introspection {
    let mut introspection = Introspection::new();
    introspection.add(Interface::from_json(COMMANDS_JSON).unwrap()).unwrap();
    introspection.add(Interface::from_json(SETTINGS_JSON).unwrap()).unwrap();
    introspection
}

fn value_document(value: &Individual<'_>) -> Vec<u8> {
    let mut ser = Serializer::new();
    value.serialize(&mut ser, "v");
    ser.finish().unwrap()
}

#[derive(Default)]
struct Wire {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
}

/// Broker side of an in-memory connection.
#[derive(Clone, Default)]
struct MockConnection {
    wire: Rc<RefCell<Wire>>,
}

impl MockConnection {
    fn feed(&self, bytes: &[u8]) {
        self.wire.borrow_mut().incoming.extend(bytes);
    }

    fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.wire.borrow_mut().written)
    }
}

impl Read for MockConnection {
    type Error = ();

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
    type Error = ();

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.wire.borrow_mut().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for MockConnection {
    type Error = ();

    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for MockConnection {}

/// Split a byte stream written by the client into `(header, body)` packets.
fn packets(bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut packets = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let header = bytes[pos];
        pos += 1;
        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let byte = bytes[pos];
            pos += 1;
            len |= usize::from(byte & 0x7F) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        packets.push((header, bytes[pos..pos + len].to_vec()));
        pos += len;
    }
    packets
}

fn publishes(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    packets(bytes)
        .into_iter()
        .filter(|(header, _)| header & 0xF0 == 0x30)
        .map(|(header, body)| {
            let topic_len = usize::from(u16::from_be_bytes([body[0], body[1]]));
            let topic = String::from_utf8(body[2..2 + topic_len].to_vec()).unwrap();
            let mut start = 2 + topic_len;
            if (header >> 1) & 0x03 != 0 {
                start += 2;
            }
            (topic, body[start..].to_vec())
        })
        .collect()
}

fn server_publish(topic: &str, packet_id: u16, payload: &[u8]) -> Vec<u8> {
    let remaining = 2 + topic.len() + 2 + payload.len();
    assert!(remaining < 128);
    let mut packet = vec![0x32, remaining as u8];
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(&packet_id.to_be_bytes());
    packet.extend_from_slice(payload);
    packet
}

#[test]
fn test_connect_handshake_and_receive() {
    let journal = RamJournal::new();
    let cache = Cache::new(&journal, StoreConfig::default()).unwrap();
    let mut device = Device::new(CONFIG, introspection())
        .unwrap()
        .with_cache(cache)
        .unwrap();
    device
        .cache()
        .unwrap()
        .store_property("org.example.Settings", "/led/enabled", 1, &Individual::Boolean(true))
        .unwrap();

    let connection = MockConnection::default();
    connection.feed(&[0x20, 0x02, 0x00, 0x00]);
    connection.feed(&[0x90, 0x03, 0x00, 0x01, 0x02]);
    connection.feed(&[0x90, 0x03, 0x00, 0x02, 0x02]);
    let options = Options {
        client_id: "realm/device",
        keep_alive_seconds: 60,
        clean_session: false,
    };
    let mut client = Client::connect(connection.clone(), options).unwrap();
    let session_present = client.session_present();
    assert!(!session_present);

    assert_eq!(device.start_handshake(&mut client, session_present), Ok(true));
    device.complete_handshake();
    assert!(device.is_synchronized());

    let written = connection.take_written();
    let subscriptions: Vec<Vec<u8>> = packets(&written)
        .into_iter()
        .filter(|(header, _)| *header == 0x82)
        .map(|(_, body)| body)
        .collect();
    assert_eq!(subscriptions.len(), 2);
    assert!(subscriptions[0].ends_with(b"realm/device/control/consumer/properties\x02"));
    assert!(subscriptions[1].ends_with(b"realm/device/org.example.Commands/#\x02"));

    let sent = publishes(&written);
    assert_eq!(
        sent,
        vec![
            (
                "realm/device".to_string(),
                b"org.example.Commands:1:0;org.example.Settings:1:0".to_vec()
            ),
            ("realm/device/control/emptyCache".to_string(), b"1".to_vec()),
            (
                "realm/device/org.example.Settings/led/enabled".to_string(),
                value_document(&Individual::Boolean(true))
            ),
        ]
    );

    let payload = value_document(&Individual::Integer(7));
    connection.feed(&server_publish(
        "realm/device/org.example.Commands/left/speed",
        0x10,
        &payload,
    ));
    let message = client.poll().unwrap().unwrap();
    assert_eq!(message.qos, QoS::AtLeastOnce);
    assert_eq!(connection.take_written(), [0x40, 0x02, 0x00, 0x10]);

    let event = device.on_incoming(&message.topic, &message.payload).unwrap();
    assert_eq!(
        event,
        Some(Event::PropertySet {
            interface_name: "org.example.Commands",
            path: "/left/speed",
            value: Individual::Integer(7),
        })
    );
    assert_eq!(
        device
            .cache()
            .unwrap()
            .load_property("org.example.Commands", "/left/speed"),
        Ok((1, Individual::Integer(7)))
    );

    client.disconnect().unwrap();
    assert_eq!(connection.take_written(), [0xE0, 0x00]);
}

#[test]
fn test_client_errors_become_publish_errors() {
    let device: Device<'_, RamJournal> = Device::new(CONFIG, introspection()).unwrap();

    let connection = MockConnection::default();
    connection.feed(&[0x20, 0x02, 0x00, 0x00]);
    connection.feed(&[0x90, 0x03, 0x00, 0x01, 0x80]);
    let options = Options {
        client_id: "realm/device",
        keep_alive_seconds: 60,
        clean_session: true,
    };
    let mut client = Client::connect(connection, options).unwrap();

    assert_eq!(
        device.start_handshake(&mut client, false),
        Err(Error::Publish)
    );
}

const ERASED_BYTE: u8 = 0xFF;

/// NOR flash held in memory.
struct MockFlash {
    memory: Vec<u8>,
    sector_size: usize,
}

impl MockFlash {
    fn new(sector_size: usize, sector_count: usize) -> Self {
        Self {
            memory: vec![ERASED_BYTE; sector_size * sector_count],
            sector_size,
        }
    }

    fn range(&self, offset: u32, len: usize) -> Result<std::ops::Range<usize>, FlashError> {
        let start = offset as usize;
        let end = start + len;
        if end > self.memory.len() {
            return Err(FlashError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl ReadStorage for MockFlash {
    type Error = FlashError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        bytes.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.memory.len()
    }
}

impl Storage for MockFlash {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = self.range(offset, bytes.len())?;
        for (cell, byte) in self.memory[range].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

impl BlockingErase for MockFlash {
    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let range = self.range(from, to.saturating_sub(from) as usize)?;
        self.memory[range].fill(ERASED_BYTE);
        Ok(())
    }
}

impl SectorStorage for MockFlash {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> usize {
        self.memory.len() / self.sector_size
    }
}

#[derive(Default)]
struct Recorder {
    published: Vec<(String, Vec<u8>)>,
}

impl Publish for Recorder {
    fn publish(&mut self, topic: &str, payload: &[u8], _qos: QoS) -> Result<(), Error> {
        self.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

impl Subscribe for Recorder {
    fn subscribe(&mut self, _topic: &str, _qos: QoS) -> Result<(), Error> {
        Ok(())
    }
}

#[test]
fn test_state_survives_remount() {
    let flash = MockFlash::new(1024, 4);
    let config = JournalConfig::from_device(&flash);
    let journal = FlashJournal::mount(flash, config).unwrap();

    {
        let cache = Cache::new(&journal, StoreConfig::default()).unwrap();
        let mut device = Device::new(CONFIG, introspection())
            .unwrap()
            .with_cache(cache)
            .unwrap();
        let mut recorder = Recorder::default();
        device
            .set_property(
                &mut recorder,
                "org.example.Settings",
                "/led/enabled",
                &Individual::Boolean(false),
            )
            .unwrap();
        assert_eq!(device.start_handshake(&mut recorder, false), Ok(true));
        device.complete_handshake();
    }

    let flash = journal.unmount();
    let journal = FlashJournal::mount(flash, config).unwrap();
    let cache = Cache::new(&journal, StoreConfig::default()).unwrap();
    let device = Device::new(CONFIG, introspection())
        .unwrap()
        .with_cache(cache)
        .unwrap();

    assert!(device.is_synchronized());
    assert_eq!(
        device
            .cache()
            .unwrap()
            .load_property("org.example.Settings", "/led/enabled"),
        Ok((1, Individual::Boolean(false)))
    );

    let mut recorder = Recorder::default();
    assert_eq!(device.start_handshake(&mut recorder, true), Ok(false));
    assert!(recorder.published.is_empty());

    assert_eq!(device.start_handshake(&mut recorder, false), Ok(true));
    let (topic, payload) = recorder.published.last().unwrap();
    assert_eq!(topic, "realm/device/org.example.Settings/led/enabled");
    let document = Document::new(payload).unwrap();
    assert_eq!(document.lookup("v").unwrap().as_bool(), Ok(false));
}
