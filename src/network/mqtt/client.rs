//! MQTT 3.1.1 client over a [`Connection`](crate::network::Connection).
//!
//! The client is blocking and keeps no session state besides the packet
//! identifier counter: outgoing QoS 1 and 2 publishes are written once and
//! their acknowledgements are consumed by [`Client::poll`], which also
//! answers the acknowledgements the broker expects for incoming publishes.
//!
//! Topics and payloads are held in fixed-size buffers, see [`MAX_TOPIC_LEN`]
//! and [`MAX_PAYLOAD_LEN`].

use heapless::{String, Vec};

use crate::network::error::Error;
use crate::network::{Connection, Read, Write};

// MQTT Control Packet types
const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const PUBACK: u8 = 0x40;
const PUBREC: u8 = 0x50;
const PUBREL: u8 = 0x60;
const PUBCOMP: u8 = 0x70;
const SUBSCRIBE: u8 = 0x82;
const SUBACK: u8 = 0x90;
const DISCONNECT: u8 = 0xE0;

/// Fixed header flags mandated for PUBREL.
const PUBREL_FLAGS: u8 = 0x02;

// Protocol constants
const PROTOCOL_NAME: &[u8] = b"MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

/// Longest topic the client sends or receives.
pub const MAX_TOPIC_LEN: usize = 256;
/// Largest payload the client sends or receives.
pub const MAX_PAYLOAD_LEN: usize = 4096;

const MAX_PACKET_LEN: usize = 2 + MAX_TOPIC_LEN + 2 + MAX_PAYLOAD_LEN;

/// Variable header and payload of a packet.
type Packet = Vec<u8, MAX_PACKET_LEN>;

/// An incoming publish packet.
///
/// ```rust
/// use astarte_device_store::network::mqtt::{PublishPacket, QoS};
/// use heapless::{String, Vec};
///
/// let packet = PublishPacket {
///     topic: String::try_from("realm/device/org.example.Settings/led").unwrap(),
///     payload: Vec::new(),
///     qos: QoS::ExactlyOnce,
/// };
/// assert!(packet.payload.is_empty());
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublishPacket {
    /// The topic of the message.
    pub topic: String<MAX_TOPIC_LEN>,
    /// The payload of the message.
    pub payload: Vec<u8, MAX_PAYLOAD_LEN>,
    /// The delivery level the broker used.
    pub qos: QoS,
}

/// Quality of Service levels for MQTT messages.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QoS {
    /// At most once delivery.
    AtMostOnce = 0,
    /// At least once delivery.
    AtLeastOnce = 1,
    /// Exactly once delivery.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::ProtocolError),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QoS {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "QoS{=u8}", *self as u8)
    }
}

/// Options for configuring the MQTT client connection.
#[derive(Debug, Clone)]
pub struct Options<'a> {
    /// The client identifier, must be unique.
    pub client_id: &'a str,
    /// The keep-alive time in seconds.
    pub keep_alive_seconds: u16,
    /// Whether to start a clean session.
    pub clean_session: bool,
}

/// An MQTT 3.1.1 client.
pub struct Client<C: Connection> {
    connection: C,
    session_present: bool,
    next_packet_id: u16,
}

impl<C: Connection> core::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("session_present", &self.session_present)
            .field("next_packet_id", &self.next_packet_id)
            .finish()
    }
}

impl<C: Connection> Client<C> {
    /// Establishes an MQTT connection with the server.
    ///
    /// This function sends a `CONNECT` packet and waits for a `CONNACK` response.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionRefused`] if the broker refuses the client
    /// - [`Error::ProtocolError`] if the answer is not a valid `CONNACK`
    /// - [`Error::ReadError`], [`Error::WriteError`] or
    ///   [`Error::ConnectionClosed`] on transport failures
    pub fn connect(mut connection: C, options: Options<'_>) -> Result<Self, Error> {
        let mut packet = Packet::new();
        put_prefixed(&mut packet, PROTOCOL_NAME)?;
        put(&mut packet, &[PROTOCOL_LEVEL])?;

        let mut connect_flags = 0;
        if options.clean_session {
            connect_flags |= 0x02;
        }
        put(&mut packet, &[connect_flags])?;
        put(&mut packet, &options.keep_alive_seconds.to_be_bytes())?;
        put_prefixed(&mut packet, options.client_id.as_bytes())?;

        write_packet(&mut connection, CONNECT, &packet)?;

        let mut connack = [0u8; 4];
        read_exact(&mut connection, &mut connack)?;
        if connack[0] != CONNACK || connack[1] != 2 {
            return Err(Error::ProtocolError);
        }

        match connack[3] {
            0 => Ok(Self {
                connection,
                session_present: connack[2] & 0x01 != 0,
                next_packet_id: 1,
            }),
            1..=5 => Err(Error::ConnectionRefused),
            _ => Err(Error::ProtocolError),
        }
    }

    /// Whether the broker resumed a previous session on connect.
    pub fn session_present(&self) -> bool {
        self.session_present
    }

    /// Publishes a message to a topic.
    ///
    /// # Errors
    ///
    /// [`Error::PacketTooLarge`] if the topic or the payload exceed the
    /// client buffers.
    pub fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Error> {
        if topic.len() > MAX_TOPIC_LEN || payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PacketTooLarge);
        }

        let mut packet = Packet::new();
        put_prefixed(&mut packet, topic.as_bytes())?;
        if qos != QoS::AtMostOnce {
            let packet_id = self.packet_id();
            put(&mut packet, &packet_id.to_be_bytes())?;
        }
        put(&mut packet, payload)?;

        write_packet(&mut self.connection, PUBLISH | ((qos as u8) << 1), &packet)
    }

    /// Subscribes to a topic filter and waits for the `SUBACK`.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        let packet_id = self.packet_id();

        let mut packet = Packet::new();
        put(&mut packet, &packet_id.to_be_bytes())?;
        put_prefixed(&mut packet, topic.as_bytes())?;
        put(&mut packet, &[qos as u8])?;

        write_packet(&mut self.connection, SUBSCRIBE, &packet)?;

        let mut suback = [0u8; 5];
        read_exact(&mut self.connection, &mut suback)?;
        if suback[0] != SUBACK || suback[1] != 3 {
            return Err(Error::ProtocolError);
        }
        if u16::from_be_bytes([suback[2], suback[3]]) != packet_id {
            return Err(Error::ProtocolError);
        }

        match suback[4] {
            0..=2 => Ok(()),
            0x80 => Err(Error::SubscriptionRefused),
            _ => Err(Error::ProtocolError),
        }
    }

    /// Polls the connection for incoming messages.
    ///
    /// Reads one packet. Incoming publishes are acknowledged and returned,
    /// the acknowledgement flow of outgoing publishes is completed, and any
    /// other packet is consumed silently.
    pub fn poll(&mut self) -> Result<Option<PublishPacket>, Error> {
        let mut header = [0u8; 1];
        match self.connection.read(&mut header) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(_) => return Err(Error::ReadError),
        }

        let remaining_len = read_remaining_length(&mut self.connection)?;
        let mut packet = Packet::new();
        packet
            .resize(remaining_len, 0)
            .map_err(|_| Error::PacketTooLarge)?;
        read_exact(&mut self.connection, &mut packet)?;

        match header[0] & 0xF0 {
            PUBLISH => self.on_publish(header[0], &packet).map(Some),
            PUBREC => {
                self.acknowledge(PUBREL | PUBREL_FLAGS, &packet)?;
                Ok(None)
            }
            PUBREL => {
                self.acknowledge(PUBCOMP, &packet)?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Sends a `DISCONNECT` and closes the connection.
    pub fn disconnect(mut self) -> Result<(), Error> {
        write_packet(&mut self.connection, DISCONNECT, &[])?;
        self.connection.close().map_err(|_| Error::WriteError)
    }

    fn on_publish(&mut self, header: u8, packet: &[u8]) -> Result<PublishPacket, Error> {
        let qos = QoS::try_from((header >> 1) & 0x03)?;

        let topic_len = match packet {
            [high, low, ..] => u16::from_be_bytes([*high, *low]) as usize,
            _ => return Err(Error::ProtocolError),
        };
        let topic_end = 2 + topic_len;
        let topic = packet.get(2..topic_end).ok_or(Error::ProtocolError)?;
        let topic = core::str::from_utf8(topic).map_err(|_| Error::ProtocolError)?;

        let mut payload_start = topic_end;
        if qos != QoS::AtMostOnce {
            let packet_id = packet
                .get(topic_end..topic_end + 2)
                .ok_or(Error::ProtocolError)?;
            let ack = if qos == QoS::AtLeastOnce { PUBACK } else { PUBREC };
            write_packet(&mut self.connection, ack, packet_id)?;
            payload_start += 2;
        }
        let payload = packet.get(payload_start..).ok_or(Error::ProtocolError)?;

        Ok(PublishPacket {
            topic: String::try_from(topic).map_err(|_| Error::PacketTooLarge)?,
            payload: Vec::from_slice(payload).map_err(|_| Error::PacketTooLarge)?,
            qos,
        })
    }

    /// Answers a packet whose variable header is a packet identifier.
    fn acknowledge(&mut self, kind: u8, packet: &[u8]) -> Result<(), Error> {
        let packet_id = packet.get(..2).ok_or(Error::ProtocolError)?;
        write_packet(&mut self.connection, kind, packet_id)
    }

    fn packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        // Zero is not a valid packet identifier.
        self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
        id
    }
}

fn put(packet: &mut Packet, bytes: &[u8]) -> Result<(), Error> {
    packet
        .extend_from_slice(bytes)
        .map_err(|_| Error::PacketTooLarge)
}

/// Appends `bytes` preceded by their length as a big endian `u16`.
fn put_prefixed(packet: &mut Packet, bytes: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(bytes.len()).map_err(|_| Error::PacketTooLarge)?;
    put(packet, &len.to_be_bytes())?;
    put(packet, bytes)
}

fn write_packet<W: Write + ?Sized>(connection: &mut W, header: u8, body: &[u8]) -> Result<(), Error> {
    let mut fixed_header: Vec<u8, 5> = Vec::new();
    fixed_header
        .push(header)
        .map_err(|_| Error::ProtocolError)?;
    encode_remaining_length(&mut fixed_header, body.len())?;

    write_all(connection, &fixed_header)?;
    write_all(connection, body)?;
    connection.flush().map_err(|_| Error::WriteError)
}

fn write_all<W: Write + ?Sized>(connection: &mut W, mut buf: &[u8]) -> Result<(), Error> {
    while !buf.is_empty() {
        match connection.write(buf) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => buf = &buf[n..],
            Err(_) => return Err(Error::WriteError),
        }
    }
    Ok(())
}

fn read_exact<R: Read + ?Sized>(connection: &mut R, buf: &mut [u8]) -> Result<(), Error> {
    let mut total_read = 0;
    while total_read < buf.len() {
        match connection.read(&mut buf[total_read..]) {
            Ok(0) => return Err(Error::ConnectionClosed),
            Ok(n) => total_read += n,
            Err(_) => return Err(Error::ReadError),
        }
    }
    Ok(())
}

fn read_remaining_length<R: Read + ?Sized>(connection: &mut R) -> Result<usize, Error> {
    let mut remaining_len = 0;
    let mut multiplier = 1;
    for _ in 0..4 {
        let mut byte = [0u8; 1];
        read_exact(connection, &mut byte)?;
        remaining_len += (byte[0] & 0x7F) as usize * multiplier;
        if byte[0] & 0x80 == 0 {
            return Ok(remaining_len);
        }
        multiplier *= 128;
    }
    Err(Error::ProtocolError)
}

/// Encodes the remaining length field for an MQTT packet.
fn encode_remaining_length(buf: &mut Vec<u8, 5>, mut len: usize) -> Result<(), Error> {
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        buf.push(byte).map_err(|_| Error::PacketTooLarge)?;
        if len == 0 {
            return Ok(());
        }
    }
}
