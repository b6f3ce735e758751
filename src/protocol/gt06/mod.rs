//! GT06-family tracker protocol.
//!
//! Binary, bidirectional, CRC-16/X.25 checked. The session starts with a
//! login frame carrying a nibble-packed IMEI; once the device is resolved,
//! position and status frames flow in and every inbound frame is answered
//! with a short acknowledgement echoing its type and serial number.
//!
//! On the first successful login the decoder pushes the device's stored
//! settings (SOS numbers, contact list, a TIMER refresh) as free-text
//! commands. The device confirms them out of band with relayed text echoes,
//! which are matched by substring and flipped to acknowledged in the sink.

pub mod commands;
pub mod framing;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::directory::DeviceDirectory;
use crate::error::{GatewayError, Result};
use crate::framing::FramingPolicy;
use crate::model::{Contact, DeviceId, DeviceSettings, Position, SosNumber};
use crate::protocol::crc::crc16;
use crate::protocol::{ControlSignal, Decoded, ProtocolDecoder};
use crate::sink::PositionSink;
use crate::writer::CommandLink;

use self::framing::Gt06FrameSplitter;

pub const MSG_LOGIN: u8 = 0x01;
pub const MSG_GPS: u8 = 0x10;
pub const MSG_LBS: u8 = 0x11;
pub const MSG_GPS_LBS_1: u8 = 0x12;
pub const MSG_STATUS: u8 = 0x13;
pub const MSG_STRING: u8 = 0x15;
pub const MSG_GPS_LBS_STATUS_1: u8 = 0x16;
pub const MSG_GPS_PHONE: u8 = 0x1A;
pub const MSG_GPS_LBS_EXTEND: u8 = 0x1E;
pub const MSG_GPS_LBS_2: u8 = 0x22;
pub const MSG_GPS_LBS_STATUS_2: u8 = 0x26;
pub const MSG_GPS_LBS_STATUS_3: u8 = 0x27;
pub const MSG_COMMAND_0: u8 = 0x80;
pub const MSG_COMMAND_1: u8 = 0x81;
pub const MSG_COMMAND_2: u8 = 0x82;

/// Raw coordinates are minutes times 30000.
const COORDINATE_DIVISOR: f64 = 60.0 * 30000.0;
/// km/h to knots.
const KNOTS_PER_KMH: f64 = 0.539957;

/// Framing policy for GT06 listeners.
pub fn framing_policy() -> FramingPolicy {
    FramingPolicy::Custom(|| Box::new(Gt06FrameSplitter::new()))
}

fn has_gps(msg_type: u8) -> bool {
    matches!(
        msg_type,
        MSG_GPS
            | MSG_GPS_LBS_1
            | MSG_GPS_LBS_2
            | MSG_GPS_LBS_STATUS_1
            | MSG_GPS_LBS_STATUS_2
            | MSG_GPS_LBS_STATUS_3
            | MSG_GPS_PHONE
            | MSG_GPS_LBS_EXTEND
    )
}

// 0x1E carries no cell section despite its name; 0x11 is not decoded as a
// position at all, it only gets the generic ack.
fn has_lbs(msg_type: u8) -> bool {
    matches!(
        msg_type,
        MSG_GPS_LBS_1
            | MSG_GPS_LBS_2
            | MSG_GPS_LBS_STATUS_1
            | MSG_GPS_LBS_STATUS_2
            | MSG_GPS_LBS_STATUS_3
    )
}

fn has_status(msg_type: u8) -> bool {
    matches!(
        msg_type,
        MSG_GPS_LBS_STATUS_1 | MSG_GPS_LBS_STATUS_2 | MSG_GPS_LBS_STATUS_3
    )
}

fn is_position(msg_type: u8) -> bool {
    has_gps(msg_type)
}

/// Bounds-checked cursor over one frame's content bytes.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.pos + count > self.data.len() {
            return Err(GatewayError::Decode(format!(
                "truncated content: need {} bytes at offset {}, have {}",
                count,
                self.pos,
                self.data.len()
            )));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Unpacks the 8-byte BCD IMEI. The first byte carries a single digit in
/// its low nibble, every following byte carries two.
fn decode_imei(data: &[u8]) -> String {
    let mut digits = String::with_capacity(15);
    for (index, byte) in data.iter().enumerate() {
        if index > 0 {
            digits.push(char::from(b'0' + (byte >> 4)));
        }
        digits.push(char::from(b'0' + (byte & 0x0F)));
    }
    digits
}

fn read_time(reader: &mut Reader<'_>, tz_offset_secs: i32) -> Result<DateTime<Utc>> {
    let raw = reader.take(6)?;
    let naive = NaiveDate::from_ymd_opt(2000 + i32::from(raw[0]), u32::from(raw[1]), u32::from(raw[2]))
        .and_then(|date| {
            date.and_hms_opt(u32::from(raw[3]), u32::from(raw[4]), u32::from(raw[5]))
        })
        .ok_or_else(|| GatewayError::Decode(format!("invalid timestamp {:02x?}", raw)))?;
    // Device clocks report local time; the login extension carries the zone.
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
        - Duration::seconds(i64::from(tz_offset_secs)))
}

/// Per-connection GT06 decoder.
pub struct Gt06Decoder {
    directory: Arc<DeviceDirectory>,
    sink: Arc<dyn PositionSink>,
    device_id: Option<DeviceId>,
    tz_offset_secs: i32,
    push_attempted: bool,
    settings: Option<DeviceSettings>,
    pending_sos: Vec<SosNumber>,
    pending_contacts: Vec<Contact>,
    sos_acked: bool,
    contacts_acked: bool,
    settings_marked: bool,
}

impl Gt06Decoder {
    pub fn new(directory: Arc<DeviceDirectory>, sink: Arc<dyn PositionSink>) -> Self {
        Self {
            directory,
            sink,
            device_id: None,
            tz_offset_secs: 0,
            push_attempted: false,
            settings: None,
            pending_sos: Vec::new(),
            pending_contacts: Vec::new(),
            sos_acked: false,
            contacts_acked: false,
            settings_marked: false,
        }
    }

    async fn decode_standard(&mut self, frame: &[u8], link: &CommandLink) -> Result<Decoded> {
        let total = frame.len();
        let declared = u16::from_be_bytes([frame[total - 4], frame[total - 3]]);
        let computed = crc16(&frame[2..total - 4]);
        if declared != computed {
            return Err(GatewayError::Decode(format!(
                "crc mismatch: frame carries {:04x}, computed {:04x}",
                declared, computed
            )));
        }

        let msg_type = frame[3];
        let serial = u16::from_be_bytes([frame[total - 6], frame[total - 5]]);
        let content = &frame[4..total - 6];

        match msg_type {
            MSG_LOGIN => self.handle_login(content, serial, link).await,
            MSG_COMMAND_0 | MSG_COMMAND_1 | MSG_COMMAND_2 => {
                // Our own pushed command looped back by the device; no ack.
                debug!(msg_type, "command frame consumed");
                Ok(Decoded::Nothing)
            }
            t if is_position(t) => {
                let device_id = match self.device_id {
                    Some(id) => id,
                    None => {
                        warn!(msg_type, "position frame before login, dropping");
                        return Ok(Decoded::Nothing);
                    }
                };
                let position = self.decode_position(msg_type, content, serial, device_id)?;
                link.send(commands::ack(msg_type, serial));
                Ok(Decoded::Position(position))
            }
            other => {
                debug!(msg_type = other, "unhandled message type");
                link.send(commands::ack(other, serial));
                Ok(Decoded::Nothing)
            }
        }
    }

    async fn handle_login(
        &mut self,
        content: &[u8],
        serial: u16,
        link: &CommandLink,
    ) -> Result<Decoded> {
        let mut reader = Reader::new(content);
        let unique_id = decode_imei(reader.take(8)?);
        if content.len() > 10 {
            reader.skip(2)?; // type identification code
            let bits = reader.u16()?;
            let offset = i32::from(bits >> 4) * 36;
            self.tz_offset_secs = if bits & 0x8 != 0 { -offset } else { offset };
        }

        let device_id = match self.directory.resolve(&unique_id).await? {
            Some(id) => id,
            None => {
                warn!(%unique_id, "login from unknown device");
                return Ok(Decoded::Nothing);
            }
        };
        if self.device_id.is_none() {
            self.device_id = Some(device_id);
        }
        debug!(%unique_id, device_id, "device authenticated");
        link.send(commands::ack(MSG_LOGIN, serial));

        if !self.push_attempted {
            self.push_attempted = true;
            self.push_settings(device_id, link).await?;
        }
        Ok(Decoded::Signal(ControlSignal::LoginAccepted { device_id }))
    }

    /// Pushes the stored settings once per connection: a TIMER refresh, then
    /// the pending SOS numbers and contacts. Empty pending lists count as
    /// already confirmed.
    async fn push_settings(&mut self, device_id: DeviceId, link: &CommandLink) -> Result<()> {
        let settings = match self.sink.get_settings(device_id).await? {
            Some(settings) => settings,
            None => return Ok(()),
        };
        link.send(commands::push_command(commands::timer_payload())?);

        let sos = self.sink.get_pending_sos(settings.id).await?;
        if sos.is_empty() {
            self.sos_acked = true;
        } else {
            link.send(commands::push_command(&commands::sos_payload(&sos))?);
        }

        let contacts = self.sink.get_pending_contacts(settings.id).await?;
        if contacts.is_empty() {
            self.contacts_acked = true;
        } else {
            match commands::contacts_payload(&settings.device_type, &contacts) {
                Some(payload) => link.send(commands::push_command(&payload)?),
                None => warn!(
                    device_type = %settings.device_type,
                    "no contact command grammar for this device class, leaving pending"
                ),
            }
        }

        self.pending_sos = sos;
        self.pending_contacts = contacts;
        self.settings = Some(settings);
        self.finish_settings_if_confirmed().await
    }

    async fn decode_echo(&mut self, frame: &[u8]) -> Result<Decoded> {
        let total = frame.len();
        if total < 11 {
            return Err(GatewayError::Decode(format!(
                "echo frame of {} bytes is below the minimum envelope",
                total
            )));
        }
        let declared = u16::from_be_bytes([frame[total - 4], frame[total - 3]]);
        let computed = crc16(&frame[2..total - 4]);
        if declared != computed {
            return Err(GatewayError::Decode(format!(
                "crc mismatch on echo: frame carries {:04x}, computed {:04x}",
                declared, computed
            )));
        }
        let text = String::from_utf8_lossy(&frame[5..total - 6]).into_owned();
        debug!(%text, "command echo");
        self.apply_ack_text(&text).await?;
        Ok(Decoded::Signal(ControlSignal::CommandEcho))
    }

    /// Confirmation matching is by substring, exactly as these devices
    /// report: "OK" plus the command family tag.
    async fn apply_ack_text(&mut self, text: &str) -> Result<()> {
        if !text.contains("OK") {
            return Ok(());
        }
        if text.contains("SOS1") && !self.sos_acked {
            for number in &self.pending_sos {
                self.sink.mark_sos_acknowledged(number.id).await?;
            }
            self.sos_acked = true;
        }
        if text.contains("FN1") && !self.contacts_acked {
            for contact in &self.pending_contacts {
                self.sink.mark_contact_acknowledged(contact.id).await?;
            }
            self.contacts_acked = true;
        }
        self.finish_settings_if_confirmed().await
    }

    async fn finish_settings_if_confirmed(&mut self) -> Result<()> {
        if self.settings_marked || !self.sos_acked || !self.contacts_acked {
            return Ok(());
        }
        if let Some(settings) = &self.settings {
            self.sink.mark_settings_acknowledged(settings.id).await?;
            self.settings_marked = true;
        }
        Ok(())
    }

    fn decode_position(
        &self,
        msg_type: u8,
        content: &[u8],
        serial: u16,
        device_id: DeviceId,
    ) -> Result<Position> {
        let mut reader = Reader::new(content);
        let time = read_time(&mut reader, self.tz_offset_secs)?;
        let mut position = Position::new(device_id, time);

        if has_gps(msg_type) {
            let gps_info = reader.u8()?;
            let gps_length = usize::from(gps_info >> 4);
            position.set("satellites", gps_info & 0x0F);

            let mut latitude = f64::from(reader.u32()?) / COORDINATE_DIVISOR;
            let mut longitude = f64::from(reader.u32()?) / COORDINATE_DIVISOR;
            position.speed = f64::from(reader.u8()?) * KNOTS_PER_KMH;

            let flags = reader.u16()?;
            position.course = f64::from(flags & 0x03FF);
            position.valid = flags & 0x1000 != 0;
            if flags & 0x0400 == 0 {
                latitude = -latitude;
            }
            if flags & 0x0800 != 0 {
                longitude = -longitude;
            }
            position.latitude = latitude;
            position.longitude = longitude;
            if flags & 0x4000 != 0 {
                position.set("acc", flags & 0x8000 != 0);
            }
            // gps_length covers this whole section; 12 is the base layout.
            if gps_length > 12 {
                reader.skip(gps_length - 12)?;
            }
        }

        if has_lbs(msg_type) {
            let mut lbs_length = 0;
            if has_status(msg_type) {
                lbs_length = usize::from(reader.u8()?);
            }
            position.set("mcc", reader.u16()?);
            position.set("mnc", reader.u8()?);
            position.set("lac", reader.u16()?);
            let cell = (u32::from(reader.u16()?) << 8) | u32::from(reader.u8()?);
            position.set("cell", cell);
            // lbs_length counts its own byte plus the 8 cell bytes
            if lbs_length > 9 {
                reader.skip(lbs_length - 9)?;
            }

            if has_status(msg_type) {
                position.set("alarm", true);
                let terminal_info = reader.u8()?;
                position.set("acc", terminal_info & 0x02 != 0);
                position.set("power", reader.u8()?);
                position.set("gsm", reader.u8()?);
            }
        }

        position.set("index", serial);
        Ok(position)
    }
}

#[async_trait]
impl ProtocolDecoder for Gt06Decoder {
    async fn decode(&mut self, frame: Bytes, link: &CommandLink) -> Result<Decoded> {
        if frame.len() < 10 {
            return Err(GatewayError::Decode(format!(
                "frame of {} bytes is below the minimum envelope",
                frame.len()
            )));
        }
        match [frame[0], frame[1]] {
            framing::HEADER_STANDARD => self.decode_standard(&frame, link).await,
            framing::HEADER_ECHO => self.decode_echo(&frame).await,
            magic => Err(GatewayError::Decode(format!(
                "unexpected magic {:02x} {:02x}",
                magic[0], magic[1]
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DeviceStore;
    use crate::framing::FrameSplitter;
    use crate::model::{AckStatus, Device};
    use crate::sink::MemorySink;
    use crate::writer::spawn_command_writer;
    use chrono::TimeZone;
    use tokio::io::AsyncReadExt;

    const LOGIN: &[u8] = &[
        0x78, 0x78, 0x0D, 0x01, 0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45, 0x00, 0x01, 0x8C,
        0xDD, 0x0D, 0x0A,
    ];

    const LOGIN_TZ: &[u8] = &[
        0x78, 0x78, 0x11, 0x01, 0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45, 0x3C, 0x00, 0x32,
        0x00, 0x00, 0x02, 0x54, 0xBE, 0x0D, 0x0A,
    ];

    const POSITION: &[u8] = &[
        0x78, 0x78, 0x1F, 0x12, 0x18, 0x03, 0x05, 0x08, 0x1E, 0x0F, 0xCA, 0x02, 0x6B, 0x3E, 0x90,
        0x0C, 0x3D, 0x45, 0xF8, 0x28, 0x14, 0x5A, 0x01, 0xCC, 0x00, 0x28, 0x77, 0x0A, 0xBC, 0xDE,
        0x00, 0x05, 0x80, 0xF7, 0x0D, 0x0A,
    ];

    // same fix as POSITION but with the union acc bits set (0x4000 | 0x8000)
    const POSITION_ACC_ON: &[u8] = &[
        0x78, 0x78, 0x1F, 0x12, 0x18, 0x03, 0x05, 0x08, 0x1E, 0x0F, 0xCA, 0x02, 0x6B, 0x3E, 0x90,
        0x0C, 0x3D, 0x45, 0xF8, 0x28, 0xD4, 0x5A, 0x01, 0xCC, 0x00, 0x28, 0x77, 0x0A, 0xBC, 0xDE,
        0x00, 0x05, 0x79, 0x57, 0x0D, 0x0A,
    ];

    // 0x16: gps section, lbs_length 0x0B (two filler bytes after the cell),
    // terminal info 0x02 (acc on), power 100, gsm 4, serial 7
    const STATUS: &[u8] = &[
        0x78, 0x78, 0x25, 0x16, 0x18, 0x03, 0x05, 0x08, 0x1E, 0x0F, 0xCA, 0x02, 0x6B, 0x3E, 0x90,
        0x0C, 0x3D, 0x45, 0xF8, 0x28, 0x14, 0x5A, 0x0B, 0x01, 0xCC, 0x00, 0x28, 0x77, 0x0A, 0xBC,
        0xDE, 0x00, 0x00, 0x02, 0x64, 0x04, 0x00, 0x07, 0xE9, 0xF1, 0x0D, 0x0A,
    ];

    // "DWXX,OK! SOS1 set ok", serial 3
    const ECHO_SOS: &[u8] = &[
        0x79, 0x79, 0x00, 0x19, 0x21, 0x44, 0x57, 0x58, 0x58, 0x2C, 0x4F, 0x4B, 0x21, 0x20, 0x53,
        0x4F, 0x53, 0x31, 0x20, 0x73, 0x65, 0x74, 0x20, 0x6F, 0x6B, 0x00, 0x03, 0xB1, 0x2C, 0x0D,
        0x0A,
    ];

    struct FixedStore(Vec<Device>);

    #[async_trait]
    impl DeviceStore for FixedStore {
        async fn load_devices(&self) -> Result<Vec<Device>> {
            Ok(self.0.clone())
        }
    }

    fn directory() -> Arc<DeviceDirectory> {
        Arc::new(DeviceDirectory::new(Arc::new(FixedStore(vec![Device {
            id: 1,
            unique_id: "123456789012345".into(),
        }]))))
    }

    fn echo_frame(text: &str, serial: u16) -> Vec<u8> {
        let body = text.as_bytes();
        let mut frame = vec![0x79, 0x79];
        frame.extend_from_slice(&((body.len() + 5) as u16).to_be_bytes());
        frame.push(0x21);
        frame.extend_from_slice(body);
        frame.extend_from_slice(&serial.to_be_bytes());
        let checksum = crc16(&frame[2..]);
        frame.extend_from_slice(&checksum.to_be_bytes());
        frame.extend_from_slice(&[0x0D, 0x0A]);
        frame
    }

    /// Runs `decode` for every frame and returns the frames written back.
    async fn session(
        decoder: &mut Gt06Decoder,
        inbound: &[&[u8]],
    ) -> (Vec<Decoded>, Vec<Bytes>) {
        let (near, mut far) = tokio::io::duplex(4096);
        let (link, writer_task) = spawn_command_writer(near);

        let mut outcomes = Vec::new();
        for frame in inbound {
            outcomes.push(
                decoder
                    .decode(Bytes::copy_from_slice(frame), &link)
                    .await
                    .unwrap(),
            );
        }
        drop(link);
        writer_task.await.unwrap().unwrap();

        let mut written = Vec::new();
        far.read_to_end(&mut written).await.unwrap();
        let mut splitter = Gt06FrameSplitter::new();
        (outcomes, splitter.push(&written).unwrap())
    }

    #[test]
    fn test_decode_imei() {
        assert_eq!(
            decode_imei(&[0x01, 0x23, 0x45, 0x67, 0x89, 0x01, 0x23, 0x45]),
            "123456789012345"
        );
        assert_eq!(
            decode_imei(&[0x01, 0x23, 0x45, 0x67, 0x01, 0x23, 0x45, 0x67]),
            "123456701234567"
        );
    }

    #[test]
    fn test_echo_frame_builder_matches_fixture() {
        assert_eq!(echo_frame("DWXX,OK! SOS1 set ok", 3), ECHO_SOS);
    }

    #[tokio::test]
    async fn test_login_known_device() {
        let mut decoder = Gt06Decoder::new(directory(), MemorySink::new());
        let (outcomes, frames) = session(&mut decoder, &[LOGIN]).await;

        assert!(matches!(
            outcomes[0],
            Decoded::Signal(ControlSignal::LoginAccepted { device_id: 1 })
        ));
        assert_eq!(frames.len(), 1);
        assert_eq!(
            &frames[0][..],
            &[0x78, 0x78, 0x05, 0x01, 0x00, 0x01, 0xD9, 0xDC, 0x0D, 0x0A]
        );
    }

    #[tokio::test]
    async fn test_login_unknown_device_gets_no_ack() {
        let store = Arc::new(FixedStore(Vec::new()));
        let mut decoder = Gt06Decoder::new(
            Arc::new(DeviceDirectory::new(store)),
            MemorySink::new(),
        );
        let (outcomes, frames) = session(&mut decoder, &[LOGIN]).await;
        assert!(matches!(outcomes[0], Decoded::Nothing));
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_position_fields() {
        let mut decoder = Gt06Decoder::new(directory(), MemorySink::new());
        let (outcomes, frames) = session(&mut decoder, &[LOGIN, POSITION]).await;

        let position = match &outcomes[1] {
            Decoded::Position(position) => position,
            other => panic!("expected a position, got {:?}", other),
        };
        assert_eq!(position.device_id, 1);
        assert_eq!(
            position.time,
            Utc.with_ymd_and_hms(2024, 3, 5, 8, 30, 15).unwrap()
        );
        assert!(position.valid);
        assert!((position.latitude - 22.546).abs() < 1e-9);
        assert!((position.longitude - 114.079).abs() < 1e-9);
        assert!((position.speed - 21.59828).abs() < 1e-9);
        assert_eq!(position.course, 90.0);
        assert_eq!(position.get("satellites"), Some(&serde_json::json!(10)));
        assert_eq!(position.get("mcc"), Some(&serde_json::json!(460)));
        assert_eq!(position.get("mnc"), Some(&serde_json::json!(0)));
        assert_eq!(position.get("lac"), Some(&serde_json::json!(10359)));
        assert_eq!(position.get("cell"), Some(&serde_json::json!(703710)));
        assert_eq!(position.get("index"), Some(&serde_json::json!(5)));
        // union bit 0x4000 is clear, so no acc attribute
        assert_eq!(position.get("acc"), None);

        // login ack then position ack
        assert_eq!(frames.len(), 2);
        assert_eq!(
            &frames[1][..],
            &[0x78, 0x78, 0x05, 0x12, 0x00, 0x05, 0xF5, 0x09, 0x0D, 0x0A]
        );
    }

    #[tokio::test]
    async fn test_position_acc_from_union_bits() {
        let mut decoder = Gt06Decoder::new(directory(), MemorySink::new());
        let (outcomes, _) = session(&mut decoder, &[LOGIN, POSITION_ACC_ON]).await;

        let position = match &outcomes[1] {
            Decoded::Position(position) => position,
            other => panic!("expected a position, got {:?}", other),
        };
        assert_eq!(position.get("acc"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_status_variant_fields() {
        let mut decoder = Gt06Decoder::new(directory(), MemorySink::new());
        let (outcomes, frames) = session(&mut decoder, &[LOGIN, STATUS]).await;

        let position = match &outcomes[1] {
            Decoded::Position(position) => position,
            other => panic!("expected a position, got {:?}", other),
        };
        assert!((position.latitude - 22.546).abs() < 1e-9);
        assert!((position.longitude - 114.079).abs() < 1e-9);
        // cell fields still land in the right place after the lbs filler
        assert_eq!(position.get("mcc"), Some(&serde_json::json!(460)));
        assert_eq!(position.get("lac"), Some(&serde_json::json!(10359)));
        assert_eq!(position.get("cell"), Some(&serde_json::json!(703710)));
        assert_eq!(position.get("alarm"), Some(&serde_json::json!(true)));
        assert_eq!(position.get("acc"), Some(&serde_json::json!(true)));
        assert_eq!(position.get("power"), Some(&serde_json::json!(100)));
        assert_eq!(position.get("gsm"), Some(&serde_json::json!(4)));
        assert_eq!(position.get("index"), Some(&serde_json::json!(7)));

        assert_eq!(frames.len(), 2);
        assert_eq!(
            &frames[1][..],
            &[0x78, 0x78, 0x05, 0x16, 0x00, 0x07, 0xB5, 0x7A, 0x0D, 0x0A]
        );
    }

    #[tokio::test]
    async fn test_time_zone_offset_applies_to_positions() {
        let mut decoder = Gt06Decoder::new(directory(), MemorySink::new());
        let (outcomes, _) = session(&mut decoder, &[LOGIN_TZ, POSITION]).await;

        let position = match &outcomes[1] {
            Decoded::Position(position) => position,
            other => panic!("expected a position, got {:?}", other),
        };
        // UTC+8 (0x3200 -> 28800 s) shifts the local fix time backwards.
        assert_eq!(
            position.time,
            Utc.with_ymd_and_hms(2024, 3, 5, 0, 30, 15).unwrap()
        );
    }

    #[tokio::test]
    async fn test_position_before_login_is_dropped() {
        let mut decoder = Gt06Decoder::new(directory(), MemorySink::new());
        let (outcomes, frames) = session(&mut decoder, &[POSITION]).await;
        assert!(matches!(outcomes[0], Decoded::Nothing));
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn test_crc_mismatch_rejects_frame() {
        let mut corrupted = LOGIN.to_vec();
        corrupted[5] ^= 0xFF;
        let mut decoder = Gt06Decoder::new(directory(), MemorySink::new());
        let link = CommandLink::disconnected();
        let result = decoder.decode(Bytes::from(corrupted), &link).await;
        assert!(matches!(result, Err(GatewayError::Decode(_))));
    }

    #[tokio::test]
    async fn test_settings_pushed_once_per_connection() {
        let sink = MemorySink::new();
        sink.seed_settings(
            DeviceSettings {
                id: 10,
                device_id: 1,
                refresh_interval: 60.0,
                device_type: "JI03".into(),
                status: AckStatus::Pending,
            },
            vec![SosNumber {
                id: 100,
                settings_id: 10,
                number: "5551234".into(),
                status: AckStatus::Pending,
            }],
            vec![Contact {
                id: 200,
                settings_id: 10,
                name: "mom".into(),
                number: "5555678".into(),
                status: AckStatus::Pending,
            }],
        )
        .await;

        let mut decoder = Gt06Decoder::new(directory(), sink);
        let (_, frames) = session(&mut decoder, &[LOGIN, LOGIN]).await;

        // first login: ack + TIMER + SOS + contacts; second login: ack only
        assert_eq!(frames.len(), 5);
        let payload_of = |frame: &Bytes| {
            String::from_utf8_lossy(&frame[9..frame.len() - 6]).into_owned()
        };
        assert_eq!(payload_of(&frames[1]), "TIMER#");
        assert_eq!(payload_of(&frames[2]), "SOS,A,5551234#");
        assert_eq!(payload_of(&frames[3]), "FN,A,5555678#");
        assert_eq!(frames[4].len(), 10);
    }

    #[tokio::test]
    async fn test_empty_pending_lists_confirm_settings_immediately() {
        let sink = MemorySink::new();
        sink.seed_settings(
            DeviceSettings {
                id: 10,
                device_id: 1,
                refresh_interval: 60.0,
                device_type: "JI03".into(),
                status: AckStatus::Pending,
            },
            Vec::new(),
            Vec::new(),
        )
        .await;

        let mut decoder = Gt06Decoder::new(directory(), sink.clone());
        let (_, frames) = session(&mut decoder, &[LOGIN]).await;

        // ack + TIMER, nothing to wait for
        assert_eq!(frames.len(), 2);
        assert_eq!(sink.settings(1).await.unwrap().status, AckStatus::Updated);
    }

    #[tokio::test]
    async fn test_echo_confirmations_flip_settings() {
        let sink = MemorySink::new();
        sink.seed_settings(
            DeviceSettings {
                id: 10,
                device_id: 1,
                refresh_interval: 60.0,
                device_type: "JI06".into(),
                status: AckStatus::Pending,
            },
            vec![SosNumber {
                id: 100,
                settings_id: 10,
                number: "5551234".into(),
                status: AckStatus::Pending,
            }],
            vec![Contact {
                id: 200,
                settings_id: 10,
                name: "mom".into(),
                number: "5555678".into(),
                status: AckStatus::Pending,
            }],
        )
        .await;

        let fn_echo = echo_frame("DWXX,OK! FN1 set ok", 4);
        let mut decoder = Gt06Decoder::new(directory(), sink.clone());
        let (_, _) = session(&mut decoder, &[LOGIN, ECHO_SOS, &fn_echo]).await;

        assert!(sink.get_pending_sos(10).await.unwrap().is_empty());
        assert!(sink.get_pending_contacts(10).await.unwrap().is_empty());
        assert_eq!(sink.settings(1).await.unwrap().status, AckStatus::Updated);
    }

    #[tokio::test]
    async fn test_unknown_device_class_leaves_contacts_pending() {
        let sink = MemorySink::new();
        sink.seed_settings(
            DeviceSettings {
                id: 10,
                device_id: 1,
                refresh_interval: 60.0,
                device_type: "XY99".into(),
                status: AckStatus::Pending,
            },
            Vec::new(),
            vec![Contact {
                id: 200,
                settings_id: 10,
                name: "mom".into(),
                number: "5555678".into(),
                status: AckStatus::Pending,
            }],
        )
        .await;

        let mut decoder = Gt06Decoder::new(directory(), sink.clone());
        let (_, frames) = session(&mut decoder, &[LOGIN]).await;

        // ack + TIMER only; the contact push has no grammar to use
        assert_eq!(frames.len(), 2);
        assert_eq!(sink.get_pending_contacts(10).await.unwrap().len(), 1);
        assert_eq!(sink.settings(1).await.unwrap().status, AckStatus::Pending);
    }
}
