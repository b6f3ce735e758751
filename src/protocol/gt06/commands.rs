//! Server-to-device frame construction.
//!
//! Every frame sent back to a tracker shares the standard envelope: magic,
//! size byte, body, CRC-16/X.25 over size byte through serial, 0D 0A trailer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{GatewayError, Result};
use crate::model::{Contact, SosNumber};
use crate::protocol::crc::crc16;

use super::MSG_COMMAND_0;

/// Server flag field carried in every pushed command.
const SERVER_FLAG: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Serial number used for server-originated frames.
const PUSH_SERIAL: [u8; 2] = [0x00, 0xA0];

/// Longest command text the single-byte size field can carry.
const MAX_COMMAND_TEXT: usize = 0xFF - 0x0A;

/// Builds the acknowledgement frame echoed for an inbound message.
pub fn ack(msg_type: u8, serial: u16) -> Bytes {
    let mut frame = BytesMut::with_capacity(10);
    frame.put_slice(&[0x78, 0x78, 0x05, msg_type]);
    frame.put_u16(serial);
    let checksum = crc16(&frame[2..6]);
    frame.put_u16(checksum);
    frame.put_slice(&[0x0D, 0x0A]);
    frame.freeze()
}

/// Wraps an ASCII command payload in the command-push envelope.
pub fn push_command(payload: &str) -> Result<Bytes> {
    let text = payload.as_bytes();
    if text.len() > MAX_COMMAND_TEXT {
        return Err(GatewayError::Framing(format!(
            "command payload of {} bytes does not fit one frame",
            text.len()
        )));
    }
    let mut frame = BytesMut::with_capacity(15 + text.len());
    frame.put_slice(&[0x78, 0x78]);
    frame.put_u8(0x0A + text.len() as u8);
    frame.put_u8(MSG_COMMAND_0);
    frame.put_u8(0x04 + text.len() as u8);
    frame.put_slice(&SERVER_FLAG);
    frame.put_slice(text);
    frame.put_slice(&PUSH_SERIAL);
    let checksum = crc16(&frame[2..11 + text.len()]);
    frame.put_u16(checksum);
    frame.put_slice(&[0x0D, 0x0A]);
    Ok(frame.freeze())
}

/// Command text programming the tracker's SOS number list.
pub fn sos_payload(numbers: &[SosNumber]) -> String {
    let mut payload = String::from("SOS,A");
    for number in numbers {
        payload.push(',');
        payload.push_str(&number.number);
    }
    payload.push('#');
    payload
}

/// Command text programming the contact list, in the dialect the given
/// device class expects. Returns `None` for unrecognized classes.
pub fn contacts_payload(device_type: &str, contacts: &[Contact]) -> Option<String> {
    let class = device_type.to_ascii_uppercase();
    match class.as_str() {
        "JI03" => {
            let mut payload = String::from("FN,A");
            for contact in contacts {
                payload.push(',');
                payload.push_str(&contact.number);
            }
            payload.push('#');
            Some(payload)
        }
        "JI06" | "JI09" => {
            let mut payload = String::from("FN&&A");
            for contact in contacts {
                payload.push_str("&&");
                payload.push_str(&contact.name);
                payload.push_str("&&");
                payload.push_str(&contact.number);
            }
            payload.push_str("##");
            Some(payload)
        }
        _ => None,
    }
}

/// Command text forcing an immediate settings refresh.
pub fn timer_payload() -> &'static str {
    "TIMER#"
}
