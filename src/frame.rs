//! MAC framing for the ranging protocol
//!
//! Three frame shapes travel on air, told apart by their first bytes:
//!
//! - **Blink** (`0xC5`): broadcast presence announcement from a tag, carrying
//!   its EUI and short address.
//! - **Short MAC** (`0x41 0x88`): data frame with short source and destination
//!   addresses. Used for POLL, POLL_ACK, RANGE, RANGE_REPORT and RANGE_FAILED.
//! - **Long MAC** (`0x41 0x8C`): data frame with an extended destination
//!   address. Used for RANGING_INIT, the anchor's answer to a blink.
//!
//! The message kind byte sits right after the MAC prefix of the short and long
//! shapes. All multi-byte fields are little-endian; the fixed-layout payload
//! structs go through [`ssmarshal`] the same way the driver's ranging messages
//! do.

use byte::{BytesExt, LE};
use ieee802154::mac::{PanId, ShortAddress};
use serde::{Deserialize, Serialize};

use crate::configs::FRAME_BUF_LEN;
use crate::time::Instant;

/// First frame-control byte of the MAC data frames.
pub const FC_1: u8 = 0x41;
/// Second frame-control byte of a short-addressed MAC frame.
pub const FC_2_SHORT: u8 = 0x88;
/// Second frame-control byte of a long-addressed MAC frame.
pub const FC_2_LONG: u8 = 0x8C;
/// First byte of a blink frame.
pub const FC_1_BLINK: u8 = 0xC5;

/// Length of the short MAC prefix; the kind byte follows it.
pub const SHORT_MAC_LEN: usize = 9;
/// Length of the long MAC prefix; the kind byte follows it.
pub const LONG_MAC_LEN: usize = 15;
/// Total length of a blink frame.
pub const BLINK_LEN: usize = 12;

/// The broadcast short address.
pub const BROADCAST: ShortAddress = ShortAddress(0xFFFF);

/// Per-peer record length in a broadcast POLL payload.
pub const POLL_ENTRY_LEN: usize = 4;

/// Length of the timestamp triplet record in a broadcast RANGE payload:
/// short address plus three 5-byte timestamps.
pub const RANGE_ENTRY_BASE_LEN: usize = 17;

/// Per-peer record stride in a broadcast RANGE payload.
///
/// The optional application payload widens each record by eight bytes.
pub const RANGE_ENTRY_LEN: usize = if cfg!(feature = "range-payload") {
    RANGE_ENTRY_BASE_LEN + 8
} else {
    RANGE_ENTRY_BASE_LEN
};

/// An 8-byte extended unique identifier.
///
/// Parseable from the conventional colon-separated hex notation:
///
/// ```rust
/// use uwb_ranging::frame::Eui;
///
/// let eui: Eui = "7D:00:22:EA:82:60:3B:9C".parse().unwrap();
/// assert_eq!(eui.short_address().0, 0x7D00);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct Eui(pub [u8; 8]);

impl Eui {
    /// Returns the short address derived from the first two EUI bytes.
    pub fn short_address(&self) -> ShortAddress {
        ShortAddress(u16::from_be_bytes([self.0[0], self.0[1]]))
    }

    /// Builds a placeholder EUI for a peer only known by its short address.
    pub fn from_short(short: ShortAddress) -> Self {
        let [hi, lo] = short.0.to_be_bytes();
        Eui([hi, lo, 0, 0, 0, 0, 0, 0])
    }
}

/// The error returned when an EUI string is malformed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParseEuiError;

impl core::str::FromStr for Eui {
    type Err = ParseEuiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 8];
        let mut parts = s.split(':');
        for slot in bytes.iter_mut() {
            let part = parts.next().ok_or(ParseEuiError)?;
            *slot = u8::from_str_radix(part, 16).map_err(|_| ParseEuiError)?;
        }
        if parts.next().is_some() {
            return Err(ParseEuiError);
        }
        Ok(Eui(bytes))
    }
}

/// The message kinds of the ranging protocol, with their wire codes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageKind {
    /// Tag-initiated start of a ranging cycle.
    Poll = 0,
    /// Anchor's delayed acknowledgement of a poll.
    PollAck = 1,
    /// Tag's timestamp report closing the two-way exchange.
    Range = 2,
    /// Anchor's computed range, sent back to the tag.
    RangeReport = 3,
    /// Tag's broadcast presence announcement.
    Blink = 4,
    /// Anchor's reply to a blink, establishing the ranging relationship.
    RangingInit = 5,
    /// Anchor's notification that the range computation failed.
    RangeFailed = 255,
}

impl MessageKind {
    /// Returns the wire code of this kind.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Looks a kind up by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MessageKind::Poll),
            1 => Some(MessageKind::PollAck),
            2 => Some(MessageKind::Range),
            3 => Some(MessageKind::RangeReport),
            4 => Some(MessageKind::Blink),
            5 => Some(MessageKind::RangingInit),
            255 => Some(MessageKind::RangeFailed),
            _ => None,
        }
    }
}

/// The reason a received frame was rejected by the framer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// The frame-control bytes match none of the three frame shapes.
    UnknownFormat,
    /// The kind byte carries an unassigned code.
    UnknownKind(u8),
    /// The frame ends before the field being read.
    Truncated,
}

/// Identifies the message kind of a received frame.
///
/// Frames that match none of the known shapes are rejected explicitly, never
/// guessed at.
pub fn kind(frame: &[u8]) -> Result<MessageKind, DecodeError> {
    match frame {
        [FC_1_BLINK, ..] => Ok(MessageKind::Blink),
        [FC_1, FC_2_LONG, ..] => kind_at(frame, LONG_MAC_LEN),
        [FC_1, FC_2_SHORT, ..] => kind_at(frame, SHORT_MAC_LEN),
        _ => Err(DecodeError::UnknownFormat),
    }
}

fn kind_at(frame: &[u8], offset: usize) -> Result<MessageKind, DecodeError> {
    let code = *frame.get(offset).ok_or(DecodeError::Truncated)?;
    MessageKind::from_code(code).ok_or(DecodeError::UnknownKind(code))
}

/// Extracts the source short address of a received frame.
pub fn source(frame: &[u8], kind: MessageKind) -> Result<ShortAddress, DecodeError> {
    let mut offset = match kind {
        MessageKind::Blink => 10,
        MessageKind::RangingInit => 13,
        _ => 7,
    };
    let addr: u16 = frame
        .read_with(&mut offset, LE)
        .map_err(|_| DecodeError::Truncated)?;
    Ok(ShortAddress(addr))
}

/// Decodes a blink frame into the sender's EUI and short address.
pub fn decode_blink(frame: &[u8]) -> Result<(Eui, ShortAddress), DecodeError> {
    if frame.len() < BLINK_LEN {
        return Err(DecodeError::Truncated);
    }
    let mut eui = [0; 8];
    eui.copy_from_slice(&frame[2..10]);
    let short = source(frame, MessageKind::Blink)?;
    Ok((Eui(eui), short))
}

/// Encodes a blink frame and returns its length.
pub fn encode_blink(
    buf: &mut [u8; FRAME_BUF_LEN],
    seq: u8,
    eui: Eui,
    src: ShortAddress,
) -> usize {
    buf[0] = FC_1_BLINK;
    buf[1] = seq;
    buf[2..10].copy_from_slice(&eui.0);
    buf[10..12].copy_from_slice(&src.0.to_le_bytes());
    BLINK_LEN
}

/// Encodes a short MAC prefix and returns its length; the caller appends the
/// kind byte and payload.
pub fn encode_short_header(
    buf: &mut [u8; FRAME_BUF_LEN],
    seq: u8,
    pan_id: PanId,
    dest: ShortAddress,
    src: ShortAddress,
) -> usize {
    buf[0] = FC_1;
    buf[1] = FC_2_SHORT;
    buf[2] = seq;
    buf[3..5].copy_from_slice(&pan_id.0.to_le_bytes());
    buf[5..7].copy_from_slice(&dest.0.to_le_bytes());
    buf[7..9].copy_from_slice(&src.0.to_le_bytes());
    SHORT_MAC_LEN
}

/// Encodes a long MAC prefix and returns its length; the caller appends the
/// kind byte and payload.
pub fn encode_long_header(
    buf: &mut [u8; FRAME_BUF_LEN],
    seq: u8,
    pan_id: PanId,
    dest: Eui,
    src: ShortAddress,
) -> usize {
    buf[0] = FC_1;
    buf[1] = FC_2_LONG;
    buf[2] = seq;
    buf[3..5].copy_from_slice(&pan_id.0.to_le_bytes());
    buf[5..13].copy_from_slice(&dest.0);
    buf[13..15].copy_from_slice(&src.0.to_le_bytes());
    LONG_MAC_LEN
}

/// One per-peer record in a broadcast POLL payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct PollEntry {
    /// The addressed peer.
    pub short_addr: u16,
    /// The reply delay assigned to that peer, in microseconds.
    pub reply_delay_us: u16,
}

/// The payload of a RANGE_REPORT message.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct RangeReportPayload {
    /// The computed distance in meters.
    pub range_m: f32,
    /// The receive power seen by the anchor, in dBm.
    pub rx_power_dbm: f32,
}

/// The optional application payload riding on RANGE and RANGE_REPORT records.
#[cfg(feature = "range-payload")]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct RangeData {
    /// Application-defined type tag.
    pub data_type: u32,
    /// Application-defined value.
    pub data_value: u32,
}

/// One per-peer timestamp record in a broadcast RANGE payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangeEntry {
    /// The addressed peer.
    pub short_addr: u16,
    /// When the tag sent its poll, in tag time.
    pub poll_sent: Instant,
    /// When the tag received this peer's poll acknowledgement, in tag time.
    pub poll_ack_received: Instant,
    /// When the tag (is scheduled to have) sent this range message, in tag
    /// time.
    pub range_sent: Instant,
}

/// Writes a RANGE record at the given offset.
///
/// Only the timestamp triplet is written here; the optional application
/// payload bytes that follow it are the engine's business.
pub fn write_range_entry(buf: &mut [u8; FRAME_BUF_LEN], offset: usize, entry: &RangeEntry) {
    buf[offset..offset + 2].copy_from_slice(&entry.short_addr.to_le_bytes());
    buf[offset + 2..offset + 7].copy_from_slice(&entry.poll_sent.to_le_bytes());
    buf[offset + 7..offset + 12].copy_from_slice(&entry.poll_ack_received.to_le_bytes());
    buf[offset + 12..offset + RANGE_ENTRY_BASE_LEN]
        .copy_from_slice(&entry.range_sent.to_le_bytes());
}

/// Reads a RANGE record at the given offset.
pub fn read_range_entry(frame: &[u8], offset: usize) -> Result<RangeEntry, DecodeError> {
    let mut off = offset;
    let short_addr: u16 = frame
        .read_with(&mut off, LE)
        .map_err(|_| DecodeError::Truncated)?;
    let poll_sent = read_instant(frame, &mut off)?;
    let poll_ack_received = read_instant(frame, &mut off)?;
    let range_sent = read_instant(frame, &mut off)?;
    Ok(RangeEntry {
        short_addr,
        poll_sent,
        poll_ack_received,
        range_sent,
    })
}

fn read_instant(frame: &[u8], off: &mut usize) -> Result<Instant, DecodeError> {
    let bytes: [u8; 5] = frame
        .get(*off..*off + 5)
        .ok_or(DecodeError::Truncated)?
        .try_into()
        .map_err(|_| DecodeError::Truncated)?;
    *off += 5;
    Ok(Instant::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_the_three_shapes() {
        let mut buf = [0; FRAME_BUF_LEN];

        let eui = Eui([1, 2, 3, 4, 5, 6, 7, 8]);
        encode_blink(&mut buf, 0, eui, ShortAddress(0x0102));
        assert_eq!(kind(&buf[..BLINK_LEN]), Ok(MessageKind::Blink));

        let len = encode_short_header(
            &mut buf,
            1,
            PanId(0xDECA),
            BROADCAST,
            ShortAddress(0x0102),
        );
        buf[len] = MessageKind::Poll.code();
        assert_eq!(kind(&buf[..len + 1]), Ok(MessageKind::Poll));

        let len = encode_long_header(&mut buf, 2, PanId(0xDECA), eui, ShortAddress(0x0304));
        buf[len] = MessageKind::RangingInit.code();
        assert_eq!(kind(&buf[..len + 1]), Ok(MessageKind::RangingInit));
    }

    #[test]
    fn rejects_unknown_first_bytes() {
        assert_eq!(kind(&[0x99, 0x88, 0x00]), Err(DecodeError::UnknownFormat));
        assert_eq!(kind(&[]), Err(DecodeError::UnknownFormat));
    }

    #[test]
    fn rejects_unassigned_kind_codes() {
        let mut buf = [0; FRAME_BUF_LEN];
        let len = encode_short_header(
            &mut buf,
            0,
            PanId(0xDECA),
            ShortAddress(1),
            ShortAddress(2),
        );
        buf[len] = 42;
        assert_eq!(kind(&buf[..len + 1]), Err(DecodeError::UnknownKind(42)));
    }

    #[test]
    fn short_header_layout_matches_the_wire() {
        let mut buf = [0; FRAME_BUF_LEN];
        let len = encode_short_header(
            &mut buf,
            7,
            PanId(0xDECA),
            ShortAddress(0xFFFF),
            ShortAddress(0x7D00),
        );
        assert_eq!(len, SHORT_MAC_LEN);
        assert_eq!(&buf[..len], &[0x41, 0x88, 7, 0xCA, 0xDE, 0xFF, 0xFF, 0x00, 0x7D]);
    }

    #[test]
    fn blink_round_trips() {
        let mut buf = [0; FRAME_BUF_LEN];
        let eui: Eui = "7D:00:22:EA:82:60:3B:9C".parse().unwrap();
        let len = encode_blink(&mut buf, 3, eui, eui.short_address());
        let (decoded_eui, decoded_short) = decode_blink(&buf[..len]).unwrap();
        assert_eq!(decoded_eui, eui);
        assert_eq!(decoded_short, ShortAddress(0x7D00));
        assert_eq!(source(&buf[..len], MessageKind::Blink), Ok(ShortAddress(0x7D00)));
    }

    #[test]
    fn source_comes_out_of_each_shape() {
        let mut buf = [0; FRAME_BUF_LEN];
        let len = encode_short_header(
            &mut buf,
            0,
            PanId(0xDECA),
            ShortAddress(0x0101),
            ShortAddress(0x7D00),
        );
        buf[len] = MessageKind::PollAck.code();
        assert_eq!(
            source(&buf[..len + 1], MessageKind::PollAck),
            Ok(ShortAddress(0x7D00))
        );

        let len = encode_long_header(
            &mut buf,
            0,
            PanId(0xDECA),
            Eui([0; 8]),
            ShortAddress(0x0101),
        );
        buf[len] = MessageKind::RangingInit.code();
        assert_eq!(
            source(&buf[..len + 1], MessageKind::RangingInit),
            Ok(ShortAddress(0x0101))
        );
    }

    #[test]
    fn poll_entry_is_four_little_endian_bytes() {
        let entry = PollEntry {
            short_addr: 0x0101,
            reply_delay_us: 21000,
        };
        let mut buf = [0; 8];
        let used = ssmarshal::serialize(&mut buf, &entry).unwrap();
        assert_eq!(used, POLL_ENTRY_LEN);
        assert_eq!(&buf[..4], &[0x01, 0x01, 0x08, 0x52]);

        let (decoded, _) = ssmarshal::deserialize::<PollEntry>(&buf).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn range_entry_round_trips() {
        let mut buf = [0; FRAME_BUF_LEN];
        let entry = RangeEntry {
            short_addr: 0x0202,
            poll_sent: Instant::new(0xFF_FFFF_FFF0).unwrap(),
            poll_ack_received: Instant::new(12).unwrap(),
            range_sent: Instant::new(0x12_3456_7890).unwrap(),
        };
        write_range_entry(&mut buf, SHORT_MAC_LEN + 2, &entry);
        let decoded = read_range_entry(&buf, SHORT_MAC_LEN + 2).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn truncated_range_entry_is_rejected() {
        let buf = [0; SHORT_MAC_LEN + 10];
        assert_eq!(
            read_range_entry(&buf, SHORT_MAC_LEN + 2),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn eui_parser_wants_exactly_eight_octets() {
        assert!("01:02:03:04:05:06:07".parse::<Eui>().is_err());
        assert!("01:02:03:04:05:06:07:08:09".parse::<Eui>().is_err());
        assert!("01:02:03:04:05:xx:07:08".parse::<Eui>().is_err());
        let eui: Eui = "01:02:03:04:05:06:07:08".parse().unwrap();
        assert_eq!(eui.0, [1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
