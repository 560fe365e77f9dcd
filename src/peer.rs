//! Per-peer ranging state
//!
//! One [`RangingPeer`] exists per discovered remote device. Everything a
//! ranging exchange needs to remember lives here: the exchange timestamps, the
//! protocol sub-state, what message is expected next, and the last results.
//! Keeping this state per peer is what lets several exchanges be in flight at
//! once without racing each other.

use core::sync::atomic::{AtomicBool, Ordering};

use ieee802154::mac::ShortAddress;

use crate::configs::INACTIVITY_MS;
use crate::frame::{Eui, MessageKind};
use crate::time::Instant;

/// Position of a peer within its ranging exchange.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolState {
    /// No exchange in flight.
    Idle,
    /// A poll has been seen; the anchor has scheduled its acknowledgement.
    PollSent,
    /// The tag has received this peer's poll acknowledgement.
    PollAckSent,
    /// The anchor has received the closing range message.
    RangeSent,
    /// The anchor has reported its computed range.
    RangeReportSent,
    /// The exchange failed; recovered on the next poll or by timeout.
    Failed,
}

/// State of one remote device the engine is ranging against.
#[derive(Debug)]
pub struct RangingPeer {
    short_addr: ShortAddress,
    eui: Eui,
    index: usize,
    last_seen_ms: u32,
    reply_delay_us: u16,

    // Exchange timestamps, in 40-bit device time. The first three are in the
    // tag's clock, the other three in the anchor's.
    pub(crate) t_poll_sent: Instant,
    pub(crate) t_poll_received: Instant,
    pub(crate) t_poll_ack_sent: Instant,
    pub(crate) t_poll_ack_received: Instant,
    pub(crate) t_range_sent: Instant,
    pub(crate) t_range_received: Instant,

    state: ProtocolState,
    expected_next: MessageKind,
    protocol_failed: bool,
    last_protocol_activity_ms: u32,

    // Written from the radio completion context, read from the service
    // context.
    pub(crate) sent_ack: AtomicBool,
    pub(crate) received_ack: AtomicBool,

    range_m: f32,
    rx_power_dbm: f32,
    fp_power_dbm: f32,
    quality: f32,
}

impl RangingPeer {
    /// Creates a fresh peer record.
    pub(crate) fn new(eui: Eui, short_addr: ShortAddress, expected_next: MessageKind, now_ms: u32) -> Self {
        RangingPeer {
            short_addr,
            eui,
            index: 0,
            last_seen_ms: now_ms,
            reply_delay_us: 0,
            t_poll_sent: Instant::default(),
            t_poll_received: Instant::default(),
            t_poll_ack_sent: Instant::default(),
            t_poll_ack_received: Instant::default(),
            t_range_sent: Instant::default(),
            t_range_received: Instant::default(),
            state: ProtocolState::Idle,
            expected_next,
            protocol_failed: false,
            last_protocol_activity_ms: now_ms,
            sent_ack: AtomicBool::new(false),
            received_ack: AtomicBool::new(false),
            range_m: 0.0,
            rx_power_dbm: 0.0,
            fp_power_dbm: 0.0,
            quality: 0.0,
        }
    }

    /// The peer's 2-byte short address.
    pub fn short_address(&self) -> ShortAddress {
        self.short_addr
    }

    /// The peer's extended unique identifier.
    pub fn eui(&self) -> Eui {
        self.eui
    }

    /// The peer's slot in the peer table.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// The reply delay currently assigned to this peer, in microseconds.
    pub fn reply_delay_us(&self) -> u16 {
        self.reply_delay_us
    }

    pub(crate) fn set_reply_delay_us(&mut self, delay_us: u16) {
        self.reply_delay_us = delay_us;
    }

    /// The last computed range to this peer, in meters. Zero until the first
    /// completed exchange.
    pub fn range_m(&self) -> f32 {
        self.range_m
    }

    pub(crate) fn set_range_m(&mut self, range_m: f32) {
        self.range_m = range_m;
    }

    /// Receive power of the last exchange, in dBm.
    pub fn rx_power_dbm(&self) -> f32 {
        self.rx_power_dbm
    }

    pub(crate) fn set_rx_power_dbm(&mut self, power: f32) {
        self.rx_power_dbm = power;
    }

    /// First-path power of the last exchange, in dBm.
    pub fn first_path_power_dbm(&self) -> f32 {
        self.fp_power_dbm
    }

    pub(crate) fn set_first_path_power_dbm(&mut self, power: f32) {
        self.fp_power_dbm = power;
    }

    /// Receive quality figure of the last exchange.
    pub fn receive_quality(&self) -> f32 {
        self.quality
    }

    pub(crate) fn set_receive_quality(&mut self, quality: f32) {
        self.quality = quality;
    }

    /// The peer's current protocol sub-state.
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ProtocolState) {
        self.state = state;
    }

    /// The message kind this peer is expected to send next.
    pub fn expected_next(&self) -> MessageKind {
        self.expected_next
    }

    pub(crate) fn set_expected_next(&mut self, kind: MessageKind) {
        self.expected_next = kind;
    }

    /// Whether the current exchange has been marked failed.
    pub fn protocol_failed(&self) -> bool {
        self.protocol_failed
    }

    pub(crate) fn set_protocol_failed(&mut self, failed: bool) {
        self.protocol_failed = failed;
    }

    /// Refreshes the liveness clock of this peer.
    pub(crate) fn note_activity(&mut self, now_ms: u32) {
        self.last_seen_ms = now_ms;
    }

    /// Whether the peer has been silent long enough to be evicted.
    pub fn is_inactive(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_seen_ms) > INACTIVITY_MS
    }

    /// Refreshes the exchange activity clock of this peer.
    pub(crate) fn note_protocol_activity(&mut self, now_ms: u32) {
        self.last_protocol_activity_ms = now_ms;
    }

    /// Whether the current exchange has stalled past `timeout_ms`.
    pub fn is_protocol_timed_out(&self, now_ms: u32, timeout_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_protocol_activity_ms) > timeout_ms
    }

    /// Whether the peer is in the middle of an exchange.
    pub fn is_protocol_active(&self) -> bool {
        matches!(
            self.state,
            ProtocolState::PollSent | ProtocolState::PollAckSent | ProtocolState::RangeSent
        )
    }

    /// Returns the peer to idle with a clean slate. Idempotent.
    pub(crate) fn reset_protocol_state(&mut self, now_ms: u32) {
        self.state = ProtocolState::Idle;
        self.protocol_failed = false;
        self.sent_ack.store(false, Ordering::Release);
        self.received_ack.store(false, Ordering::Release);
        self.last_protocol_activity_ms = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> RangingPeer {
        RangingPeer::new(
            Eui([1, 2, 3, 4, 5, 6, 7, 8]),
            ShortAddress(0x0102),
            MessageKind::Poll,
            0,
        )
    }

    #[test]
    fn reset_is_idempotent() {
        let mut p = peer();
        p.set_state(ProtocolState::PollSent);
        p.set_protocol_failed(true);
        p.sent_ack.store(true, Ordering::Release);
        p.received_ack.store(true, Ordering::Release);

        for _ in 0..2 {
            p.reset_protocol_state(42);
            assert_eq!(p.state(), ProtocolState::Idle);
            assert!(!p.protocol_failed());
            assert!(!p.sent_ack.load(Ordering::Acquire));
            assert!(!p.received_ack.load(Ordering::Acquire));
            assert_eq!(p.last_protocol_activity_ms, 42);
        }
    }

    #[test]
    fn protocol_timeout_tracks_activity() {
        let mut p = peer();
        p.note_protocol_activity(100);
        assert!(!p.is_protocol_timed_out(1100, 1000));
        assert!(p.is_protocol_timed_out(1101, 1000));
    }

    #[test]
    fn only_mid_exchange_states_are_active() {
        let mut p = peer();
        for (state, active) in [
            (ProtocolState::Idle, false),
            (ProtocolState::PollSent, true),
            (ProtocolState::PollAckSent, true),
            (ProtocolState::RangeSent, true),
            (ProtocolState::RangeReportSent, false),
            (ProtocolState::Failed, false),
        ] {
            p.set_state(state);
            assert_eq!(p.is_protocol_active(), active);
        }
    }

    #[test]
    fn inactivity_follows_last_seen() {
        let mut p = peer();
        p.note_activity(500);
        assert!(!p.is_inactive(1500));
        assert!(p.is_inactive(1501));
    }
}
