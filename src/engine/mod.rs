//! The per-peer ranging protocol engine
//!
//! [`RangingEngine`] owns the peer table, the intake queue and the radio, and
//! runs one ranging state machine per peer. The host constructs it as a tag
//! or as an anchor, registers whatever hooks it cares about, forwards the
//! radio's interrupt events to [`handle_sent`] and [`handle_received`], and
//! calls [`service_once`] at millisecond cadence.
//!
//! Two execution contexts touch the engine:
//!
//! - the radio's completion callbacks, which only queue received frames and
//!   record transmit timestamps;
//! - the service context, which runs everything else.
//!
//! The engine is a single owned value. The host is expected to hold it behind
//! an exclusive handle (a critical-section mutex on interrupt-driven targets)
//! and call into it from both contexts through that handle; nothing here
//! blocks.
//!
//! [`handle_sent`]: RangingEngine::handle_sent
//! [`handle_received`]: RangingEngine::handle_received
//! [`service_once`]: RangingEngine::service_once

use core::num::Wrapping;
use core::sync::atomic::Ordering;

use ieee802154::mac::{PanId, ShortAddress};

use crate::configs::{
    BLINK_ROLLOVER, DEFAULT_RANGE_FILTER_WINDOW, DEFAULT_REPLY_DELAY_US, DEFAULT_RESET_MS,
    DEFAULT_TIMER_MS, FRAME_BUF_LEN, HARD_PROTOCOL_TIMEOUT_MS, PAN_ID, PROTOCOL_TIMEOUT_MS,
};
use crate::error::Error;
use crate::frame::{self, Eui, MessageKind, PollEntry, RangeEntry, BROADCAST};
use crate::hooks::{Hooks, ERR_QUEUE_FULL, ERR_TIMEOUT};
use crate::peer::{ProtocolState, RangingPeer};
use crate::queue::{IntakeQueue, RxItem};
use crate::radio::{Host, Radio};
use crate::table::PeerTable;
use crate::time::{Duration, Instant};

mod anchor;
mod tag;

/// Operating role of the device, fixed at bring-up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Mobile device initiating ranging cycles.
    Tag,
    /// Fixed device answering them.
    Anchor,
}

/// The ranging protocol engine.
pub struct RangingEngine<'h, R, H> {
    radio: R,
    host: H,
    role: Role,
    eui: Eui,
    short_addr: ShortAddress,
    pan_id: PanId,
    seq: Wrapping<u8>,

    peers: PeerTable,
    queue: IntakeQueue,
    hooks: Hooks<'h>,

    // What the radio context needs to attribute a TX-done event.
    last_sent_kind: Option<MessageKind>,
    last_sent_to: ShortAddress,

    reply_delay_us: u16,
    timer_delay_ms: u16,
    timer_last_ms: u32,
    blink_counter: u8,
    last_activity_ms: u32,
    reset_period_ms: u32,

    filter_enabled: bool,
    filter_window: u16,

    decode_errors: u32,
    last_range_from: Option<ShortAddress>,

    tx_buf: [u8; FRAME_BUF_LEN],

    #[cfg(feature = "range-payload")]
    range_payload: Option<frame::RangeData>,
    #[cfg(feature = "range-payload")]
    range_report_payload: Option<frame::RangeData>,
    #[cfg(feature = "range-payload")]
    received_range_payload: Option<frame::RangeData>,
    #[cfg(feature = "range-payload")]
    received_range_report_payload: Option<frame::RangeData>,
}

impl<'h, R, H> RangingEngine<'h, R, H>
where
    R: Radio,
    H: Host,
{
    /// Brings the device up as a tag.
    ///
    /// Parses the colon-separated EUI, derives or randomises the short
    /// address, programs the radio identity and arms the receiver.
    pub fn start_as_tag(
        radio: R,
        host: H,
        eui: &str,
        random_short: bool,
    ) -> Result<Self, Error<R::Error>> {
        Self::start(Role::Tag, radio, host, eui, random_short)
    }

    /// Brings the device up as an anchor.
    pub fn start_as_anchor(
        radio: R,
        host: H,
        eui: &str,
        random_short: bool,
    ) -> Result<Self, Error<R::Error>> {
        Self::start(Role::Anchor, radio, host, eui, random_short)
    }

    fn start(
        role: Role,
        mut radio: R,
        mut host: H,
        eui: &str,
        random_short: bool,
    ) -> Result<Self, Error<R::Error>> {
        let eui: Eui = eui.parse().map_err(|_| Error::InvalidEui)?;
        let short_addr = if random_short {
            ShortAddress(u16::from_be_bytes([host.random_u8(), host.random_u8()]))
        } else {
            eui.short_address()
        };

        radio
            .configure(eui, short_addr, PAN_ID)
            .map_err(Error::Radio)?;
        radio.start_receiving().map_err(Error::Radio)?;

        let now = host.now_ms();
        Ok(RangingEngine {
            radio,
            host,
            role,
            eui,
            short_addr,
            pan_id: PAN_ID,
            seq: Wrapping(0),
            peers: PeerTable::new(),
            queue: IntakeQueue::new(),
            hooks: Hooks::default(),
            last_sent_kind: None,
            last_sent_to: BROADCAST,
            reply_delay_us: DEFAULT_REPLY_DELAY_US,
            timer_delay_ms: DEFAULT_TIMER_MS,
            timer_last_ms: now,
            blink_counter: 0,
            last_activity_ms: now,
            reset_period_ms: DEFAULT_RESET_MS,
            filter_enabled: false,
            filter_window: DEFAULT_RANGE_FILTER_WINDOW,
            decode_errors: 0,
            last_range_from: None,
            tx_buf: [0; FRAME_BUF_LEN],
            #[cfg(feature = "range-payload")]
            range_payload: None,
            #[cfg(feature = "range-payload")]
            range_report_payload: None,
            #[cfg(feature = "range-payload")]
            received_range_payload: None,
            #[cfg(feature = "range-payload")]
            received_range_report_payload: None,
        })
    }

    /// Registers the legacy hook fired whenever any peer produces a new
    /// range.
    pub fn on_new_range(&mut self, hook: &'h mut dyn FnMut(&RangingPeer)) {
        self.hooks.new_range = Some(hook);
    }

    /// Registers the hook fired when an unknown tag blinks at this anchor.
    pub fn on_blink_peer(&mut self, hook: &'h mut dyn FnMut(&RangingPeer)) {
        self.hooks.blink_peer = Some(hook);
    }

    /// Registers the hook fired when an anchor accepts this tag.
    pub fn on_new_peer(&mut self, hook: &'h mut dyn FnMut(&RangingPeer)) {
        self.hooks.new_peer = Some(hook);
    }

    /// Registers the hook fired right before a silent peer is evicted.
    pub fn on_inactive_peer(&mut self, hook: &'h mut dyn FnMut(&RangingPeer)) {
        self.hooks.inactive_peer = Some(hook);
    }

    /// Registers the hook fired when a peer's exchange completes with a
    /// range.
    pub fn on_range_complete(&mut self, hook: &'h mut dyn FnMut(&RangingPeer)) {
        self.hooks.range_complete = Some(hook);
    }

    /// Registers the hook fired on protocol errors; see the `ERR_*` codes in
    /// [`crate::hooks`].
    pub fn on_protocol_error(&mut self, hook: &'h mut dyn FnMut(Option<&RangingPeer>, i16)) {
        self.hooks.protocol_error = Some(hook);
    }

    /// This device's operating role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// This device's EUI.
    pub fn eui(&self) -> Eui {
        self.eui
    }

    /// This device's short address.
    pub fn short_address(&self) -> ShortAddress {
        self.short_addr
    }

    /// Number of peers currently tracked.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Looks a peer up by short address.
    pub fn find_peer(&self, short_addr: ShortAddress) -> Option<&RangingPeer> {
        self.peers.find(short_addr)
    }

    /// The peer that most recently completed an exchange.
    pub fn last_peer(&self) -> Option<&RangingPeer> {
        self.last_range_from.and_then(|s| self.peers.find(s))
    }

    /// Iterates over the tracked peers.
    pub fn peers(&self) -> impl Iterator<Item = &RangingPeer> {
        self.peers.iter()
    }

    /// Number of received frames dropped because they could not be decoded.
    pub fn decode_error_count(&self) -> u32 {
        self.decode_errors
    }

    /// Overrides the base reply delay used to stagger anchors.
    pub fn set_reply_delay_us(&mut self, delay_us: u16) {
        self.reply_delay_us = delay_us;
    }

    /// Overrides the idle receiver reset period.
    pub fn set_reset_period_ms(&mut self, period_ms: u32) {
        self.reset_period_ms = period_ms;
    }

    /// Switches the exponential moving average range filter on or off.
    pub fn enable_range_filter(&mut self, enabled: bool) {
        self.filter_enabled = enabled;
    }

    /// Sets the range filter window; values below 2 are clamped to 2.
    pub fn set_range_filter_window(&mut self, window: u16) {
        self.filter_window = window.max(2);
    }

    /// Sets the application payload carried by outgoing RANGE records.
    #[cfg(feature = "range-payload")]
    pub fn set_range_payload(&mut self, data: frame::RangeData) {
        self.range_payload = Some(data);
    }

    /// Sets the application payload carried by outgoing RANGE_REPORTs.
    #[cfg(feature = "range-payload")]
    pub fn set_range_report_payload(&mut self, data: frame::RangeData) {
        self.range_report_payload = Some(data);
    }

    /// Takes the application payload of the last received RANGE record, if
    /// any.
    #[cfg(feature = "range-payload")]
    pub fn take_range_payload(&mut self) -> Option<frame::RangeData> {
        self.received_range_payload.take()
    }

    /// Takes the application payload of the last received RANGE_REPORT, if
    /// any.
    #[cfg(feature = "range-payload")]
    pub fn take_range_report_payload(&mut self) -> Option<frame::RangeData> {
        self.received_range_report_payload.take()
    }

    /// Feeds a received frame into the engine.
    ///
    /// Call this from the radio's receive-complete event with the frame bytes
    /// and the radio's 40-bit receive timestamp. Decodes just enough to queue
    /// the frame; the state machines run later, in [`service_once`].
    ///
    /// [`service_once`]: RangingEngine::service_once
    pub fn handle_received(&mut self, bytes: &[u8], rx_time: Instant) {
        if bytes.is_empty() || bytes.len() > FRAME_BUF_LEN {
            self.decode_errors += 1;
            return;
        }
        let kind = match frame::kind(bytes) {
            Ok(kind) => kind,
            Err(_) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("dropping undecodable frame");
                self.decode_errors += 1;
                return;
            }
        };
        let src = match frame::source(bytes, kind) {
            Ok(src) => src,
            Err(_) => {
                self.decode_errors += 1;
                return;
            }
        };

        if let Some(peer) = self.peers.find(src) {
            peer.received_ack.store(true, Ordering::Release);
        }

        let mut item = RxItem {
            frame: [0; FRAME_BUF_LEN],
            len: bytes.len(),
            src,
            kind,
            rx_time,
            arrival_ms: self.host.now_ms(),
        };
        item.frame[..bytes.len()].copy_from_slice(bytes);

        if self.queue.enqueue(item).is_err() {
            #[cfg(feature = "defmt")]
            defmt::warn!("intake queue full, dropping frame");
            self.fire_protocol_error(None, ERR_QUEUE_FULL);
        }
    }

    /// Records a completed transmission.
    ///
    /// Call this from the radio's transmit-complete event with the radio's
    /// 40-bit transmit timestamp. Broadcast polls and range messages fan the
    /// timestamp out to every peer.
    pub fn handle_sent(&mut self, tx_time: Instant) {
        let Some(kind) = self.last_sent_kind else {
            return;
        };
        match (self.role, kind) {
            (Role::Anchor, MessageKind::PollAck) => {
                if let Some(peer) = self.peers.find_mut(self.last_sent_to) {
                    peer.t_poll_ack_sent = tx_time;
                    peer.sent_ack.store(true, Ordering::Release);
                }
            }
            (Role::Tag, MessageKind::Poll) => {
                if self.last_sent_to == BROADCAST {
                    for peer in self.peers.iter_mut() {
                        peer.t_poll_sent = tx_time;
                        peer.sent_ack.store(true, Ordering::Release);
                    }
                } else if let Some(peer) = self.peers.find_mut(self.last_sent_to) {
                    peer.t_poll_sent = tx_time;
                    peer.sent_ack.store(true, Ordering::Release);
                }
            }
            (Role::Tag, MessageKind::Range) => {
                if self.last_sent_to == BROADCAST {
                    for peer in self.peers.iter_mut() {
                        peer.t_range_sent = tx_time;
                        peer.sent_ack.store(true, Ordering::Release);
                    }
                } else if let Some(peer) = self.peers.find_mut(self.last_sent_to) {
                    peer.t_range_sent = tx_time;
                    peer.sent_ack.store(true, Ordering::Release);
                }
            }
            _ => {}
        }
    }

    /// Runs one service pass: idle reset check, queue drain, per-peer timeout
    /// sweep, scheduler tick. Strictly non-blocking; call at millisecond
    /// cadence.
    pub fn service_once(&mut self) -> Result<(), Error<R::Error>> {
        self.check_for_reset()?;
        self.drain_queue()?;
        self.check_protocol_timeouts();

        let now = self.host.now_ms();
        if now.wrapping_sub(self.timer_last_ms) > self.timer_delay_ms as u32 {
            self.timer_last_ms = now;
            self.timer_tick(now)?;
        }
        Ok(())
    }

    // The hard receiver reset only fires while no peer is mid-exchange, so a
    // valid exchange is never torn down.
    fn check_for_reset(&mut self) -> Result<(), Error<R::Error>> {
        if self.peers.iter().any(|p| p.is_protocol_active()) {
            return Ok(());
        }
        let now = self.host.now_ms();
        if now.wrapping_sub(self.last_activity_ms) > self.reset_period_ms {
            for peer in self.peers.iter_mut() {
                peer.set_expected_next(MessageKind::Poll);
            }
            self.radio.start_receiving().map_err(Error::Radio)?;
            self.last_activity_ms = now;
        }
        Ok(())
    }

    fn drain_queue(&mut self) -> Result<(), Error<R::Error>> {
        // Bounded by the queue length at entry, so frames arriving while we
        // drain can't keep the service call busy.
        let mut budget = self.queue.len();
        while budget > 0 {
            let Some(item) = self.queue.dequeue() else {
                break;
            };
            self.dispatch(item)?;
            budget -= 1;
        }
        Ok(())
    }

    fn dispatch(&mut self, item: RxItem) -> Result<(), Error<R::Error>> {
        match (self.role, item.kind) {
            (Role::Anchor, MessageKind::Blink) => self.anchor_on_blink(&item),
            (Role::Tag, MessageKind::RangingInit) => self.tag_on_ranging_init(&item),
            // Role/kind combinations that can only be another device's
            // traffic.
            (Role::Anchor, MessageKind::RangingInit) | (Role::Tag, MessageKind::Blink) => Ok(()),
            _ => match self.peers.position(item.src) {
                Some(index) => match self.role {
                    Role::Anchor => self.anchor_on_frame(index, &item),
                    Role::Tag => self.tag_on_frame(index, &item),
                },
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::debug!("frame from unknown peer {=u16:x}", item.src.0);
                    Ok(())
                }
            },
        }
    }

    fn check_protocol_timeouts(&mut self) {
        let now = self.host.now_ms();
        for index in 0..self.peers.len() {
            let (active, state, soft, hard, _short) = match self.peers.get(index) {
                Some(p) => (
                    p.is_protocol_active(),
                    p.state(),
                    p.is_protocol_timed_out(now, PROTOCOL_TIMEOUT_MS),
                    p.is_protocol_timed_out(now, HARD_PROTOCOL_TIMEOUT_MS),
                    p.short_address().0,
                ),
                None => break,
            };

            if active && soft {
                #[cfg(feature = "defmt")]
                defmt::warn!("peer {=u16:x} timed out mid-exchange", _short);
                self.fire_protocol_error(Some(index), ERR_TIMEOUT);
                self.recover_peer(index, now);
            } else if matches!(state, ProtocolState::Failed | ProtocolState::RangeReportSent)
                && hard
            {
                self.recover_peer(index, now);
            }
        }
    }

    fn recover_peer(&mut self, index: usize, now: u32) {
        let expected = match self.role {
            Role::Anchor => MessageKind::Poll,
            Role::Tag => MessageKind::PollAck,
        };
        if let Some(peer) = self.peers.get_mut(index) {
            peer.reset_protocol_state(now);
            peer.set_expected_next(expected);
        }
    }

    fn timer_tick(&mut self, now: u32) -> Result<(), Error<R::Error>> {
        if self.role == Role::Tag {
            if self.peers.is_empty() || self.blink_counter == 0 {
                self.transmit_blink()?;
            } else {
                for peer in self.peers.iter_mut() {
                    peer.set_expected_next(MessageKind::PollAck);
                }
                self.transmit_poll_broadcast()?;
            }
        }

        self.prune_inactive_peers(now);

        self.blink_counter += 1;
        if self.blink_counter > BLINK_ROLLOVER {
            self.blink_counter = 0;
        }
        Ok(())
    }

    fn prune_inactive_peers(&mut self, now: u32) {
        let mut index = 0;
        while index < self.peers.len() {
            let inactive = self
                .peers
                .get(index)
                .map(|p| p.is_inactive(now))
                .unwrap_or(false);
            if inactive {
                #[cfg(feature = "defmt")]
                defmt::info!("evicting inactive peer at slot {}", index);
                self.fire_inactive_peer(index);
                self.peers.remove(index);
            } else {
                index += 1;
            }
        }
    }

    pub(crate) fn note_activity(&mut self) {
        self.last_activity_ms = self.host.now_ms();
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq.0;
        self.seq += Wrapping(1);
        seq
    }

    fn transmit_blink(&mut self) -> Result<(), Error<R::Error>> {
        let seq = self.next_seq();
        let len = frame::encode_blink(&mut self.tx_buf, seq, self.eui, self.short_addr);
        self.last_sent_kind = Some(MessageKind::Blink);
        self.last_sent_to = BROADCAST;
        self.radio
            .transmit(&self.tx_buf[..len])
            .map_err(Error::Radio)
    }

    pub(crate) fn transmit_ranging_init(
        &mut self,
        dest_eui: Eui,
        dest: ShortAddress,
    ) -> Result<(), Error<R::Error>> {
        let seq = self.next_seq();
        let mut len =
            frame::encode_long_header(&mut self.tx_buf, seq, self.pan_id, dest_eui, self.short_addr);
        self.tx_buf[len] = MessageKind::RangingInit.code();
        len += 1;
        self.last_sent_kind = Some(MessageKind::RangingInit);
        self.last_sent_to = dest;
        self.radio
            .transmit(&self.tx_buf[..len])
            .map_err(Error::Radio)
    }

    fn transmit_poll_broadcast(&mut self) -> Result<(), Error<R::Error>> {
        let count = self.peers.len();
        // Leave room for every peer's staggered reply before the next tick.
        self.timer_delay_ms = (DEFAULT_TIMER_MS as u32
            + count as u32 * 3 * self.reply_delay_us as u32 / 1000)
            as u16;

        let seq = self.next_seq();
        let mut len =
            frame::encode_short_header(&mut self.tx_buf, seq, self.pan_id, BROADCAST, self.short_addr);
        self.tx_buf[len] = MessageKind::Poll.code();
        self.tx_buf[len + 1] = count as u8;
        len += 2;

        let base_delay = self.reply_delay_us;
        for (i, peer) in self.peers.iter_mut().enumerate() {
            let delay_us = (2 * i as u16 + 1) * base_delay;
            peer.set_reply_delay_us(delay_us);
            let entry = PollEntry {
                short_addr: peer.short_address().0,
                reply_delay_us: delay_us,
            };
            len += ssmarshal::serialize(&mut self.tx_buf[len..], &entry)?;
        }

        self.last_sent_kind = Some(MessageKind::Poll);
        self.last_sent_to = BROADCAST;
        self.radio
            .transmit(&self.tx_buf[..len])
            .map_err(Error::Radio)
    }

    pub(crate) fn transmit_poll_ack(
        &mut self,
        dest: ShortAddress,
        delay_us: u16,
    ) -> Result<(), Error<R::Error>> {
        let seq = self.next_seq();
        let mut len =
            frame::encode_short_header(&mut self.tx_buf, seq, self.pan_id, dest, self.short_addr);
        self.tx_buf[len] = MessageKind::PollAck.code();
        len += 1;
        self.last_sent_kind = Some(MessageKind::PollAck);
        self.last_sent_to = dest;
        self.radio
            .transmit_delayed(&self.tx_buf[..len], Duration::from_micros(delay_us as u32))
            .map_err(Error::Radio)?;
        Ok(())
    }

    pub(crate) fn transmit_range_broadcast(&mut self) -> Result<(), Error<R::Error>> {
        let count = self.peers.len();
        self.timer_delay_ms = (DEFAULT_TIMER_MS as u32
            + count as u32 * 3 * self.reply_delay_us as u32 / 1000)
            as u16;

        let seq = self.next_seq();
        // The scheduled transmit time rides inside the payload, so the delay
        // is armed before the records are written.
        let scheduled = self
            .radio
            .set_tx_delay(Duration::from_micros(self.reply_delay_us as u32))
            .map_err(Error::Radio)?;

        let mut len =
            frame::encode_short_header(&mut self.tx_buf, seq, self.pan_id, BROADCAST, self.short_addr);
        self.tx_buf[len] = MessageKind::Range.code();
        self.tx_buf[len + 1] = count as u8;
        len += 2;

        for peer in self.peers.iter_mut() {
            peer.t_range_sent = scheduled;
            let entry = RangeEntry {
                short_addr: peer.short_address().0,
                poll_sent: peer.t_poll_sent,
                poll_ack_received: peer.t_poll_ack_received,
                range_sent: peer.t_range_sent,
            };
            frame::write_range_entry(&mut self.tx_buf, len, &entry);
            #[cfg(feature = "range-payload")]
            {
                let data = self.range_payload.unwrap_or(frame::RangeData {
                    data_type: 0,
                    data_value: 0,
                });
                ssmarshal::serialize(&mut self.tx_buf[len + frame::RANGE_ENTRY_BASE_LEN..], &data)?;
            }
            len += frame::RANGE_ENTRY_LEN;
        }

        self.last_sent_kind = Some(MessageKind::Range);
        self.last_sent_to = BROADCAST;
        self.radio
            .transmit(&self.tx_buf[..len])
            .map_err(Error::Radio)
    }

    pub(crate) fn transmit_range_report(
        &mut self,
        dest: ShortAddress,
        delay_us: u16,
        range_m: f32,
        rx_power_dbm: f32,
    ) -> Result<(), Error<R::Error>> {
        let seq = self.next_seq();
        let mut len =
            frame::encode_short_header(&mut self.tx_buf, seq, self.pan_id, dest, self.short_addr);
        self.tx_buf[len] = MessageKind::RangeReport.code();
        len += 1;
        let payload = frame::RangeReportPayload {
            range_m,
            rx_power_dbm,
        };
        len += ssmarshal::serialize(&mut self.tx_buf[len..], &payload)?;
        #[cfg(feature = "range-payload")]
        {
            let data = self.range_report_payload.unwrap_or(frame::RangeData {
                data_type: 0,
                data_value: 0,
            });
            len += ssmarshal::serialize(&mut self.tx_buf[len..], &data)?;
        }

        self.last_sent_kind = Some(MessageKind::RangeReport);
        self.last_sent_to = dest;
        self.radio
            .transmit_delayed(&self.tx_buf[..len], Duration::from_micros(delay_us as u32))
            .map_err(Error::Radio)?;
        Ok(())
    }

    pub(crate) fn transmit_range_failed(
        &mut self,
        dest: ShortAddress,
    ) -> Result<(), Error<R::Error>> {
        let seq = self.next_seq();
        let mut len =
            frame::encode_short_header(&mut self.tx_buf, seq, self.pan_id, dest, self.short_addr);
        self.tx_buf[len] = MessageKind::RangeFailed.code();
        len += 1;
        self.last_sent_kind = Some(MessageKind::RangeFailed);
        self.last_sent_to = dest;
        self.radio
            .transmit(&self.tx_buf[..len])
            .map_err(Error::Radio)
    }

    pub(crate) fn bump_decode_errors(&mut self) {
        self.decode_errors += 1;
    }

    pub(crate) fn fire_new_range(&mut self, index: usize) {
        if let (Some(hook), Some(peer)) = (self.hooks.new_range.as_deref_mut(), self.peers.get(index))
        {
            hook(peer);
        }
    }

    pub(crate) fn fire_blink_peer(&mut self, index: usize) {
        if let (Some(hook), Some(peer)) =
            (self.hooks.blink_peer.as_deref_mut(), self.peers.get(index))
        {
            hook(peer);
        }
    }

    pub(crate) fn fire_new_peer(&mut self, index: usize) {
        if let (Some(hook), Some(peer)) = (self.hooks.new_peer.as_deref_mut(), self.peers.get(index))
        {
            hook(peer);
        }
    }

    fn fire_inactive_peer(&mut self, index: usize) {
        if let (Some(hook), Some(peer)) =
            (self.hooks.inactive_peer.as_deref_mut(), self.peers.get(index))
        {
            hook(peer);
        }
    }

    pub(crate) fn fire_range_complete(&mut self, index: usize) {
        if let (Some(hook), Some(peer)) =
            (self.hooks.range_complete.as_deref_mut(), self.peers.get(index))
        {
            hook(peer);
        }
    }

    pub(crate) fn fire_protocol_error(&mut self, index: Option<usize>, code: i16) {
        let peer = match index {
            Some(i) => self.peers.get(i),
            None => None,
        };
        if let Some(hook) = self.hooks.protocol_error.as_deref_mut() {
            hook(peer, code);
        }
    }
}

// Exponential moving average over the last `window` measurements.
pub(crate) fn filter_range(value: f32, previous: f32, window: u16) -> f32 {
    let k = 2.0 / (window as f32 + 1.0);
    value * k + previous * (1.0 - k)
}
