//! Anchor-side frame processing
//!
//! An anchor is receive-permanent: it only ever transmits in response to a
//! blink (RANGING_INIT) or a poll (POLL_ACK, then RANGE_REPORT or
//! RANGE_FAILED). POLL is exempt from the unexpected-message check because it
//! (re)starts the exchange; that is also what recovers a failed peer.

use crate::error::Error;
use crate::frame::{self, MessageKind, PollEntry, SHORT_MAC_LEN};
use crate::hooks::ERR_TABLE_FULL;
use crate::peer::{ProtocolState, RangingPeer};
use crate::queue::RxItem;
use crate::radio::{Host, Radio};
use crate::twr::TwrTimestamps;

use super::{filter_range, RangingEngine};

impl<'h, R, H> RangingEngine<'h, R, H>
where
    R: Radio,
    H: Host,
{
    pub(super) fn anchor_on_blink(&mut self, item: &RxItem) -> Result<(), Error<R::Error>> {
        let (eui, short) = match frame::decode_blink(&item.frame[..item.len]) {
            Ok(decoded) => decoded,
            Err(_) => {
                self.bump_decode_errors();
                return Ok(());
            }
        };

        if let Some(peer) = self.peers.find_mut(short) {
            // Already tracked; the blink just proves the tag is alive.
            peer.note_activity(item.arrival_ms);
            return Ok(());
        }

        // One tracked tag at a time: a new blink recycles the table.
        self.peers.clear();
        let peer = RangingPeer::new(eui, short, MessageKind::Poll, item.arrival_ms);
        match self.peers.add(peer) {
            Ok(index) => {
                self.fire_blink_peer(index);
                self.transmit_ranging_init(eui, short)?;
                self.note_activity();
            }
            Err(_) => self.fire_protocol_error(None, ERR_TABLE_FULL),
        }
        Ok(())
    }

    pub(super) fn anchor_on_frame(
        &mut self,
        index: usize,
        item: &RxItem,
    ) -> Result<(), Error<R::Error>> {
        let expected = match self.peers.get(index) {
            Some(peer) => peer.expected_next(),
            None => return Ok(()),
        };

        if item.kind != expected && item.kind != MessageKind::Poll {
            if let Some(peer) = self.peers.get_mut(index) {
                peer.set_protocol_failed(true);
                peer.set_state(ProtocolState::Failed);
            }
            self.fire_protocol_error(Some(index), item.kind.code() as i16);
        }

        match item.kind {
            MessageKind::Poll => self.anchor_on_poll(index, item),
            MessageKind::Range => self.anchor_on_range(index, item),
            // Unexpected kinds were reported above; nothing else to process.
            _ => Ok(()),
        }
    }

    // A poll is a broadcast carrying one record per addressed anchor; only
    // the record matching our own short address concerns us.
    fn anchor_on_poll(&mut self, index: usize, item: &RxItem) -> Result<(), Error<R::Error>> {
        let bytes = &item.frame[..item.len];
        let Some(&count) = bytes.get(SHORT_MAC_LEN + 1) else {
            self.bump_decode_errors();
            return Ok(());
        };

        let mut assigned_delay = None;
        for i in 0..count as usize {
            let offset = SHORT_MAC_LEN + 2 + i * frame::POLL_ENTRY_LEN;
            let Some(record) = bytes.get(offset..offset + frame::POLL_ENTRY_LEN) else {
                self.bump_decode_errors();
                return Ok(());
            };
            let entry = match ssmarshal::deserialize::<PollEntry>(record) {
                Ok((entry, _)) => entry,
                Err(_) => {
                    self.bump_decode_errors();
                    return Ok(());
                }
            };
            if entry.short_addr == self.short_addr.0 {
                assigned_delay = Some(entry.reply_delay_us);
                break;
            }
        }

        // Not addressed in this cycle.
        let Some(delay_us) = assigned_delay else {
            return Ok(());
        };

        let dest = match self.peers.get_mut(index) {
            Some(peer) => {
                // A poll (re)starts the exchange, clearing any earlier
                // failure.
                peer.set_reply_delay_us(delay_us);
                peer.set_protocol_failed(false);
                peer.set_state(ProtocolState::PollSent);
                peer.t_poll_received = item.rx_time;
                peer.note_activity(item.arrival_ms);
                peer.note_protocol_activity(item.arrival_ms);
                peer.set_expected_next(MessageKind::Range);
                peer.short_address()
            }
            None => return Ok(()),
        };

        self.transmit_poll_ack(dest, delay_us)?;
        self.note_activity();
        Ok(())
    }

    fn anchor_on_range(&mut self, index: usize, item: &RxItem) -> Result<(), Error<R::Error>> {
        let bytes = &item.frame[..item.len];
        let Some(&count) = bytes.get(SHORT_MAC_LEN + 1) else {
            self.bump_decode_errors();
            return Ok(());
        };

        let mut our_entry = None;
        for i in 0..count as usize {
            let offset = SHORT_MAC_LEN + 2 + i * frame::RANGE_ENTRY_LEN;
            let entry = match frame::read_range_entry(bytes, offset) {
                Ok(entry) => entry,
                Err(_) => {
                    self.bump_decode_errors();
                    return Ok(());
                }
            };
            if entry.short_addr == self.short_addr.0 {
                #[cfg(feature = "range-payload")]
                {
                    let payload = bytes
                        .get(offset + frame::RANGE_ENTRY_BASE_LEN..offset + frame::RANGE_ENTRY_LEN)
                        .and_then(|b| ssmarshal::deserialize::<frame::RangeData>(b).ok())
                        .map(|(data, _)| data);
                    self.received_range_payload = payload;
                }
                our_entry = Some(entry);
                break;
            }
        }

        let Some(entry) = our_entry else {
            return Ok(());
        };

        let (failed, dest, delay_us, previous_range) = match self.peers.get_mut(index) {
            Some(peer) => {
                peer.t_range_received = item.rx_time;
                peer.note_activity(item.arrival_ms);
                peer.note_protocol_activity(item.arrival_ms);
                peer.set_state(ProtocolState::RangeSent);
                // Next cycle starts over with a poll.
                peer.set_expected_next(MessageKind::Poll);
                (
                    peer.protocol_failed(),
                    peer.short_address(),
                    peer.reply_delay_us(),
                    peer.range_m(),
                )
            }
            None => return Ok(()),
        };
        self.note_activity();

        if failed {
            self.transmit_range_failed(dest)?;
            if let Some(peer) = self.peers.get_mut(index) {
                peer.set_state(ProtocolState::Failed);
            }
            return Ok(());
        }

        let time_of_flight = match self.peers.get_mut(index) {
            Some(peer) => {
                peer.t_poll_sent = entry.poll_sent;
                peer.t_poll_ack_received = entry.poll_ack_received;
                peer.t_range_sent = entry.range_sent;
                TwrTimestamps {
                    poll_sent: peer.t_poll_sent,
                    poll_received: peer.t_poll_received,
                    poll_ack_sent: peer.t_poll_ack_sent,
                    poll_ack_received: peer.t_poll_ack_received,
                    range_sent: peer.t_range_sent,
                    range_received: peer.t_range_received,
                }
                .time_of_flight()
            }
            None => return Ok(()),
        };

        match time_of_flight {
            Ok(tof) => {
                let mut distance = tof.as_meters();
                if self.filter_enabled && previous_range != 0.0 {
                    distance = filter_range(distance, previous_range, self.filter_window);
                }
                let rx_power = self.radio.rx_power_dbm();
                let fp_power = self.radio.first_path_power_dbm();
                let quality = self.radio.receive_quality();
                if let Some(peer) = self.peers.get_mut(index) {
                    peer.set_range_m(distance);
                    peer.set_rx_power_dbm(rx_power);
                    peer.set_first_path_power_dbm(fp_power);
                    peer.set_receive_quality(quality);
                }

                self.transmit_range_report(dest, delay_us, distance, rx_power)?;
                if let Some(peer) = self.peers.get_mut(index) {
                    peer.set_state(ProtocolState::RangeReportSent);
                }
                self.last_range_from = Some(dest);
                self.fire_new_range(index);
                self.fire_range_complete(index);
            }
            Err(_error) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("range computation failed: {}", _error);
                self.transmit_range_failed(dest)?;
                if let Some(peer) = self.peers.get_mut(index) {
                    peer.set_protocol_failed(true);
                    peer.set_state(ProtocolState::Failed);
                }
            }
        }
        Ok(())
    }
}
