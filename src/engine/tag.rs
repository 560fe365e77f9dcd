//! Tag-side frame processing
//!
//! The tag drives the cycle: the scheduler emits blinks and broadcast polls,
//! and the code here consumes what comes back. The closing RANGE broadcast
//! goes out once every polled anchor has acknowledged, whatever order the
//! acknowledgements arrive in.

use crate::error::Error;
use crate::frame::{self, MessageKind, RangeReportPayload, SHORT_MAC_LEN};
use crate::hooks::ERR_TABLE_FULL;
use crate::peer::{ProtocolState, RangingPeer};
use crate::queue::RxItem;
use crate::radio::{Host, Radio};

use super::{filter_range, RangingEngine};

impl<'h, R, H> RangingEngine<'h, R, H>
where
    R: Radio,
    H: Host,
{
    pub(super) fn tag_on_ranging_init(&mut self, item: &RxItem) -> Result<(), Error<R::Error>> {
        if let Some(peer) = self.peers.find_mut(item.src) {
            // Already tracked; the anchor is just reannouncing itself.
            peer.note_activity(item.arrival_ms);
            return Ok(());
        }

        // Only the anchor's short address travels in a ranging init.
        let peer = RangingPeer::new(
            frame::Eui::from_short(item.src),
            item.src,
            MessageKind::PollAck,
            item.arrival_ms,
        );
        match self.peers.add(peer) {
            Ok(index) => self.fire_new_peer(index),
            Err(_) => self.fire_protocol_error(None, ERR_TABLE_FULL),
        }
        self.note_activity();
        Ok(())
    }

    pub(super) fn tag_on_frame(
        &mut self,
        index: usize,
        item: &RxItem,
    ) -> Result<(), Error<R::Error>> {
        let expected = match self.peers.get(index) {
            Some(peer) => peer.expected_next(),
            None => return Ok(()),
        };

        if item.kind != expected {
            if let Some(peer) = self.peers.get_mut(index) {
                peer.set_protocol_failed(true);
                peer.set_state(ProtocolState::Failed);
                peer.set_expected_next(MessageKind::PollAck);
            }
            self.fire_protocol_error(Some(index), item.kind.code() as i16);
            return Ok(());
        }

        match item.kind {
            MessageKind::PollAck => self.tag_on_poll_ack(index, item),
            MessageKind::RangeReport => self.tag_on_range_report(index, item),
            _ => Ok(()),
        }
    }

    fn tag_on_poll_ack(&mut self, index: usize, item: &RxItem) -> Result<(), Error<R::Error>> {
        if let Some(peer) = self.peers.get_mut(index) {
            peer.t_poll_ack_received = item.rx_time;
            peer.note_activity(item.arrival_ms);
            peer.note_protocol_activity(item.arrival_ms);
            peer.set_state(ProtocolState::PollAckSent);
        }

        // Close the cycle once every polled anchor has answered.
        let all_acked = self
            .peers
            .iter()
            .all(|p| p.state() == ProtocolState::PollAckSent);
        if all_acked {
            for peer in self.peers.iter_mut() {
                peer.set_expected_next(MessageKind::RangeReport);
            }
            self.transmit_range_broadcast()?;
        }
        Ok(())
    }

    fn tag_on_range_report(&mut self, index: usize, item: &RxItem) -> Result<(), Error<R::Error>> {
        let bytes = &item.frame[..item.len];
        let payload = bytes
            .get(SHORT_MAC_LEN + 1..)
            .and_then(|b| ssmarshal::deserialize::<RangeReportPayload>(b).ok());
        let Some((report, _used)) = payload else {
            self.bump_decode_errors();
            return Ok(());
        };
        #[cfg(feature = "range-payload")]
        {
            self.received_range_report_payload = bytes
                .get(SHORT_MAC_LEN + 1 + 8..)
                .and_then(|b| ssmarshal::deserialize::<frame::RangeData>(b).ok())
                .map(|(data, _)| data);
        }

        if let Some(peer) = self.peers.get_mut(index) {
            let mut range = report.range_m;
            if self.filter_enabled && peer.range_m() != 0.0 {
                range = filter_range(range, peer.range_m(), self.filter_window);
            }
            peer.set_range_m(range);
            peer.set_rx_power_dbm(report.rx_power_dbm);
            peer.note_activity(item.arrival_ms);
            peer.note_protocol_activity(item.arrival_ms);
            peer.set_state(ProtocolState::Idle);
            peer.set_expected_next(MessageKind::PollAck);
        }
        self.note_activity();

        self.last_range_from = Some(item.src);
        self.fire_new_range(index);
        self.fire_range_complete(index);
        Ok(())
    }
}
