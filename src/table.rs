//! Bounded table of discovered peers
//!
//! A flat, fixed-capacity table keyed by short address. Slots stay contiguous:
//! removal shifts the tail down and rewrites the affected indices.

use heapless::Vec;
use ieee802154::mac::ShortAddress;

use crate::configs::MAX_PEERS;
use crate::peer::RangingPeer;

/// Why a peer could not be added to the table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddPeerError {
    /// A live peer already carries this short address.
    Duplicate,
    /// All [`MAX_PEERS`] slots are taken.
    Full,
}

/// The set of peers the engine is currently tracking.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: Vec<RangingPeer, MAX_PEERS>,
}

impl PeerTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        PeerTable { peers: Vec::new() }
    }

    /// Number of live peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the table holds no peers.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Finds the slot of the peer with the given short address.
    pub fn position(&self, short_addr: ShortAddress) -> Option<usize> {
        self.peers
            .iter()
            .position(|p| p.short_address() == short_addr)
    }

    /// Finds the peer with the given short address.
    pub fn find(&self, short_addr: ShortAddress) -> Option<&RangingPeer> {
        self.peers.iter().find(|p| p.short_address() == short_addr)
    }

    pub(crate) fn find_mut(&mut self, short_addr: ShortAddress) -> Option<&mut RangingPeer> {
        self.peers
            .iter_mut()
            .find(|p| p.short_address() == short_addr)
    }

    /// Returns the peer in the given slot.
    pub fn get(&self, index: usize) -> Option<&RangingPeer> {
        self.peers.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut RangingPeer> {
        self.peers.get_mut(index)
    }

    /// Adds a peer, returning its slot.
    ///
    /// Short addresses are unique among live peers; a duplicate or a full
    /// table rejects the add.
    pub(crate) fn add(&mut self, mut peer: RangingPeer) -> Result<usize, AddPeerError> {
        if self.position(peer.short_address()).is_some() {
            return Err(AddPeerError::Duplicate);
        }
        let index = self.peers.len();
        peer.set_index(index);
        self.peers.push(peer).map_err(|_| AddPeerError::Full)?;
        Ok(index)
    }

    /// Removes the peer in the given slot, shifting the tail down.
    pub(crate) fn remove(&mut self, index: usize) -> Option<RangingPeer> {
        if index >= self.peers.len() {
            return None;
        }
        let removed = self.peers.remove(index);
        for (i, peer) in self.peers.iter_mut().enumerate().skip(index) {
            peer.set_index(i);
        }
        Some(removed)
    }

    /// Drops every peer.
    pub(crate) fn clear(&mut self) {
        self.peers.clear();
    }

    /// Iterates over the live peers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &RangingPeer> {
        self.peers.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RangingPeer> {
        self.peers.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Eui, MessageKind};

    fn peer(short: u16) -> RangingPeer {
        RangingPeer::new(
            Eui::from_short(ShortAddress(short)),
            ShortAddress(short),
            MessageKind::Poll,
            0,
        )
    }

    #[test]
    fn rejects_duplicates_and_overflow() {
        let mut table = PeerTable::new();
        assert_eq!(table.add(peer(0x0101)), Ok(0));
        assert_eq!(table.add(peer(0x0101)), Err(AddPeerError::Duplicate));
        assert_eq!(table.add(peer(0x0202)), Ok(1));
        assert_eq!(table.add(peer(0x0303)), Ok(2));
        assert_eq!(table.add(peer(0x0404)), Ok(3));
        assert_eq!(table.add(peer(0x0505)), Err(AddPeerError::Full));
        assert_eq!(table.len(), MAX_PEERS);
    }

    #[test]
    fn remove_compacts_and_reindexes() {
        let mut table = PeerTable::new();
        for short in [0x0101, 0x0202, 0x0303] {
            table.add(peer(short)).unwrap();
        }
        let removed = table.remove(0).unwrap();
        assert_eq!(removed.short_address(), ShortAddress(0x0101));
        assert_eq!(table.len(), 2);
        assert_eq!(table.position(ShortAddress(0x0202)), Some(0));
        assert_eq!(table.position(ShortAddress(0x0303)), Some(1));
        for (i, p) in table.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
        assert!(table.remove(5).is_none());
    }
}
