//! User callbacks fired by the engine
//!
//! The engine reports protocol milestones through a capability set of
//! optional handlers. All of them run inside [`service_once`] (the queue-full
//! case inside the receive path) and must not block.
//!
//! [`service_once`]: ../engine/struct.RangingEngine.html#method.service_once

use crate::peer::RangingPeer;

/// Error code passed to the protocol-error hook when a peer's exchange timed
/// out.
pub const ERR_TIMEOUT: i16 = -1;

/// Error code passed to the protocol-error hook when the intake queue
/// overflowed and a frame was dropped.
pub const ERR_QUEUE_FULL: i16 = -2;

/// Error code passed to the protocol-error hook when the peer table was full
/// and a new peer could not be added.
pub const ERR_TABLE_FULL: i16 = -3;

/// A hook receiving the peer an event concerns.
pub type PeerHook<'a> = &'a mut dyn FnMut(&RangingPeer);

/// A hook receiving protocol errors. The peer is absent for errors without
/// peer context (queue overflow, table full); positive codes are the wire
/// code of an unexpected message, negative codes are the `ERR_*` constants.
pub type ErrorHook<'a> = &'a mut dyn FnMut(Option<&RangingPeer>, i16);

/// The set of registered handlers.
#[derive(Default)]
pub struct Hooks<'a> {
    pub(crate) new_range: Option<PeerHook<'a>>,
    pub(crate) blink_peer: Option<PeerHook<'a>>,
    pub(crate) new_peer: Option<PeerHook<'a>>,
    pub(crate) inactive_peer: Option<PeerHook<'a>>,
    pub(crate) range_complete: Option<PeerHook<'a>>,
    pub(crate) protocol_error: Option<ErrorHook<'a>>,
}
