//! Protocol constants and tuning defaults
//!
//! Every value here can be left alone for a standard deployment. The runtime
//! knobs (reply delay, reset period, range filter) are also adjustable through
//! the setters on [`RangingEngine`].
//!
//! [`RangingEngine`]: ../engine/struct.RangingEngine.html

use ieee802154::mac::PanId;

/// Maximum number of peers tracked at the same time.
///
/// A tag ranges against up to this many anchors concurrently. An anchor tracks
/// a single tag and recycles its slot when a new one blinks.
pub const MAX_PEERS: usize = 4;

/// Capacity of the intake queue between the radio RX context and the engine.
pub const INTAKE_QUEUE_SIZE: usize = 10;

/// Default reply delay in microseconds.
///
/// Anchors answering a broadcast poll are staggered in odd multiples of this
/// value so their replies don't collide on air.
pub const DEFAULT_REPLY_DELAY_US: u16 = 7000;

/// Default scheduler tick period in milliseconds.
///
/// Elongated while broadcasting, to leave room for every peer's staggered
/// reply before the next cycle starts.
pub const DEFAULT_TIMER_MS: u16 = 80;

/// Default receiver reset period in milliseconds.
///
/// Only applies while no peer is mid-exchange, so a valid exchange is never
/// torn down.
pub const DEFAULT_RESET_MS: u32 = 200;

/// Age in milliseconds after which a silent peer is dropped from the table.
pub const INACTIVITY_MS: u32 = 1000;

/// Age in milliseconds after which a mid-exchange peer is forced back to idle.
pub const PROTOCOL_TIMEOUT_MS: u32 = 1000;

/// Age in milliseconds after which a failed or parked peer is quietly
/// recovered to idle.
pub const HARD_PROTOCOL_TIMEOUT_MS: u32 = 2000;

/// Size of the frame buffers, matching the radio's 127-byte MTU.
///
/// The largest frame the engine itself produces is a broadcast RANGE for
/// [`MAX_PEERS`] peers, well below this.
pub const FRAME_BUF_LEN: usize = 127;

/// Default network identifier.
pub const PAN_ID: PanId = PanId(0xDECA);

/// Number of scheduler ticks between discovery blinks.
pub const BLINK_ROLLOVER: u8 = 20;

/// Default window of the exponential moving average range filter.
pub const DEFAULT_RANGE_FILTER_WINDOW: u16 = 15;
