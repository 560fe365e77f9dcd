//! Intake queue between the radio RX context and the engine
//!
//! Received frames are decoded just enough to be queued (kind and source) and
//! then handed to the service context through a single-producer
//! single-consumer ring. The producer is the radio's receive callback, the
//! consumer is [`RangingEngine::service_once`]; the ring's memory-ordered
//! indices are the only synchronisation between the two.
//!
//! [`RangingEngine::service_once`]: ../engine/struct.RangingEngine.html#method.service_once

use heapless::spsc::Queue;
use ieee802154::mac::ShortAddress;

use crate::configs::{FRAME_BUF_LEN, INTAKE_QUEUE_SIZE};
use crate::frame::MessageKind;
use crate::time::Instant;

// The spsc ring keeps one slot free, so one extra element of backing store is
// needed for the advertised capacity.
const QUEUE_LEN: usize = INTAKE_QUEUE_SIZE + 1;

/// One received frame awaiting protocol processing.
#[derive(Debug)]
pub struct RxItem {
    /// The raw frame bytes.
    pub frame: [u8; FRAME_BUF_LEN],
    /// Number of valid bytes in `frame`.
    pub len: usize,
    /// The sender's short address.
    pub src: ShortAddress,
    /// The decoded message kind.
    pub kind: MessageKind,
    /// The radio's 40-bit receive timestamp.
    pub rx_time: Instant,
    /// Host time at which the frame was queued, in milliseconds.
    pub arrival_ms: u32,
}

/// The bounded ring of received frames.
pub struct IntakeQueue {
    ring: Queue<RxItem, QUEUE_LEN>,
}

impl IntakeQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        IntakeQueue { ring: Queue::new() }
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.ring.len() == 0
    }

    /// Queues a frame. Returns it back when the ring is full; the caller
    /// drops it and reports the overflow.
    pub fn enqueue(&mut self, item: RxItem) -> Result<(), RxItem> {
        self.ring.enqueue(item)
    }

    /// Takes the oldest queued frame, if any.
    pub fn dequeue(&mut self) -> Option<RxItem> {
        self.ring.dequeue()
    }

    /// Discards everything that is queued.
    pub fn clear(&mut self) {
        while self.ring.dequeue().is_some() {}
    }
}

impl Default for IntakeQueue {
    fn default() -> Self {
        IntakeQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(tag: u8) -> RxItem {
        let mut frame = [0; FRAME_BUF_LEN];
        frame[0] = tag;
        RxItem {
            frame,
            len: 1,
            src: ShortAddress(tag as u16),
            kind: MessageKind::Poll,
            rx_time: Instant::default(),
            arrival_ms: 0,
        }
    }

    #[test]
    fn holds_exactly_the_advertised_capacity() {
        let mut q = IntakeQueue::new();
        for i in 0..INTAKE_QUEUE_SIZE {
            assert!(q.enqueue(item(i as u8)).is_ok());
        }
        assert_eq!(q.len(), INTAKE_QUEUE_SIZE);

        // The rejected item comes back untouched and the queue is unchanged.
        let rejected = q.enqueue(item(0xEE)).unwrap_err();
        assert_eq!(rejected.frame[0], 0xEE);
        assert_eq!(q.len(), INTAKE_QUEUE_SIZE);
    }

    #[test]
    fn drains_in_fifo_order() {
        let mut q = IntakeQueue::new();
        for i in 0..3 {
            q.enqueue(item(i)).unwrap();
        }
        for i in 0..3 {
            assert_eq!(q.dequeue().unwrap().frame[0], i);
        }
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn clear_empties_the_ring() {
        let mut q = IntakeQueue::new();
        for i in 0..5 {
            q.enqueue(item(i)).unwrap();
        }
        q.clear();
        assert!(q.is_empty());
        assert!(q.enqueue(item(9)).is_ok());
    }
}
