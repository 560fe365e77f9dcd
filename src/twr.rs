//! Asymmetric two-way ranging arithmetic
//!
//! The exchange produces six timestamps, three per clock. Two round-trip and
//! two reply durations are formed with wrap-safe subtraction, and the time of
//! flight falls out of
//!
//! ```text
//! tof = (round1 * round2 - reply1 * reply2) / (round1 + round2 + reply1 + reply2)
//! ```
//!
//! which cancels the clock offset between the two devices. All products and
//! sums are computed with checked 64-bit arithmetic; with sane reply delays
//! the operands are far below the overflow thresholds, but a corrupted
//! timestamp must surface as an error rather than a bogus range.

use crate::time::{Duration, Instant};

/// The six timestamps of one completed ranging exchange.
///
/// `poll_sent`, `poll_ack_received` and `range_sent` are in the tag's clock;
/// `poll_received`, `poll_ack_sent` and `range_received` in the anchor's.
#[derive(Clone, Copy, Debug)]
pub struct TwrTimestamps {
    /// When the tag sent its poll.
    pub poll_sent: Instant,
    /// When the anchor received the poll.
    pub poll_received: Instant,
    /// When the anchor sent its poll acknowledgement.
    pub poll_ack_sent: Instant,
    /// When the tag received the poll acknowledgement.
    pub poll_ack_received: Instant,
    /// When the tag sent the closing range message.
    pub range_sent: Instant,
    /// When the anchor received the closing range message.
    pub range_received: Instant,
}

/// Why a time-of-flight computation was rejected.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TwrError {
    /// The round-trip product overflows 64 bits.
    RoundTripTimesTooLarge,
    /// The reply-time product overflows 64 bits.
    ReplyTimesTooLarge,
    /// A sum in the denominator overflows 64 bits.
    SumTooLarge,
    /// The denominator is zero.
    ZeroDenominator,
    /// The reply legs outweigh the round trips; the timestamps are
    /// inconsistent.
    NegativeTimeOfFlight,
    /// The quotient does not fit a 40-bit duration.
    TimeOfFlightTooLarge,
}

impl TwrTimestamps {
    /// Computes the time of flight between the two devices.
    pub fn time_of_flight(&self) -> Result<Duration, TwrError> {
        let round1 = self.poll_ack_received.duration_since(self.poll_sent).value();
        let reply1 = self.poll_ack_sent.duration_since(self.poll_received).value();
        let round2 = self.range_received.duration_since(self.poll_ack_sent).value();
        let reply2 = self.range_sent.duration_since(self.poll_ack_received).value();

        let round_product = round1
            .checked_mul(round2)
            .ok_or(TwrError::RoundTripTimesTooLarge)?;
        let reply_product = reply1
            .checked_mul(reply2)
            .ok_or(TwrError::ReplyTimesTooLarge)?;
        let round_sum = round1.checked_add(round2).ok_or(TwrError::SumTooLarge)?;
        let reply_sum = reply1.checked_add(reply2).ok_or(TwrError::SumTooLarge)?;
        let denominator = round_sum
            .checked_add(reply_sum)
            .ok_or(TwrError::SumTooLarge)?;

        if denominator == 0 {
            return Err(TwrError::ZeroDenominator);
        }
        let numerator = round_product
            .checked_sub(reply_product)
            .ok_or(TwrError::NegativeTimeOfFlight)?;

        Duration::new(numerator / denominator).ok_or(TwrError::TimeOfFlightTooLarge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TIME_MAX;

    // Builds a consistent exchange out of a known time of flight and two
    // arbitrary clock offsets, then checks the formula recovers it.
    fn exchange(tof: u64, tag_offset: u64, anchor_offset: u64) -> TwrTimestamps {
        let tag = |t: u64| Instant::new((t + tag_offset) % (TIME_MAX + 1)).unwrap();
        let anchor = |t: u64| Instant::new((t + anchor_offset) % (TIME_MAX + 1)).unwrap();

        // Global-time script of the exchange, microsecond-scale gaps.
        let poll_sent = 1_000_000;
        let poll_received = poll_sent + tof;
        let poll_ack_sent = poll_received + 447_283_200; // 7 ms reply
        let poll_ack_received = poll_ack_sent + tof;
        let range_sent = poll_ack_received + 447_283_200;
        let range_received = range_sent + tof;

        TwrTimestamps {
            poll_sent: tag(poll_sent),
            poll_received: anchor(poll_received),
            poll_ack_sent: anchor(poll_ack_sent),
            poll_ack_received: tag(poll_ack_received),
            range_sent: tag(range_sent),
            range_received: anchor(range_received),
        }
    }

    #[test]
    fn recovers_the_time_of_flight() {
        for tof in [0, 1, 533, 10_000] {
            let stamps = exchange(tof, 0, 0);
            assert_eq!(stamps.time_of_flight().unwrap().value(), tof);
        }
    }

    #[test]
    fn clock_offsets_cancel() {
        let stamps = exchange(533, 0x12_3456_7890, 0xFF_FFFF_0000);
        assert_eq!(stamps.time_of_flight().unwrap().value(), 533);
    }

    #[test]
    fn survives_counter_wrap_mid_exchange() {
        // Offset chosen so the anchor's counter wraps between poll and range.
        let stamps = exchange(533, 0, TIME_MAX - 500_000_000);
        assert_eq!(stamps.time_of_flight().unwrap().value(), 533);
    }

    #[test]
    fn zero_denominator_is_an_error() {
        let t = Instant::new(1000).unwrap();
        let stamps = TwrTimestamps {
            poll_sent: t,
            poll_received: t,
            poll_ack_sent: t,
            poll_ack_received: t,
            range_sent: t,
            range_received: t,
        };
        assert_eq!(stamps.time_of_flight(), Err(TwrError::ZeroDenominator));
    }

    #[test]
    fn inconsistent_timestamps_are_an_error() {
        // Reply legs longer than the round trips: the product goes negative.
        let mk = |v: u64| Instant::new(v).unwrap();
        let stamps = TwrTimestamps {
            poll_sent: mk(0),
            poll_received: mk(10),
            poll_ack_sent: mk(1_000_000),
            poll_ack_received: mk(100),
            range_sent: mk(2_000_000),
            range_received: mk(1_000_100),
        };
        assert_eq!(
            stamps.time_of_flight(),
            Err(TwrError::NegativeTimeOfFlight)
        );
    }

    #[test]
    fn oversized_operands_are_an_error() {
        // Full-scale round trips overflow the 64-bit product.
        let mk = |v: u64| Instant::new(v).unwrap();
        let stamps = TwrTimestamps {
            poll_sent: mk(1),
            poll_received: mk(0),
            poll_ack_sent: mk(0),
            poll_ack_received: mk(0),
            range_sent: mk(1),
            range_received: mk(TIME_MAX),
        };
        assert!(stamps.time_of_flight().is_err());
    }
}
