//! Time-related types based on the transceiver's system time
//!
//! The radio timestamps transmissions and receptions with a 40-bit counter
//! running at one tick per ~15.65 picoseconds. The counter wraps roughly every
//! 17.2 seconds, so all arithmetic here is modular on 2^40.

use core::ops::Add;
use serde::{Deserialize, Serialize};

/// Largest value the 40-bit system time counter can hold.
pub const TIME_MAX: u64 = 0xffffffffff;

/// Device time ticks per microsecond, times ten.
///
/// The tick rate is 128 * 499.2 MHz = 63897.6 ticks/us; scaling by ten keeps
/// the conversions exact in integer arithmetic.
const TICKS_PER_US_X10: u64 = 638_976;

/// Meters of radio flight per device time tick (speed of light times the tick
/// period).
const METERS_PER_TICK: f32 = 4.691_764e-3;

/// One reading of the device time counter.
///
/// Stored as the raw 40-bit value the radio reports, so radio timestamps can
/// be carried around without conversion loss.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Wraps a raw counter reading, rejecting anything above [`TIME_MAX`].
    ///
    /// ``` rust
    /// use uwb_ranging::time::{Instant, TIME_MAX};
    ///
    /// assert!(Instant::new(447_283_200).is_some());
    /// assert!(Instant::new(TIME_MAX + 1).is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value > TIME_MAX {
            return None;
        }
        Some(Instant(value))
    }

    /// Reads an instant from its 5-byte little-endian wire form.
    pub fn from_le_bytes(bytes: [u8; 5]) -> Self {
        let mut value = [0; 8];
        value[..5].copy_from_slice(&bytes);
        // Five bytes can never exceed the 40-bit range.
        Instant(u64::from_le_bytes(value))
    }

    /// Writes the instant in its 5-byte little-endian wire form.
    pub fn to_le_bytes(self) -> [u8; 5] {
        let mut bytes = [0; 5];
        bytes.copy_from_slice(&self.0.to_le_bytes()[..5]);
        bytes
    }

    /// The raw counter value, always within `0..=TIME_MAX`.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// How much counter time passed from `earlier` to `self`.
    ///
    /// The counter rolls over every ~17.2 seconds, so the numeric order of two
    /// readings says nothing about their causal order; the caller must know
    /// that `earlier` really happened first. Given that, the result is correct
    /// even across a rollover:
    ///
    /// ``` rust
    /// use uwb_ranging::time::{Instant, TIME_MAX};
    ///
    /// let before_wrap = Instant::new(TIME_MAX - 3).unwrap();
    /// let after_wrap = Instant::new(6).unwrap();
    ///
    /// assert_eq!(after_wrap.duration_since(before_wrap).value(), 10);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        // Two's-complement subtraction reduced mod 2^40 handles the rollover
        // for free.
        Duration(self.0.wrapping_sub(earlier.0) & TIME_MAX)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Two 40-bit operands stay far below u64 overflow; the mask reduces
        // the sum back into counter range.
        Instant((self.0 + rhs.0) & TIME_MAX)
    }
}

/// A span of device time, counted in the same 40-bit ticks as [`Instant`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Wraps a raw tick count, rejecting anything above [`TIME_MAX`].
    pub fn new(value: u64) -> Option<Self> {
        if value > TIME_MAX {
            return None;
        }
        Some(Duration(value))
    }

    /// Creates an instance of `Duration` from a number of microseconds
    ///
    /// Values beyond the ~17.2 second counter period wrap, like the counter
    /// itself does.
    pub fn from_micros(micros: u32) -> Self {
        // `micros` takes up at most 32 bits, so the scaled product fits within
        // 52 bits and the multiplication can't overflow.
        Duration((micros as u64 * TICKS_PER_US_X10 / 10) & TIME_MAX)
    }

    /// Returns the duration in microseconds, rounded down.
    pub fn as_micros(&self) -> u64 {
        self.0 * 10 / TICKS_PER_US_X10
    }

    /// Interprets the duration as a radio time of flight and returns the
    /// distance covered, in meters.
    pub fn as_meters(&self) -> f32 {
        self.0 as f32 * METERS_PER_TICK
    }

    /// The raw tick count, always within `0..=TIME_MAX`.
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codec_round_trips() {
        for value in [0, 1, 0xAB_CDEF_0123, TIME_MAX] {
            let instant = Instant::new(value).unwrap();
            assert_eq!(Instant::from_le_bytes(instant.to_le_bytes()), instant);
        }
    }

    #[test]
    fn subtraction_is_wrap_safe() {
        let pairs = [
            (0, 0),
            (100, 40),
            (40, 100),
            (TIME_MAX, 0),
            (0, TIME_MAX),
            (12, TIME_MAX - 30),
        ];
        for (a, b) in pairs {
            let diff = Instant::new(a)
                .unwrap()
                .duration_since(Instant::new(b).unwrap());
            assert!(diff.value() <= TIME_MAX);
            assert_eq!((diff.value() + b) % (TIME_MAX + 1), a);
        }
    }

    #[test]
    fn add_wraps_on_overflow() {
        let late = Instant::new(TIME_MAX - 10).unwrap();
        let sum = late + Duration::new(20).unwrap();
        assert_eq!(sum.value(), 9);
    }

    #[test]
    fn micros_conversions_are_exact() {
        let reply = Duration::from_micros(7000);
        assert_eq!(reply.value(), 447_283_200);
        assert_eq!(reply.as_micros(), 7000);
    }

    #[test]
    fn ticks_convert_to_meters() {
        // 2.5 m of flight is ~533 ticks.
        let tof = Duration::new(533).unwrap();
        let distance = tof.as_meters();
        assert!((distance - 2.5).abs() < 0.01);
    }
}
