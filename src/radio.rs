//! Contracts the engine expects from its collaborators
//!
//! The engine does not talk to hardware itself. The host hands it a [`Radio`]
//! for the UWB transceiver and a [`Host`] for wall-clock time and randomness,
//! and wires the transceiver's interrupt events to
//! [`RangingEngine::handle_sent`] and [`RangingEngine::handle_received`].
//!
//! [`RangingEngine::handle_sent`]: ../engine/struct.RangingEngine.html#method.handle_sent
//! [`RangingEngine::handle_received`]: ../engine/struct.RangingEngine.html#method.handle_received

use ieee802154::mac::{PanId, ShortAddress};

use crate::frame::Eui;
use crate::time::{Duration, Instant};

/// The transceiver as the engine sees it.
///
/// Channel, PRF and data-rate configuration are the driver's business and
/// happen before the engine is started.
pub trait Radio {
    /// The driver's error type.
    type Error;

    /// Programs the device identity: EUI, short address and network id.
    fn configure(
        &mut self,
        eui: Eui,
        short_addr: ShortAddress,
        pan_id: PanId,
    ) -> Result<(), Self::Error>;

    /// Arms the receiver in receive-permanently mode.
    ///
    /// The engine calls this at bring-up and after an idle reset, never in a
    /// hot path; the driver must re-arm itself after each reception.
    fn start_receiving(&mut self) -> Result<(), Self::Error>;

    /// Starts transmitting a frame, immediately or at a previously armed
    /// delayed time. Returns without waiting for completion; the TX-done
    /// interrupt reports the actual transmit timestamp.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Arms a delayed transmission and returns the 40-bit device time at
    /// which the next [`transmit`] will go out.
    ///
    /// Split from [`transmit`] because the closing range message must embed
    /// its own scheduled transmit timestamp before the frame is handed over.
    ///
    /// [`transmit`]: Radio::transmit
    fn set_tx_delay(&mut self, delay: Duration) -> Result<Instant, Self::Error>;

    /// Transmits a frame after the given delay and returns the scheduled
    /// transmit timestamp.
    fn transmit_delayed(&mut self, frame: &[u8], delay: Duration) -> Result<Instant, Self::Error> {
        let scheduled = self.set_tx_delay(delay)?;
        self.transmit(frame)?;
        Ok(scheduled)
    }

    /// Estimated receive power of the last reception, in dBm.
    fn rx_power_dbm(&mut self) -> f32;

    /// Estimated first-path power of the last reception, in dBm.
    fn first_path_power_dbm(&mut self) -> f32;

    /// Receive quality figure of the last reception.
    fn receive_quality(&mut self) -> f32;
}

/// The host platform as the engine sees it.
///
/// Neither method is assumed thread-safe; the engine is driven under an
/// exclusive handle.
pub trait Host {
    /// Monotonic milliseconds since boot.
    fn now_ms(&mut self) -> u32;

    /// A byte of entropy, used to randomise the short address at bring-up.
    fn random_u8(&mut self) -> u8;
}
