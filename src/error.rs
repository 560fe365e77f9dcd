//! The crate's error type

use crate::frame::DecodeError;

/// An error that can occur while starting or servicing the engine.
///
/// Parameterised over the radio driver's error type. Protocol-level trouble
/// (unexpected messages, timeouts, overflow) never surfaces here; it is
/// absorbed into counters and the protocol-error hook.
#[derive(Debug)]
pub enum Error<E> {
    /// The radio driver failed.
    Radio(E),

    /// A frame could not be decoded.
    Frame(DecodeError),

    /// A payload could not be serialized or deserialized.
    Payload(ssmarshal::Error),

    /// The target buffer is too small for the frame being built.
    BufferTooSmall {
        /// How large a buffer would have been required.
        required_len: usize,
    },

    /// The EUI string passed at bring-up is malformed.
    InvalidEui,
}

impl<E> From<DecodeError> for Error<E> {
    fn from(error: DecodeError) -> Self {
        Error::Frame(error)
    }
}

impl<E> From<ssmarshal::Error> for Error<E> {
    fn from(error: ssmarshal::Error) -> Self {
        Error::Payload(error)
    }
}
