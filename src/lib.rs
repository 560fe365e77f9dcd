//! Concurrent two-way ranging engine for DW1000-style UWB transceivers
//!
//! This crate implements the ranging protocol that lets one mobile *tag*
//! measure its distance to several fixed *anchors* at the same time, and an
//! anchor serve the tags that find it. It sits on top of a radio driver: the
//! driver moves frames and timestamps them, this crate runs the protocol.
//!
//! A full cycle looks like this:
//!
//! 1. The tag broadcasts a **blink**; each anchor that hears it answers with
//!    **ranging init**, and both sides record the new peer.
//! 2. The tag broadcasts a **poll**, assigning every anchor a staggered reply
//!    delay. Each anchor answers with a delayed **poll ack**.
//! 3. Once every anchor has acknowledged, the tag broadcasts a **range**
//!    message carrying, per anchor, the three timestamps the anchor is
//!    missing.
//! 4. Each anchor now holds all six timestamps of an asymmetric two-way
//!    ranging exchange, computes the time of flight, and sends the distance
//!    back in a **range report**.
//!
//! Every peer runs its own little state machine, so several exchanges can be
//! mid-flight at once without stepping on each other. Received frames are
//! queued from the radio's interrupt context and consumed by
//! [`RangingEngine::service_once`], which the host calls at millisecond
//! cadence.
//!
//! The radio and the host platform are abstracted behind the [`Radio`] and
//! [`Host`] traits; see the [`radio`] module for the exact contract.

#![no_std]
#![deny(missing_docs)]

pub mod configs;
pub mod engine;
pub mod error;
pub mod frame;
pub mod hooks;
pub mod peer;
pub mod queue;
pub mod radio;
pub mod table;
pub mod time;
pub mod twr;

#[doc(no_inline)]
pub use ieee802154::mac;

pub use crate::{
    engine::{RangingEngine, Role},
    error::Error,
    frame::{Eui, MessageKind},
    hooks::{ERR_QUEUE_FULL, ERR_TABLE_FULL, ERR_TIMEOUT},
    peer::{ProtocolState, RangingPeer},
    radio::{Host, Radio},
};
