//! Test doubles for the radio and host contracts, plus a small radio-channel
//! simulator.
//!
//! Every simulated node gets its own 40-bit device clock, offset from a shared
//! global tick counter; frames are delivered with a flight time derived from
//! node positions. Ranges computed over these clocks are exact, which lets the
//! end-to-end scenarios assert tight tolerances.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use uwb_ranging::frame::Eui;
use uwb_ranging::mac::{PanId, ShortAddress};
use uwb_ranging::radio::{Host, Radio};
use uwb_ranging::time::{Duration, Instant, TIME_MAX};
use uwb_ranging::RangingEngine;

/// Device time ticks per millisecond (63 897.6 ticks/us times 1000).
pub const TICKS_PER_MS: u64 = 63_897_600;

/// Meters of flight per device tick.
pub const METERS_PER_TICK: f64 = 0.0046917639786159;

pub type Engine<'h> = RangingEngine<'h, MockRadio, MockHost>;

pub fn tof_ticks(meters: f64) -> u64 {
    (meters / METERS_PER_TICK).round() as u64
}

/// The shared millisecond clock all mock hosts read.
#[derive(Clone)]
pub struct Clock(Rc<Cell<u32>>);

impl Clock {
    pub fn new() -> Self {
        Clock(Rc::new(Cell::new(0)))
    }

    pub fn get(&self) -> u32 {
        self.0.get()
    }

    pub fn set(&self, ms: u32) {
        self.0.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get() + ms);
    }
}

pub struct MockHost {
    clock: Clock,
    rng_state: u8,
}

impl MockHost {
    pub fn new(clock: &Clock) -> Self {
        MockHost {
            clock: clock.clone(),
            rng_state: 0x5A,
        }
    }
}

impl Host for MockHost {
    fn now_ms(&mut self) -> u32 {
        self.clock.get()
    }

    fn random_u8(&mut self) -> u8 {
        self.rng_state = self.rng_state.wrapping_mul(31).wrapping_add(7);
        self.rng_state
    }
}

/// One transmission captured by the mock radio, stamped in global ticks.
pub struct Tx {
    pub frame: Vec<u8>,
    pub at_ticks: u64,
}

#[derive(Default)]
pub struct RadioState {
    pub sent: Vec<Tx>,
    pub armed_at: Option<u64>,
    pub rx_starts: u32,
    pub rx_power: f32,
    pub fp_power: f32,
    pub quality: f32,
}

pub struct MockRadio {
    pub state: Rc<RefCell<RadioState>>,
    clock: Clock,
    pub clock_offset: u64,
}

impl MockRadio {
    pub fn new(clock: &Clock, clock_offset: u64) -> (Self, Rc<RefCell<RadioState>>) {
        let state = Rc::new(RefCell::new(RadioState {
            rx_power: -78.5,
            fp_power: -82.0,
            quality: 9.5,
            ..RadioState::default()
        }));
        (
            MockRadio {
                state: Rc::clone(&state),
                clock: clock.clone(),
                clock_offset,
            },
            state,
        )
    }

    fn global_ticks(&self) -> u64 {
        self.clock.get() as u64 * TICKS_PER_MS
    }

    fn stamp(&self, global_ticks: u64) -> Instant {
        Instant::new((global_ticks + self.clock_offset) & TIME_MAX).unwrap()
    }
}

impl Radio for MockRadio {
    type Error = Infallible;

    fn configure(
        &mut self,
        _eui: Eui,
        _short_addr: ShortAddress,
        _pan_id: PanId,
    ) -> Result<(), Infallible> {
        Ok(())
    }

    fn start_receiving(&mut self) -> Result<(), Infallible> {
        self.state.borrow_mut().rx_starts += 1;
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), Infallible> {
        let mut state = self.state.borrow_mut();
        let at_ticks = state.armed_at.take().unwrap_or_else(|| self.global_ticks());
        state.sent.push(Tx {
            frame: frame.to_vec(),
            at_ticks,
        });
        Ok(())
    }

    fn set_tx_delay(&mut self, delay: Duration) -> Result<Instant, Infallible> {
        let at_ticks = self.global_ticks() + delay.value();
        self.state.borrow_mut().armed_at = Some(at_ticks);
        Ok(self.stamp(at_ticks))
    }

    fn rx_power_dbm(&mut self) -> f32 {
        self.state.borrow().rx_power
    }

    fn first_path_power_dbm(&mut self) -> f32 {
        self.state.borrow().fp_power
    }

    fn receive_quality(&mut self) -> f32 {
        self.state.borrow().quality
    }
}

/// One simulated device: its engine, its radio's shared state, its device
/// clock offset and its position on a line.
pub struct Node<'h> {
    pub engine: Engine<'h>,
    pub radio: Rc<RefCell<RadioState>>,
    pub offset: u64,
    pub pos: f64,
}

/// A frame in flight towards a node.
pub struct Flight {
    pub deliver_ms: u32,
    pub to: usize,
    pub frame: Vec<u8>,
    pub rx_local: Instant,
}

/// Advances the simulation one millisecond at a time: deliver due frames,
/// service every engine, then put freshly transmitted frames in flight to all
/// other nodes.
pub fn run_sim(nodes: &mut [Node], clock: &Clock, flights: &mut Vec<Flight>, from_ms: u32, to_ms: u32) {
    for ms in from_ms..to_ms {
        clock.set(ms);

        let mut i = 0;
        while i < flights.len() {
            if flights[i].deliver_ms <= ms {
                let flight = flights.remove(i);
                nodes[flight.to]
                    .engine
                    .handle_received(&flight.frame, flight.rx_local);
            } else {
                i += 1;
            }
        }

        for node in nodes.iter_mut() {
            node.engine.service_once().unwrap();
        }

        let positions: Vec<f64> = nodes.iter().map(|n| n.pos).collect();
        let offsets: Vec<u64> = nodes.iter().map(|n| n.offset).collect();
        for i in 0..nodes.len() {
            let transmissions: Vec<Tx> = nodes[i].radio.borrow_mut().sent.drain(..).collect();
            for tx in transmissions {
                // The TX-done event carries the sender's local stamp of the
                // (possibly scheduled) transmission time.
                let tx_local = Instant::new((tx.at_ticks + offsets[i]) & TIME_MAX).unwrap();
                nodes[i].engine.handle_sent(tx_local);

                for j in 0..nodes.len() {
                    if i == j {
                        continue;
                    }
                    let tof = tof_ticks((positions[i] - positions[j]).abs());
                    let rx_global = tx.at_ticks + tof;
                    let rx_local = Instant::new((rx_global + offsets[j]) & TIME_MAX).unwrap();
                    let deliver_ms = ((rx_global / TICKS_PER_MS) as u32 + 1).max(ms + 1);
                    flights.push(Flight {
                        deliver_ms,
                        to: j,
                        frame: tx.frame.clone(),
                        rx_local,
                    });
                }
            }
        }
    }
}
