#![allow(dead_code)]

//! Deterministic simulation of the shared single-wire bus.
//!
//! Time advances in byte-time steps of one millisecond. In every step each
//! port may offer one byte; simultaneous bytes merge with wired-AND
//! semantics (zero is dominant), and the merged byte is looped back to every
//! port including the transmitters. That gives the channel exactly what real
//! hardware gives it: transmitters see a corrupted echo when they lose
//! arbitration, and jam bytes of 0x00 flatten whatever else is on the wire.

use hbus_proto::{millis, BusStack, Channel, ChannelEvent, Millis};

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A node attached to the simulated wire.
pub trait BusPort {
    fn tx_ready(&mut self) -> Option<u8>;
    fn byte_received(&mut self, byte: u8, now: Millis);
    fn start_edge(&mut self, now: Millis);
    fn tx_complete(&mut self, now: Millis);
    fn poll_line(&mut self, now: Millis) -> Option<ChannelEvent>;
}

impl BusPort for Channel {
    fn tx_ready(&mut self) -> Option<u8> {
        self.on_tx_ready()
    }
    fn byte_received(&mut self, byte: u8, now: Millis) {
        self.on_byte_received(byte, now)
    }
    fn start_edge(&mut self, now: Millis) {
        self.on_start_edge(now)
    }
    fn tx_complete(&mut self, now: Millis) {
        self.on_tx_complete(now)
    }
    fn poll_line(&mut self, now: Millis) -> Option<ChannelEvent> {
        self.poll(now)
    }
}

impl BusPort for BusStack {
    fn tx_ready(&mut self) -> Option<u8> {
        self.on_tx_ready()
    }
    fn byte_received(&mut self, byte: u8, now: Millis) {
        self.on_byte_received(byte, now)
    }
    fn start_edge(&mut self, now: Millis) {
        self.on_start_edge(now)
    }
    fn tx_complete(&mut self, now: Millis) {
        self.on_tx_complete(now)
    }
    fn poll_line(&mut self, now: Millis) -> Option<ChannelEvent> {
        self.poll_tx(now)
    }
}

/// The wire with its attached ports.
pub struct Wire<P> {
    pub ports: Vec<P>,
    driving: Vec<bool>,
    now: Millis,
}

impl<P: BusPort> Wire<P> {
    pub fn new(ports: Vec<P>) -> Wire<P> {
        let driving = ports.iter().map(|_| false).collect();
        Wire {
            ports,
            driving,
            now: millis(0),
        }
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    /// Advance one byte-time. Returns any transmit outcome per port.
    pub fn step(&mut self) -> Vec<Option<ChannelEvent>> {
        let offers: Vec<Option<u8>> = self.ports.iter_mut().map(|p| p.tx_ready()).collect();

        // a port that stopped offering drained its shift register at the
        // previous byte boundary; notify it before this byte-time's traffic
        for ((port, offer), was_driving) in self
            .ports
            .iter_mut()
            .zip(&offers)
            .zip(self.driving.iter_mut())
        {
            if *was_driving && offer.is_none() {
                port.tx_complete(self.now);
            }
            *was_driving = offer.is_some();
        }

        if offers.iter().any(Option::is_some) {
            let merged = offers
                .iter()
                .flatten()
                .fold(0xFFu8, |wire, byte| wire & byte);
            // passive ports see the start bit before the byte completes
            for (port, offer) in self.ports.iter_mut().zip(&offers) {
                if offer.is_none() {
                    port.start_edge(self.now);
                }
            }
            for port in self.ports.iter_mut() {
                port.byte_received(merged, self.now);
            }
        }

        self.now = self.now + 1;
        let now = self.now;
        self.ports
            .iter_mut()
            .map(|p| p.poll_line(now))
            .collect()
    }
}
