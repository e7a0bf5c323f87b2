//! Collaborator seams and the polling pump.
//!
//! The bridge never blocks: each pump call drains whatever its source has
//! ready and returns. Callers own the schedule.

use core::mem;
use core::ops::DerefMut;

use log::info;

use crate::{
    ParseResult, Route,
    packet::{PacketDecoder, PacketEncoder},
};

/// Yields transport bytes as they arrive. Non-blocking.
pub trait ByteSource {
    fn next_byte(&mut self) -> Option<u8>;
}

/// Accepts encoded stream bytes for transmission.
pub trait ByteSink {
    fn write_all(&mut self, bytes: &[u8]);
}

/// Receives reassembled datagrams bound for the network.
pub trait PacketSink {
    fn deliver(&mut self, route: Route, payload: &[u8]);
}

/// Supplies outbound datagrams. The borrowed payload is valid until the
/// next call.
pub trait PacketSource {
    fn next_packet(&mut self) -> Option<(Route, &[u8])>;
}

/// Notified once per successfully processed packet in either direction.
pub trait ActivityHook {
    fn activity(&mut self);
}

/// No-op hook for callers without a status indicator.
impl ActivityHook for () {
    fn activity(&mut self) {}
}

/// Packets moved since the counters were last taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BridgeStats {
    pub serial_to_net: u32,
    pub net_to_serial: u32,
}

/// One canonical codec pair plus traffic accounting.
pub struct Bridge<B: DerefMut<Target = [u8]>> {
    enc: PacketEncoder<B>,
    dec: PacketDecoder<B>,
    stats: BridgeStats,
}

#[cfg(any(feature = "std", test))]
impl Bridge<Box<[u8]>> {
    pub fn new_boxslice(capacity: usize) -> Self {
        Self::new(
            vec![0u8; capacity].into_boxed_slice(),
            vec![0u8; capacity].into_boxed_slice(),
        )
    }
}

impl<B: DerefMut<Target = [u8]>> Bridge<B> {
    pub fn new(enc_buf: B, dec_buf: B) -> Self {
        Self {
            enc: PacketEncoder::new(enc_buf),
            dec: PacketDecoder::new(dec_buf),
            stats: BridgeStats::default(),
        }
    }

    /// Drains the byte source through the decoder, delivering every
    /// completed record. Returns the number delivered.
    pub fn pump_serial_to_net(
        &mut self,
        bytes: &mut impl ByteSource,
        packets: &mut impl PacketSink,
        hook: &mut impl ActivityHook,
    ) -> usize {
        let mut delivered = 0;
        while let Some(b) = bytes.next_byte() {
            match self.dec.feed(b) {
                ParseResult::Packet(p) => {
                    packets.deliver(p.route, p.payload);
                    hook.activity();
                    delivered += 1;
                }
                // Stray bytes and failed checksums are already logged;
                // keep draining.
                _ => {}
            }
        }
        self.stats.serial_to_net += delivered as u32;
        delivered
    }

    /// Drains the packet source through the encoder into the byte sink.
    /// Returns the number of packets encoded.
    pub fn pump_net_to_serial(
        &mut self,
        packets: &mut impl PacketSource,
        bytes: &mut impl ByteSink,
        hook: &mut impl ActivityHook,
    ) -> usize {
        let mut sent = 0;
        while let Some((route, payload)) = packets.next_packet() {
            let frame = self.enc.encode(route, payload);
            bytes.write_all(frame);
            hook.activity();
            sent += 1;
        }
        self.stats.net_to_serial += sent as u32;
        sent
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Returns the counters and zeroes them.
    pub fn take_stats(&mut self) -> BridgeStats {
        mem::take(&mut self.stats)
    }

    /// Emits and resets the traffic counters. Callers decide the cadence.
    pub fn log_stats(&mut self) {
        let stats = self.take_stats();
        info!(
            "bridge stats: serial->net {} packets, net->serial {} packets",
            stats.serial_to_net, stats.net_to_serial
        );
    }
}
