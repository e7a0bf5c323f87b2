#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod bridge;
pub mod crc;
pub mod indicator;
pub mod packet;
pub mod preamble;

/// Where a datagram came from and where it is going.
///
/// `address` is the node's single distinguishing address byte; the two
/// ports identify the UDP endpoints on either side of the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Route {
    pub address: u8,
    pub local_port: u16,
    pub remote_port: u16,
}

/// A decoded record, borrowing its payload from the decoder's buffer.
/// Valid until the next call that feeds the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PacketRef<'buf> {
    pub route: Route,
    pub payload: &'buf [u8],
}

/// The result of feeding one stream byte to a packet decoder.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseResult<'buf> {
    /// Byte outside any frame; it belongs to the caller, not to us.
    NotData,
    /// Byte consumed, no complete record yet.
    Pending,
    /// A record completed but its checksum did not match. The record is
    /// discarded; decoding resumes with the next byte.
    ChecksumMismatch,
    /// A record arrived intact.
    Packet(PacketRef<'buf>),
}

/// Wire size of the record header: length, address, two ports.
pub const HEADER_LEN: usize = 7;
/// Wire size of the CRC16 trailer.
pub const TRAILER_LEN: usize = 2;
