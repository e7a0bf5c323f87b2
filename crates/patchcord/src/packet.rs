//! Canonical packet framer: little-endian record header and CRC16
//! trailer, carried over the erasure-coded link framing.

use core::ops::DerefMut;

use log::warn;
use septet::{FeedResult, FrameDecoder, FrameEncoder};

use crate::{
    HEADER_LEN, PacketRef, ParseResult, Route, TRAILER_LEN, crc::Crc16,
};

/// Serializes records into the link framing.
pub struct PacketEncoder<B: DerefMut<Target = [u8]>> {
    link: FrameEncoder<B>,
}

#[cfg(any(feature = "std", test))]
impl PacketEncoder<Box<[u8]>> {
    pub fn new_boxslice(len: usize) -> Self {
        Self::new(vec![0u8; len].into_boxed_slice())
    }
}

impl<B: DerefMut<Target = [u8]>> PacketEncoder<B> {
    pub fn new(buf: B) -> Self {
        Self {
            link: FrameEncoder::new(buf),
        }
    }

    /// Builds one complete frame for the record and returns the encoded
    /// stream, valid until the next call.
    pub fn encode(&mut self, route: Route, payload: &[u8]) -> &[u8] {
        // The length field is 16 bits; anything longer could never
        // round-trip. Truncates, consistent with the buffer policy.
        let payload = &payload[..payload.len().min(usize::from(u16::MAX))];
        self.link.reset_buffer();

        let mut crc = Crc16::new();
        self.write(&(payload.len() as u16).to_le_bytes(), &mut crc);
        self.write(&[route.address], &mut crc);
        self.write(&route.local_port.to_le_bytes(), &mut crc);
        self.write(&route.remote_port.to_le_bytes(), &mut crc);
        self.write(payload, &mut crc);

        // The trailer is excluded from its own checksum.
        let crc = crc.finish();
        self.link.extend(&crc.to_le_bytes());
        let len = self.link.end_frame();
        &self.link.contents()[..len]
    }

    /// Bytes lost to the output capacity in the last encode.
    pub fn dropped_bytes(&self) -> usize {
        self.link.dropped_bytes()
    }

    fn write(&mut self, bytes: &[u8], crc: &mut Crc16) {
        self.link.extend(bytes);
        crc.update(bytes);
    }
}

/// Reassembles records from the link framing, one stream byte per call.
pub struct PacketDecoder<B: DerefMut<Target = [u8]>> {
    link: FrameDecoder<B>,
}

#[cfg(any(feature = "std", test))]
impl PacketDecoder<Box<[u8]>> {
    pub fn new_boxslice(len: usize) -> Self {
        Self::new(vec![0u8; len].into_boxed_slice())
    }
}

impl<B: DerefMut<Target = [u8]>> PacketDecoder<B> {
    pub fn new(buf: B) -> Self {
        Self {
            link: FrameDecoder::new(buf),
        }
    }

    /// Consumes one stream byte. On [`ParseResult::Packet`] the borrowed
    /// payload is valid until the next call.
    pub fn feed(&mut self, byte: u8) -> ParseResult<'_> {
        match self.link.feed(byte) {
            FeedResult::NotData => ParseResult::NotData,
            FeedResult::FrameStarted
            | FeedResult::Pending
            | FeedResult::IgnoredEnd => ParseResult::Pending,
            FeedResult::FrameComplete(_) => self.parse(),
        }
    }

    /// Full reset of the link decoder and its buffer.
    pub fn clear(&mut self) {
        self.link.clear();
    }

    fn parse(&mut self) -> ParseResult<'_> {
        let frame = self.link.take_frame();

        // A frame too short for header + trailer would zero-pad to an
        // all-zero record whose checksum trivially matches. Reject it
        // outright.
        if frame.len() < HEADER_LEN + TRAILER_LEN {
            warn!("runt frame: {} bytes", frame.len());
            return ParseResult::ChecksumMismatch;
        }

        let mut crc = Crc16::new();
        let mut rd = 0usize;

        let mut hdr = [0u8; HEADER_LEN];
        read_padded(frame, &mut rd, &mut hdr);
        crc.update(&hdr);
        let payload_len = usize::from(u16::from_le_bytes([hdr[0], hdr[1]]));
        let route = Route {
            address: hdr[2],
            local_port: u16::from_le_bytes([hdr[3], hdr[4]]),
            remote_port: u16::from_le_bytes([hdr[5], hdr[6]]),
        };

        let end = (rd + payload_len).min(frame.len());
        let payload = &frame[rd..end];
        crc.update(payload);
        rd = end;

        let mut trailer = [0u8; TRAILER_LEN];
        read_padded(frame, &mut rd, &mut trailer);
        let framed = u16::from_le_bytes(trailer);
        let computed = crc.finish();
        if computed != framed {
            warn!("record checksum mismatch: computed {computed:#06x}, framed {framed:#06x}");
            return ParseResult::ChecksumMismatch;
        }
        ParseResult::Packet(PacketRef { route, payload })
    }
}

/// Reads past the end of a short frame as zeros, so a truncated record
/// parses to definite values and fails its checksum instead of erroring.
fn read_padded(frame: &[u8], rd: &mut usize, out: &mut [u8]) {
    let end = (*rd + out.len()).min(frame.len());
    let n = end - *rd;
    out[..n].copy_from_slice(&frame[*rd..end]);
    out[n..].fill(0);
    *rd = end;
}

#[cfg(test)]
mod test {
    use crate::{ParseResult, Route};

    use super::{PacketDecoder, PacketEncoder};

    #[test]
    fn empty_payload_round_trip() {
        let route = Route {
            address: 1,
            local_port: 2,
            remote_port: 3,
        };
        let mut enc = PacketEncoder::new_boxslice(128);
        let stream = enc.encode(route, &[]).to_vec();

        let mut dec = PacketDecoder::new_boxslice(128);
        let mut got = None;
        for &b in &stream {
            if let ParseResult::Packet(p) = dec.feed(b) {
                got = Some((p.route, p.payload.to_vec()));
            }
        }
        assert_eq!(got, Some((route, vec![])));
    }

    #[test]
    fn short_frame_is_a_checksum_error() {
        // A frame too short for a record is rejected; the decoder keeps
        // going.
        let mut enc = septet::FrameEncoder::new(vec![0u8; 64].into_boxed_slice());
        enc.extend(&[0xAA, 0xBB, 0xCC]);
        let len = enc.end_frame();
        let stream = enc.contents()[..len].to_vec();

        let mut dec = PacketDecoder::new_boxslice(64);
        let mut mismatches = 0;
        let mut packets = 0;
        for &b in &stream {
            match dec.feed(b) {
                ParseResult::ChecksumMismatch => mismatches += 1,
                ParseResult::Packet(_) => packets += 1,
                _ => {}
            }
        }
        assert_eq!((mismatches, packets), (1, 0));
    }
}
