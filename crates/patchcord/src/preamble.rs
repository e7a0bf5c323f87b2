//! Reduced packet framer for transports that are already reliable.
//!
//! Records are delimited by a fixed 4-byte preamble and carried raw: no
//! escaping, no erasure coding, no tolerance for lost bytes. A dropped
//! byte desynchronizes the stream until the next preamble lines up.

use core::ops::DerefMut;

use log::warn;

use crate::{
    HEADER_LEN, PacketRef, ParseResult, Route, TRAILER_LEN, crc::Crc16,
};

/// Byte sequence opening every record.
pub const PREAMBLE: [u8; 4] = [0xCF, 0xEB, 0x01, 0x81];

/// Serializes records behind the preamble.
pub struct PreambleEncoder<B: DerefMut<Target = [u8]>> {
    buf: B,
    idx: usize,
    dropped: usize,
}

#[cfg(any(feature = "std", test))]
impl PreambleEncoder<Box<[u8]>> {
    pub fn new_boxslice(len: usize) -> Self {
        Self::new(vec![0u8; len].into_boxed_slice())
    }
}

impl<B: DerefMut<Target = [u8]>> PreambleEncoder<B> {
    pub fn new(buf: B) -> Self {
        Self {
            buf,
            idx: 0,
            dropped: 0,
        }
    }

    /// Builds one record and returns its bytes, valid until the next
    /// call.
    pub fn encode(&mut self, route: Route, payload: &[u8]) -> &[u8] {
        let payload = &payload[..payload.len().min(usize::from(u16::MAX))];
        self.idx = 0;
        self.dropped = 0;

        self.push(&PREAMBLE);
        let mut crc = Crc16::new();
        self.push_crc(&(payload.len() as u16).to_le_bytes(), &mut crc);
        self.push_crc(&[route.address], &mut crc);
        self.push_crc(&route.local_port.to_le_bytes(), &mut crc);
        self.push_crc(&route.remote_port.to_le_bytes(), &mut crc);
        self.push_crc(payload, &mut crc);
        let crc = crc.finish();
        self.push(&crc.to_le_bytes());
        &self.buf[..self.idx]
    }

    /// Bytes lost to the output capacity in the last encode.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped
    }

    fn push_crc(&mut self, bytes: &[u8], crc: &mut Crc16) {
        self.push(bytes);
        crc.update(bytes);
    }

    fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.idx < self.buf.len() {
                self.buf[self.idx] = b;
                self.idx += 1;
            } else {
                self.dropped += 1;
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum State {
    /// Scanning for the preamble; the payload records how much matched.
    Scan(usize),
    Header(usize),
    Payload,
    Trailer(usize),
}

/// Reassembles records by scanning for the preamble, one byte per call.
pub struct PreambleDecoder<B: DerefMut<Target = [u8]>> {
    buf: B,
    state: State,
    header: [u8; HEADER_LEN],
    trailer: [u8; TRAILER_LEN],
    route: Route,
    /// Payload bytes to consume: the framed length clamped to capacity.
    limit: usize,
    got: usize,
    crc: Crc16,
}

#[cfg(any(feature = "std", test))]
impl PreambleDecoder<Box<[u8]>> {
    pub fn new_boxslice(len: usize) -> Self {
        Self::new(vec![0u8; len].into_boxed_slice())
    }
}

impl<B: DerefMut<Target = [u8]>> PreambleDecoder<B> {
    pub fn new(buf: B) -> Self {
        Self {
            buf,
            state: State::Scan(0),
            header: [0; HEADER_LEN],
            trailer: [0; TRAILER_LEN],
            route: Route {
                address: 0,
                local_port: 0,
                remote_port: 0,
            },
            limit: 0,
            got: 0,
            crc: Crc16::new(),
        }
    }

    /// Consumes one stream byte. On [`ParseResult::Packet`] the borrowed
    /// payload is valid until the next call.
    pub fn feed(&mut self, byte: u8) -> ParseResult<'_> {
        match self.state {
            State::Scan(matched) => {
                if byte == PREAMBLE[matched] {
                    if matched + 1 == PREAMBLE.len() {
                        self.state = State::Header(0);
                        self.crc = Crc16::new();
                    } else {
                        self.state = State::Scan(matched + 1);
                    }
                    ParseResult::Pending
                } else {
                    // Restart the scan; the mismatching byte may itself
                    // open a preamble.
                    let restart = usize::from(byte == PREAMBLE[0]);
                    self.state = State::Scan(restart);
                    if restart > 0 {
                        ParseResult::Pending
                    } else {
                        ParseResult::NotData
                    }
                }
            }
            State::Header(n) => {
                self.header[n] = byte;
                if n + 1 < HEADER_LEN {
                    self.state = State::Header(n + 1);
                    return ParseResult::Pending;
                }
                self.crc.update(&self.header);
                let framed_len =
                    usize::from(u16::from_le_bytes([self.header[0], self.header[1]]));
                self.route = Route {
                    address: self.header[2],
                    local_port: u16::from_le_bytes([self.header[3], self.header[4]]),
                    remote_port: u16::from_le_bytes([self.header[5], self.header[6]]),
                };
                self.limit = framed_len.min(self.buf.len());
                self.got = 0;
                self.state = if self.limit == 0 {
                    State::Trailer(0)
                } else {
                    State::Payload
                };
                ParseResult::Pending
            }
            State::Payload => {
                self.buf[self.got] = byte;
                self.got += 1;
                self.crc.update(&[byte]);
                if self.got == self.limit {
                    self.state = State::Trailer(0);
                }
                ParseResult::Pending
            }
            State::Trailer(n) => {
                self.trailer[n] = byte;
                if n + 1 < TRAILER_LEN {
                    self.state = State::Trailer(n + 1);
                    return ParseResult::Pending;
                }
                self.state = State::Scan(0);
                let framed = u16::from_le_bytes(self.trailer);
                let computed = self.crc.finish();
                if computed != framed {
                    warn!(
                        "record checksum mismatch: computed {computed:#06x}, framed {framed:#06x}"
                    );
                    return ParseResult::ChecksumMismatch;
                }
                ParseResult::Packet(PacketRef {
                    route: self.route,
                    payload: &self.buf[..self.limit],
                })
            }
        }
    }
}
