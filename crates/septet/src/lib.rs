#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

use core::ops::DerefMut;

use log::{debug, warn};

/// Frame delimiter: opens a frame, aborting any frame in progress.
pub const FRAME_START: u8 = 0xE6;
/// Frame delimiter: closes the frame in progress.
pub const FRAME_END: u8 = 0xE9;
/// Escape introducer for reserved values occurring inside a frame.
pub const ESC: u8 = 0xDB;
/// Escape code standing in for [`FRAME_END`].
pub const ESC_END: u8 = 0xDC;
/// Escape code standing in for [`ESC`].
pub const ESC_ESC: u8 = 0xDD;
/// Escape code standing in for [`FRAME_START`].
pub const ESC_START: u8 = 0xDE;

/// Payload bytes carried by one coding group.
pub const GROUP_DATA: usize = 7;
/// Encoded bytes emitted for one full coding group.
pub const GROUP_CODED: usize = GROUP_DATA + 2;

/// The result of feeding one stream byte to a [`FrameDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FeedResult {
    /// Byte outside any frame; it belongs to the caller, not to us.
    NotData,
    /// A START delimiter arrived. Decoder state was reset; if a frame was
    /// in progress, its partial output has been discarded.
    FrameStarted,
    /// Byte consumed, frame still in progress.
    Pending,
    /// An END delimiter arrived outside any frame. Consumed, no effect.
    IgnoredEnd,
    /// A frame completed. Carries the total number of decoded bytes
    /// buffered since the buffer was last taken or cleared, which may
    /// span several completed frames.
    FrameComplete(usize),
}

// ---- encoding ----

/// Serializes payload bytes into an escaped, erasure-coded, delimited
/// stream.
///
/// Output lands in a caller-provided buffer. Bytes that do not fit are
/// dropped rather than reported as errors; [`FrameEncoder::dropped_bytes`]
/// counts them.
pub struct FrameEncoder<B: DerefMut<Target = [u8]>> {
    buf: B,
    idx: usize,
    dropped: usize,

    group: [u8; GROUP_DATA],
    group_len: usize,

    /// Current value of the alternating high bit, `0x00` or `0x80`.
    /// Runs across the whole frame, reset only at frame start.
    toggle: u8,
    in_frame: bool,
}

#[cfg(any(feature = "std", test))]
impl FrameEncoder<Box<[u8]>> {
    pub fn new_boxslice(len: usize) -> Self {
        Self::new(vec![0u8; len].into_boxed_slice())
    }
}

impl<B: DerefMut<Target = [u8]>> FrameEncoder<B> {
    pub fn new(buf: B) -> Self {
        Self {
            buf,
            idx: 0,
            dropped: 0,
            group: [0; GROUP_DATA],
            group_len: 0,
            toggle: 0,
            in_frame: false,
        }
    }

    /// Appends payload bytes to the frame in progress, opening a new frame
    /// first if none is.
    pub fn extend(&mut self, bytes: &[u8]) {
        if !self.in_frame {
            self.toggle = 0;
            self.push_raw(FRAME_START);
            self.in_frame = true;
        }
        for &b in bytes {
            if self.group_len >= GROUP_DATA {
                self.flush_group();
            }
            self.group[self.group_len] = b;
            self.group_len += 1;
        }
    }

    /// Flushes any partial coding group and closes the frame. Returns the
    /// total number of bytes buffered.
    pub fn end_frame(&mut self) -> usize {
        if self.in_frame {
            if self.group_len > 0 {
                self.flush_group();
            }
            self.push_raw(FRAME_END);
            self.in_frame = false;
        }
        self.idx
    }

    /// Rewinds the output cursor, handing back the previous fill level.
    /// Does not touch an in-progress frame; finish frames before resetting.
    pub fn reset_buffer(&mut self) -> usize {
        let len = self.idx;
        self.idx = 0;
        self.dropped = 0;
        len
    }

    /// Everything buffered so far.
    pub fn contents(&self) -> &[u8] {
        &self.buf[..self.idx]
    }

    /// Bytes lost to the buffer capacity since the last reset.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped
    }

    fn flush_group(&mut self) {
        let cnt = self.group_len.min(GROUP_DATA);
        self.group_len = 0;

        let mut enc = [0u8; GROUP_CODED];
        let mut toggle = self.toggle;
        let mut upper = 0u8;
        for i in 0..cnt {
            let b = self.group[i];
            // Bit 7 of payload byte i is parked at bit 6-i of the
            // high-bits byte.
            upper |= (b & 0x80) >> (i + 1);
            enc[i] = (b & 0x7F) | toggle;
            toggle ^= 0x80;
        }
        enc[cnt] = upper | toggle;
        toggle ^= 0x80;

        // Parity closes the group: the low seven bits of all cnt+2
        // encoded bytes XOR to zero.
        let mut parity = 0u8;
        for &b in &enc[..cnt + 1] {
            parity ^= b;
        }
        enc[cnt + 1] = (parity & 0x7F) | toggle;
        self.toggle = toggle ^ 0x80;

        for &b in &enc[..cnt + 2] {
            let code = match b {
                FRAME_START => ESC_START,
                FRAME_END => ESC_END,
                ESC => ESC_ESC,
                _ => {
                    self.push_raw(b);
                    continue;
                }
            };
            self.push_raw(ESC);
            self.push_raw(code);
        }
    }

    fn push_raw(&mut self, byte: u8) {
        if self.idx < self.buf.len() {
            self.buf[self.idx] = byte;
            self.idx += 1;
        } else {
            self.dropped += 1;
        }
    }
}

// ---- decoding ----

/// Incrementally decodes an escaped, erasure-coded stream back into
/// payload bytes, one input byte per call.
///
/// Decoded bytes accumulate in the caller-provided buffer across completed
/// frames until [`FrameDecoder::take_frame`] or [`FrameDecoder::clear`];
/// bytes that do not fit are dropped silently and counted.
pub struct FrameDecoder<B: DerefMut<Target = [u8]>> {
    buf: B,
    idx: usize,
    /// Output cursor as of the last completed frame; a START mid-frame
    /// rewinds to here, keeping earlier completed frames intact.
    last_end: usize,
    dropped: usize,

    group: [u8; GROUP_CODED],
    group_len: usize,

    /// Expected value of the next byte's alternating high bit.
    expect_high: bool,
    skips: u8,
    skip_at: usize,

    escaping: bool,
    in_frame: bool,
}

#[cfg(any(feature = "std", test))]
impl FrameDecoder<Box<[u8]>> {
    pub fn new_boxslice(len: usize) -> Self {
        Self::new(vec![0u8; len].into_boxed_slice())
    }
}

impl<B: DerefMut<Target = [u8]>> FrameDecoder<B> {
    pub fn new(buf: B) -> Self {
        Self {
            buf,
            idx: 0,
            last_end: 0,
            dropped: 0,
            group: [0; GROUP_CODED],
            group_len: 0,
            expect_high: false,
            skips: 0,
            skip_at: 0,
            escaping: false,
            in_frame: false,
        }
    }

    /// Consumes one stream byte.
    pub fn feed(&mut self, byte: u8) -> FeedResult {
        if byte == FRAME_START {
            if self.in_frame {
                debug!("frame restarted mid-frame, discarding partial output");
            }
            self.idx = self.last_end;
            self.group_len = 0;
            self.expect_high = false;
            self.skips = 0;
            self.skip_at = 0;
            self.escaping = false;
            self.in_frame = true;
            return FeedResult::FrameStarted;
        }
        if byte == FRAME_END {
            if !self.in_frame {
                return FeedResult::IgnoredEnd;
            }
            self.end_group();
            self.in_frame = false;
            self.last_end = self.idx;
            return FeedResult::FrameComplete(self.idx);
        }
        if !self.in_frame {
            return FeedResult::NotData;
        }

        if byte == ESC {
            // A duplicated ESC lands here again and is absorbed.
            self.escaping = true;
            return FeedResult::Pending;
        }
        let mut byte = byte;
        if self.escaping {
            self.escaping = false;
            byte = match byte {
                ESC_END => FRAME_END,
                ESC_ESC => ESC,
                ESC_START => FRAME_START,
                // Unknown code: pass through. The group is probably
                // corrupt; the layer above will notice.
                other => other,
            };
        }

        let high = byte & 0x80 != 0;
        let byte = byte & 0x7F;
        if high != self.expect_high {
            // Broken alternation: a byte was dropped upstream. Hold its
            // place with a zero; the group-end parity pass fills it in.
            self.skip_at = self.group_len;
            self.group[self.group_len] = 0;
            self.group_len += 1;
            self.skips += 1;
        }
        self.expect_high = !high;

        // A placeholder insertion can fill the group; the current byte
        // then opens the next one.
        let add_later = self.group_len >= GROUP_CODED;
        if !add_later {
            self.group[self.group_len] = byte;
            self.group_len += 1;
        }
        if self.group_len >= GROUP_CODED {
            self.end_group();
        }
        if add_later {
            self.group[self.group_len] = byte;
            self.group_len += 1;
        }
        FeedResult::Pending
    }

    /// Hands out the decoded bytes buffered so far and rewinds the
    /// cursors. The returned slice is valid until the next call that
    /// mutates the decoder.
    ///
    /// Callers are expected to take the buffer right after a
    /// [`FeedResult::FrameComplete`]; taking it mid-frame leaves the rest
    /// of that frame decoding from index zero.
    pub fn take_frame(&mut self) -> &[u8] {
        let len = self.idx;
        self.idx = 0;
        self.last_end = 0;
        self.dropped = 0;
        &self.buf[..len]
    }

    /// Full reset: buffer cursors and frame state machine.
    pub fn clear(&mut self) {
        self.idx = 0;
        self.last_end = 0;
        self.dropped = 0;
        self.group_len = 0;
        self.expect_high = false;
        self.skips = 0;
        self.skip_at = 0;
        self.escaping = false;
        self.in_frame = false;
    }

    /// Decoded bytes buffered so far, without consuming them.
    pub fn decoded(&self) -> &[u8] {
        &self.buf[..self.idx]
    }

    /// Bytes lost to the buffer capacity since the buffer was last taken.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped
    }

    fn end_group(&mut self) {
        let skips = self.skips;
        let l = self.group_len;
        self.skips = 0;
        self.group_len = 0;

        if l < 3 {
            return;
        }
        if skips > 1 {
            // Two erasures in one group cannot be reconstructed. The
            // group's payload is gone; later groups are unaffected.
            warn!("discarding coding group with {} erasures", skips);
            return;
        }
        if skips == 1 {
            // A complete group XORs to zero in its stored seven-bit
            // values, so the missing byte is the XOR of all the others.
            let mut parity = 0u8;
            for &b in &self.group[..l] {
                parity ^= b;
            }
            self.group[self.skip_at] = parity;
        }

        // The second-to-last byte carries bit 7 of each payload byte,
        // most significant position first.
        let mut upper = self.group[l - 2];
        for i in 0..(l - 2) {
            upper <<= 1;
            let b = self.group[i] | (upper & 0x80);
            self.push_out(b);
        }
    }

    fn push_out(&mut self, byte: u8) {
        if self.idx < self.buf.len() {
            self.buf[self.idx] = byte;
            self.idx += 1;
        } else {
            self.dropped += 1;
        }
    }
}
