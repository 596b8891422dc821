//! Inbound bytes cut at frame boundaries
//!
//! `h2` reads whatever the pipe holds. Handed a whole read at once it buffers
//! frames for several streams before any stream is polled, and the adapter
//! would then see them in stream order. Feeding one frame per drive keeps
//! events in the order the peer sent them.

use bytes::{Bytes, BytesMut};

/// Client connection preface.
const PREFACE_LEN: usize = 24;
const HEADER_LEN: usize = 9;
const SETTINGS: u8 = 0x4;
const ACK: u8 = 0x1;

/// What a cut holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unit {
    Preface,
    Frame { kind: u8, flags: u8 },
    /// Declared length beyond what we accept; handed over whole so the
    /// engine fails the connection.
    Oversized,
}

impl Unit {
    pub(crate) fn acknowledges_settings(self) -> bool {
        matches!(self, Unit::Frame { kind: SETTINGS, flags } if flags & ACK != 0)
    }
}

#[derive(Debug)]
pub(crate) struct FrameSplitter {
    buf: BytesMut,
    preface_left: usize,
    max_frame_size: usize,
}

impl FrameSplitter {
    /// A server expects the client preface ahead of the first frame.
    pub(crate) fn new(expect_preface: bool, max_frame_size: u32) -> Self {
        Self {
            buf: BytesMut::new(),
            preface_left: if expect_preface { PREFACE_LEN } else { 0 },
            max_frame_size: usize::try_from(max_frame_size).unwrap_or(usize::MAX),
        }
    }

    pub(crate) fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next piece the engine can act on, if a whole one is buffered.
    ///
    /// Preface bytes are released as they arrive so a bad preface fails early.
    pub(crate) fn next_unit(&mut self) -> Option<(Bytes, Unit)> {
        if self.preface_left > 0 {
            if self.buf.is_empty() {
                return None;
            }
            let n = self.preface_left.min(self.buf.len());
            self.preface_left -= n;
            return Some((self.buf.split_to(n).freeze(), Unit::Preface));
        }
        if self.buf.len() < HEADER_LEN {
            return None;
        }
        let len = (usize::from(self.buf[0]) << 16) | (usize::from(self.buf[1]) << 8) | usize::from(self.buf[2]);
        if len > self.max_frame_size {
            return Some((self.buf.split().freeze(), Unit::Oversized));
        }
        if self.buf.len() < HEADER_LEN + len {
            return None;
        }
        let unit = Unit::Frame {
            kind: self.buf[3],
            flags: self.buf[4],
        };
        Some((self.buf.split_to(HEADER_LEN + len).freeze(), unit))
    }

    /// Everything still buffered, whole frame or not.
    pub(crate) fn rest(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
