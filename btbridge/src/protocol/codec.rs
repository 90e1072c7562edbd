//! Receive-side framing and resynchronization.
//!
//! A deframer is a step function over a byte window: each call either emits
//! one item and reports how many bytes it used, skips garbage, or asks for
//! more input. Callers own the buffer and the cursor, which keeps partial
//! frames trivially carried across reads.

use {
    crate::protocol::frame::{Frame, FrameKind, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN},
    log::trace,
};

/// Result of one deframer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// A complete item starting at the window's first byte.
    Emit {
        /// The decoded item.
        item: T,
        /// Bytes it occupied.
        consumed: usize,
    },
    /// The window does not start a valid frame; drop this many bytes.
    Skip(usize),
    /// The window holds a frame prefix; this many more bytes are needed.
    NeedMore(usize),
}

/// Incremental deframer over a byte window.
pub trait Deframe {
    /// Decoded item type.
    type Output;

    /// Upper bound on one encoded item.
    const MAX_FRAME_LEN: usize;

    /// Decode at the start of `window`. Every step either consumes at least
    /// one byte or asks for more.
    fn step(&mut self, window: &[u8]) -> Step<Self::Output>;
}

/// Where a pass over a buffer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Bytes fully handled (emitted or skipped).
    pub consumed: usize,
    /// Bytes still awaited by the trailing partial frame, if any.
    pub needed: Option<usize>,
}

/// Run `deframer` across `buf`, handing every item to `on_item` in order.
pub fn deframe<D, F>(deframer: &mut D, buf: &[u8], mut on_item: F) -> Progress
where
    D: Deframe,
    F: FnMut(D::Output),
{
    let mut pos = 0;
    while pos < buf.len() {
        match deframer.step(&buf[pos..]) {
            Step::Emit { item, consumed } => {
                on_item(item);
                pos += consumed;
            },
            Step::Skip(n) => pos += n,
            Step::NeedMore(n) => {
                return Progress {
                    consumed: pos,
                    needed: Some(n),
                };
            },
        }
    }
    Progress {
        consumed: pos,
        needed: None,
    }
}

/// Collect every item `deframer` finds in `buf`.
pub fn deframe_all<D: Deframe>(deframer: &mut D, buf: &[u8]) -> (Vec<D::Output>, Progress) {
    let mut items = Vec::new();
    let progress = deframe(deframer, buf, |item| items.push(item));
    (items, progress)
}

/// Diagnostic counters kept by [`FrameCodec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecStats {
    /// Bytes dropped while hunting for a header.
    pub skipped_bytes: u64,
    /// Frames emitted.
    pub frames: u64,
    /// Frames discarded for a bad checksum.
    pub checksum_errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Header,
    Opcode,
    Length,
    Data,
    Checksum,
    Complete,
}

/// Frame codec for the command/ack/indication protocol.
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    checksum: bool,
    stats: CodecStats,
}

impl FrameCodec {
    /// Create a codec; `checksum` selects whether frames carry a trailing
    /// checksum byte.
    pub fn new(checksum: bool) -> Self {
        Self {
            checksum,
            stats: CodecStats::default(),
        }
    }

    /// Whether frames carry a checksum.
    pub fn checksum_enabled(&self) -> bool {
        self.checksum
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    fn skip(&mut self, reason: &str, byte: u8) -> Step<Frame> {
        trace!("resync: {reason} at byte {byte:#04x}");
        self.stats.skipped_bytes += 1;
        Step::Skip(1)
    }
}

impl Deframe for FrameCodec {
    type Output = Frame;

    const MAX_FRAME_LEN: usize = MAX_FRAME_LEN;

    fn step(&mut self, window: &[u8]) -> Step<Frame> {
        let Some(&first) = window.first() else {
            return Step::NeedMore(HEADER_LEN);
        };

        let mut state = RxState::Header;
        let mut kind = FrameKind::Command;
        let mut len = 0usize;
        let mut end = HEADER_LEN;

        loop {
            match state {
                RxState::Header => {
                    if window.len() < 2 {
                        if FrameKind::is_magic_lead(first) {
                            return Step::NeedMore(HEADER_LEN - window.len());
                        }
                        return self.skip("no magic", first);
                    }
                    match FrameKind::from_magic(u16::from_le_bytes([window[0], window[1]])) {
                        Some(k) => kind = k,
                        None => return self.skip("no magic", first),
                    }
                    if window.len() < HEADER_LEN {
                        return Step::NeedMore(HEADER_LEN - window.len());
                    }
                    state = RxState::Opcode;
                },
                RxState::Opcode => {
                    if !kind.accepts_opcode(window[2]) {
                        return self.skip("opcode out of range", first);
                    }
                    state = RxState::Length;
                },
                RxState::Length => {
                    len = usize::from(u16::from_le_bytes([window[3], window[4]]));
                    if len > MAX_PAYLOAD_LEN {
                        return self.skip("length over limit", first);
                    }
                    end = HEADER_LEN + len + usize::from(self.checksum);
                    if window.len() < end {
                        return Step::NeedMore(end - window.len());
                    }
                    state = RxState::Data;
                },
                RxState::Data => {
                    state = if self.checksum {
                        RxState::Checksum
                    } else {
                        RxState::Complete
                    };
                },
                RxState::Checksum => {
                    let sum = window[..end]
                        .iter()
                        .fold(0u8, |acc, b| acc.wrapping_add(*b));
                    if sum != 0 {
                        self.stats.checksum_errors += 1;
                        return self.skip("bad checksum", first);
                    }
                    state = RxState::Complete;
                },
                RxState::Complete => {
                    self.stats.frames += 1;
                    let frame = Frame {
                        kind,
                        opcode: window[2],
                        payload: window[HEADER_LEN..HEADER_LEN + len].to_vec(),
                    };
                    trace!(
                        "frame {:?} op={:#04x} len={}",
                        frame.kind, frame.opcode, len
                    );
                    return Step::Emit {
                        item: frame,
                        consumed: end,
                    };
                },
            }
        }
    }
}
