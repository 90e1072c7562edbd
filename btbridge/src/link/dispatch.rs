//! Opcode dispatch for validated frames.
//!
//! Handlers are registered once through [`DispatcherBuilder`]; the built
//! [`Dispatcher`] is immutable. Acks additionally land on an [`AckBoard`]
//! so a blocking caller can wait for the status of the command it sent.

use {
    crate::{
        error::{Error, Result},
        protocol::frame::{Frame, FrameKind, TEST_OPCODE},
    },
    log::{debug, trace, warn},
    std::sync::{Arc, Mutex, PoisonError},
};

type AckHandler = Box<dyn Fn(u8) + Send + Sync>;
type IndHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

struct IndEntry {
    max_len: usize,
    handler: IndHandler,
}

/// Why a frame was not delivered to a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Opcode at or above the kind's bound.
    OutOfRange,
    /// No handler registered for the opcode.
    NoHandler,
    /// Ack payload was not exactly one byte.
    LengthMismatch,
    /// Indication payload larger than the declared maximum.
    Oversize,
    /// Command frames only travel host to companion.
    UnexpectedCommand,
}

/// What [`Dispatcher::dispatch`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// An ack was recorded (and handed to its handler, if any).
    Ack {
        /// Command opcode acknowledged.
        opcode: u8,
        /// Status byte.
        status: u8,
    },
    /// An indication handler ran.
    Indication(u8),
    /// Test opcode frame; logged only.
    Test,
    /// Logged and discarded.
    Dropped(DropReason),
}

/// Latest ack status per command opcode.
#[derive(Debug)]
pub struct AckBoard {
    slots: Mutex<Vec<Option<u8>>>,
}

impl AckBoard {
    fn new() -> Self {
        Self {
            slots: Mutex::new(vec![None; usize::from(FrameKind::Ack.opcode_limit())]),
        }
    }

    fn record(&self, opcode: u8, status: u8) {
        if let Some(slot) = self
            .lock()
            .get_mut(usize::from(opcode))
        {
            *slot = Some(status);
        }
    }

    /// Forget any stale status for `opcode` before sending it again.
    pub fn arm(&self, opcode: u8) {
        if let Some(slot) = self
            .lock()
            .get_mut(usize::from(opcode))
        {
            *slot = None;
        }
    }

    /// Take the status recorded for `opcode`.
    pub fn take(&self, opcode: u8) -> Option<u8> {
        self.lock()
            .get_mut(usize::from(opcode))
            .and_then(Option::take)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Option<u8>>> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Builder for a [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    acks: Vec<(u8, AckHandler)>,
    inds: Vec<(u8, usize, IndHandler)>,
}

impl DispatcherBuilder {
    /// Start with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle acks for command `opcode`.
    #[must_use]
    pub fn on_ack<F>(mut self, opcode: u8, handler: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.acks.push((opcode, Box::new(handler)));
        self
    }

    /// Handle indication `opcode` with payloads of at most `max_len` bytes.
    #[must_use]
    pub fn on_indication<F>(mut self, opcode: u8, max_len: usize, handler: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.inds.push((opcode, max_len, Box::new(handler)));
        self
    }

    /// Freeze the registry. Fails on out-of-range or duplicate opcodes.
    pub fn build(self) -> Result<Dispatcher> {
        let ack_limit = FrameKind::Ack.opcode_limit();
        let ind_limit = FrameKind::Indication.opcode_limit();

        let mut acks: Vec<Option<AckHandler>> = (0..ack_limit).map(|_| None).collect();
        for (opcode, handler) in self.acks {
            let slot = acks
                .get_mut(usize::from(opcode))
                .ok_or_else(|| Error::Config(format!("ack opcode {opcode:#04x} out of range")))?;
            if slot.replace(handler).is_some() {
                return Err(Error::Config(format!(
                    "duplicate ack handler for {opcode:#04x}"
                )));
            }
        }

        let mut inds: Vec<Option<IndEntry>> = (0..ind_limit).map(|_| None).collect();
        for (opcode, max_len, handler) in self.inds {
            let slot = inds.get_mut(usize::from(opcode)).ok_or_else(|| {
                Error::Config(format!("indication opcode {opcode:#04x} out of range"))
            })?;
            if slot
                .replace(IndEntry { max_len, handler })
                .is_some()
            {
                return Err(Error::Config(format!(
                    "duplicate indication handler for {opcode:#04x}"
                )));
            }
        }

        Ok(Dispatcher {
            acks,
            inds,
            board: Arc::new(AckBoard::new()),
        })
    }
}

/// Immutable opcode registry.
pub struct Dispatcher {
    acks: Vec<Option<AckHandler>>,
    inds: Vec<Option<IndEntry>>,
    board: Arc<AckBoard>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("acks", &self.acks.iter().filter(|h| h.is_some()).count())
            .field("indications", &self.inds.iter().filter(|h| h.is_some()).count())
            .finish_non_exhaustive()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            acks: (0..FrameKind::Ack.opcode_limit()).map(|_| None).collect(),
            inds: (0..FrameKind::Indication.opcode_limit())
                .map(|_| None)
                .collect(),
            board: Arc::new(AckBoard::new()),
        }
    }
}

impl Dispatcher {
    /// Start a builder.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Shared ack status board.
    pub fn ack_board(&self) -> Arc<AckBoard> {
        Arc::clone(&self.board)
    }

    /// Route one frame.
    pub fn dispatch(&self, frame: &Frame) -> Dispatched {
        match frame.kind {
            FrameKind::Command => {
                warn!("dropping command frame {:#04x} from companion", frame.opcode);
                Dispatched::Dropped(DropReason::UnexpectedCommand)
            },
            FrameKind::Ack => self.dispatch_ack(frame),
            FrameKind::Indication => self.dispatch_indication(frame),
        }
    }

    fn dispatch_ack(&self, frame: &Frame) -> Dispatched {
        if frame.opcode == TEST_OPCODE {
            debug!("test ack: {:02X?}", frame.payload);
            return Dispatched::Test;
        }
        let Some(slot) = self.acks.get(usize::from(frame.opcode)) else {
            debug!("ack opcode {:#04x} out of range", frame.opcode);
            return Dispatched::Dropped(DropReason::OutOfRange);
        };
        let &[status] = frame.payload.as_slice() else {
            warn!(
                "ack {:#04x}: length mismatch ({} bytes)",
                frame.opcode,
                frame.payload.len()
            );
            return Dispatched::Dropped(DropReason::LengthMismatch);
        };

        self.board.record(frame.opcode, status);
        match slot {
            Some(handler) => handler(status),
            None => trace!("ack {:#04x} status {status:#04x} (no handler)", frame.opcode),
        }
        Dispatched::Ack {
            opcode: frame.opcode,
            status,
        }
    }

    fn dispatch_indication(&self, frame: &Frame) -> Dispatched {
        if frame.opcode == TEST_OPCODE {
            debug!("test indication: {:02X?}", frame.payload);
            return Dispatched::Test;
        }
        let Some(slot) = self.inds.get(usize::from(frame.opcode)) else {
            debug!("indication opcode {:#04x} out of range", frame.opcode);
            return Dispatched::Dropped(DropReason::OutOfRange);
        };
        let Some(entry) = slot else {
            debug!("no handler for indication {:#04x}", frame.opcode);
            return Dispatched::Dropped(DropReason::NoHandler);
        };
        if frame.payload.len() > entry.max_len {
            warn!(
                "indication {:#04x}: {} bytes exceeds max {}",
                frame.opcode,
                frame.payload.len(),
                entry.max_len
            );
            return Dispatched::Dropped(DropReason::Oversize);
        }
        (entry.handler)(&frame.payload);
        Dispatched::Indication(frame.opcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ack(opcode: u8, payload: Vec<u8>) -> Frame {
        Frame {
            kind: FrameKind::Ack,
            opcode,
            payload,
        }
    }

    fn ind(opcode: u8, payload: Vec<u8>) -> Frame {
        Frame {
            kind: FrameKind::Indication,
            opcode,
            payload,
        }
    }

    #[test]
    fn test_ack_sets_board_and_calls_handler() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = Arc::clone(&seen);
        let dispatcher = Dispatcher::builder()
            .on_ack(0x10, move |status| {
                seen2.store(usize::from(status) + 1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let board = dispatcher.ack_board();

        assert_eq!(
            dispatcher.dispatch(&ack(0x10, vec![0x02])),
            Dispatched::Ack {
                opcode: 0x10,
                status: 0x02
            }
        );
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(board.take(0x10), Some(0x02));
        assert_eq!(board.take(0x10), None);
    }

    #[test]
    fn test_ack_without_handler_still_recorded() {
        let dispatcher = Dispatcher::default();
        dispatcher.dispatch(&ack(0x20, vec![0x00]));
        assert_eq!(dispatcher.ack_board().take(0x20), Some(0x00));
    }

    #[test]
    fn test_ack_length_mismatch_dropped() {
        let dispatcher = Dispatcher::default();
        assert_eq!(
            dispatcher.dispatch(&ack(0x20, vec![0x00, 0x01])),
            Dispatched::Dropped(DropReason::LengthMismatch)
        );
        assert_eq!(dispatcher.ack_board().take(0x20), None);
    }

    #[test]
    fn test_indication_limits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let dispatcher = Dispatcher::builder()
            .on_indication(0x05, 4, move |payload| {
                calls2.fetch_add(payload.len(), Ordering::SeqCst);
            })
            .build()
            .unwrap();

        assert_eq!(
            dispatcher.dispatch(&ind(0x05, vec![1, 2, 3, 4])),
            Dispatched::Indication(0x05)
        );
        assert_eq!(
            dispatcher.dispatch(&ind(0x05, vec![0; 5])),
            Dispatched::Dropped(DropReason::Oversize)
        );
        assert_eq!(
            dispatcher.dispatch(&ind(0x06, vec![])),
            Dispatched::Dropped(DropReason::NoHandler)
        );
        assert_eq!(
            dispatcher.dispatch(&ind(0x40, vec![])),
            Dispatched::Dropped(DropReason::OutOfRange)
        );
        assert_eq!(
            dispatcher.dispatch(&ind(TEST_OPCODE, vec![9])),
            Dispatched::Test
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_builder_rejects_bad_registrations() {
        assert!(Dispatcher::builder()
            .on_indication(0x30, 1, |_| {})
            .build()
            .is_err());
        assert!(Dispatcher::builder()
            .on_ack(0x01, |_| {})
            .on_ack(0x01, |_| {})
            .build()
            .is_err());
    }

    #[test]
    fn test_command_from_companion_dropped() {
        let frame = Frame::command(0x01, vec![]).unwrap();
        assert_eq!(
            Dispatcher::default().dispatch(&frame),
            Dispatched::Dropped(DropReason::UnexpectedCommand)
        );
    }
}
