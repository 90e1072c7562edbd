//! Single outstanding bootloader transaction.

use {
    crate::protocol::boot::{BootOp, BootPacket},
    log::trace,
    std::sync::{Mutex, PoisonError},
};

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Idle,
    Pending(BootOp),
    Done(BootPacket),
}

/// Shared slot the OTA engine waits on and the bridge fills.
#[derive(Debug, Default)]
pub struct TxnSlot {
    state: Mutex<SlotState>,
}

impl TxnSlot {
    /// Create an idle slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect a response to `op`, discarding whatever was there.
    pub fn arm(&self, op: BootOp) {
        *self.lock() = SlotState::Pending(op);
    }

    /// Drop any pending expectation.
    pub fn clear(&self) {
        *self.lock() = SlotState::Idle;
    }

    /// Offer a decoded response. Returns whether it completed the pending
    /// transaction; anything else is dropped.
    pub fn offer(&self, packet: BootPacket) -> bool {
        let mut state = self.lock();
        match &*state {
            SlotState::Pending(op) if packet.answers(*op) => {
                *state = SlotState::Done(packet);
                true
            },
            _ => {
                trace!(
                    "unsolicited boot response op={:#04x} ({:?})",
                    packet.op, packet.form
                );
                false
            },
        }
    }

    /// Take the completed response, returning the slot to idle.
    pub fn take(&self) -> Option<BootPacket> {
        let mut state = self.lock();
        if matches!(*state, SlotState::Done(_)) {
            if let SlotState::Done(packet) = std::mem::take(&mut *state) {
                return Some(packet);
            }
        }
        None
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotState> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
