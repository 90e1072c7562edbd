//! Receive path: ring buffer, carry-over bridge, dispatch and the
//! bootloader transaction slot.

pub mod bridge;
pub mod dispatch;
pub mod ring;
pub mod txn;

pub use {
    bridge::{Bridge, LinkMode, PollSummary},
    dispatch::{AckBoard, Dispatched, Dispatcher, DispatcherBuilder, DropReason},
    ring::{RingBuffer, RxSink},
    txn::TxnSlot,
};
