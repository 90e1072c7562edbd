//! Poll loop glue between the RX ring buffer and the deframers.

use {
    crate::{
        link::{dispatch::Dispatcher, ring::RxSink, txn::TxnSlot},
        protocol::{
            boot::BootDecoder,
            codec::{CodecStats, Deframe, FrameCodec, deframe},
        },
    },
    log::{debug, warn},
    std::sync::Arc,
};

/// Which protocol the companion is speaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Command/ack/indication frames from the running firmware.
    #[default]
    Frames,
    /// ROM bootloader responses during an OTA session.
    Bootloader,
}

/// What one [`Bridge::poll`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollSummary {
    /// Bytes drained from the ring buffer.
    pub received: usize,
    /// Frames dispatched.
    pub frames: usize,
    /// Bootloader responses decoded.
    pub boot_packets: usize,
    /// Bytes kept for the next poll.
    pub carried: usize,
    /// Bytes of an oversized partial frame thrown away.
    pub discarded: usize,
}

/// Ring buffer, carry-over and deframers.
#[derive(Debug)]
pub struct Bridge {
    sink: RxSink,
    carry: Vec<u8>,
    awaiting: Option<usize>,
    codec: FrameCodec,
    boot: BootDecoder,
    mode: LinkMode,
    dispatcher: Dispatcher,
    slot: Arc<TxnSlot>,
}

impl Bridge {
    /// Create a bridge with a ring of `ring_capacity` bytes.
    pub fn new(ring_capacity: usize, checksum: bool, dispatcher: Dispatcher) -> Self {
        Self {
            sink: RxSink::new(ring_capacity),
            carry: Vec::new(),
            awaiting: None,
            codec: FrameCodec::new(checksum),
            boot: BootDecoder::new(),
            mode: LinkMode::Frames,
            dispatcher,
            slot: Arc::new(TxnSlot::new()),
        }
    }

    /// Producer handle for the byte-arrival callback.
    pub fn rx_sink(&self) -> RxSink {
        self.sink.clone()
    }

    /// Transaction slot filled in bootloader mode.
    pub fn txn_slot(&self) -> Arc<TxnSlot> {
        Arc::clone(&self.slot)
    }

    /// Dispatcher routing decoded frames.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Frame codec counters.
    pub fn codec_stats(&self) -> CodecStats {
        self.codec.stats()
    }

    /// Current link mode.
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Switch protocols. Any partial frame of the old protocol is dropped.
    pub fn set_mode(&mut self, mode: LinkMode) {
        if self.mode != mode {
            debug!("link mode {:?} -> {mode:?}", self.mode);
            self.mode = mode;
            self.carry.clear();
            self.awaiting = None;
        }
    }

    /// Bytes awaited by the carried partial frame.
    pub fn awaiting(&self) -> Option<usize> {
        self.awaiting
    }

    /// Drain the ring buffer, decode and dispatch in arrival order.
    pub fn poll(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();
        let mut scratch = std::mem::take(&mut self.carry);
        summary.received = self.sink.drain(&mut scratch);
        if scratch.is_empty() {
            return summary;
        }

        let (progress, limit) = match self.mode {
            LinkMode::Frames => {
                let dispatcher = &self.dispatcher;
                let progress = deframe(&mut self.codec, &scratch, |frame| {
                    dispatcher.dispatch(&frame);
                    summary.frames += 1;
                });
                (progress, 2 * FrameCodec::MAX_FRAME_LEN)
            },
            LinkMode::Bootloader => {
                let slot = &self.slot;
                let progress = deframe(&mut self.boot, &scratch, |packet| {
                    slot.offer(packet);
                    summary.boot_packets += 1;
                });
                (progress, 2 * BootDecoder::MAX_FRAME_LEN)
            },
        };

        scratch.drain(..progress.consumed);
        if scratch.len() > limit {
            warn!("discarding {} byte partial frame", scratch.len());
            summary.discarded = scratch.len();
            scratch.clear();
            self.awaiting = None;
        } else {
            self.awaiting = progress.needed;
        }
        summary.carried = scratch.len();
        self.carry = scratch;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        boot::{BootForm, BootOp, BootPacket},
        frame::{Frame, FrameKind},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_carry_over_across_polls() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let dispatcher = Dispatcher::builder()
            .on_indication(0x01, 16, move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let mut bridge = Bridge::new(64, true, dispatcher);
        let sink = bridge.rx_sink();

        let data = Frame::new(FrameKind::Indication, 0x01, vec![1, 2, 3])
            .unwrap()
            .encode(true);
        sink.on_bytes_received(&data[..4]).unwrap();
        let summary = bridge.poll();
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.carried, 4);
        assert_eq!(bridge.awaiting(), Some(1));

        sink.on_bytes_received(&data[4..]).unwrap();
        sink.on_bytes_received(&data).unwrap();
        let summary = bridge.poll();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.carried, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.codec_stats().frames, 2);
    }

    #[test]
    fn test_poll_empty_is_noop() {
        let mut bridge = Bridge::new(16, false, Dispatcher::default());
        assert_eq!(bridge.poll(), PollSummary::default());
    }

    #[test]
    fn test_bootloader_mode_fills_slot() {
        let mut bridge = Bridge::new(64, true, Dispatcher::default());
        bridge.set_mode(LinkMode::Bootloader);
        let slot = bridge.txn_slot();
        slot.arm(BootOp::LinkCheck);

        let rsp = BootPacket {
            form: BootForm::Short,
            op: 0x00,
            status: 0,
            data: vec![0x00],
        }
        .encode();
        bridge.rx_sink().on_bytes_received(&rsp).unwrap();
        let summary = bridge.poll();
        assert_eq!(summary.boot_packets, 1);
        assert!(slot.take().is_some());
    }

    #[test]
    fn test_mode_switch_drops_partial() {
        let mut bridge = Bridge::new(64, true, Dispatcher::default());
        bridge.rx_sink().on_bytes_received(&[0xBA, 0xAB]).unwrap();
        assert_eq!(bridge.poll().carried, 2);
        bridge.set_mode(LinkMode::Bootloader);
        assert_eq!(bridge.awaiting(), None);
        assert_eq!(bridge.poll(), PollSummary::default());
    }
}
