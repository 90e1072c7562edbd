//! Protocol implementations.

pub mod boot;
pub mod codec;
pub mod crc;
pub mod frame;

// Re-export common types
pub use {
    boot::{BootDecoder, BootForm, BootOp, BootPacket, BootRequest, EraseSize, Reply},
    codec::{CodecStats, Deframe, FrameCodec, Progress, Step, deframe, deframe_all},
    crc::{Crc32, crc32},
    frame::{Frame, FrameKind, MAX_FRAME_LEN, MAX_PAYLOAD_LEN, TEST_OPCODE},
};
