//! CRC32 as computed by the companion chip's ROM bootloader.
//!
//! The ROM uses the reflected 0x04C11DB7 polynomial seeded with 0xFFFFFFFF
//! and returns the register without the final inversion, i.e. CRC-32/JAMCRC.

use crc::{CRC_32_JAMCRC, Crc, Digest};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_JAMCRC);

/// One-shot CRC32 over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Incremental CRC32, fed packet by packet while an image is streamed.
pub struct Crc32 {
    digest: Digest<'static, u32>,
    len: u64,
}

impl Crc32 {
    /// Start a new digest.
    pub fn new() -> Self {
        Self {
            digest: CRC32.digest(),
            len: 0,
        }
    }

    /// Feed the next chunk.
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing has been fed yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current CRC value without consuming the digest.
    pub fn value(&self) -> u32 {
        self.digest.clone().finalize()
    }

    /// Finish and return the CRC.
    pub fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("len", &self.len)
            .field("value", &format_args!("{:#010x}", self.value()))
            .finish()
    }
}
