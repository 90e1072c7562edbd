//! Erase planning: cover a byte range with the largest erase units that fit.

use crate::protocol::boot::{EraseSize, SECTOR_SIZE};

const SECTOR: u64 = SECTOR_SIZE as u64;

/// One step of an erase plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseOp {
    /// Erase a whole aligned unit.
    Unit {
        /// Granularity.
        size: EraseSize,
        /// Unit start address.
        addr: u32,
    },
    /// Clear `from..to` inside one sector by read-modify-write.
    Partial {
        /// Sector start address.
        sector: u32,
        /// First byte offset to clear.
        from: u32,
        /// One past the last byte offset to clear.
        to: u32,
    },
}

impl EraseOp {
    /// Absolute byte range this step clears.
    pub fn range(&self) -> std::ops::Range<u64> {
        match *self {
            Self::Unit { size, addr } => {
                u64::from(addr)..u64::from(addr) + u64::from(size.bytes())
            },
            Self::Partial { sector, from, to } => {
                u64::from(sector) + u64::from(from)..u64::from(sector) + u64::from(to)
            },
        }
    }
}

/// Plan the erase of `len` bytes at `start`.
///
/// Aligned spans use 64K, then 32K, then 4K units; head and tail fragments
/// smaller than a sector become [`EraseOp::Partial`].
#[allow(clippy::cast_possible_truncation)] // every address stays below start + len
pub fn plan_erase(start: u32, len: u32) -> Vec<EraseOp> {
    let mut ops = Vec::new();
    let mut addr = u64::from(start);
    let end = addr + u64::from(len);

    while addr < end {
        let sector = addr & !(SECTOR - 1);
        if addr != sector || end - addr < SECTOR {
            let stop = end.min(sector + SECTOR);
            ops.push(EraseOp::Partial {
                sector: sector as u32,
                from: (addr - sector) as u32,
                to: (stop - sector) as u32,
            });
            addr = stop;
            continue;
        }

        let size = [EraseSize::Block64K, EraseSize::Block32K, EraseSize::Sector4K]
            .into_iter()
            .find(|size| {
                let bytes = u64::from(size.bytes());
                addr % bytes == 0 && end - addr >= bytes
            })
            .unwrap_or(EraseSize::Sector4K);
        ops.push(EraseOp::Unit {
            size,
            addr: addr as u32,
        });
        addr += u64::from(size.bytes());
    }
    ops
}
