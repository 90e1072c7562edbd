//! Status-register values for locking and unlocking the flash array.

use crate::flash::table::FlashParams;

/// Direction of a protection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtectMode {
    /// Clear block protection before erasing/writing.
    Unprotect,
    /// Restore block protection afterwards.
    Reprotect,
}

impl ProtectMode {
    /// Whether this locks the array.
    pub const fn locks(self) -> bool {
        matches!(self, Self::Reprotect)
    }
}

/// One status-register write and the registers it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrWrite {
    /// SPI write command.
    pub cmd: u8,
    /// One or two register bytes.
    pub values: Vec<u8>,
    /// Indices (0 = SR1, 1 = SR2) of the registers written.
    pub registers: Vec<usize>,
}

/// Mask of the protect field in the 16-bit status word.
pub fn field_mask(params: &FlashParams) -> u16 {
    let ones = (1u32 << params.bp_width) - 1;
    let mask = ones << params.bp_offset;
    u16::try_from(mask & 0xFFFF).unwrap_or(u16::MAX)
}

/// Status word with the protect field set for `mode`, other bits kept.
pub fn target_word(params: &FlashParams, current: u16, mode: ProtectMode) -> u16 {
    let mask = field_mask(params);
    let bits = match mode {
        ProtectMode::Unprotect => params.unprotect_bits,
        ProtectMode::Reprotect => params.protect_bits,
    };
    (current & !mask) | ((bits << params.bp_offset) & mask)
}

/// Writes needed to put `target` into the part's registers.
pub fn plan_writes(params: &FlashParams, target: u16) -> Vec<SrWrite> {
    let [sr1, sr2] = target.to_le_bytes();
    if params.sr_count < 2 {
        vec![SrWrite {
            cmd: params.write_cmds[0],
            values: vec![sr1],
            registers: vec![0],
        }]
    } else if params.combined_write() {
        vec![SrWrite {
            cmd: params.write_cmds[0],
            values: vec![sr1, sr2],
            registers: vec![0, 1],
        }]
    } else {
        vec![
            SrWrite {
                cmd: params.write_cmds[0],
                values: vec![sr1],
                registers: vec![0],
            },
            SrWrite {
                cmd: params.write_cmds[1],
                values: vec![sr2],
                registers: vec![1],
            },
        ]
    }
}

/// Byte of `word` held by register `index`.
pub fn register_byte(word: u16, index: usize) -> u8 {
    word.to_le_bytes()[index.min(1)]
}
