//! SPI NOR parts the companion module ships with, keyed by JEDEC ID.
//!
//! Status registers are treated as one 16-bit word: SR1 in the low byte,
//! SR2 in the high byte. The block-protect field is `bp_width` bits starting
//! at `bp_offset`; `protect_bits`/`unprotect_bits` are the field values
//! written to lock and unlock the array.

/// SR1 read command.
pub const RDSR1: u8 = 0x05;
/// SR2 read command.
pub const RDSR2: u8 = 0x35;
/// SR1 write command (also the combined two-byte write).
pub const WRSR1: u8 = 0x01;
/// SR2 write command.
pub const WRSR2: u8 = 0x31;

/// Per-part status register description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlashParams {
    /// JEDEC ID: manufacturer << 16 | memory type << 8 | capacity code.
    pub id: u32,
    /// Part name.
    pub name: &'static str,
    /// Capacity in bytes.
    pub capacity: u32,
    /// Number of status registers (1 or 2).
    pub sr_count: u8,
    /// First bit of the protect field.
    pub bp_offset: u8,
    /// Width of the protect field in bits.
    pub bp_width: u8,
    /// Field value that write-protects the array.
    pub protect_bits: u16,
    /// Field value that unprotects the array.
    pub unprotect_bits: u16,
    /// Read commands for SR1 and SR2.
    pub read_cmds: [u8; 2],
    /// Write commands for SR1 and SR2. `write_cmds[1] == 0` means both
    /// registers are written together with `write_cmds[0]`.
    pub write_cmds: [u8; 2],
    /// The part does not confirm SR writes on its own; re-read to verify.
    pub verify_write: bool,
}

impl FlashParams {
    /// Manufacturer ID byte.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn manufacturer(&self) -> u8 {
        (self.id >> 16) as u8
    }

    /// Whether both registers go out in one two-byte write.
    pub const fn combined_write(&self) -> bool {
        self.sr_count == 2 && self.write_cmds[1] == 0
    }
}

const MIB: u32 = 1024 * 1024;

const fn single(
    id: u32,
    name: &'static str,
    capacity: u32,
    bp_width: u8,
    protect_bits: u16,
    verify_write: bool,
) -> FlashParams {
    FlashParams {
        id,
        name,
        capacity,
        sr_count: 1,
        bp_offset: 2,
        bp_width,
        protect_bits,
        unprotect_bits: 0,
        read_cmds: [RDSR1, 0],
        write_cmds: [WRSR1, 0],
        verify_write,
    }
}

const fn dual(
    id: u32,
    name: &'static str,
    capacity: u32,
    combined: bool,
    verify_write: bool,
) -> FlashParams {
    FlashParams {
        id,
        name,
        capacity,
        sr_count: 2,
        bp_offset: 2,
        bp_width: 5,
        protect_bits: 0x1F,
        unprotect_bits: 0,
        read_cmds: [RDSR1, RDSR2],
        write_cmds: if combined { [WRSR1, 0] } else { [WRSR1, WRSR2] },
        verify_write,
    }
}

/// Every known part.
pub static FLASH_TABLE: &[FlashParams] = &[
    // GigaDevice
    single(0xC84014, "GD25Q80", MIB, 5, 0x1F, false),
    dual(0xC84015, "GD25Q16", 2 * MIB, true, false),
    dual(0xC84016, "GD25Q32", 4 * MIB, false, false),
    dual(0xC84017, "GD25Q64", 8 * MIB, false, false),
    dual(0xC84018, "GD25Q128", 16 * MIB, false, false),
    single(0xC86014, "GD25LQ80", MIB, 5, 0x1F, false),
    dual(0xC86015, "GD25LQ16", 2 * MIB, true, false),
    // XTX
    single(0x0B4014, "XT25F08B", MIB, 5, 0x1F, true),
    dual(0x0B4015, "XT25F16B", 2 * MIB, true, true),
    dual(0x0B4016, "XT25F32B", 4 * MIB, true, true),
    dual(0x0B4017, "XT25F64B", 8 * MIB, false, true),
    // Macronix
    single(0xC22314, "MX25V8035F", MIB, 4, 0x0F, false),
    single(0xC22315, "MX25V1635F", 2 * MIB, 4, 0x0F, false),
    single(0xC22016, "MX25L3233F", 4 * MIB, 4, 0x0F, false),
    // Winbond
    single(0xEF4014, "W25Q80", MIB, 5, 0x1F, false),
    dual(0xEF4015, "W25Q16", 2 * MIB, true, false),
    dual(0xEF4016, "W25Q32", 4 * MIB, false, false),
    dual(0xEF4017, "W25Q64", 8 * MIB, false, false),
    dual(0xEF4018, "W25Q128", 16 * MIB, false, false),
    // Puya
    single(0x856013, "P25Q40", MIB / 2, 4, 0x0F, true),
    dual(0x856014, "P25Q80", MIB, true, true),
    dual(0x856015, "P25Q16", 2 * MIB, true, true),
    dual(0x856016, "P25Q32", 4 * MIB, false, true),
    // Boya
    dual(0x684014, "BY25Q80", MIB, true, false),
    dual(0x684015, "BY25Q16", 2 * MIB, true, false),
    dual(0x684016, "BY25Q32", 4 * MIB, false, false),
    // Others
    single(0x1C7015, "EN25QH16", 2 * MIB, 4, 0x0F, false),
    dual(0x5E4015, "ZB25VQ16", 2 * MIB, true, true),
    dual(0x5E4016, "ZB25VQ32", 4 * MIB, false, true),
    dual(0xA14015, "FM25Q16", 2 * MIB, true, false),
    single(0xEB6014, "TH25Q80", MIB, 4, 0x0F, true),
    single(0xE04014, "PN25F08", MIB, 4, 0x0F, false),
];

/// Find the entry for a JEDEC ID.
pub fn lookup(id: u32) -> Option<&'static FlashParams> {
    let id = id & 0x00FF_FFFF;
    FLASH_TABLE
        .iter()
        .find(|p| p.id == id)
}
