//! External SPI flash knowledge: part table, protection and erase planning.

pub mod erase;
pub mod protect;
pub mod table;

pub use {
    erase::{EraseOp, plan_erase},
    protect::{ProtectMode, SrWrite},
    table::{FLASH_TABLE, FlashParams, lookup},
};
