//! ROM bootloader transactions of the companion chip.
//!
//! ## Request Format
//!
//! ```text
//! short: 01 E0 FC <len>              <op> <payload>   len   = 1 + payload
//! long:  01 E0 FC FF <len16 LE>      <op> <payload>   len16 = 1 + payload
//! ```
//!
//! ## Response Format
//!
//! ```text
//! short: 04 0E <len>    01 E0 FC              <op> <data>           len   = 4 + data
//! long:  04 0E FF       01 E0 FC <len16 LE>   <op> <status> <data>  len16 = 2 + data
//! ```
//!
//! Flash operations use the long form and carry a status byte (0 = success).

use {
    crate::protocol::codec::{Deframe, Step},
    byteorder::{LittleEndian, WriteBytesExt},
    log::trace,
};

/// Request prefix shared by both forms.
pub const REQUEST_PREFIX: [u8; 3] = [0x01, 0xE0, 0xFC];

/// Response event header.
pub const RESPONSE_HEADER: [u8; 2] = [0x04, 0x0E];

/// Marker byte selecting the long form.
pub const LONG_MARKER: u8 = 0xFF;

/// Flash sector size used by Read4K/Write4K.
pub const SECTOR_SIZE: usize = 4096;

const SHORT_RESPONSE_HEADER_LEN: usize = 3;
const LONG_RESPONSE_HEADER_LEN: usize = 8;

/// Largest long-form response: Read4K answers with address plus a sector.
pub const MAX_RESPONSE_LEN: usize = LONG_RESPONSE_HEADER_LEN + 2 + 4 + SECTOR_SIZE;

/// Keyword sent with the reset request.
pub const RESET_MAGIC: [u8; 4] = [0x53, 0x45, 0x41, 0x4E];

/// Request/response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootForm {
    /// One-byte length, no status.
    Short,
    /// Two-byte length, status byte in the response.
    Long,
}

/// Bootloader operation codes. Short and long forms have separate code
/// spaces, so the same byte appears twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootOp {
    /// Link check (short 0x00).
    LinkCheck,
    /// Set UART baud rate (short 0x0F).
    SetBaudRate,
    /// CRC over a flash range (short 0x10).
    CheckCrc,
    /// Soft reset into the bootloader (short 0x70).
    Reset,
    /// Stay in ROM instead of booting flash (short 0xAA).
    StayRom,
    /// Reboot into the application (short 0x0E).
    Reboot,
    /// Write an arbitrary chunk (long 0x06).
    Write,
    /// Write one 4 KB sector (long 0x07).
    Write4K,
    /// Read one 4 KB sector (long 0x09).
    Read4K,
    /// Read the JEDEC ID (long 0x0E).
    GetFlashId,
    /// Read a status register (long 0x0C).
    ReadSr,
    /// Write one or two status registers (long 0x0D).
    WriteSr,
    /// Erase a 4K/32K/64K unit (long 0x0F).
    Erase,
}

impl BootOp {
    /// Envelope this operation travels in.
    pub const fn form(self) -> BootForm {
        match self {
            Self::LinkCheck
            | Self::SetBaudRate
            | Self::CheckCrc
            | Self::Reset
            | Self::StayRom
            | Self::Reboot => BootForm::Short,
            _ => BootForm::Long,
        }
    }

    /// Wire opcode.
    pub const fn code(self) -> u8 {
        match self {
            Self::LinkCheck => 0x00,
            Self::SetBaudRate => 0x0F,
            Self::CheckCrc => 0x10,
            Self::Reset => 0x70,
            Self::StayRom => 0xAA,
            Self::Reboot | Self::GetFlashId => 0x0E,
            Self::Write => 0x06,
            Self::Write4K => 0x07,
            Self::Read4K => 0x09,
            Self::ReadSr => 0x0C,
            Self::WriteSr => 0x0D,
            Self::Erase => 0x0F,
        }
    }

    /// Whether the bootloader answers this request.
    pub const fn expects_response(self) -> bool {
        !matches!(self, Self::Reset | Self::Reboot)
    }

    /// Decode an opcode for the given form.
    pub fn from_code(form: BootForm, code: u8) -> Option<Self> {
        const ALL: [BootOp; 13] = [
            BootOp::LinkCheck,
            BootOp::SetBaudRate,
            BootOp::CheckCrc,
            BootOp::Reset,
            BootOp::StayRom,
            BootOp::Reboot,
            BootOp::Write,
            BootOp::Write4K,
            BootOp::Read4K,
            BootOp::GetFlashId,
            BootOp::ReadSr,
            BootOp::WriteSr,
            BootOp::Erase,
        ];
        ALL.into_iter()
            .find(|op| op.form() == form && op.code() == code)
    }
}

/// Erase granularity and its flash sub-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EraseSize {
    /// 4 KB sector (0x20).
    Sector4K,
    /// 32 KB block (0x52).
    Block32K,
    /// 64 KB block (0xD8).
    Block64K,
}

impl EraseSize {
    /// SPI flash erase command.
    pub const fn command(self) -> u8 {
        match self {
            Self::Sector4K => 0x20,
            Self::Block32K => 0x52,
            Self::Block64K => 0xD8,
        }
    }

    /// Unit size in bytes.
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Sector4K => 0x1000,
            Self::Block32K => 0x8000,
            Self::Block64K => 0x10000,
        }
    }

    /// Decode an erase command byte.
    pub fn from_command(cmd: u8) -> Option<Self> {
        [Self::Sector4K, Self::Block32K, Self::Block64K]
            .into_iter()
            .find(|size| size.command() == cmd)
    }
}

/// A bootloader request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRequest {
    op: BootOp,
    payload: Vec<u8>,
}

impl BootRequest {
    fn new(op: BootOp) -> Self {
        Self {
            op,
            payload: Vec::new(),
        }
    }

    /// Link check.
    pub fn link_check() -> Self {
        Self::new(BootOp::LinkCheck)
    }

    /// Switch to `baud` after `delay_ms`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn set_baud_rate(baud: u32, delay_ms: u8) -> Self {
        let mut req = Self::new(BootOp::SetBaudRate);
        req.payload.write_u32::<LittleEndian>(baud).unwrap();
        req.payload.push(delay_ms);
        req
    }

    /// CRC over `start..=end`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn check_crc(start: u32, end: u32) -> Self {
        let mut req = Self::new(BootOp::CheckCrc);
        req.payload.write_u32::<LittleEndian>(start).unwrap();
        req.payload.write_u32::<LittleEndian>(end).unwrap();
        req
    }

    /// Soft reset.
    pub fn reset() -> Self {
        let mut req = Self::new(BootOp::Reset);
        req.payload.extend_from_slice(&RESET_MAGIC);
        req
    }

    /// Stay in ROM.
    pub fn stay_rom() -> Self {
        let mut req = Self::new(BootOp::StayRom);
        req.payload.push(0x55);
        req
    }

    /// Reboot into the application.
    pub fn reboot() -> Self {
        let mut req = Self::new(BootOp::Reboot);
        req.payload.push(0xA5);
        req
    }

    /// Write `data` at `addr`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn write(addr: u32, data: &[u8]) -> Self {
        let mut req = Self::new(BootOp::Write);
        req.payload.write_u32::<LittleEndian>(addr).unwrap();
        req.payload.extend_from_slice(data);
        req
    }

    /// Write one sector at a sector-aligned `addr`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn write_4k(addr: u32, sector: &[u8]) -> Self {
        let mut req = Self::new(BootOp::Write4K);
        req.payload.write_u32::<LittleEndian>(addr).unwrap();
        req.payload.extend_from_slice(sector);
        req
    }

    /// Read one sector at a sector-aligned `addr`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn read_4k(addr: u32) -> Self {
        let mut req = Self::new(BootOp::Read4K);
        req.payload.write_u32::<LittleEndian>(addr).unwrap();
        req
    }

    /// JEDEC ID read (SPI 0x9F).
    pub fn flash_id() -> Self {
        let mut req = Self::new(BootOp::GetFlashId);
        req.payload.extend_from_slice(&[0x9F, 0x00, 0x00, 0x00]);
        req
    }

    /// Read the status register selected by `cmd`.
    pub fn read_sr(cmd: u8) -> Self {
        let mut req = Self::new(BootOp::ReadSr);
        req.payload.push(cmd);
        req
    }

    /// Write one or two status register bytes with `cmd`.
    pub fn write_sr(cmd: u8, values: &[u8]) -> Self {
        let mut req = Self::new(BootOp::WriteSr);
        req.payload.push(cmd);
        req.payload.extend_from_slice(values);
        req
    }

    /// Erase the unit of `size` at `addr`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn erase(size: EraseSize, addr: u32) -> Self {
        let mut req = Self::new(BootOp::Erase);
        req.payload.push(size.command());
        req.payload.write_u32::<LittleEndian>(addr).unwrap();
        req
    }

    /// Operation.
    pub fn op(&self) -> BootOp {
        self.op
    }

    /// Request payload after the opcode.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Append the encoded request to `out`, returning the bytes written.
    #[allow(clippy::cast_possible_truncation)] // payloads are at most a sector plus an address
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn write_to(&self, out: &mut Vec<u8>) -> usize {
        let start = out.len();
        out.extend_from_slice(&REQUEST_PREFIX);
        let len = 1 + self.payload.len();
        match self.op.form() {
            BootForm::Short => out.push(len as u8),
            BootForm::Long => {
                out.push(LONG_MARKER);
                out.write_u16::<LittleEndian>(len as u16).unwrap();
            },
        }
        out.push(self.op.code());
        out.extend_from_slice(&self.payload);
        out.len() - start
    }

    /// Encode into a fresh buffer.
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.payload.len());
        self.write_to(&mut out);
        out
    }
}

/// Parse one encoded request; used by the simulated chip and by traces.
pub fn parse_request(bytes: &[u8]) -> Option<BootRequest> {
    let rest = bytes.strip_prefix(&REQUEST_PREFIX)?;
    let (&first, rest) = rest.split_first()?;
    let (form, body) = if first == LONG_MARKER {
        if rest.len() < 2 {
            return None;
        }
        let len = usize::from(u16::from_le_bytes([rest[0], rest[1]]));
        (BootForm::Long, rest.get(2..2 + len)?)
    } else {
        (BootForm::Short, rest.get(..usize::from(first))?)
    };
    let (&code, payload) = body.split_first()?;
    Some(BootRequest {
        op: BootOp::from_code(form, code)?,
        payload: payload.to_vec(),
    })
}

/// A decoded bootloader response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPacket {
    /// Envelope.
    pub form: BootForm,
    /// Wire opcode.
    pub op: u8,
    /// Status byte (always 0 for short responses).
    pub status: u8,
    /// Response data after the status.
    pub data: Vec<u8>,
}

impl BootPacket {
    /// Whether this packet answers `op`.
    pub fn answers(&self, op: BootOp) -> bool {
        self.form == op.form() && self.op == op.code()
    }

    /// Encode as the bootloader would send it.
    #[allow(clippy::cast_possible_truncation)] // bounded by MAX_RESPONSE_LEN
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LONG_RESPONSE_HEADER_LEN + 2 + self.data.len());
        out.extend_from_slice(&RESPONSE_HEADER);
        match self.form {
            BootForm::Short => {
                out.push((4 + self.data.len()) as u8);
                out.extend_from_slice(&REQUEST_PREFIX);
                out.push(self.op);
            },
            BootForm::Long => {
                out.push(LONG_MARKER);
                out.extend_from_slice(&REQUEST_PREFIX);
                out.write_u16::<LittleEndian>((2 + self.data.len()) as u16)
                    .unwrap();
                out.push(self.op);
                out.push(self.status);
            },
        }
        out.extend_from_slice(&self.data);
        out
    }
}

/// Deframer for bootloader responses; resynchronizes on `04 0E`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BootDecoder {
    skipped: u64,
}

impl BootDecoder {
    /// Create a decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes dropped while hunting for a response header.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    fn skip(&mut self) -> Step<BootPacket> {
        self.skipped += 1;
        Step::Skip(1)
    }
}

impl Deframe for BootDecoder {
    type Output = BootPacket;

    const MAX_FRAME_LEN: usize = MAX_RESPONSE_LEN;

    fn step(&mut self, window: &[u8]) -> Step<BootPacket> {
        let Some(&first) = window.first() else {
            return Step::NeedMore(SHORT_RESPONSE_HEADER_LEN);
        };
        if first != RESPONSE_HEADER[0] {
            return self.skip();
        }
        if window.len() < SHORT_RESPONSE_HEADER_LEN {
            if window.len() == 2 && window[1] != RESPONSE_HEADER[1] {
                return self.skip();
            }
            return Step::NeedMore(SHORT_RESPONSE_HEADER_LEN - window.len());
        }
        if window[1] != RESPONSE_HEADER[1] {
            return self.skip();
        }

        if window[2] == LONG_MARKER {
            if window.len() < LONG_RESPONSE_HEADER_LEN {
                return Step::NeedMore(LONG_RESPONSE_HEADER_LEN - window.len());
            }
            if window[3..6] != REQUEST_PREFIX {
                return self.skip();
            }
            let len = usize::from(u16::from_le_bytes([window[6], window[7]]));
            let total = LONG_RESPONSE_HEADER_LEN + len;
            if len < 2 || total > MAX_RESPONSE_LEN {
                return self.skip();
            }
            if window.len() < total {
                return Step::NeedMore(total - window.len());
            }
            let body = &window[LONG_RESPONSE_HEADER_LEN..total];
            trace!("boot rsp long op={:#04x} status={:#04x}", body[0], body[1]);
            return Step::Emit {
                item: BootPacket {
                    form: BootForm::Long,
                    op: body[0],
                    status: body[1],
                    data: body[2..].to_vec(),
                },
                consumed: total,
            };
        }

        let len = usize::from(window[2]);
        let total = SHORT_RESPONSE_HEADER_LEN + len;
        if len < 4 {
            return self.skip();
        }
        if window.len() < total {
            return Step::NeedMore(total - window.len());
        }
        if window[3..6] != REQUEST_PREFIX {
            return self.skip();
        }
        trace!("boot rsp short op={:#04x}", window[6]);
        Step::Emit {
            item: BootPacket {
                form: BootForm::Short,
                op: window[6],
                status: 0,
                data: window[7..total].to_vec(),
            },
            consumed: total,
        }
    }
}

/// Outcome of a matched response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Status byte (0 = success).
    pub status: u8,
    /// Operation-specific value (CRC, flash ID, register value).
    pub value: u32,
}

impl Reply {
    const fn ok(value: u32) -> Self {
        Self { status: 0, value }
    }

    /// Whether the bootloader reported success.
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}

fn read_u32(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?))
}

fn matches(packet: &BootPacket, op: BootOp, prefix: &[u8]) -> bool {
    packet.answers(op) && packet.data.starts_with(prefix)
}

/// Link check reply.
pub fn check_link(packet: &BootPacket) -> Option<Reply> {
    (matches(packet, BootOp::LinkCheck, &[0x00]) && packet.data.len() == 1).then(|| Reply::ok(0))
}

/// Stay-in-ROM echo.
pub fn check_stay_rom(packet: &BootPacket) -> Option<Reply> {
    matches(packet, BootOp::StayRom, &[0x55]).then(|| Reply::ok(0))
}

/// Baud-rate echo.
pub fn check_set_baud(packet: &BootPacket, baud: u32, delay_ms: u8) -> Option<Reply> {
    let request = BootRequest::set_baud_rate(baud, delay_ms);
    (matches(packet, BootOp::SetBaudRate, request.payload())).then(|| Reply::ok(baud))
}

/// CRC reply; the value is the device CRC.
pub fn check_crc(packet: &BootPacket) -> Option<Reply> {
    if !packet.answers(BootOp::CheckCrc) {
        return None;
    }
    read_u32(&packet.data).map(Reply::ok)
}

/// Flash ID reply; the value is the 24-bit JEDEC ID.
pub fn check_flash_id(packet: &BootPacket) -> Option<Reply> {
    if !packet.answers(BootOp::GetFlashId) {
        return None;
    }
    let id = read_u32(&packet.data)?;
    Some(Reply {
        status: packet.status,
        value: id & 0x00FF_FFFF,
    })
}

/// Status register read reply; the value is the register byte.
pub fn check_read_sr(packet: &BootPacket, cmd: u8) -> Option<Reply> {
    if !matches(packet, BootOp::ReadSr, &[cmd]) {
        return None;
    }
    let value = *packet.data.get(1)?;
    Some(Reply {
        status: packet.status,
        value: u32::from(value),
    })
}

/// Status register write echo.
pub fn check_write_sr(packet: &BootPacket, cmd: u8, values: &[u8]) -> Option<Reply> {
    let request = BootRequest::write_sr(cmd, values);
    (matches(packet, BootOp::WriteSr, request.payload())).then_some(Reply {
        status: packet.status,
        value: 0,
    })
}

/// Erase echo.
pub fn check_erase(packet: &BootPacket, size: EraseSize, addr: u32) -> Option<Reply> {
    let request = BootRequest::erase(size, addr);
    (matches(packet, BootOp::Erase, request.payload())).then_some(Reply {
        status: packet.status,
        value: addr,
    })
}

/// Write reply for `op` (Write or Write4K). The value is the echoed address,
/// which the caller compares with the one it sent.
pub fn check_write(packet: &BootPacket, op: BootOp) -> Option<Reply> {
    if !packet.answers(op) {
        return None;
    }
    Some(Reply {
        status: packet.status,
        value: read_u32(&packet.data)?,
    })
}

/// Sector read reply: status and the sector bytes when the address matches.
pub fn check_read_sector(packet: &BootPacket, addr: u32) -> Option<(u8, &[u8])> {
    if !matches(packet, BootOp::Read4K, &addr.to_le_bytes()) {
        return None;
    }
    let sector = &packet.data[4..];
    if packet.status == 0 && sector.len() != SECTOR_SIZE {
        return None;
    }
    Some((packet.status, sector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::deframe_all;

    #[test]
    fn test_short_request_layout() {
        let mut out = Vec::new();
        let written = BootRequest::link_check().write_to(&mut out);
        assert_eq!(out, vec![0x01, 0xE0, 0xFC, 0x01, 0x00]);
        assert_eq!(written, 5);

        let data = BootRequest::set_baud_rate(921_600, 20).build();
        assert_eq!(
            data,
            vec![0x01, 0xE0, 0xFC, 0x06, 0x0F, 0x00, 0x10, 0x0E, 0x00, 20]
        );
    }

    #[test]
    fn test_long_request_layout() {
        let data = BootRequest::erase(EraseSize::Block64K, 0x0025_0000).build();
        assert_eq!(
            data,
            vec![0x01, 0xE0, 0xFC, 0xFF, 0x06, 0x00, 0x0F, 0xD8, 0x00, 0x00, 0x25, 0x00]
        );

        let sector = vec![0xA5; SECTOR_SIZE];
        let mut out = vec![0xEE];
        let written = BootRequest::write_4k(0x1000, &sector).write_to(&mut out);
        assert_eq!(written, 3 + 3 + 1 + 4 + SECTOR_SIZE);
        assert_eq!(out.len(), written + 1);
        assert_eq!(&out[5..7], &(1 + 4 + SECTOR_SIZE as u16).to_le_bytes());
    }

    #[test]
    fn test_parse_request_both_forms() {
        for request in [
            BootRequest::reset(),
            BootRequest::check_crc(0x10, 0x1F),
            BootRequest::flash_id(),
            BootRequest::write(0x2000, &[1, 2, 3]),
        ] {
            assert_eq!(parse_request(&request.build()), Some(request));
        }
        assert_eq!(parse_request(&[0x01, 0xE0, 0xFC, 0x05, 0x00]), None);
    }

    #[test]
    fn test_same_code_distinct_by_form() {
        assert_eq!(
            BootOp::from_code(BootForm::Short, 0x0E),
            Some(BootOp::Reboot)
        );
        assert_eq!(
            BootOp::from_code(BootForm::Long, 0x0E),
            Some(BootOp::GetFlashId)
        );
        assert_eq!(
            BootOp::from_code(BootForm::Long, 0x0F),
            Some(BootOp::Erase)
        );
    }

    #[test]
    fn test_decoder_resyncs_and_splits() {
        let link = BootPacket {
            form: BootForm::Short,
            op: 0x00,
            status: 0,
            data: vec![0x00],
        };
        let id = BootPacket {
            form: BootForm::Long,
            op: 0x0E,
            status: 0,
            data: 0x00C8_4014u32.to_le_bytes().to_vec(),
        };
        let mut data = vec![0x04, 0x00, 0x0E, 0x33];
        data.extend(link.encode());
        data.extend(id.encode());

        let mut decoder = BootDecoder::new();
        let (packets, progress) = deframe_all(&mut decoder, &data);
        assert_eq!(packets, vec![link.clone(), id.clone()]);
        assert_eq!(progress.consumed, data.len());
        assert_eq!(decoder.skipped_bytes(), 4);

        assert_eq!(check_link(&link), Some(Reply::ok(0)));
        assert_eq!(check_flash_id(&id).map(|r| r.value), Some(0x00C8_4014));
        assert_eq!(check_link(&id), None);
    }

    #[test]
    fn test_decoder_waits_for_sector() {
        let mut data = 0x3000u32.to_le_bytes().to_vec();
        data.extend(vec![0x5A; SECTOR_SIZE]);
        let packet = BootPacket {
            form: BootForm::Long,
            op: BootOp::Read4K.code(),
            status: 0,
            data,
        };
        let encoded = packet.encode();
        let mut decoder = BootDecoder::new();
        let (packets, progress) = deframe_all(&mut decoder, &encoded[..100]);
        assert!(packets.is_empty());
        assert_eq!(progress.needed, Some(encoded.len() - 100));

        let (packets, _) = deframe_all(&mut decoder, &encoded);
        let (status, sector) = check_read_sector(&packets[0], 0x3000).unwrap();
        assert_eq!(status, 0);
        assert_eq!(sector, &[0x5A; SECTOR_SIZE][..]);
        assert!(check_read_sector(&packets[0], 0x4000).is_none());
    }

    #[test]
    fn test_checkers_compare_prefix() {
        let echo = BootPacket {
            form: BootForm::Long,
            op: BootOp::Erase.code(),
            status: 0,
            data: BootRequest::erase(EraseSize::Sector4K, 0x1000)
                .payload()
                .to_vec(),
        };
        assert!(check_erase(&echo, EraseSize::Sector4K, 0x1000).is_some());
        assert!(check_erase(&echo, EraseSize::Sector4K, 0x2000).is_none());
        assert!(check_erase(&echo, EraseSize::Block32K, 0x1000).is_none());

        let sr = BootPacket {
            form: BootForm::Long,
            op: BootOp::ReadSr.code(),
            status: 0,
            data: vec![0x05, 0x1C],
        };
        assert_eq!(check_read_sr(&sr, 0x05).map(|r| r.value), Some(0x1C));
        assert!(check_read_sr(&sr, 0x35).is_none());

        let baud = BootPacket {
            form: BootForm::Short,
            op: BootOp::SetBaudRate.code(),
            status: 0,
            data: BootRequest::set_baud_rate(921_600, 20)
                .payload()
                .to_vec(),
        };
        assert!(check_set_baud(&baud, 921_600, 20).is_some());
        assert!(check_set_baud(&baud, 115_200, 20).is_none());
    }

    #[test]
    fn test_write_reply_reports_status_and_address() {
        let rejected = BootPacket {
            form: BootForm::Long,
            op: BootOp::Write.code(),
            status: 0x03,
            data: 0x8000u32.to_le_bytes().to_vec(),
        };
        let reply = check_write(&rejected, BootOp::Write).unwrap();
        assert!(!reply.is_ok());
        assert_eq!(reply.value, 0x8000);
        assert!(check_write(&rejected, BootOp::Write4K).is_none());
    }
}
