//! Simulated companion chip for engine tests.
//!
//! [`SimCompanion`] sits behind the [`Uart`] seam and answers bootloader
//! requests synchronously by pushing the encoded responses into the
//! companion's RX sink. Command frames are acked the same way.

use {
    crate::{
        companion::Companion,
        error::Result,
        flash::{lookup, protect::field_mask, table::{RDSR1, RDSR2, WRSR1, WRSR2}},
        hal::{PowerControl, PowerMode, ResetLine, TimerCallback, TimerId, TimerMode, Timers},
        link::{Dispatcher, RxSink},
        ota::OtaConfig,
        port::Uart,
        protocol::{
            Crc32, Frame, FrameCodec, FrameKind,
            boot::{self, BootOp, BootPacket, BootRequest, EraseSize, SECTOR_SIZE},
            deframe_all,
        },
    },
    std::{
        collections::{BTreeMap, HashMap},
        ops::RangeInclusive,
        sync::{
            Arc, Mutex, PoisonError,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    },
};

/// JEDEC ID of the default simulated part (GD25Q80, one status register).
pub(crate) const GD25Q80: u32 = 0xC8_4014;

/// Fire `timer` `times` times while handling occurrences `occurrences` of `op`.
#[derive(Debug, Clone)]
pub(crate) struct FireRule {
    pub op: BootOp,
    pub occurrences: RangeInclusive<usize>,
    pub timer: TimerId,
    pub times: usize,
}

/// Chip state and fault knobs.
#[derive(Debug)]
pub(crate) struct SimState {
    pub flash: BTreeMap<u32, Box<[u8; SECTOR_SIZE]>>,
    pub sr: [u8; 2],
    pub flash_id: u32,
    pub baud: u32,
    pub baud_history: Vec<u32>,
    pub counts: HashMap<BootOp, usize>,
    pub writes: Vec<(BootOp, u32, usize)>,
    pub erases: Vec<(EraseSize, u32)>,
    pub sr_writes: Vec<(u8, Vec<u8>)>,
    pub frames_sent: Vec<Vec<u8>>,
    pub ack_status: u8,
    pub ack_frames: bool,

    pub swallow: HashMap<BootOp, usize>,
    /// Occurrences of an op (1-based) whose response is dropped.
    pub silent: HashMap<BootOp, RangeInclusive<usize>>,
    pub swallow_writes_at: Option<u32>,
    pub reject_writes_at: Option<(u32, u8)>,
    pub flaky_sr_writes: usize,
    pub corrupt_crc: bool,
    pub fire: Vec<FireRule>,

    sink: Option<RxSink>,
    timers: Option<ManualTimers>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            flash: BTreeMap::new(),
            // Block protect field fully set.
            sr: [0x7C, 0x00],
            flash_id: GD25Q80,
            baud: 115_200,
            baud_history: Vec::new(),
            counts: HashMap::new(),
            writes: Vec::new(),
            erases: Vec::new(),
            sr_writes: Vec::new(),
            frames_sent: Vec::new(),
            ack_status: 0,
            ack_frames: true,
            swallow: HashMap::new(),
            silent: HashMap::new(),
            swallow_writes_at: None,
            reject_writes_at: None,
            flaky_sr_writes: 0,
            corrupt_crc: false,
            fire: Vec::new(),
            sink: None,
            timers: None,
        }
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    bytes
        .get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map_or(0, u32::from_le_bytes)
}

fn reply(op: BootOp, status: u8, data: Vec<u8>) -> Option<BootPacket> {
    Some(BootPacket {
        form: op.form(),
        op: op.code(),
        status,
        data,
    })
}

impl SimState {
    pub fn count(&self, op: BootOp) -> usize {
        self.counts.get(&op).copied().unwrap_or(0)
    }

    pub fn sector(&self, addr: u32) -> [u8; SECTOR_SIZE] {
        self.flash
            .get(&(addr & !0xFFF))
            .map_or([0xFF; SECTOR_SIZE], |s| **s)
    }

    pub fn read(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let a = addr + i as u32;
                self.sector(a)[(a & 0xFFF) as usize]
            })
            .collect()
    }

    pub fn protected(&self) -> bool {
        lookup(self.flash_id)
            .is_some_and(|params| u16::from_le_bytes(self.sr) & field_mask(params) != 0)
    }

    fn program(&mut self, addr: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let a = addr + i as u32;
            let sector = self
                .flash
                .entry(a & !0xFFF)
                .or_insert_with(|| Box::new([0xFF; SECTOR_SIZE]));
            // NOR programming only clears bits.
            sector[(a & 0xFFF) as usize] &= byte;
        }
    }

    fn erase(&mut self, size: EraseSize, addr: u32) {
        let start = addr & !(size.bytes() - 1);
        for sector in (start..start + size.bytes()).step_by(SECTOR_SIZE) {
            self.flash.remove(&sector);
        }
    }

    fn crc(&self, start: u32, end: u32) -> u32 {
        let mut crc = Crc32::new();
        let mut addr = u64::from(start);
        while addr <= u64::from(end) {
            let a = addr as u32;
            let offset = (a & 0xFFF) as usize;
            let n = (SECTOR_SIZE - offset).min((u64::from(end) - addr + 1) as usize);
            crc.update(&self.sector(a)[offset..offset + n]);
            addr += n as u64;
        }
        crc.finalize()
    }

    fn handle_request(&mut self, request: &BootRequest) -> (Option<Vec<u8>>, Vec<TimerId>) {
        let op = request.op();
        let n = {
            let count = self.counts.entry(op).or_default();
            *count += 1;
            *count
        };
        let fires = self
            .fire
            .iter()
            .filter(|rule| rule.op == op && rule.occurrences.contains(&n))
            .flat_map(|rule| std::iter::repeat_n(rule.timer, rule.times))
            .collect();

        let packet = self.respond(request);
        let swallowed = match self.swallow.get_mut(&op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            },
            _ => false,
        } || self.silent.get(&op).is_some_and(|range| range.contains(&n));
        let bytes = packet
            .filter(|_| !swallowed)
            .map(|packet| packet.encode());
        (bytes, fires)
    }

    fn respond(&mut self, request: &BootRequest) -> Option<BootPacket> {
        let op = request.op();
        let p = request.payload();
        match op {
            BootOp::LinkCheck => reply(op, 0, vec![0x00]),
            BootOp::SetBaudRate | BootOp::StayRom => reply(op, 0, p.to_vec()),
            BootOp::CheckCrc => {
                let mut crc = self.crc(read_u32(p, 0), read_u32(p, 4));
                if self.corrupt_crc {
                    crc ^= 1;
                }
                reply(op, 0, crc.to_le_bytes().to_vec())
            },
            BootOp::Reset | BootOp::Reboot => None,
            BootOp::GetFlashId => reply(op, 0, self.flash_id.to_le_bytes().to_vec()),
            BootOp::ReadSr => {
                let cmd = p[0];
                let value = match cmd {
                    RDSR1 => self.sr[0],
                    RDSR2 => self.sr[1],
                    _ => 0,
                };
                reply(op, 0, vec![cmd, value])
            },
            BootOp::WriteSr => {
                self.sr_writes.push((p[0], p[1..].to_vec()));
                if self.flaky_sr_writes > 0 {
                    self.flaky_sr_writes -= 1;
                } else {
                    match (p[0], &p[1..]) {
                        (WRSR1, [sr1]) => self.sr[0] = *sr1,
                        (WRSR1, [sr1, sr2]) => self.sr = [*sr1, *sr2],
                        (WRSR2, [sr2]) => self.sr[1] = *sr2,
                        _ => {},
                    }
                }
                reply(op, 0, p.to_vec())
            },
            BootOp::Erase => {
                let size = EraseSize::from_command(p[0])?;
                let addr = read_u32(p, 1);
                self.erases.push((size, addr));
                let status = if self.protected() {
                    1
                } else {
                    self.erase(size, addr);
                    0
                };
                reply(op, status, p.to_vec())
            },
            BootOp::Write | BootOp::Write4K => {
                let addr = read_u32(p, 0);
                let data = &p[4..];
                self.writes.push((op, addr, data.len()));
                if self.swallow_writes_at == Some(addr) {
                    return None;
                }
                let status = match self.reject_writes_at {
                    Some((at, status)) if at == addr => status,
                    _ if self.protected() => 1,
                    _ => {
                        let data = data.to_vec();
                        self.program(addr, &data);
                        0
                    },
                };
                reply(op, status, addr.to_le_bytes().to_vec())
            },
            BootOp::Read4K => {
                let addr = read_u32(p, 0);
                let mut data = addr.to_le_bytes().to_vec();
                data.extend_from_slice(&self.sector(addr));
                reply(op, 0, data)
            },
        }
    }

    fn handle_frame(&mut self, bytes: &[u8]) -> Option<Vec<u8>> {
        self.frames_sent.push(bytes.to_vec());
        if !self.ack_frames {
            return None;
        }
        let (frames, _) = deframe_all(&mut FrameCodec::new(true), bytes);
        let mut out = Vec::new();
        for frame in frames.iter().filter(|f| f.kind == FrameKind::Command) {
            let ack = Frame::new(FrameKind::Ack, frame.opcode, vec![self.ack_status]).ok()?;
            out.extend(ack.encode(true));
        }
        Some(out)
    }
}

/// Handle on a simulated chip; clones share the chip.
#[derive(Debug, Clone, Default)]
pub(crate) struct SimCompanion {
    state: Arc<Mutex<SimState>>,
}

impl SimCompanion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner))
    }

    /// Deliver responses into `sink`.
    pub fn attach(&self, sink: RxSink) {
        self.with_state(|s| s.sink = Some(sink));
    }

    pub fn count(&self, op: BootOp) -> usize {
        self.with_state(|s| s.count(op))
    }

    pub fn timers(&self) -> Option<ManualTimers> {
        self.with_state(|s| s.timers.clone())
    }

    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.with_state(|s| s.frames_sent.clone())
    }

    fn receive(&self, bytes: &[u8]) {
        let (response, fires, sink, timers) = self.with_state(|s| {
            let (response, fires) = match boot::parse_request(bytes) {
                Some(request) => s.handle_request(&request),
                None => (s.handle_frame(bytes), Vec::new()),
            };
            (response, fires, s.sink.clone(), s.timers.clone())
        });
        if let (Some(sink), Some(response)) = (sink, response) {
            sink.on_bytes_received(&response).unwrap();
        }
        if let Some(timers) = timers {
            for id in fires {
                timers.fire(id);
            }
        }
    }
}

impl Uart for SimCompanion {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.receive(bytes);
        Ok(())
    }

    fn send_sync(&mut self, bytes: &[u8], _timeout: Duration) -> Result<()> {
        self.send(bytes)
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.with_state(|s| {
            s.baud = baud_rate;
            s.baud_history.push(baud_rate);
        });
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.with_state(|s| s.baud)
    }
}

/// Timers that only fire when told to.
#[derive(Clone, Default)]
pub(crate) struct ManualTimers {
    running: Arc<Mutex<HashMap<TimerId, (TimerMode, TimerCallback)>>>,
}

impl std::fmt::Debug for ManualTimers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTimers").finish_non_exhaustive()
    }
}

impl ManualTimers {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TimerId, (TimerMode, TimerCallback)>> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fire(&self, id: TimerId) {
        let mut running = self.lock();
        let one_shot = match running.get_mut(&id) {
            Some((mode, callback)) => {
                callback();
                *mode == TimerMode::OneShot
            },
            None => false,
        };
        if one_shot {
            running.remove(&id);
        }
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.lock().contains_key(&id)
    }
}

impl Timers for ManualTimers {
    fn start(
        &mut self,
        id: TimerId,
        _period: Duration,
        mode: TimerMode,
        callback: TimerCallback,
    ) -> Result<()> {
        self.lock().insert(id, (mode, callback));
        Ok(())
    }

    fn stop(&mut self, id: TimerId) {
        self.lock().remove(&id);
    }
}

/// Reset line counting its pulses.
#[derive(Debug, Clone, Default)]
pub(crate) struct CountingReset(pub Arc<AtomicUsize>);

impl ResetLine for CountingReset {
    fn pulse(&mut self) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Power control recording every mode change.
#[derive(Debug, Clone)]
pub(crate) struct RecordingPower {
    mode: PowerMode,
    pub history: Arc<Mutex<Vec<PowerMode>>>,
}

impl RecordingPower {
    pub fn new(mode: PowerMode) -> Self {
        Self {
            mode,
            history: Arc::default(),
        }
    }
}

impl PowerControl for RecordingPower {
    fn mode(&self) -> PowerMode {
        self.mode
    }

    fn set_mode(&mut self, mode: PowerMode) -> Result<()> {
        self.mode = mode;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mode);
        Ok(())
    }
}

/// Short deadlines so failure paths finish quickly.
pub(crate) fn fast_config() -> OtaConfig {
    let mut config = OtaConfig::default()
        .with_response_timeout(Duration::from_millis(30))
        .with_stay_rom_window(Duration::from_millis(60))
        .with_sr_retry_delay(Duration::ZERO);
    config.erase_timeout = Duration::from_millis(30);
    config.crc_timeout = Duration::from_millis(30);
    config
}

/// Companion wired to `sim` with manual timers.
pub(crate) fn companion(sim: SimCompanion, config: OtaConfig) -> Companion<SimCompanion> {
    // RUST_LOG=btbridge=trace shows the session while a test runs.
    let _ = env_logger::builder().is_test(true).try_init();
    let timers = ManualTimers::default();
    sim.with_state(|s| s.timers = Some(timers.clone()));
    let mut companion = Companion::new(sim, Dispatcher::default(), config).with_timers(timers);
    let sink = companion.rx_sink();
    companion.uart_mut().attach(sink);
    companion
}
