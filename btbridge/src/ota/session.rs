//! OTA engine.
//!
//! The engine runs on the caller's thread. Every bootloader transaction
//! arms the transaction slot, sends the request and pumps the bridge until
//! the matching response lands, the deadline passes or a timer signal
//! arrives. Timers never touch the link; they only flag the shared
//! [`SessionStatus`].

use {
    crate::{
        error::{Error, OtaError, WriteFailure},
        flash::{
            EraseOp, FlashParams, ProtectMode, SrWrite, lookup, plan_erase,
            protect::{field_mask, plan_writes, register_byte, target_word},
        },
        hal::{PowerControl, PowerMode, ResetLine, TimerId, TimerMode, Timers},
        image::ImageSource,
        link::{Bridge, LinkMode, TxnSlot},
        ota::{
            FlashStep, OtaConfig, OtaReport, OtaState, ProgressFn, ProtectStep, SessionStatus,
            lock_status,
            watchdog::{Watchdog, WatchdogAction},
        },
        port::Uart,
        protocol::{
            Crc32,
            boot::{self, BootOp, BootPacket, BootRequest, EraseSize, Reply, SECTOR_SIZE},
        },
    },
    log::{debug, info, trace, warn},
    std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::{Duration, Instant},
    },
};

/// Pause between polls while waiting for a response.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Why the current pass stopped.
#[derive(Debug)]
enum Halt {
    Fail(OtaError),
    Restart,
}

impl From<OtaError> for Halt {
    fn from(err: OtaError) -> Self {
        Self::Fail(err)
    }
}

type Flow<T> = std::result::Result<T, Halt>;

/// Why a single transaction produced no response.
#[derive(Debug)]
enum TxnError {
    Timeout,
    ForceFailed,
    Halt(Halt),
}

fn transport(err: &Error) -> Halt {
    Halt::Fail(OtaError::Transport(err.to_string()))
}

/// One OTA session over borrowed companion resources.
pub(crate) struct Session<'a, 'p> {
    pub(crate) uart: &'a mut dyn Uart,
    pub(crate) bridge: &'a mut Bridge,
    pub(crate) reset: &'a mut dyn ResetLine,
    pub(crate) power: &'a mut dyn PowerControl,
    pub(crate) timers: &'a mut dyn Timers,
    pub(crate) config: &'a OtaConfig,
    pub(crate) status: Arc<Mutex<SessionStatus>>,
    pub(crate) cancel: Arc<AtomicBool>,
    pub(crate) slot: Arc<TxnSlot>,
    pub(crate) image: &'a mut dyn ImageSource,
    pub(crate) progress: &'a mut ProgressFn<'p>,
    pub(crate) report: OtaReport,
    /// Part whose protection was lifted and not yet restored.
    pub(crate) unlocked: Option<&'static FlashParams>,
    /// Set while restoring protection; timer signals and cancellation are
    /// ignored, transaction deadlines still apply.
    pub(crate) restoring: bool,
}

impl Session<'_, '_> {
    /// Run the session to completion, cleanup included.
    pub(crate) fn run(mut self, target: u32) -> std::result::Result<OtaReport, OtaError> {
        let saved_power = self.power.mode();
        let saved_baud = self.uart.baud_rate();
        info!(
            "OTA: {} bytes to {target:#010x}",
            self.image.len()
        );

        let outcome = match self.start_timers() {
            Ok(()) => loop {
                match self.attempt(target) {
                    Ok(()) => break Ok(()),
                    Err(Halt::Restart) => {
                        self.report.restarts += 1;
                        info!("OTA: restarting session (restart {})", self.report.restarts);
                    },
                    Err(Halt::Fail(err)) => break Err(err),
                }
            },
            Err(err) => Err(err),
        };

        if outcome.is_err() {
            self.restore_protection();
        }
        self.cleanup(saved_power, saved_baud, outcome.is_err());
        match outcome {
            Ok(()) => {
                info!(
                    "OTA: done, {} bytes in {} packets, crc {:#010x}",
                    self.report.bytes, self.report.packets, self.report.crc
                );
                Ok(self.report)
            },
            Err(err) => {
                warn!("OTA failed ({}): {err}", err.code());
                Err(err)
            },
        }
    }

    fn attempt(&mut self, target: u32) -> Flow<()> {
        self.report.bytes = 0;
        self.report.packets = 0;

        self.enter(OtaState::Start);
        if let Err(e) = self.power.set_mode(PowerMode::Active) {
            warn!("could not keep the system awake: {e}");
        }
        self.bridge.set_mode(LinkMode::Bootloader);
        self.uart
            .set_baud_rate(self.config.rom_baud)
            .map_err(|e| transport(&e))?;

        self.enter(OtaState::Reset);
        self.send_only(&BootRequest::reset())?;
        self.reset.pulse().map_err(|e| transport(&e))?;

        self.enter(OtaState::StayRom);
        self.stay_rom()?;

        if let Some(baud) = self
            .config
            .transfer_baud
            .filter(|baud| *baud != self.config.rom_baud)
        {
            self.enter(OtaState::SetBaudRate);
            self.switch_baud(baud)?;
        }

        self.enter(OtaState::LinkCheck);
        self.link_check()?;

        self.enter(OtaState::GetFlashId);
        let params = self.identify_flash()?;
        let size = self.image.len();
        if size > params.capacity {
            return Err(OtaError::ImageTooLarge {
                size,
                capacity: params.capacity,
            }
            .into());
        }

        self.enter(OtaState::ProtectFlash(ProtectMode::Unprotect));
        // Any status write may land before a failure.
        self.unlocked = Some(params);
        self.protect(params, ProtectMode::Unprotect)?;

        self.program(params, target)
    }

    fn program(&mut self, params: &FlashParams, target: u32) -> Flow<()> {
        let size = self.image.len();

        self.enter(OtaState::EraseFlash);
        self.erase_range(target, size)?;

        self.enter(OtaState::WriteFlash);
        let local = self.write_image(target)?;

        self.enter(OtaState::WriteChipKeyword);
        self.write_keyword()?;

        self.enter(OtaState::ReadCrc);
        let device = self.read_crc(target, size)?;

        if device != local {
            warn!("CRC mismatch: local {local:#010x}, device {device:#010x}");
            return Err(OtaError::CrcMismatch { local, device }.into());
        }

        self.enter(OtaState::ProtectFlash(ProtectMode::Reprotect));
        self.protect(params, ProtectMode::Reprotect)?;
        self.unlocked = None;
        self.report.crc = device;

        self.enter(OtaState::Reboot);
        self.send_only(&BootRequest::reboot())
    }

    /// Put write protection back after a failed session left the array
    /// open, reconnecting to the bootloader if it stopped answering.
    fn restore_protection(&mut self) {
        let Some(params) = self.unlocked else {
            return;
        };
        self.timers.stop(TimerId::SessionCeiling);
        self.timers.stop(TimerId::Daemon);
        {
            let mut status = lock_status(&self.status);
            status.abort = None;
            status.restart = false;
            status.force_fail = false;
        }
        self.restoring = true;
        self.enter(OtaState::ProtectFlash(ProtectMode::Reprotect));
        warn!("OTA: restoring flash protection");

        let restored = self.protect(params, ProtectMode::Reprotect).or_else(|_| {
            debug!("bootloader not answering, reconnecting");
            self.reconnect()?;
            self.protect(params, ProtectMode::Reprotect)
        });
        match restored {
            Ok(()) => {
                self.unlocked = None;
                info!("OTA: flash protection restored");
            },
            Err(halt) => warn!("could not restore flash protection: {halt:?}"),
        }
        self.restoring = false;
    }

    /// Reset into the bootloader again at the ROM baud rate.
    fn reconnect(&mut self) -> Flow<()> {
        self.uart
            .set_baud_rate(self.config.rom_baud)
            .map_err(|e| transport(&e))?;
        self.send_only(&BootRequest::reset())?;
        self.reset.pulse().map_err(|e| transport(&e))?;
        self.stay_rom()?;
        self.link_check()
    }

    fn cleanup(&mut self, saved_power: PowerMode, saved_baud: u32, failed: bool) {
        self.enter(OtaState::Cleanup);
        self.timers.stop(TimerId::SessionCeiling);
        self.timers.stop(TimerId::Daemon);
        self.slot.clear();

        if let Err(e) = self.uart.set_baud_rate(saved_baud) {
            warn!("could not restore baud rate {saved_baud}: {e}");
        }
        self.bridge.set_mode(LinkMode::Frames);
        if failed {
            if let Err(e) = self.reset.pulse() {
                warn!("could not reset companion: {e}");
            }
        }
        if let Err(e) = self.power.set_mode(saved_power) {
            warn!("could not restore power mode: {e}");
        }

        *lock_status(&self.status) = SessionStatus::default();
        let total = self.image.len() as usize;
        (self.progress)(OtaState::Idle, self.report.bytes as usize, total);
    }

    fn start_timers(&mut self) -> std::result::Result<(), OtaError> {
        let status = Arc::clone(&self.status);
        self.timers
            .start(
                TimerId::SessionCeiling,
                self.config.session_timeout,
                TimerMode::OneShot,
                Box::new(move || {
                    warn!("OTA session ceiling reached");
                    lock_status(&status)
                        .abort
                        .get_or_insert(OtaError::SessionTimeout);
                }),
            )
            .map_err(|e| OtaError::Transport(e.to_string()))?;

        let status = Arc::clone(&self.status);
        let mut watchdog = Watchdog::new(self.config.max_restarts);
        self.timers
            .start(
                TimerId::Daemon,
                self.config.daemon_interval,
                TimerMode::Repeating,
                Box::new(move || {
                    let mut status = lock_status(&status);
                    match watchdog.tick(status.snapshot()) {
                        WatchdogAction::None => {},
                        WatchdogAction::ForceFailWrite => status.force_fail = true,
                        WatchdogAction::Restart => status.restart = true,
                        WatchdogAction::Abort => {
                            status.abort.get_or_insert(OtaError::Stalled);
                        },
                    }
                }),
            )
            .map_err(|e| OtaError::Transport(e.to_string()))
    }

    // ---- status helpers ----

    fn enter(&mut self, state: OtaState) {
        {
            let mut status = lock_status(&self.status);
            if status.state == state {
                return;
            }
            debug!("OTA state {:?} -> {state:?}", status.state);
            status.state = state;
            status.protect_step = ProtectStep::Idle;
            status.flash_step = FlashStep::Idle;
            status.write_addr = None;
        }
        let total = self.image.len() as usize;
        (self.progress)(state, self.report.bytes as usize, total);
    }

    fn set_protect_step(&self, step: ProtectStep) {
        trace!("protect step {step:?}");
        lock_status(&self.status).protect_step = step;
    }

    fn set_flash_step(&self, step: FlashStep) {
        lock_status(&self.status).flash_step = step;
    }

    // ---- transactions ----

    fn send_only(&mut self, request: &BootRequest) -> Flow<()> {
        trace!("send {:?}", request.op());
        self.uart
            .send(&request.build())
            .map_err(|e| transport(&e))
    }

    fn submit(&mut self, request: &BootRequest) -> std::result::Result<(), TxnError> {
        if let Some(signal) = self.take_signal(false) {
            return Err(signal);
        }
        self.slot.arm(request.op());
        trace!("request {:?}", request.op());
        self.uart
            .send(&request.build())
            .map_err(|e| TxnError::Halt(transport(&e)))
    }

    fn await_response(
        &mut self,
        op: BootOp,
        timeout: Duration,
    ) -> std::result::Result<BootPacket, TxnError> {
        let is_write = matches!(op, BootOp::Write | BootOp::Write4K);
        let deadline = Instant::now() + timeout;
        loop {
            // Timer signals win over a response that raced them.
            if let Some(signal) = self.take_signal(is_write) {
                self.slot.clear();
                return Err(signal);
            }
            self.bridge.poll();
            if let Some(packet) = self.slot.take() {
                lock_status(&self.status).progress += 1;
                return Ok(packet);
            }
            if Instant::now() >= deadline {
                self.slot.clear();
                debug!("{op:?}: no response within {timeout:?}");
                return Err(TxnError::Timeout);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn transact(
        &mut self,
        request: &BootRequest,
        timeout: Duration,
    ) -> std::result::Result<BootPacket, TxnError> {
        self.submit(request)?;
        self.await_response(request.op(), timeout)
    }

    fn take_signal(&self, is_write: bool) -> Option<TxnError> {
        if self.restoring {
            return None;
        }
        if crate::is_interrupted_requested() || self.cancel.load(Ordering::Relaxed) {
            return Some(TxnError::Halt(Halt::Fail(OtaError::Cancelled)));
        }
        let mut status = lock_status(&self.status);
        if let Some(err) = status.abort.take() {
            return Some(TxnError::Halt(Halt::Fail(err)));
        }
        if std::mem::take(&mut status.restart) {
            return Some(TxnError::Halt(Halt::Restart));
        }
        if is_write && std::mem::take(&mut status.force_fail) {
            return Some(TxnError::ForceFailed);
        }
        None
    }

    /// Transact and run `check` on the response. `None` covers timeouts and
    /// responses that do not match.
    fn expect<T>(
        &mut self,
        request: &BootRequest,
        timeout: Duration,
        check: impl FnOnce(&BootPacket) -> Option<T>,
    ) -> Flow<Option<T>> {
        match self.transact(request, timeout) {
            Ok(packet) => {
                let reply = check(&packet);
                if reply.is_none() {
                    debug!("{:?}: unexpected response {packet:02X?}", request.op());
                }
                Ok(reply)
            },
            Err(TxnError::Timeout | TxnError::ForceFailed) => Ok(None),
            Err(TxnError::Halt(halt)) => Err(halt),
        }
    }

    // ---- handshake ----

    fn stay_rom(&mut self) -> Flow<()> {
        let deadline = Instant::now() + self.config.stay_rom_window;
        let interval = self.config.stay_rom_interval;
        let mut tries = 0u32;
        loop {
            tries += 1;
            if self
                .expect(&BootRequest::stay_rom(), interval, boot::check_stay_rom)?
                .is_some()
            {
                debug!("bootloader held after {tries} requests");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(OtaError::LinkFailed.into());
            }
        }
    }

    fn switch_baud(&mut self, baud: u32) -> Flow<()> {
        let delay = self.config.baud_switch_delay_ms;
        let request = BootRequest::set_baud_rate(baud, delay);
        let sent = self.submit(&request).and_then(|()| {
            self.uart
                .set_baud_rate(baud)
                .map_err(|e| TxnError::Halt(transport(&e)))?;
            self.await_response(BootOp::SetBaudRate, self.config.response_timeout)
        });
        match sent {
            Ok(packet) if boot::check_set_baud(&packet, baud, delay).is_some() => {
                info!("OTA: link at {baud} baud");
                Ok(())
            },
            Err(TxnError::Halt(halt)) => Err(halt),
            _ => Err(OtaError::BaudRateFailed(baud).into()),
        }
    }

    fn link_check(&mut self) -> Flow<()> {
        let attempts = self.config.link_attempts.max(1);
        for attempt in 1..=attempts {
            if self
                .expect(
                    &BootRequest::link_check(),
                    self.config.response_timeout,
                    boot::check_link,
                )?
                .is_some()
            {
                return Ok(());
            }
            warn!("link check {attempt}/{attempts} failed");
        }
        Err(OtaError::LinkFailed.into())
    }

    fn identify_flash(&mut self) -> Flow<&'static FlashParams> {
        let reply = self
            .expect(
                &BootRequest::flash_id(),
                self.config.response_timeout,
                boot::check_flash_id,
            )?
            .filter(Reply::is_ok)
            .ok_or(OtaError::FlashIdFailed)?;
        let params = lookup(reply.value).ok_or(OtaError::UnknownFlash(reply.value))?;
        info!("OTA: flash {} ({:#08x})", params.name, params.id);
        self.report.flash_name = params.name;
        self.report.flash_id = params.id;
        Ok(params)
    }

    // ---- protection ----

    fn read_sr(&mut self, cmd: u8) -> Flow<Option<u8>> {
        let reply = self.expect(
            &BootRequest::read_sr(cmd),
            self.config.response_timeout,
            |packet| boot::check_read_sr(packet, cmd),
        )?;
        Ok(reply
            .filter(Reply::is_ok)
            .and_then(|r| u8::try_from(r.value).ok()))
    }

    fn protect(&mut self, params: &FlashParams, mode: ProtectMode) -> Flow<()> {
        let failed = || Halt::Fail(OtaError::ProtectFailed { lock: mode.locks() });

        self.set_protect_step(ProtectStep::ReadSr1);
        let sr1 = self.read_sr(params.read_cmds[0])?.ok_or_else(failed)?;
        let sr2 = if params.sr_count > 1 {
            self.set_protect_step(ProtectStep::ReadSr2);
            self.read_sr(params.read_cmds[1])?.ok_or_else(failed)?
        } else {
            0
        };

        self.set_protect_step(ProtectStep::ComputeTarget);
        let current = u16::from_le_bytes([sr1, sr2]);
        let target = target_word(params, current, mode);
        let mask = field_mask(params);
        if current & mask == target & mask {
            debug!("{mode:?}: status registers already at {current:#06x}");
            self.set_protect_step(ProtectStep::Done);
            return Ok(());
        }
        debug!("{mode:?}: status {current:#06x} -> {target:#06x}");

        for write in plan_writes(params, target) {
            self.write_sr(params, &write, target, mode)?;
        }
        self.set_protect_step(ProtectStep::Done);
        Ok(())
    }

    fn write_sr(
        &mut self,
        params: &FlashParams,
        write: &SrWrite,
        target: u16,
        mode: ProtectMode,
    ) -> Flow<()> {
        let step = if write.registers.first() == Some(&1) {
            ProtectStep::WriteSr2
        } else {
            ProtectStep::WriteSr1
        };
        let attempts = if params.verify_write {
            self.config.sr_attempts.max(1)
        } else {
            1
        };

        for attempt in 1..=attempts {
            self.set_protect_step(step);
            let echoed = self
                .expect(
                    &BootRequest::write_sr(write.cmd, &write.values),
                    self.config.response_timeout,
                    |packet| boot::check_write_sr(packet, write.cmd, &write.values),
                )?
                .is_some_and(|reply| reply.is_ok());

            if echoed && !params.verify_write {
                return Ok(());
            }
            if echoed {
                thread::sleep(self.config.sr_retry_delay);
                if self.verify_registers(params, write, target)? {
                    return Ok(());
                }
            }
            warn!(
                "status register write {attempt}/{attempts} (cmd {:#04x}) did not take effect",
                write.cmd
            );
        }
        Err(OtaError::ProtectFailed { lock: mode.locks() }.into())
    }

    fn verify_registers(
        &mut self,
        params: &FlashParams,
        write: &SrWrite,
        target: u16,
    ) -> Flow<bool> {
        let mask = field_mask(params);
        for &index in &write.registers {
            self.set_protect_step(if index == 0 {
                ProtectStep::VerifySr1
            } else {
                ProtectStep::VerifySr2
            });
            let Some(value) = self.read_sr(params.read_cmds[index])? else {
                return Ok(false);
            };
            let bits = register_byte(mask, index);
            if value & bits != register_byte(target, index) & bits {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ---- erase ----

    fn erase_range(&mut self, start: u32, len: u32) -> Flow<()> {
        let plan = plan_erase(start, len);
        debug!("erase plan: {} steps", plan.len());
        for op in plan {
            match op {
                EraseOp::Unit { size, addr } => self.erase_unit(size, addr)?,
                EraseOp::Partial { sector, from, to } => self.erase_partial(sector, from, to)?,
            }
        }
        self.set_flash_step(FlashStep::Done);
        Ok(())
    }

    fn erase_unit(&mut self, size: EraseSize, addr: u32) -> Flow<()> {
        self.set_flash_step(match size {
            EraseSize::Sector4K => FlashStep::Erase4K,
            EraseSize::Block32K => FlashStep::Erase32K,
            EraseSize::Block64K => FlashStep::Erase64K,
        });
        trace!("erase {size:?} at {addr:#010x}");
        let reply = self.expect(
            &BootRequest::erase(size, addr),
            self.config.erase_timeout,
            |packet| boot::check_erase(packet, size, addr),
        )?;
        match reply {
            Some(reply) if reply.is_ok() => Ok(()),
            _ => Err(OtaError::EraseFailed { addr }.into()),
        }
    }

    fn erase_partial(&mut self, sector: u32, from: u32, to: u32) -> Flow<()> {
        trace!("read-modify-write {sector:#010x} [{from:#x}..{to:#x})");
        self.set_flash_step(FlashStep::ReadBack);
        let mut data = self
            .expect(
                &BootRequest::read_4k(sector),
                self.config.response_timeout,
                |packet| {
                    boot::check_read_sector(packet, sector)
                        .filter(|(status, _)| *status == 0)
                        .map(|(_, bytes)| bytes.to_vec())
                },
            )?
            .ok_or(OtaError::EraseFailed { addr: sector })?;

        self.erase_unit(EraseSize::Sector4K, sector)?;
        data[from as usize..to as usize].fill(0xFF);
        self.write_packet(sector, &data).map_err(|halt| match halt {
            Halt::Fail(OtaError::WriteFailed { .. }) => {
                Halt::Fail(OtaError::EraseFailed { addr: sector })
            },
            other => other,
        })
    }

    // ---- write ----

    fn write_image(&mut self, target: u32) -> Flow<u32> {
        let total = self.image.len();
        let packet = self.config.packet_size();
        let mut buf = vec![0u8; packet];
        let mut crc = Crc32::new();
        let mut offset = 0u32;

        while offset < total {
            let n = packet.min((total - offset) as usize);
            let chunk = &mut buf[..n];
            self.image
                .read_at(offset, chunk)
                .map_err(|e| transport(&e))?;
            // Accumulated once per packet, whatever the retries do.
            crc.update(chunk);
            self.write_packet(target + offset, chunk)?;

            #[allow(clippy::cast_possible_truncation)] // n <= packet size
            let n = n as u32;
            offset += n;
            self.report.bytes += n;
            self.report.packets += 1;
            (self.progress)(OtaState::WriteFlash, offset as usize, total as usize);
        }
        self.set_flash_step(FlashStep::Done);
        Ok(crc.finalize())
    }

    fn write_packet(&mut self, addr: u32, data: &[u8]) -> Flow<()> {
        let attempts = self.config.write_retries.max(1);
        let mut reason = WriteFailure::Timeout;
        for attempt in 1..=attempts {
            match self.write_attempt(addr, data)? {
                Ok(()) => return Ok(()),
                Err(failure) => {
                    warn!("write at {addr:#010x} attempt {attempt}/{attempts}: {failure}");
                    if attempt < attempts {
                        self.report.write_retries += 1;
                    }
                    reason = failure;
                },
            }
        }
        Err(OtaError::WriteFailed { addr, reason }.into())
    }

    fn write_attempt(
        &mut self,
        addr: u32,
        data: &[u8],
    ) -> Flow<std::result::Result<(), WriteFailure>> {
        let sector_write = addr as usize % SECTOR_SIZE == 0 && data.len() == SECTOR_SIZE;
        let (op, request) = if sector_write {
            (BootOp::Write4K, BootRequest::write_4k(addr, data))
        } else {
            (BootOp::Write, BootRequest::write(addr, data))
        };
        {
            let mut status = lock_status(&self.status);
            status.flash_step = FlashStep::WriteSector;
            status.write_addr = Some(addr);
            status.force_fail = false;
        }

        match self.transact(&request, self.config.response_timeout) {
            Ok(packet) => Ok(match boot::check_write(&packet, op) {
                Some(reply) if !reply.is_ok() => Err(WriteFailure::Rejected(reply.status)),
                Some(reply) if reply.value == addr => Ok(()),
                _ => Err(WriteFailure::AddressMismatch),
            }),
            Err(TxnError::Timeout) => Ok(Err(WriteFailure::Timeout)),
            Err(TxnError::ForceFailed) => Ok(Err(WriteFailure::ForceFailed)),
            Err(TxnError::Halt(halt)) => Err(halt),
        }
    }

    fn write_keyword(&mut self) -> Flow<()> {
        let config = self.config;
        if config.keyword.is_empty() {
            return Ok(());
        }
        let len = u32::try_from(config.keyword.len()).map_err(|_| OtaError::KeywordFailed)?;
        // NOR programming only clears bits.
        self.erase_range(config.keyword_address, len)?;

        let attempts = config.write_retries.max(1);
        for attempt in 1..=attempts {
            match self.write_attempt(config.keyword_address, &config.keyword)? {
                Ok(()) => {
                    debug!("keyword written at {:#010x}", config.keyword_address);
                    return Ok(());
                },
                Err(failure) => warn!("keyword write {attempt}/{attempts}: {failure}"),
            }
        }
        Err(OtaError::KeywordFailed.into())
    }

    // ---- verify ----

    fn read_crc(&mut self, start: u32, len: u32) -> Flow<u32> {
        let end = start
            .checked_add(len - 1)
            .ok_or(OtaError::CrcReadFailed)?;
        let reply = self
            .expect(
                &BootRequest::check_crc(start, end),
                self.config.crc_timeout,
                boot::check_crc,
            )?
            .ok_or(OtaError::CrcReadFailed)?;
        debug!("device CRC over {start:#010x}..={end:#010x}: {:#010x}", reply.value);
        Ok(reply.value)
    }
}
