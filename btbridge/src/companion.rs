//! Host-side handle on the companion chip.
//!
//! [`Companion`] owns the UART send side, the receive bridge and the
//! collaborators an OTA session needs. Received bytes go in through
//! [`Companion::on_bytes_received`] (or an [`RxSink`] handed to an RX
//! thread); [`Companion::poll`] decodes and dispatches them.

use {
    crate::{
        error::{Error, Result},
        hal::{NoReset, PowerControl, ResetLine, StaticPower, ThreadTimers, Timers},
        image::ImageSource,
        link::{Bridge, Dispatcher, LinkMode, PollSummary, RxSink},
        ota::{
            OtaConfig, OtaReport, OtaState, ProgressFn, SessionStatus, lock_status,
            session::Session,
        },
        port::Uart,
        protocol::Frame,
    },
    log::{debug, trace},
    std::{
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::{Duration, Instant},
    },
};

/// The companion chip as seen from the host.
pub struct Companion<U: Uart> {
    uart: U,
    bridge: Bridge,
    reset: Box<dyn ResetLine>,
    power: Box<dyn PowerControl>,
    timers: Box<dyn Timers>,
    config: OtaConfig,
    status: Arc<Mutex<SessionStatus>>,
    cancel: Arc<AtomicBool>,
}

impl<U: Uart> std::fmt::Debug for Companion<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Companion")
            .field("bridge", &self.bridge)
            .field("config", &self.config)
            .field("state", &self.ota_state())
            .finish_non_exhaustive()
    }
}

impl<U: Uart> Companion<U> {
    /// Create a handle with no reset line, static power and thread timers.
    pub fn new(uart: U, dispatcher: Dispatcher, config: OtaConfig) -> Self {
        let bridge = Bridge::new(config.ring_capacity, config.checksum, dispatcher);
        Self {
            uart,
            bridge,
            reset: Box::new(NoReset),
            power: Box::new(StaticPower::default()),
            timers: Box::new(ThreadTimers::new()),
            config,
            status: Arc::new(Mutex::new(SessionStatus::default())),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use `reset` to pulse the companion's reset pin.
    #[must_use]
    pub fn with_reset_line(mut self, reset: impl ResetLine + 'static) -> Self {
        self.reset = Box::new(reset);
        self
    }

    /// Use `power` for power mode control.
    #[must_use]
    pub fn with_power(mut self, power: impl PowerControl + 'static) -> Self {
        self.power = Box::new(power);
        self
    }

    /// Use `timers` for the session ceiling and watchdog.
    #[must_use]
    pub fn with_timers(mut self, timers: impl Timers + 'static) -> Self {
        self.timers = Box::new(timers);
        self
    }

    /// Producer handle for an RX thread or interrupt.
    pub fn rx_sink(&self) -> RxSink {
        self.bridge.rx_sink()
    }

    /// Push received bytes into the ring buffer.
    pub fn on_bytes_received(&self, bytes: &[u8]) -> Result<()> {
        self.bridge.rx_sink().on_bytes_received(bytes)
    }

    /// Decode and dispatch everything received so far.
    pub fn poll(&mut self) -> PollSummary {
        self.bridge.poll()
    }

    /// The UART.
    pub fn uart(&self) -> &U {
        &self.uart
    }

    /// The UART, mutably.
    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    /// Session configuration.
    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    /// Receive bridge.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Macro state of the running OTA session, `Idle` when none.
    pub fn ota_state(&self) -> OtaState {
        lock_status(&self.status).state
    }

    /// Flag that stops a running session at its next transaction.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.ota_state() == OtaState::Idle && self.bridge.mode() == LinkMode::Frames {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    /// Send a command frame.
    pub fn send_command(&mut self, opcode: u8, payload: &[u8]) -> Result<()> {
        self.ensure_idle()?;
        let frame = Frame::command(opcode, payload)?;
        trace!("command {opcode:#04x} ({} bytes)", payload.len());
        self.uart.send(&frame.encode(self.config.checksum))
    }

    /// Send a command frame and wait for its ack status.
    pub fn send_command_wait_ack(
        &mut self,
        opcode: u8,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<u8> {
        self.ensure_idle()?;
        let frame = Frame::command(opcode, payload)?;
        let board = self.bridge.dispatcher().ack_board();
        board.arm(opcode);
        self.uart
            .send_sync(&frame.encode(self.config.checksum), timeout)?;

        let deadline = Instant::now() + timeout;
        loop {
            self.bridge.poll();
            if let Some(status) = board.take(opcode) {
                debug!("command {opcode:#04x} acked with {status:#04x}");
                return Ok(status);
            }
            if crate::is_interrupted_requested() {
                return Err(Error::Timeout(format!("command {opcode:#04x} interrupted")));
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "no ack for command {opcode:#04x} within {timeout:?}"
                )));
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Flash `image` at `flash_address` through the ROM bootloader.
    pub fn begin_ota(
        &mut self,
        flash_address: u32,
        image: &mut dyn ImageSource,
    ) -> Result<OtaReport> {
        let mut ignore = |_: OtaState, _: usize, _: usize| {};
        self.begin_ota_with_progress(flash_address, image, &mut ignore)
    }

    /// [`begin_ota`](Self::begin_ota) with a progress callback receiving
    /// the state, bytes written and image size.
    pub fn begin_ota_with_progress(
        &mut self,
        flash_address: u32,
        image: &mut dyn ImageSource,
        progress: &mut ProgressFn<'_>,
    ) -> Result<OtaReport> {
        self.ensure_idle()?;
        if image.is_empty() {
            return Err(Error::Config("image is empty".to_string()));
        }
        if u64::from(flash_address) + u64::from(image.len()) > 1 << 32 {
            return Err(Error::Config(format!(
                "image of {} bytes at {flash_address:#010x} runs past the address space",
                image.len()
            )));
        }
        self.check_keyword_clear(flash_address, image.len())?;
        self.cancel.store(false, Ordering::Relaxed);

        let slot = self.bridge.txn_slot();
        let session = Session {
            uart: &mut self.uart,
            bridge: &mut self.bridge,
            reset: self.reset.as_mut(),
            power: self.power.as_mut(),
            timers: self.timers.as_mut(),
            config: &self.config,
            status: Arc::clone(&self.status),
            cancel: Arc::clone(&self.cancel),
            slot,
            image,
            progress,
            report: OtaReport::default(),
            unlocked: None,
            restoring: false,
        };
        Ok(session.run(flash_address)?)
    }

    /// The keyword is written after the image CRC is taken, so the two
    /// must not share bytes.
    fn check_keyword_clear(&self, flash_address: u32, len: u32) -> Result<()> {
        if self.config.keyword.is_empty() {
            return Ok(());
        }
        let keyword = u64::from(self.config.keyword_address);
        let keyword_end = keyword + self.config.keyword.len() as u64;
        if keyword_end > 1 << 32 {
            return Err(Error::Config(format!(
                "keyword at {keyword:#010x} runs past the address space"
            )));
        }
        let start = u64::from(flash_address);
        let end = start + u64::from(len);
        if start < keyword_end && keyword < end {
            return Err(Error::Config(format!(
                "image at {start:#010x}..{end:#010x} overlaps the chip keyword at {keyword:#010x}"
            )));
        }
        Ok(())
    }
}
