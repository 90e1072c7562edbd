//! Collaborators the bridge consumes besides the UART: a reset line, power
//! mode control and a timer service.
//!
//! Embedded targets implement these over their HAL; the host build ships
//! thread-backed timers and a power stub.

use {
    crate::error::Result,
    log::trace,
    std::{
        collections::HashMap,
        sync::mpsc::{self, RecvTimeoutError, Sender},
        thread,
        time::Duration,
    },
};

/// Hardware reset of the companion chip.
pub trait ResetLine: Send {
    /// Pulse the reset line and wait for the chip to come back.
    fn pulse(&mut self) -> Result<()>;
}

/// System power mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PowerMode {
    /// Full speed, no sleep.
    #[default]
    Active,
    /// Clocks reduced between events.
    LowPower,
    /// Deep sleep allowed.
    Sleep,
}

/// Power mode control. OTA keeps the system awake and restores the
/// previous mode afterwards.
pub trait PowerControl: Send {
    /// Current mode.
    fn mode(&self) -> PowerMode;

    /// Switch mode.
    fn set_mode(&mut self, mode: PowerMode) -> Result<()>;
}

/// Timer identities used by the OTA engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// One-shot ceiling for a whole session.
    SessionCeiling,
    /// Repeating progress watchdog.
    Daemon,
}

/// Fire once or periodically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Fire once after the period.
    OneShot,
    /// Fire every period until stopped.
    Repeating,
}

/// Timer callback. Runs outside the engine's thread.
pub type TimerCallback = Box<dyn FnMut() + Send>;

/// Timer service.
pub trait Timers: Send {
    /// Start (or restart) timer `id`.
    fn start(
        &mut self,
        id: TimerId,
        period: Duration,
        mode: TimerMode,
        callback: TimerCallback,
    ) -> Result<()>;

    /// Stop timer `id`; a no-op when it is not running.
    fn stop(&mut self, id: TimerId);
}

/// Timers backed by one thread each.
#[derive(Debug, Default)]
pub struct ThreadTimers {
    running: HashMap<TimerId, Sender<()>>,
}

impl ThreadTimers {
    /// Create an empty timer service.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Timers for ThreadTimers {
    fn start(
        &mut self,
        id: TimerId,
        period: Duration,
        mode: TimerMode,
        mut callback: TimerCallback,
    ) -> Result<()> {
        self.stop(id);
        let (tx, rx) = mpsc::channel::<()>();
        thread::Builder::new()
            .name(format!("btbridge-timer-{id:?}"))
            .spawn(move || {
                loop {
                    match rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {
                            trace!("timer {id:?} fired");
                            callback();
                            if mode == TimerMode::OneShot {
                                break;
                            }
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        self.running.insert(id, tx);
        Ok(())
    }

    fn stop(&mut self, id: TimerId) {
        // Dropping the sender wakes the thread with `Disconnected`.
        self.running.remove(&id);
    }
}

/// Power control for hosts with no power management.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPower {
    mode: PowerMode,
}

impl PowerControl for StaticPower {
    fn mode(&self) -> PowerMode {
        self.mode
    }

    fn set_mode(&mut self, mode: PowerMode) -> Result<()> {
        self.mode = mode;
        Ok(())
    }
}

/// Reset line for links without one; the chip must be reset by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReset;

impl ResetLine for NoReset {
    fn pulse(&mut self) -> Result<()> {
        trace!("no reset line wired");
        Ok(())
    }
}
