//! Progress watchdog run from the repeating daemon timer.
//!
//! Decisions are a pure function of the previous and current status
//! snapshots, so the policy is tested without timers or threads.

use {
    crate::ota::{FlashStep, OtaState, StatusSnapshot},
    log::warn,
};

/// What the daemon timer should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Session is moving.
    None,
    /// The write in flight did not advance; fail it so it gets retried.
    ForceFailWrite,
    /// Nothing moved since the last tick; start over.
    Restart,
    /// Nothing moved and no restarts are left.
    Abort,
}

/// Stall detector.
#[derive(Debug, Clone)]
pub struct Watchdog {
    last: Option<StatusSnapshot>,
    restarts_left: u32,
}

impl Watchdog {
    /// Allow up to `max_restarts` whole-procedure restarts.
    pub fn new(max_restarts: u32) -> Self {
        Self {
            last: None,
            restarts_left: max_restarts,
        }
    }

    /// Restarts still available.
    pub fn restarts_left(&self) -> u32 {
        self.restarts_left
    }

    /// Judge `now` against the previous tick.
    pub fn tick(&mut self, now: StatusSnapshot) -> WatchdogAction {
        let Some(prev) = self.last.replace(now) else {
            return WatchdogAction::None;
        };
        if now.state == OtaState::Idle {
            return WatchdogAction::None;
        }

        if now.flash_step == FlashStep::WriteSector
            && prev.flash_step == FlashStep::WriteSector
            && now.write_addr.is_some()
            && now.write_addr == prev.write_addr
        {
            warn!("watchdog: write at {:#010x} stuck", now.write_addr.unwrap_or_default());
            return WatchdogAction::ForceFailWrite;
        }

        if now.state == prev.state && now.progress == prev.progress {
            if self.restarts_left == 0 {
                warn!("watchdog: stalled in {:?}, no restarts left", now.state);
                return WatchdogAction::Abort;
            }
            self.restarts_left -= 1;
            self.last = None;
            warn!(
                "watchdog: stalled in {:?}, restarting ({} left)",
                now.state, self.restarts_left
            );
            return WatchdogAction::Restart;
        }
        WatchdogAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(state: OtaState, step: FlashStep, addr: Option<u32>, progress: u64) -> StatusSnapshot {
        StatusSnapshot {
            state,
            flash_step: step,
            write_addr: addr,
            progress,
        }
    }

    #[test]
    fn test_first_tick_only_records() {
        let mut dog = Watchdog::new(3);
        let s = snap(OtaState::LinkCheck, FlashStep::Idle, None, 0);
        assert_eq!(dog.tick(s), WatchdogAction::None);
    }

    #[test]
    fn test_advancing_session_left_alone() {
        let mut dog = Watchdog::new(3);
        dog.tick(snap(OtaState::WriteFlash, FlashStep::WriteSector, Some(0x1000), 10));
        assert_eq!(
            dog.tick(snap(OtaState::WriteFlash, FlashStep::WriteSector, Some(0x2000), 11)),
            WatchdogAction::None
        );
    }

    #[test]
    fn test_stuck_write_force_failed_before_restart() {
        let mut dog = Watchdog::new(3);
        let s = snap(OtaState::WriteFlash, FlashStep::WriteSector, Some(0x3000), 7);
        dog.tick(s);
        assert_eq!(dog.tick(s), WatchdogAction::ForceFailWrite);
        assert_eq!(dog.tick(s), WatchdogAction::ForceFailWrite);
        assert_eq!(dog.restarts_left(), 3);
    }

    #[test]
    fn test_stall_restarts_then_aborts() {
        let mut dog = Watchdog::new(1);
        let s = snap(OtaState::GetFlashId, FlashStep::Idle, None, 4);
        dog.tick(s);
        assert_eq!(dog.tick(s), WatchdogAction::Restart);
        assert_eq!(dog.restarts_left(), 0);
        // A restart forgets the previous snapshot.
        assert_eq!(dog.tick(s), WatchdogAction::None);
        assert_eq!(dog.tick(s), WatchdogAction::Abort);
    }

    #[test]
    fn test_state_change_is_progress() {
        let mut dog = Watchdog::new(0);
        dog.tick(snap(OtaState::EraseFlash, FlashStep::Erase64K, None, 3));
        assert_eq!(
            dog.tick(snap(OtaState::WriteFlash, FlashStep::Idle, None, 3)),
            WatchdogAction::None
        );
    }

    #[test]
    fn test_idle_never_acts() {
        let mut dog = Watchdog::new(0);
        let s = snap(OtaState::Idle, FlashStep::Idle, None, 0);
        dog.tick(s);
        assert_eq!(dog.tick(s), WatchdogAction::None);
    }
}
