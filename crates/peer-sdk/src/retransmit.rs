//! Retransmission policy shared by the handshake and watchdog procedures.

use std::time::Duration;

/// Answer window used for the CER when no interval is configured.
pub const DEFAULT_HANDSHAKE_WINDOW: Duration = Duration::from_secs(1);

/// How many times a request is resent and how long each attempt waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetransmitPolicy {
    /// Resends after the first attempt.  `0` means a single attempt.
    pub max_retransmits: u32,
    /// Answer window per attempt.  `None` picks a per-procedure default.
    pub interval: Option<Duration>,
}

impl RetransmitPolicy {
    pub fn new(max_retransmits: u32, interval: Option<Duration>) -> Self {
        Self {
            max_retransmits,
            interval,
        }
    }

    pub fn handshake_window(&self) -> Duration {
        self.interval.unwrap_or(DEFAULT_HANDSHAKE_WINDOW)
    }

    /// DWRs fall back to the watchdog interval itself.
    pub fn watchdog_window(&self, watchdog_interval: Duration) -> Duration {
        self.interval.unwrap_or(watchdog_interval)
    }

    /// Whether `retransmits` resends already used up the budget.
    pub fn should_give_up(&self, retransmits: u32) -> bool {
        retransmits >= self.max_retransmits
    }

    /// Total transmissions before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_retransmits.saturating_add(1)
    }
}
