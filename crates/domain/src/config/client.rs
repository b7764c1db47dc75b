use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-connection timing and retransmission behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Retransmissions after the first request; 0 means a single attempt.
    #[serde(default)]
    pub max_retransmits: u32,
    /// Answer window per attempt.  Unset means 1 s for the handshake and the
    /// watchdog interval for DWRs.
    #[serde(default)]
    pub retransmit_interval_ms: Option<u64>,
    #[serde(default = "d_true")]
    pub enable_watchdog: bool,
    #[serde(default = "d_watchdog_interval_ms")]
    pub watchdog_interval_ms: u64,
    #[serde(default = "d_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// How long `send_request` waits for the matching answer.
    #[serde(default = "d_answer_timeout_ms")]
    pub answer_timeout_ms: u64,
    #[serde(default = "d_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl ClientConfig {
    pub fn retransmit_interval(&self) -> Option<Duration> {
        self.retransmit_interval_ms.map(Duration::from_millis)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retransmits: 0,
            retransmit_interval_ms: None,
            enable_watchdog: true,
            watchdog_interval_ms: d_watchdog_interval_ms(),
            connect_timeout_ms: d_connect_timeout_ms(),
            answer_timeout_ms: d_answer_timeout_ms(),
            max_message_bytes: d_max_message_bytes(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}

fn d_watchdog_interval_ms() -> u64 {
    30_000
}

fn d_connect_timeout_ms() -> u64 {
    5_000
}

fn d_answer_timeout_ms() -> u64 {
    10_000
}

fn d_max_message_bytes() -> usize {
    64 * 1024
}
