//! Origin-State-Id and header identifier generation.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;

static STATE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A fresh, non-zero Origin-State-Id.
///
/// Seeded from wall-clock seconds so values grow across restarts, with a
/// process-wide counter so two dials in the same second still differ.
pub fn next_origin_state_id() -> u32 {
    let base = clock_seconds(Utc::now().timestamp());
    loop {
        let v = base.wrapping_add(STATE_COUNTER.fetch_add(1, Ordering::Relaxed));
        if v != 0 {
            return v;
        }
    }
}

/// Low 32 bits of a Unix timestamp; the value wraps in 2106.
fn clock_seconds(timestamp: i64) -> u32 {
    (timestamp & 0xffff_ffff) as u32
}

/// Per-connection hop-by-hop and end-to-end counters.
#[derive(Debug)]
pub(crate) struct IdGenerator {
    hop_by_hop: AtomicU32,
    end_to_end: AtomicU32,
}

impl IdGenerator {
    pub(crate) fn new() -> Self {
        let now = Utc::now();
        let secs = clock_seconds(now.timestamp());
        let nanos = now.timestamp_subsec_nanos();
        Self {
            hop_by_hop: AtomicU32::new(nanos ^ secs.rotate_left(16)),
            // RFC 6733 §3: high 12 bits from the clock, low 20 random.
            end_to_end: AtomicU32::new((secs & 0xfff) << 20 | (nanos & 0xf_ffff)),
        }
    }

    pub(crate) fn next_hop_by_hop(&self) -> u32 {
        self.hop_by_hop.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_end_to_end(&self) -> u32 {
        self.end_to_end.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_state_ids_are_fresh_and_non_zero() {
        let a = next_origin_state_id();
        let b = next_origin_state_id();
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn clock_seconds_keep_the_low_32_bits() {
        assert_eq!(clock_seconds(1_700_000_000), 1_700_000_000);
        assert_eq!(clock_seconds(0x1_0000_0005), 5);
        assert_eq!(clock_seconds(-1), u32::MAX);
    }

    #[test]
    fn hop_by_hop_ids_increase() {
        let ids = IdGenerator::new();
        let first = ids.next_hop_by_hop();
        assert_eq!(ids.next_hop_by_hop(), first.wrapping_add(1));
    }
}
