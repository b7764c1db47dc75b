//! Device-Watchdog: periodic DWR/DWA liveness checks on an established
//! connection.

use std::time::Duration;

use chrono::Utc;
use diam_protocol::dict::{avp as code, command, result_code};
use diam_protocol::{Avp, Message, WatchdogAnswer};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::connection::Connection;
use crate::retransmit::RetransmitPolicy;
use crate::types::{CloseReason, WatchdogReport, WatchdogState};

enum Cycle {
    Answered(WatchdogReport),
    Expired { attempts: u32 },
    Closed,
}

/// Run the watchdog for the connection's lifetime.
pub(crate) fn spawn(
    conn: Connection,
    interval: Duration,
    policy: RetransmitPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move { run(conn, interval, policy).await })
}

async fn run(conn: Connection, interval: Duration, policy: RetransmitPolicy) {
    let closed = conn.on_close();
    let window = policy.watchdog_window(interval);
    tracing::debug!(
        peer = %conn.peer_addr(),
        interval_ms = interval.as_millis() as u64,
        window_ms = window.as_millis() as u64,
        "watchdog started"
    );

    loop {
        conn.set_watchdog_state(WatchdogState::Inactive);
        tokio::select! {
            _ = closed.wait() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        match cycle(&conn, window, policy).await {
            Cycle::Answered(report) => {
                tracing::debug!(
                    peer = %conn.peer_addr(),
                    origin_host = %report.origin_host,
                    "DWA received"
                );
                conn.publish_report(report);
            }
            Cycle::Expired { attempts } => {
                tracing::warn!(peer = %conn.peer_addr(), attempts, "watchdog expired");
                conn.set_watchdog_state(WatchdogState::Closed);
                conn.shutdown(CloseReason::WatchdogExpired);
                return;
            }
            Cycle::Closed => return,
        }
    }
}

/// One DWR exchange, retransmitted until a good DWA or the budget runs out.
async fn cycle(conn: &Connection, window: Duration, policy: RetransmitPolicy) -> Cycle {
    let closed = conn.on_close();
    let mut dwr = build_dwr(conn);
    conn.stamp(&mut dwr);
    let hop_by_hop = dwr.hop_by_hop();

    let mut retransmits = 0;
    loop {
        let rx = conn.pending().watchdog.register(hop_by_hop);
        conn.set_watchdog_state(WatchdogState::RequestSent);
        if conn.send(dwr.clone()).await.is_err() {
            return Cycle::Closed;
        }
        conn.set_watchdog_state(WatchdogState::AwaitingAnswer);
        let deadline = Instant::now() + window;

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(dwa)) => match check(&dwa, conn.origin_state_id()) {
                Ok(report) => return Cycle::Answered(report),
                Err(reason) => {
                    tracing::warn!(peer = %conn.peer_addr(), reason = %reason, "bad DWA");
                    // A bad answer does not shorten the window.
                    tokio::select! {
                        _ = closed.wait() => return Cycle::Closed,
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
            },
            Ok(Err(_)) => return Cycle::Closed,
            Err(_) => {
                tracing::debug!(peer = %conn.peer_addr(), hop_by_hop, "no DWA within window");
            }
        }

        if policy.should_give_up(retransmits) {
            conn.pending().watchdog.cancel(hop_by_hop);
            return Cycle::Expired {
                attempts: retransmits + 1,
            };
        }
        retransmits += 1;
    }
}

fn build_dwr(conn: &Connection) -> Message {
    let mut dwr = Message::request(command::DEVICE_WATCHDOG, 0);
    dwr.avps.extend(conn.settings().identity_avps());
    dwr.push(Avp::mandatory(code::ORIGIN_STATE_ID, conn.origin_state_id()));
    dwr
}

/// A DWA may omit Origin-State-Id, but one that differs from ours fails the
/// cycle: the peer must echo the value sent in the DWR.
fn check(dwa: &Message, origin_state_id: u32) -> Result<WatchdogReport, String> {
    let parsed = WatchdogAnswer::parse(dwa).map_err(|e| e.to_string())?;
    if !result_code::is_success(parsed.result_code) {
        return Err(format!("Result-Code {}", parsed.result_code));
    }
    if let Some(received) = parsed.origin_state_id {
        if received != origin_state_id {
            return Err(format!(
                "Origin-State-Id changed: sent {origin_state_id}, received {received}"
            ));
        }
    }
    Ok(WatchdogReport {
        origin_host: parsed.origin_host,
        origin_realm: parsed.origin_realm,
        origin_state_id: parsed.origin_state_id,
        result_code: parsed.result_code,
        received_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dwa(rc: u32, state_id: Option<u32>) -> Message {
        let mut m = Message::request(command::DEVICE_WATCHDOG, 0)
            .answer(rc)
            .with(Avp::identity(code::ORIGIN_HOST, "server"))
            .with(Avp::identity(code::ORIGIN_REALM, "realm"));
        if let Some(id) = state_id {
            m.push(Avp::mandatory(code::ORIGIN_STATE_ID, id));
        }
        m
    }

    #[test]
    fn success_with_matching_state_id_is_reported() {
        let report = check(&dwa(result_code::SUCCESS, Some(42)), 42).unwrap();
        assert_eq!(report.origin_state_id, Some(42));
        assert_eq!(report.origin_host, "server");
    }

    #[test]
    fn absent_state_id_is_accepted() {
        assert!(check(&dwa(result_code::SUCCESS, None), 42).is_ok());
    }

    #[test]
    fn changed_state_id_fails_the_cycle() {
        let err = check(&dwa(result_code::SUCCESS, Some(1)), 42).unwrap_err();
        assert!(err.contains("Origin-State-Id"));
    }

    #[test]
    fn failure_result_code_fails_the_cycle() {
        assert!(check(&dwa(result_code::UNABLE_TO_COMPLY, Some(42)), 42).is_err());
    }
}
