//! Capabilities-Exchange: build the CER, retransmit on silence, validate the
//! CEA.

use std::net::IpAddr;

use diam_protocol::dict::{avp as code, command, result_code};
use diam_protocol::{Applications, Avp, CapabilitiesAnswer, Message};

use crate::connection::Connection;
use crate::retransmit::RetransmitPolicy;
use crate::settings::Settings;
use crate::types::{CloseReason, Error, HandshakeState, PeerCapabilities};

/// What a dial advertises on top of the node [`Settings`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Advertised {
    pub applications: Applications,
    pub supported_vendor_ids: Vec<u32>,
}

impl Advertised {
    /// Settings merged with per-client overrides.  Fails before any I/O when
    /// nothing would be advertised.
    pub(crate) fn resolve(
        settings: &Settings,
        applications: &Applications,
        supported_vendor_ids: &[u32],
    ) -> Result<Self, Error> {
        let applications = settings.applications.merged(applications);
        if applications.is_empty() {
            return Err(diam_protocol::ParseError::MissingApplication.into());
        }
        let mut vendors = settings.supported_vendor_ids.clone();
        for id in supported_vendor_ids {
            if !vendors.contains(id) {
                vendors.push(*id);
            }
        }
        Ok(Self {
            applications,
            supported_vendor_ids: vendors,
        })
    }
}

pub(crate) fn build_cer(
    settings: &Settings,
    advertised: &Advertised,
    local_ip: IpAddr,
    origin_state_id: u32,
) -> Message {
    let mut cer = Message::request(command::CAPABILITIES_EXCHANGE, 0);
    cer.avps.extend(settings.identity_avps());

    cer.push(Avp::mandatory(code::HOST_IP_ADDRESS, local_ip));
    for ip in settings.host_ip_addresses.iter().filter(|ip| **ip != local_ip) {
        cer.push(Avp::mandatory(code::HOST_IP_ADDRESS, *ip));
    }
    cer.push(Avp::mandatory(code::VENDOR_ID, settings.vendor_id));
    cer.push(Avp::utf8(code::PRODUCT_NAME, settings.product_name.as_str()));
    cer.push(Avp::mandatory(code::ORIGIN_STATE_ID, origin_state_id));
    for id in &advertised.supported_vendor_ids {
        cer.push(Avp::mandatory(code::SUPPORTED_VENDOR_ID, *id));
    }
    cer.avps.extend(advertised.applications.to_avps());
    if let Some(rev) = settings.firmware_revision {
        cer.push(Avp::new(code::FIRMWARE_REVISION, 0, rev));
    }
    cer
}

/// Drive the handshake to `Established` or an error.
///
/// The same CER (same hop-by-hop id and Origin-State-Id) is resent when a
/// window passes without an answer, `max_retransmits` times at most.  The
/// caller closes the connection on error.
pub(crate) async fn run(
    conn: &Connection,
    advertised: &Advertised,
    policy: RetransmitPolicy,
) -> Result<PeerCapabilities, Error> {
    let sent_state_id = conn.origin_state_id();
    let mut cer = build_cer(
        conn.settings(),
        advertised,
        conn.local_addr().ip(),
        sent_state_id,
    );
    conn.stamp(&mut cer);
    let hop_by_hop = cer.hop_by_hop();
    let window = policy.handshake_window();

    let mut retransmits = 0;
    let outcome = loop {
        let rx = conn.pending().handshake.register(hop_by_hop);
        conn.set_handshake_state(HandshakeState::RequestSent);
        tracing::debug!(
            peer = %conn.peer_addr(),
            attempt = retransmits + 1,
            hop_by_hop,
            "sending CER"
        );
        if let Err(e) = conn.send(cer.clone()).await {
            break Err(e);
        }
        conn.set_handshake_state(HandshakeState::AwaitingAnswer);

        match tokio::time::timeout(window, rx).await {
            Ok(Ok(cea)) => break validate(&cea, sent_state_id),
            Ok(Err(_)) => {
                break Err(Error::Closed(
                    conn.on_close().get().unwrap_or(CloseReason::Local),
                ))
            }
            Err(_) if policy.should_give_up(retransmits) => {
                conn.pending().handshake.cancel(hop_by_hop);
                break Err(Error::HandshakeTimeout {
                    attempts: retransmits + 1,
                });
            }
            Err(_) => {
                retransmits += 1;
                tracing::debug!(
                    peer = %conn.peer_addr(),
                    retransmits,
                    window_ms = window.as_millis() as u64,
                    "no CEA, retransmitting"
                );
            }
        }
    };

    match outcome {
        Ok(caps) => {
            tracing::info!(
                peer = %conn.peer_addr(),
                origin_host = %caps.origin_host,
                origin_realm = %caps.origin_realm,
                "capabilities exchanged"
            );
            conn.mark_established(caps.clone());
            Ok(caps)
        }
        Err(e) => {
            conn.set_handshake_state(HandshakeState::Failed);
            Err(e)
        }
    }
}

/// Structural checks first, then Result-Code, then the echoed state id.
fn validate(cea: &Message, sent_state_id: u32) -> Result<PeerCapabilities, Error> {
    let parsed = CapabilitiesAnswer::parse(cea)?;
    if !result_code::is_success(parsed.result_code) {
        return Err(Error::FailedResultCode {
            code: parsed.result_code,
            avps: cea.avps.clone(),
        });
    }
    if parsed.origin_state_id != sent_state_id {
        return Err(Error::UnexpectedOriginStateId {
            sent: sent_state_id,
            received: parsed.origin_state_id,
        });
    }
    Ok(parsed.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use diam_protocol::{ParseError, VendorSpecificApplication};
    use std::net::Ipv4Addr;

    fn settings() -> Settings {
        Settings::builder("client", "example.org")
            .vendor_id(10415)
            .acct_application_id(3)
            .host_ip_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
            .firmware_revision(7)
            .build()
    }

    fn cea_for(cer: &Message, rc: u32, state_id: u32) -> Message {
        cer.answer(rc)
            .with(Avp::identity(code::ORIGIN_HOST, "server"))
            .with(Avp::identity(code::ORIGIN_REALM, "example.org"))
            .with(Avp::mandatory(code::ORIGIN_STATE_ID, state_id))
            .with(Avp::mandatory(code::ACCT_APPLICATION_ID, 3u32))
    }

    #[test]
    fn resolve_requires_an_application() {
        let err = Advertised::resolve(&Settings::default(), &Applications::default(), &[])
            .unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MissingApplication)));
    }

    #[test]
    fn resolve_merges_overrides() {
        let overrides = Applications {
            vendor_specific: vec![VendorSpecificApplication::auth(10415, 16777251)],
            ..Default::default()
        };
        let adv = Advertised::resolve(&settings(), &overrides, &[10415, 10415]).unwrap();
        assert_eq!(adv.applications.acct, vec![3]);
        assert_eq!(adv.applications.vendor_specific.len(), 1);
        assert_eq!(adv.supported_vendor_ids, vec![10415]);
    }

    #[test]
    fn cer_carries_identity_and_capabilities() {
        let s = settings();
        let adv = Advertised::resolve(&s, &Applications::default(), &[]).unwrap();
        let local = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let cer = build_cer(&s, &adv, local, 99);

        assert_eq!(cer.name(), "CER");
        assert_eq!(cer.avps[0].code, code::ORIGIN_HOST);
        assert_eq!(cer.avps[1].code, code::ORIGIN_REALM);
        let ips: Vec<_> = cer
            .find_all(code::HOST_IP_ADDRESS)
            .filter_map(|a| a.data.as_address())
            .collect();
        assert_eq!(ips, vec![local, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))]);
        assert_eq!(
            cer.find(code::ORIGIN_STATE_ID).and_then(|a| a.data.as_u32()),
            Some(99)
        );
        assert_eq!(
            cer.find(code::FIRMWARE_REVISION).map(|a| a.is_mandatory()),
            Some(false)
        );
    }

    #[test]
    fn validate_accepts_echoed_state_id() {
        let cer = build_cer(
            &settings(),
            &Advertised::resolve(&settings(), &Applications::default(), &[]).unwrap(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            5,
        );
        let caps = validate(&cea_for(&cer, result_code::SUCCESS, 5), 5).unwrap();
        assert_eq!(caps.origin_host, "server");
    }

    #[test]
    fn validate_reports_failed_result_code() {
        let cer = Message::request(command::CAPABILITIES_EXCHANGE, 0);
        let err = validate(&cea_for(&cer, result_code::NO_COMMON_APPLICATION, 5), 5).unwrap_err();
        assert!(matches!(err, Error::FailedResultCode { code: 5010, .. }));
        assert!(err.to_string().contains("failed Result-Code AVP"));
    }

    #[test]
    fn validate_rejects_changed_state_id() {
        let cer = Message::request(command::CAPABILITIES_EXCHANGE, 0);
        let err = validate(&cea_for(&cer, result_code::SUCCESS, 1), 5).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedOriginStateId {
                sent: 5,
                received: 1
            }
        ));
    }
}
