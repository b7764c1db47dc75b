//! Local node identity shared by every connection a [`StateMachine`] serves.
//!
//! [`StateMachine`]: crate::StateMachine

use std::net::IpAddr;

use diam_domain::config::IdentityConfig;
use diam_protocol::dict::avp as code;
use diam_protocol::{Applications, Avp, Message, VendorSpecificApplication};

/// Identity and advertised capabilities of this node.
///
/// Built once and shared read-only behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub origin_host: String,
    pub origin_realm: String,
    pub vendor_id: u32,
    pub product_name: String,
    pub firmware_revision: Option<u32>,
    /// When set, every connection uses this value instead of a fresh one.
    pub origin_state_id: Option<u32>,
    /// Sent in addition to the local socket address.
    pub host_ip_addresses: Vec<IpAddr>,
    pub supported_vendor_ids: Vec<u32>,
    pub applications: Applications,
}

impl Settings {
    pub fn builder(
        origin_host: impl Into<String>,
        origin_realm: impl Into<String>,
    ) -> SettingsBuilder {
        SettingsBuilder {
            settings: Settings {
                origin_host: origin_host.into(),
                origin_realm: origin_realm.into(),
                ..Settings::default()
            },
        }
    }

    pub fn from_config(cfg: &IdentityConfig) -> Self {
        let vendor_specific = cfg
            .vendor_specific_applications
            .iter()
            .map(|v| VendorSpecificApplication {
                vendor_id: v.vendor_id,
                auth_application_id: v.auth_application_id,
                acct_application_id: v.acct_application_id,
            })
            .collect();
        Self {
            origin_host: cfg.origin_host.clone(),
            origin_realm: cfg.origin_realm.clone(),
            vendor_id: cfg.vendor_id,
            product_name: cfg.product_name.clone(),
            firmware_revision: cfg.firmware_revision,
            origin_state_id: cfg.origin_state_id,
            host_ip_addresses: cfg.host_ip_addresses.clone(),
            supported_vendor_ids: cfg.supported_vendor_ids.clone(),
            applications: Applications {
                auth: cfg.auth_application_ids.clone(),
                acct: cfg.acct_application_ids.clone(),
                vendor_specific,
            },
        }
    }

    /// Origin-Host and Origin-Realm, in that order.
    pub fn identity_avps(&self) -> [Avp; 2] {
        [
            Avp::identity(code::ORIGIN_HOST, self.origin_host.as_str()),
            Avp::identity(code::ORIGIN_REALM, self.origin_realm.as_str()),
        ]
    }

    /// Answer to `request` carrying `result_code` and this node's identity.
    pub fn answer(&self, request: &Message, result_code: u32) -> Message {
        let mut answer = request.answer(result_code);
        answer.avps.extend(self.identity_avps());
        answer
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            origin_host: "client.localdomain".into(),
            origin_realm: "localdomain".into(),
            vendor_id: 0,
            product_name: "diam-peer".into(),
            firmware_revision: None,
            origin_state_id: None,
            host_ip_addresses: Vec::new(),
            supported_vendor_ids: Vec::new(),
            applications: Applications::default(),
        }
    }
}

/// Fluent builder for [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn vendor_id(mut self, id: u32) -> Self {
        self.settings.vendor_id = id;
        self
    }

    pub fn product_name(mut self, name: impl Into<String>) -> Self {
        self.settings.product_name = name.into();
        self
    }

    pub fn firmware_revision(mut self, rev: u32) -> Self {
        self.settings.firmware_revision = Some(rev);
        self
    }

    pub fn origin_state_id(mut self, id: u32) -> Self {
        self.settings.origin_state_id = Some(id);
        self
    }

    pub fn host_ip_address(mut self, ip: IpAddr) -> Self {
        self.settings.host_ip_addresses.push(ip);
        self
    }

    pub fn supported_vendor_id(mut self, id: u32) -> Self {
        self.settings.supported_vendor_ids.push(id);
        self
    }

    pub fn auth_application_id(mut self, id: u32) -> Self {
        self.settings.applications.auth.push(id);
        self
    }

    pub fn acct_application_id(mut self, id: u32) -> Self {
        self.settings.applications.acct.push(id);
        self
    }

    pub fn vendor_specific_application(mut self, app: VendorSpecificApplication) -> Self {
        self.settings.applications.vendor_specific.push(app);
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diam_domain::config::Config;

    #[test]
    fn builder_collects_applications() {
        let s = Settings::builder("client", "example.org")
            .acct_application_id(3)
            .vendor_specific_application(VendorSpecificApplication::auth(10415, 16777251))
            .build();
        assert_eq!(s.origin_host, "client");
        assert_eq!(s.applications.acct, vec![3]);
        assert_eq!(s.applications.vendor_specific.len(), 1);
        assert_eq!(s.product_name, "diam-peer");
    }

    #[test]
    fn from_config_copies_identity() {
        let cfg = Config::from_toml(
            r#"
[identity]
origin_host = "cfg-host"
origin_realm = "cfg-realm"
vendor_id = 10415
auth_application_ids = [4]

[[identity.vendor_specific_applications]]
vendor_id = 10415
acct_application_id = 3
"#,
        )
        .unwrap();
        let s = Settings::from_config(&cfg.identity);
        assert_eq!(s.origin_host, "cfg-host");
        assert_eq!(s.vendor_id, 10415);
        assert_eq!(s.applications.auth, vec![4]);
        assert_eq!(
            s.applications.vendor_specific[0],
            VendorSpecificApplication::acct(10415, 3)
        );
    }

    #[test]
    fn answer_carries_identity() {
        let s = Settings::builder("me", "realm").build();
        let req = Message::request(280, 0);
        let ans = s.answer(&req, 2001);
        assert_eq!(ans.result_code(), Some(2001));
        assert_eq!(
            ans.find(code::ORIGIN_HOST).and_then(|a| a.data.as_str()),
            Some("me")
        );
    }
}
