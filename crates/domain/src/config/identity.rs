use std::net::IpAddr;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Who this node is and what it advertises in the capabilities exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "d_origin_host")]
    pub origin_host: String,
    #[serde(default = "d_origin_realm")]
    pub origin_realm: String,
    #[serde(default)]
    pub vendor_id: u32,
    #[serde(default = "d_product_name")]
    pub product_name: String,
    #[serde(default)]
    pub firmware_revision: Option<u32>,
    /// Pin the Origin-State-Id instead of generating one per connection.
    #[serde(default)]
    pub origin_state_id: Option<u32>,
    /// Advertised in addition to the local socket address.
    #[serde(default)]
    pub host_ip_addresses: Vec<IpAddr>,
    #[serde(default)]
    pub supported_vendor_ids: Vec<u32>,
    #[serde(default)]
    pub auth_application_ids: Vec<u32>,
    #[serde(default)]
    pub acct_application_ids: Vec<u32>,
    #[serde(default)]
    pub vendor_specific_applications: Vec<VendorSpecificApplicationConfig>,
}

impl IdentityConfig {
    pub fn has_applications(&self) -> bool {
        !self.auth_application_ids.is_empty()
            || !self.acct_application_ids.is_empty()
            || !self.vendor_specific_applications.is_empty()
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            origin_host: d_origin_host(),
            origin_realm: d_origin_realm(),
            vendor_id: 0,
            product_name: d_product_name(),
            firmware_revision: None,
            origin_state_id: None,
            host_ip_addresses: Vec::new(),
            supported_vendor_ids: Vec::new(),
            auth_application_ids: Vec::new(),
            acct_application_ids: Vec::new(),
            vendor_specific_applications: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorSpecificApplicationConfig {
    pub vendor_id: u32,
    #[serde(default)]
    pub auth_application_id: Option<u32>,
    #[serde(default)]
    pub acct_application_id: Option<u32>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_origin_host() -> String {
    "client.localdomain".into()
}

fn d_origin_realm() -> String {
    "localdomain".into()
}

fn d_product_name() -> String {
    "diam-peer".into()
}
