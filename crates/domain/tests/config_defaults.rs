use std::io::Write;

use diam_domain::config::{Config, ConfigSeverity};

fn with_app(mut config: Config) -> Config {
    config.identity.acct_application_ids = vec![3];
    config
}

#[test]
fn default_peer_is_local_diameter_port() {
    let config = Config::default();
    assert_eq!(config.peer.address, "127.0.0.1:3868");
    assert!(config.peer.tls.is_none());
}

#[test]
fn default_client_timings() {
    let config = Config::default();
    assert_eq!(config.client.max_retransmits, 0);
    assert_eq!(config.client.retransmit_interval_ms, None);
    assert!(config.client.enable_watchdog);
    assert_eq!(config.client.watchdog_interval_ms, 30_000);
    assert_eq!(config.client.max_message_bytes, 65_536);
}

#[test]
fn partial_toml_keeps_defaults() {
    let toml_str = r#"
[identity]
origin_host = "client.example.org"
origin_realm = "example.org"
acct_application_ids = [3]

[client]
max_retransmits = 3
retransmit_interval_ms = 500
"#;
    let config = Config::from_toml(toml_str).unwrap();
    assert_eq!(config.identity.origin_host, "client.example.org");
    assert_eq!(config.identity.product_name, "diam-peer");
    assert_eq!(config.client.max_retransmits, 3);
    assert_eq!(
        config.client.retransmit_interval(),
        Some(std::time::Duration::from_millis(500))
    );
    assert_eq!(config.client.watchdog_interval_ms, 30_000);
}

#[test]
fn vendor_specific_applications_parse() {
    let toml_str = r#"
[[identity.vendor_specific_applications]]
vendor_id = 10415
auth_application_id = 16777251
"#;
    let config = Config::from_toml(toml_str).unwrap();
    let vsa = &config.identity.vendor_specific_applications[0];
    assert_eq!(vsa.vendor_id, 10415);
    assert_eq!(vsa.auth_application_id, Some(16777251));
    assert_eq!(vsa.acct_application_id, None);
    assert!(config.identity.has_applications());
}

#[test]
fn host_ip_addresses_parse_from_strings() {
    let toml_str = r#"
[identity]
host_ip_addresses = ["10.0.0.1", "::1"]
"#;
    let config = Config::from_toml(toml_str).unwrap();
    assert_eq!(config.identity.host_ip_addresses.len(), 2);
    assert!(config.identity.host_ip_addresses[1].is_ipv6());
}

#[test]
fn validate_requires_an_application() {
    let issues = Config::default().validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "identity"));

    let issues = with_app(Config::default()).validate();
    assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error), "{issues:?}");
}

#[test]
fn validate_rejects_zero_intervals() {
    let mut config = with_app(Config::default());
    config.client.retransmit_interval_ms = Some(0);
    config.client.watchdog_interval_ms = 0;
    let fields: Vec<_> = config.validate().into_iter().map(|i| i.field).collect();
    assert!(fields.contains(&"client.retransmit_interval_ms".to_string()));
    assert!(fields.contains(&"client.watchdog_interval_ms".to_string()));
}

#[test]
fn short_watchdog_interval_is_only_a_warning() {
    let mut config = with_app(Config::default());
    config.client.watchdog_interval_ms = 100;
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert!(issues[0].to_string().starts_with("[WARN] client.watchdog_interval_ms"));
}

#[test]
fn tls_needs_cert_and_key_together() {
    let toml_str = r#"
[identity]
auth_application_ids = [4]

[peer]
address = "peer.example.org:5658"

[peer.tls]
ca_file = "ca.pem"
cert_file = "client.pem"
"#;
    let config = Config::from_toml(toml_str).unwrap();
    let err = config.validated().unwrap_err();
    assert!(err.to_string().contains("peer.tls"), "{err}");
}

#[test]
fn load_reads_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[identity]\norigin_host = \"from-file\"\nacct_application_ids = [3]"
    )
    .unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.identity.origin_host, "from-file");
}

#[test]
fn load_reports_toml_errors() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[client]\nmax_retransmits = \"three\"").unwrap();
    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, diam_domain::Error::Toml(_)));
}
