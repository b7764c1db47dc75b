//! Base-protocol dictionary: command codes, AVP codes and types, result codes.

/// Command codes (RFC 6733 §3.1).
pub mod command {
    pub const CAPABILITIES_EXCHANGE: u32 = 257;
    pub const DEVICE_WATCHDOG: u32 = 280;
    pub const DISCONNECT_PEER: u32 = 282;
}

/// AVP codes used by the peer-management commands.
pub mod avp {
    pub const HOST_IP_ADDRESS: u32 = 257;
    pub const AUTH_APPLICATION_ID: u32 = 258;
    pub const ACCT_APPLICATION_ID: u32 = 259;
    pub const VENDOR_SPECIFIC_APPLICATION_ID: u32 = 260;
    pub const SESSION_ID: u32 = 263;
    pub const ORIGIN_HOST: u32 = 264;
    pub const SUPPORTED_VENDOR_ID: u32 = 265;
    pub const VENDOR_ID: u32 = 266;
    pub const FIRMWARE_REVISION: u32 = 267;
    pub const RESULT_CODE: u32 = 268;
    pub const PRODUCT_NAME: u32 = 269;
    pub const DISCONNECT_CAUSE: u32 = 273;
    pub const ORIGIN_STATE_ID: u32 = 278;
    pub const FAILED_AVP: u32 = 279;
    pub const ERROR_MESSAGE: u32 = 281;
    pub const ROUTE_RECORD: u32 = 282;
    pub const DESTINATION_REALM: u32 = 283;
    pub const DESTINATION_HOST: u32 = 293;
    pub const ORIGIN_REALM: u32 = 296;
    pub const EXPERIMENTAL_RESULT: u32 = 297;
    pub const EXPERIMENTAL_RESULT_CODE: u32 = 298;
    pub const INBAND_SECURITY_ID: u32 = 299;
}

/// Result-Code values (RFC 6733 §7.1).
pub mod result_code {
    pub const SUCCESS: u32 = 2001;
    pub const LIMITED_SUCCESS: u32 = 2002;
    pub const COMMAND_UNSUPPORTED: u32 = 3001;
    pub const UNABLE_TO_DELIVER: u32 = 3002;
    pub const REALM_NOT_SERVED: u32 = 3003;
    pub const TOO_BUSY: u32 = 3004;
    pub const APPLICATION_UNSUPPORTED: u32 = 3007;
    pub const INVALID_AVP_VALUE: u32 = 5004;
    pub const MISSING_AVP: u32 = 5005;
    pub const NO_COMMON_APPLICATION: u32 = 5010;
    pub const UNSUPPORTED_VERSION: u32 = 5011;
    pub const UNABLE_TO_COMPLY: u32 = 5012;
    pub const NO_COMMON_SECURITY: u32 = 5017;

    /// `2xxx` is the success class.
    pub fn is_success(code: u32) -> bool {
        (2000..3000).contains(&code)
    }
}

/// Wire data type of an AVP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvpType {
    Unsigned32,
    Unsigned64,
    Integer32,
    OctetString,
    Utf8String,
    DiameterIdentity,
    Address,
    Grouped,
}

/// Look up the data type of a base-protocol AVP.
///
/// Vendor-specific AVPs and unknown codes fall back to `OctetString` so the
/// raw bytes survive a decode/encode cycle untouched.
pub fn avp_type(code: u32, vendor_id: Option<u32>) -> AvpType {
    if vendor_id.is_some_and(|v| v != 0) {
        return AvpType::OctetString;
    }
    match code {
        avp::HOST_IP_ADDRESS => AvpType::Address,
        avp::AUTH_APPLICATION_ID
        | avp::ACCT_APPLICATION_ID
        | avp::SUPPORTED_VENDOR_ID
        | avp::VENDOR_ID
        | avp::FIRMWARE_REVISION
        | avp::RESULT_CODE
        | avp::ORIGIN_STATE_ID
        | avp::EXPERIMENTAL_RESULT_CODE
        | avp::INBAND_SECURITY_ID => AvpType::Unsigned32,
        avp::DISCONNECT_CAUSE => AvpType::Integer32,
        avp::VENDOR_SPECIFIC_APPLICATION_ID | avp::FAILED_AVP | avp::EXPERIMENTAL_RESULT => {
            AvpType::Grouped
        }
        avp::SESSION_ID | avp::PRODUCT_NAME | avp::ERROR_MESSAGE => AvpType::Utf8String,
        avp::ORIGIN_HOST
        | avp::ORIGIN_REALM
        | avp::DESTINATION_HOST
        | avp::DESTINATION_REALM
        | avp::ROUTE_RECORD => AvpType::DiameterIdentity,
        _ => AvpType::OctetString,
    }
}

/// Human-readable AVP name, for error messages and logs.
pub fn avp_name(code: u32) -> &'static str {
    match code {
        avp::HOST_IP_ADDRESS => "Host-IP-Address",
        avp::AUTH_APPLICATION_ID => "Auth-Application-Id",
        avp::ACCT_APPLICATION_ID => "Acct-Application-Id",
        avp::VENDOR_SPECIFIC_APPLICATION_ID => "Vendor-Specific-Application-Id",
        avp::SESSION_ID => "Session-Id",
        avp::ORIGIN_HOST => "Origin-Host",
        avp::SUPPORTED_VENDOR_ID => "Supported-Vendor-Id",
        avp::VENDOR_ID => "Vendor-Id",
        avp::FIRMWARE_REVISION => "Firmware-Revision",
        avp::RESULT_CODE => "Result-Code",
        avp::PRODUCT_NAME => "Product-Name",
        avp::DISCONNECT_CAUSE => "Disconnect-Cause",
        avp::ORIGIN_STATE_ID => "Origin-State-Id",
        avp::FAILED_AVP => "Failed-AVP",
        avp::ERROR_MESSAGE => "Error-Message",
        avp::ROUTE_RECORD => "Route-Record",
        avp::DESTINATION_REALM => "Destination-Realm",
        avp::DESTINATION_HOST => "Destination-Host",
        avp::ORIGIN_REALM => "Origin-Realm",
        avp::EXPERIMENTAL_RESULT => "Experimental-Result",
        avp::EXPERIMENTAL_RESULT_CODE => "Experimental-Result-Code",
        avp::INBAND_SECURITY_ID => "Inband-Security-Id",
        _ => "Unknown",
    }
}

/// Short command name as used in logs: `CER`, `CEA`, `DWR`, ...
///
/// Commands outside the base protocol render as `<code>R` / `<code>A`.
pub fn command_name(code: u32, request: bool) -> String {
    let prefix = match code {
        command::CAPABILITIES_EXCHANGE => "CE",
        command::DEVICE_WATCHDOG => "DW",
        command::DISCONNECT_PEER => "DP",
        _ => return format!("{code}{}", if request { 'R' } else { 'A' }),
    };
    format!("{prefix}{}", if request { 'R' } else { 'A' })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_avps_have_expected_types() {
        assert_eq!(avp_type(avp::ORIGIN_HOST, None), AvpType::DiameterIdentity);
        assert_eq!(avp_type(avp::RESULT_CODE, None), AvpType::Unsigned32);
        assert_eq!(avp_type(avp::HOST_IP_ADDRESS, None), AvpType::Address);
        assert_eq!(
            avp_type(avp::VENDOR_SPECIFIC_APPLICATION_ID, None),
            AvpType::Grouped
        );
    }

    #[test]
    fn vendor_avps_are_opaque() {
        assert_eq!(avp_type(avp::RESULT_CODE, Some(10415)), AvpType::OctetString);
        assert_eq!(avp_type(avp::RESULT_CODE, Some(0)), AvpType::Unsigned32);
    }

    #[test]
    fn command_names() {
        assert_eq!(command_name(command::CAPABILITIES_EXCHANGE, true), "CER");
        assert_eq!(command_name(command::DEVICE_WATCHDOG, false), "DWA");
        assert_eq!(command_name(272, true), "272R");
    }

    #[test]
    fn success_class() {
        assert!(result_code::is_success(result_code::SUCCESS));
        assert!(result_code::is_success(result_code::LIMITED_SUCCESS));
        assert!(!result_code::is_success(result_code::UNABLE_TO_COMPLY));
        assert!(!result_code::is_success(result_code::COMMAND_UNSUPPORTED));
    }
}
