//! BMC records
//!
//! Out-of-band management controllers are keyed by a uuid derived from
//! their MAC address, so re-registering the same board updates one record.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

const BASE62: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Power state when it could not be determined
pub const UNKNOWN_POWER_STATE: &str = "unknown";

/// Derives the BMC uuid: colons stripped, string reversed, read as hex,
/// then base62 encoded.
pub fn bmc_uuid_from_mac(mac: &str) -> Result<String, ModelError> {
    let reversed: String = mac.replace(':', "").chars().rev().collect();
    if reversed.is_empty() {
        return Err(ModelError::InvalidMac(mac.to_string()));
    }
    let mut value =
        u64::from_str_radix(&reversed, 16).map_err(|_| ModelError::InvalidMac(mac.to_string()))?;
    if value == 0 {
        return Ok("0".to_string());
    }
    let mut digits = Vec::new();
    while value > 0 {
        // value % 62 < 62 always indexes BASE62
        digits.push(BASE62[usize::try_from(value % 62).unwrap_or_default()]);
        value /= 62;
    }
    digits.reverse();
    Ok(String::from_utf8_lossy(&digits).into_owned())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bmc {
    pub uuid: String,

    #[serde(default)]
    pub version: u64,

    pub mac: String,

    pub ip: String,

    #[serde(default = "unknown_power_state")]
    pub current_power_state: String,

    #[serde(default)]
    pub board_serial_number: String,

    #[serde(default)]
    pub timestamp: i64,
}

fn unknown_power_state() -> String {
    UNKNOWN_POWER_STATE.to_string()
}

impl Bmc {
    pub fn new(mac: &str, ip: &str) -> Result<Self, ModelError> {
        Ok(Self {
            uuid: bmc_uuid_from_mac(mac)?,
            version: 0,
            mac: mac.to_string(),
            ip: ip.to_string(),
            current_power_state: unknown_power_state(),
            board_serial_number: String::new(),
            timestamp: crate::now_timestamp(),
        })
    }

    /// True when any field an upsert tracks differs from `other`
    pub fn differs_from(&self, other: &Self) -> bool {
        self.mac != other.mac
            || self.ip != other.ip
            || self.current_power_state != other.current_power_state
            || self.board_serial_number != other.board_serial_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_from_mac_is_stable_and_colon_insensitive() {
        let a = bmc_uuid_from_mac("00:0c:29:aa:bb:01").unwrap();
        let b = bmc_uuid_from_mac("000c29aabb01").unwrap();
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_uuid_from_mac_reverses_before_parsing() {
        // "100" reversed is "001" == 1
        assert_eq!(bmc_uuid_from_mac("1:00").unwrap(), "1");
        // "f3" reversed is "3f" == 63 == "11" in base62
        assert_eq!(bmc_uuid_from_mac("f3").unwrap(), "11");
    }

    #[test]
    fn test_uuid_from_mac_rejects_garbage() {
        assert!(bmc_uuid_from_mac("zz:zz").is_err());
        assert!(bmc_uuid_from_mac("").is_err());
    }

    #[test]
    fn test_differs_from() {
        let a = Bmc::new("00:0c:29:aa:bb:01", "10.0.0.5").unwrap();
        let mut b = a.clone();
        b.timestamp += 100;
        assert!(!a.differs_from(&b));
        b.current_power_state = "on".to_string();
        assert!(a.differs_from(&b));
    }
}
