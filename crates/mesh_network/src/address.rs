//! Hardware addresses identifying mesh participants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MeshError;

/// Length of a hardware address in bytes.
pub const ADDRESS_LEN: usize = 6;

/// A 6-byte hardware address, the identity of a mesh participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress([u8; ADDRESS_LEN]);

impl PeerAddress {
    /// The all-ones broadcast address.
    pub const BROADCAST: PeerAddress = PeerAddress([0xFF; ADDRESS_LEN]);

    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Build an address from the first six bytes of a slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, MeshError> {
        let raw: [u8; ADDRESS_LEN] = bytes
            .get(..ADDRESS_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| MeshError::InvalidAddress(format!("{} bytes", bytes.len())))?;
        Ok(Self(raw))
    }

    /// Generate a random unicast, locally-administered address.
    pub fn random() -> Self {
        let mut bytes: [u8; ADDRESS_LEN] = rand::random();
        bytes[0] = (bytes[0] & 0xFC) | 0x02;
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Whether this is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Lowercase hex without separators, as used in text announcements.
    pub fn to_compact_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse the separator-free hex form produced by [`to_compact_hex`](Self::to_compact_hex).
    pub fn from_compact_hex(s: &str) -> Result<Self, MeshError> {
        if s.len() != ADDRESS_LEN * 2 || !s.is_ascii() {
            return Err(MeshError::InvalidAddress(s.to_string()));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| MeshError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl From<[u8; ADDRESS_LEN]> for PeerAddress {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for PeerAddress {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != ADDRESS_LEN {
            return Err(MeshError::InvalidAddress(s.to_string()));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        for (byte, part) in bytes.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(MeshError::InvalidAddress(s.to_string()));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| MeshError::InvalidAddress(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let addr = PeerAddress::new([0x24, 0x6f, 0x28, 0xaa, 0x01, 0xff]);
        assert_eq!(addr.to_string(), "24:6f:28:aa:01:ff");
        assert_eq!("24:6F:28:AA:01:FF".parse::<PeerAddress>().unwrap(), addr);
        assert_eq!("24-6f-28-aa-01-ff".parse::<PeerAddress>().unwrap(), addr);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("24:6f:28:aa:01".parse::<PeerAddress>().is_err());
        assert!("24:6f:28:aa:01:zz".parse::<PeerAddress>().is_err());
        assert!("246:f:28:aa:01:ff".parse::<PeerAddress>().is_err());
    }

    #[test]
    fn test_compact_hex() {
        let addr = PeerAddress::new([0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        assert_eq!(addr.to_compact_hex(), "deadbeef0001");
        assert_eq!(PeerAddress::from_compact_hex("deadbeef0001").unwrap(), addr);
        assert!(PeerAddress::from_compact_hex("deadbeef00").is_err());
    }

    #[test]
    fn test_random_is_local_unicast() {
        for _ in 0..32 {
            let addr = PeerAddress::random();
            assert_eq!(addr.as_bytes()[0] & 0x01, 0);
            assert_eq!(addr.as_bytes()[0] & 0x02, 0x02);
            assert!(!addr.is_broadcast());
        }
    }

    #[test]
    fn test_serde_as_string() {
        let addr = PeerAddress::new([1, 2, 3, 4, 5, 6]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"01:02:03:04:05:06\"");
        let back: PeerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_from_slice() {
        let addr = PeerAddress::from_slice(&[9, 8, 7, 6, 5, 4, 3]).unwrap();
        assert_eq!(addr, PeerAddress::new([9, 8, 7, 6, 5, 4]));
        assert!(PeerAddress::from_slice(&[1, 2]).is_err());
    }
}
