//! Device identity stamped on every frame a session emits.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

/// Identity used by the test harness when none is configured.
pub const DEFAULT_DEVICE_ID: &str = "12abdd2289421234";

/// 8-byte identity of a simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId([u8; 8]);

impl DeviceId {
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Parse an identity.
    ///
    /// Exactly 16 hex digits are decoded and used directly. Any other string is
    /// hashed down to 8 bytes (leading bytes of its SHA-256 digest).
    pub fn parse(id: &str) -> Self {
        if id.len() == 16 {
            let mut bytes = [0u8; 8];
            if hex::decode_to_slice(id, &mut bytes).is_ok() {
                return Self(bytes);
            }
        }
        let digest = Sha256::digest(id.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::parse(DEFAULT_DEVICE_ID)
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
