use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VfcError;

/// Block cipher algorithm identifier.
///
/// Each variant names one slot in the cipher registry. The slot order is
/// stable and doubles as the on-disk algorithm tag in encrypted containers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// Portable AES (works on every target)
    #[default]
    Aes,
    /// AES backed by hardware instructions; unavailable without CPU support
    AesAccel,
    /// Reserved for an externally registered backend
    Vendor,
}

impl Algorithm {
    /// Number of registry slots
    pub const COUNT: usize = 3;

    pub const ALL: [Algorithm; Self::COUNT] = [Algorithm::Aes, Algorithm::AesAccel, Algorithm::Vendor];

    /// Slot index in the registry table and tag byte in container headers.
    pub fn index(self) -> usize {
        match self {
            Algorithm::Aes => 0,
            Algorithm::AesAccel => 1,
            Algorithm::Vendor => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Aes => "aes",
            Algorithm::AesAccel => "aes-accel",
            Algorithm::Vendor => "vendor",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = VfcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes" => Ok(Algorithm::Aes),
            "aes-accel" | "aesni" | "aes-ni" => Ok(Algorithm::AesAccel),
            "vendor" => Ok(Algorithm::Vendor),
            other => Err(VfcError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Direction of a block-cipher operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encrypt => f.write_str("encrypt"),
            Direction::Decrypt => f.write_str("decrypt"),
        }
    }
}
