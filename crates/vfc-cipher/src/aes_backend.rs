//! AES backends built on the RustCrypto `aes` crate.
//!
//! Both variants accept 128/192/256-bit keys and use separate encrypt and
//! decrypt round-key types, which zeroize themselves on drop. The accelerated
//! variant refuses to construct when the CPU lacks AES instructions.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128Dec, Aes128Enc, Aes192Dec, Aes192Enc, Aes256Dec, Aes256Enc, Block};
use vfc_core::{Algorithm, Direction};

use crate::block::{check_user_key, transform_block, BlockCipher, ExpandedKey, KeySchedule};
use crate::error::{CipherError, CipherResult};

/// AES block size in bytes
pub const AES_BLOCK_SIZE: usize = 16;

/// Largest AES round-key schedule: 15 round keys of 16 bytes (AES-256)
pub const AES_MAX_SCHEDULE: usize = 15 * AES_BLOCK_SIZE;

/// Returns true if this CPU exposes AES instructions.
pub fn is_accel_available() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        std::arch::is_x86_feature_detected!("aes")
    }
    #[cfg(target_arch = "aarch64")]
    {
        std::arch::is_aarch64_feature_detected!("aes")
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
    {
        false
    }
}

enum AesRoundKeys {
    Enc128(Aes128Enc),
    Enc192(Aes192Enc),
    Enc256(Aes256Enc),
    Dec128(Aes128Dec),
    Dec192(Aes192Dec),
    Dec256(Aes256Dec),
}

impl AesRoundKeys {
    fn expand(direction: Direction, key: &[u8]) -> CipherResult<Self> {
        let invalid = || CipherError::InvalidKeyMaterial {
            len: key.len(),
            reason: "AES accepts 16, 24 or 32 byte keys".into(),
        };
        let keys = match (direction, key.len()) {
            (Direction::Encrypt, 16) => Self::Enc128(Aes128Enc::new_from_slice(key).map_err(|_| invalid())?),
            (Direction::Encrypt, 24) => Self::Enc192(Aes192Enc::new_from_slice(key).map_err(|_| invalid())?),
            (Direction::Encrypt, 32) => Self::Enc256(Aes256Enc::new_from_slice(key).map_err(|_| invalid())?),
            (Direction::Decrypt, 16) => Self::Dec128(Aes128Dec::new_from_slice(key).map_err(|_| invalid())?),
            (Direction::Decrypt, 24) => Self::Dec192(Aes192Dec::new_from_slice(key).map_err(|_| invalid())?),
            (Direction::Decrypt, 32) => Self::Dec256(Aes256Dec::new_from_slice(key).map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };
        Ok(keys)
    }

    fn rounds(&self) -> usize {
        match self {
            Self::Enc128(_) | Self::Dec128(_) => 10,
            Self::Enc192(_) | Self::Dec192(_) => 12,
            Self::Enc256(_) | Self::Dec256(_) => 14,
        }
    }
}

impl ExpandedKey for AesRoundKeys {
    fn schedule_len(&self) -> usize {
        (self.rounds() + 1) * AES_BLOCK_SIZE
    }

    fn transform(&self, block: &mut [u8]) {
        let block = Block::from_mut_slice(block);
        match self {
            Self::Enc128(k) => k.encrypt_block(block),
            Self::Enc192(k) => k.encrypt_block(block),
            Self::Enc256(k) => k.encrypt_block(block),
            Self::Dec128(k) => k.decrypt_block(block),
            Self::Dec192(k) => k.decrypt_block(block),
            Self::Dec256(k) => k.decrypt_block(block),
        }
    }
}

/// AES block cipher backend
#[derive(Debug)]
pub struct AesCipher {
    algorithm: Algorithm,
    name: &'static str,
}

impl AesCipher {
    /// Portable AES, available on every target.
    pub fn portable() -> Self {
        Self {
            algorithm: Algorithm::Aes,
            name: "AES (portable)",
        }
    }

    /// Hardware-accelerated AES.
    pub fn accelerated() -> CipherResult<Self> {
        if !is_accel_available() {
            return Err(CipherError::ConstructionFailed {
                algorithm: Algorithm::AesAccel,
                reason: "CPU does not support AES instructions".into(),
            });
        }
        Ok(Self {
            algorithm: Algorithm::AesAccel,
            name: "AES (hardware accelerated)",
        })
    }

    fn set_key(
        &self,
        direction: Direction,
        schedule: &mut KeySchedule,
        user_key: &[u8],
        user_key_bits: u32,
    ) -> CipherResult<()> {
        check_user_key(user_key, user_key_bits)?;
        if schedule.direction() != direction {
            return Err(CipherError::InvalidArgument(format!(
                "{} schedule passed to set_{direction}_key",
                schedule.direction()
            )));
        }
        let keys = AesRoundKeys::expand(direction, user_key)?;
        schedule.install(Box::new(keys))
    }
}

impl BlockCipher for AesCipher {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn name(&self) -> &str {
        self.name
    }

    fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn key_size(&self) -> usize {
        AES_MAX_SCHEDULE
    }

    fn set_encrypt_key(&self, schedule: &mut KeySchedule, user_key: &[u8], user_key_bits: u32) -> CipherResult<()> {
        self.set_key(Direction::Encrypt, schedule, user_key, user_key_bits)
    }

    fn set_decrypt_key(&self, schedule: &mut KeySchedule, user_key: &[u8], user_key_bits: u32) -> CipherResult<()> {
        self.set_key(Direction::Decrypt, schedule, user_key, user_key_bits)
    }

    fn encrypt_block(&self, input: &[u8], output: &mut [u8], schedule: &KeySchedule) -> CipherResult<()> {
        transform_block(AES_BLOCK_SIZE, Direction::Encrypt, input, output, schedule)
    }

    fn decrypt_block(&self, input: &[u8], output: &mut [u8], schedule: &KeySchedule) -> CipherResult<()> {
        transform_block(AES_BLOCK_SIZE, Direction::Decrypt, input, output, schedule)
    }
}
