//! The block-cipher plug-in contract.
//!
//! A [`BlockCipher`] is a stateless capability object for one algorithm
//! variant: it knows its block and key-schedule sizes, expands user keys into
//! a [`KeySchedule`], and transforms exactly one block at a time. Chaining,
//! IV handling and buffering live in [`crate::context::CipherContext`].

use std::fmt;
use vfc_core::{Algorithm, Direction};

use crate::error::{CipherError, CipherResult};

/// Interface version implemented by a backend.
///
/// Minor bumps append optional operations and stay compatible; a different
/// major version means the call contract changed and the backend is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceVersion {
    pub major: u16,
    pub minor: u16,
}

impl fmt::Display for InterfaceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The interface version this build of the crate speaks.
pub const INTERFACE_VERSION: InterfaceVersion = InterfaceVersion { major: 1, minor: 0 };

/// Fail unless `cipher` speaks a major version this build understands.
pub fn ensure_supported(cipher: &dyn BlockCipher) -> CipherResult<()> {
    let found = cipher.interface_version();
    if found.major != INTERFACE_VERSION.major {
        return Err(CipherError::UnsupportedInterfaceVersion {
            name: cipher.name().to_string(),
            found,
            supported: INTERFACE_VERSION.major,
        });
    }
    Ok(())
}

/// Algorithm-specific expanded key for one direction.
pub trait ExpandedKey: Send + Sync {
    /// Size of the expanded schedule in bytes.
    fn schedule_len(&self) -> usize;

    /// Transform one block in place in the schedule's direction.
    ///
    /// Callers guarantee `block.len()` equals the cipher's block size.
    fn transform(&self, block: &mut [u8]);
}

/// Storage for one direction's key schedule.
///
/// Allocated by the context with the bound cipher's `key_size()` as capacity
/// and filled by the cipher's `set_encrypt_key` / `set_decrypt_key`.
pub struct KeySchedule {
    direction: Direction,
    capacity: usize,
    expanded: Option<Box<dyn ExpandedKey>>,
}

impl KeySchedule {
    pub fn new(direction: Direction, capacity: usize) -> Self {
        Self {
            direction,
            capacity,
            expanded: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_set(&self) -> bool {
        self.expanded.is_some()
    }

    /// Bytes occupied by the installed schedule (0 when unset).
    pub fn len(&self) -> usize {
        self.expanded.as_ref().map_or(0, |k| k.schedule_len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install an expanded key produced by a backend.
    pub fn install(&mut self, expanded: Box<dyn ExpandedKey>) -> CipherResult<()> {
        if expanded.schedule_len() > self.capacity {
            return Err(CipherError::InvalidArgument(format!(
                "expanded key of {} bytes exceeds schedule capacity {}",
                expanded.schedule_len(),
                self.capacity
            )));
        }
        self.expanded = Some(expanded);
        Ok(())
    }

    /// Drop the installed key material.
    pub fn clear(&mut self) {
        self.expanded = None;
    }

    pub fn expanded(&self) -> CipherResult<&dyn ExpandedKey> {
        self.expanded
            .as_deref()
            .ok_or(CipherError::NotInitialized(self.direction))
    }
}

impl fmt::Debug for KeySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySchedule")
            .field("direction", &self.direction)
            .field("capacity", &self.capacity)
            .field("set", &self.is_set())
            .finish()
    }
}

/// A single-block cipher primitive over one algorithm variant.
///
/// Instances are shared (`Arc<dyn BlockCipher>`) between the registry and
/// every context bound to them, so all methods take `&self`; per-key state
/// lives in the caller-owned [`KeySchedule`]. Block size and key-schedule
/// size must not change over the lifetime of an instance.
pub trait BlockCipher: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Human-readable backend name
    fn name(&self) -> &str;

    fn interface_version(&self) -> InterfaceVersion {
        INTERFACE_VERSION
    }

    /// Block size in bytes
    fn block_size(&self) -> usize;

    /// Largest key schedule this backend produces, in bytes
    fn key_size(&self) -> usize;

    fn set_encrypt_key(
        &self,
        schedule: &mut KeySchedule,
        user_key: &[u8],
        user_key_bits: u32,
    ) -> CipherResult<()>;

    fn set_decrypt_key(
        &self,
        schedule: &mut KeySchedule,
        user_key: &[u8],
        user_key_bits: u32,
    ) -> CipherResult<()>;

    fn encrypt_block(&self, input: &[u8], output: &mut [u8], schedule: &KeySchedule) -> CipherResult<()>;

    fn decrypt_block(&self, input: &[u8], output: &mut [u8], schedule: &KeySchedule) -> CipherResult<()>;
}

impl fmt::Debug for dyn BlockCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCipher")
            .field("algorithm", &self.algorithm())
            .field("name", &self.name())
            .field("version", &self.interface_version())
            .field("block_size", &self.block_size())
            .finish()
    }
}

/// Shared single-block transform used by backends whose schedules carry all
/// algorithm state.
pub fn transform_block(
    block_size: usize,
    direction: Direction,
    input: &[u8],
    output: &mut [u8],
    schedule: &KeySchedule,
) -> CipherResult<()> {
    if input.len() != block_size || output.len() != block_size {
        return Err(CipherError::InvalidArgument(format!(
            "block operation needs {block_size}-byte buffers, got in={} out={}",
            input.len(),
            output.len()
        )));
    }
    if schedule.direction() != direction {
        return Err(CipherError::InvalidArgument(format!(
            "{} schedule passed to {direction} operation",
            schedule.direction()
        )));
    }
    let key = schedule.expanded()?;
    output.copy_from_slice(input);
    key.transform(output);
    Ok(())
}

/// Validate the user key arguments common to every `set_*_key` call.
pub fn check_user_key(user_key: &[u8], user_key_bits: u32) -> CipherResult<()> {
    if user_key.is_empty() {
        return Err(CipherError::InvalidArgument("empty user key".into()));
    }
    if user_key_bits as usize != user_key.len() * 8 {
        return Err(CipherError::InvalidArgument(format!(
            "user key is {} bytes but {user_key_bits} bits were declared",
            user_key.len()
        )));
    }
    Ok(())
}
