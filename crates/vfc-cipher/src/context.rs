//! Block-chained (CBC) encryption context over a shared [`BlockCipher`].
//!
//! ```text
//! encrypt:  C[i] = E(P[i] ^ IV_enc);  IV_enc = C[i]
//! decrypt:  P[i] = D(C[i]) ^ IV_dec;  IV_dec = C[i]
//! ```
//!
//! The two chaining states are independent: encrypting never disturbs an
//! in-progress decrypt stream on the same context and vice versa. Callers
//! pass whole blocks only; padding belongs to the stream framing layer.

use std::fmt;
use std::sync::Arc;
use vfc_core::{Algorithm, Direction};
use zeroize::Zeroizing;

use crate::block::{ensure_supported, BlockCipher, KeySchedule};
use crate::error::{CipherError, CipherResult};

pub struct CipherContext {
    cipher: Arc<dyn BlockCipher>,
    block_size: usize,
    encrypt_key: Option<Arc<KeySchedule>>,
    decrypt_key: Option<Arc<KeySchedule>>,
    encrypt_iv: Zeroizing<Vec<u8>>,
    decrypt_iv: Zeroizing<Vec<u8>>,
    scratch: Zeroizing<Vec<u8>>,
    name: String,
}

fn alloc_block(block_size: usize) -> CipherResult<Zeroizing<Vec<u8>>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(block_size)
        .map_err(|_| CipherError::AllocationFailed { bytes: block_size })?;
    buf.resize(block_size, 0);
    Ok(Zeroizing::new(buf))
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    dst.iter_mut().zip(src).for_each(|(d, s)| *d ^= s);
}

impl CipherContext {
    /// Bind a new context to `cipher` with zeroed chaining state.
    pub fn bind(cipher: Arc<dyn BlockCipher>) -> CipherResult<Self> {
        Self::bind_named(cipher, "")
    }

    /// Bind a context labelled with the resource it serves (diagnostics only).
    pub fn bind_named(cipher: Arc<dyn BlockCipher>, name: impl Into<String>) -> CipherResult<Self> {
        ensure_supported(&*cipher)?;
        let block_size = cipher.block_size();
        if block_size == 0 {
            return Err(CipherError::InvalidArgument(format!(
                "cipher '{}' reports a zero block size",
                cipher.name()
            )));
        }
        Ok(CipherContext {
            encrypt_iv: alloc_block(block_size)?,
            decrypt_iv: alloc_block(block_size)?,
            scratch: alloc_block(block_size)?,
            encrypt_key: None,
            decrypt_key: None,
            block_size,
            cipher,
            name: name.into(),
        })
    }

    /// Expand `key` into both the encrypt and decrypt schedules.
    ///
    /// Leaves the chaining state untouched. On failure neither schedule is
    /// replaced.
    pub fn set_key(&mut self, key: &[u8]) -> CipherResult<()> {
        if key.is_empty() {
            return Err(CipherError::InvalidKeyMaterial {
                len: 0,
                reason: "empty key".into(),
            });
        }
        let bits = u32::try_from(key.len() * 8).map_err(|_| CipherError::InvalidKeyMaterial {
            len: key.len(),
            reason: "key too long".into(),
        })?;

        let capacity = self.cipher.key_size();
        let mut encrypt = KeySchedule::new(Direction::Encrypt, capacity);
        let mut decrypt = KeySchedule::new(Direction::Decrypt, capacity);
        self.cipher.set_encrypt_key(&mut encrypt, key, bits)?;
        self.cipher.set_decrypt_key(&mut decrypt, key, bits)?;

        self.encrypt_key = Some(Arc::new(encrypt));
        self.decrypt_key = Some(Arc::new(decrypt));
        tracing::debug!(
            resource = %self.name,
            algorithm = %self.cipher.algorithm(),
            key_bits = bits,
            "cipher context keyed"
        );
        Ok(())
    }

    /// Set both chaining states to `iv`.
    pub fn set_iv(&mut self, iv: &[u8]) -> CipherResult<()> {
        self.set_encrypt_iv(iv)?;
        self.set_decrypt_iv(iv)
    }

    pub fn set_encrypt_iv(&mut self, iv: &[u8]) -> CipherResult<()> {
        self.check_iv(iv)?;
        self.encrypt_iv.copy_from_slice(iv);
        Ok(())
    }

    pub fn set_decrypt_iv(&mut self, iv: &[u8]) -> CipherResult<()> {
        self.check_iv(iv)?;
        self.decrypt_iv.copy_from_slice(iv);
        Ok(())
    }

    /// Encrypt `input` into `output` (same length, whole blocks).
    pub fn encrypt(&mut self, input: &[u8], output: &mut [u8]) -> CipherResult<()> {
        self.check_pair(input, output)?;
        output.copy_from_slice(input);
        self.encrypt_in_place(output)
    }

    /// Decrypt `input` into `output` (same length, whole blocks).
    pub fn decrypt(&mut self, input: &[u8], output: &mut [u8]) -> CipherResult<()> {
        self.check_pair(input, output)?;
        output.copy_from_slice(input);
        self.decrypt_in_place(output)
    }

    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) -> CipherResult<()> {
        let key = self
            .encrypt_key
            .clone()
            .ok_or(CipherError::NotInitialized(Direction::Encrypt))?;
        self.check_len(buf.len())?;

        for block in buf.chunks_exact_mut(self.block_size) {
            self.scratch.copy_from_slice(block);
            xor_into(&mut self.scratch, &self.encrypt_iv);
            self.cipher.encrypt_block(&self.scratch, block, &key)?;
            self.encrypt_iv.copy_from_slice(block);
        }
        Ok(())
    }

    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) -> CipherResult<()> {
        let key = self
            .decrypt_key
            .clone()
            .ok_or(CipherError::NotInitialized(Direction::Decrypt))?;
        self.check_len(buf.len())?;

        for block in buf.chunks_exact_mut(self.block_size) {
            // scratch keeps the ciphertext: it becomes the next chaining value
            self.scratch.copy_from_slice(block);
            self.cipher.decrypt_block(&self.scratch, block, &key)?;
            xor_into(block, &self.decrypt_iv);
            std::mem::swap(&mut self.decrypt_iv, &mut self.scratch);
        }
        Ok(())
    }

    /// A new context sharing this one's key schedules with fresh, zeroed
    /// chaining state.
    ///
    /// Use one fork per concurrent stream; a single context must not be
    /// driven from two threads at once.
    pub fn fork(&self) -> CipherResult<Self> {
        Ok(CipherContext {
            cipher: self.cipher.clone(),
            block_size: self.block_size,
            encrypt_key: self.encrypt_key.clone(),
            decrypt_key: self.decrypt_key.clone(),
            encrypt_iv: alloc_block(self.block_size)?,
            decrypt_iv: alloc_block(self.block_size)?,
            scratch: alloc_block(self.block_size)?,
            name: self.name.clone(),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn algorithm(&self) -> Algorithm {
        self.cipher.algorithm()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_keyed(&self) -> bool {
        self.encrypt_key.is_some() && self.decrypt_key.is_some()
    }

    /// Current encrypt-direction chaining value.
    pub fn encrypt_iv(&self) -> &[u8] {
        &self.encrypt_iv
    }

    /// Current decrypt-direction chaining value.
    pub fn decrypt_iv(&self) -> &[u8] {
        &self.decrypt_iv
    }

    fn check_iv(&self, iv: &[u8]) -> CipherResult<()> {
        if iv.len() != self.block_size {
            return Err(CipherError::InvalidArgument(format!(
                "IV must be {} bytes, got {}",
                self.block_size,
                iv.len()
            )));
        }
        Ok(())
    }

    fn check_len(&self, len: usize) -> CipherResult<()> {
        if len % self.block_size != 0 {
            return Err(CipherError::InvalidBufferLength {
                len,
                block_size: self.block_size,
            });
        }
        Ok(())
    }

    fn check_pair(&self, input: &[u8], output: &[u8]) -> CipherResult<()> {
        if input.len() != output.len() {
            return Err(CipherError::InvalidArgument(format!(
                "input is {} bytes but output is {}",
                input.len(),
                output.len()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherContext")
            .field("name", &self.name)
            .field("algorithm", &self.cipher.algorithm())
            .field("block_size", &self.block_size)
            .field("keyed", &self.is_keyed())
            .finish()
    }
}
