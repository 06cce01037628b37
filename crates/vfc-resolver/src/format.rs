//! Encrypted container framing.
//!
//! ```text
//! offset  size  field
//!      0     8  magic "VFCRYPT\0"
//!      8     1  format version (1)
//!      9     1  algorithm tag (registry slot index)
//!     10     4  Argon2id memory cost, KiB   (u32 BE)
//!     14     4  Argon2id time cost          (u32 BE)
//!     18     4  Argon2id parallelism        (u32 BE)
//!     22    16  salt
//!     38    16  IV
//!     54    16  key check value
//!     70     …  CBC ciphertext, PKCS#7 padded (at least one block)
//! ```

use std::io::{self, Read, Write};
use vfc_cipher::{KdfParams, KEY_CHECK_SIZE, SALT_SIZE};
use vfc_core::Algorithm;

use crate::error::{ResolveError, ResolveResult};

pub const MAGIC: [u8; 8] = *b"VFCRYPT\0";
pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 70;

/// Containers carry one 16-byte IV, so only 16-byte block ciphers fit.
pub const IV_SIZE: usize = 16;

/// Argon2id cost ceilings; a header is decoded before its key check value can
/// be verified, so these bound the work an arbitrary file can demand.
pub const MAX_MEM_COST_KIB: u32 = 1024 * 1024;
pub const MAX_TIME_COST: u32 = 16;
pub const MAX_PARALLELISM: u32 = 64;

/// Reject Argon2id costs above the ceilings.
pub fn check_kdf(kdf: &KdfParams) -> ResolveResult<()> {
    let over = |what: &str, value: u32, max: u32| {
        Err(ResolveError::Format(format!("Argon2 {what} {value} exceeds {max}")))
    };
    if kdf.mem_cost_kib > MAX_MEM_COST_KIB {
        return over("memory cost (KiB)", kdf.mem_cost_kib, MAX_MEM_COST_KIB);
    }
    if kdf.time_cost > MAX_TIME_COST {
        return over("time cost", kdf.time_cost, MAX_TIME_COST);
    }
    if kdf.parallelism > MAX_PARALLELISM {
        return over("parallelism", kdf.parallelism, MAX_PARALLELISM);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub algorithm: Algorithm,
    pub kdf: KdfParams,
    pub salt: [u8; SALT_SIZE],
    pub iv: [u8; IV_SIZE],
    pub key_check: [u8; KEY_CHECK_SIZE],
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(&MAGIC);
        out[8] = FORMAT_VERSION;
        out[9] = self.algorithm.index() as u8;
        out[10..14].copy_from_slice(&self.kdf.mem_cost_kib.to_be_bytes());
        out[14..18].copy_from_slice(&self.kdf.time_cost.to_be_bytes());
        out[18..22].copy_from_slice(&self.kdf.parallelism.to_be_bytes());
        out[22..38].copy_from_slice(&self.salt);
        out[38..54].copy_from_slice(&self.iv);
        out[54..70].copy_from_slice(&self.key_check);
        out
    }

    pub fn decode(raw: &[u8; HEADER_LEN]) -> ResolveResult<Self> {
        if raw[..8] != MAGIC {
            return Err(ResolveError::Format("bad magic; not a vfcrypt container".into()));
        }
        if raw[8] != FORMAT_VERSION {
            return Err(ResolveError::Format(format!("unsupported format version {}", raw[8])));
        }
        let algorithm = Algorithm::from_index(raw[9] as usize)
            .ok_or_else(|| ResolveError::Format(format!("unknown algorithm tag {}", raw[9])))?;

        let be = |at: usize| u32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let kdf = KdfParams {
            mem_cost_kib: be(10),
            time_cost: be(14),
            parallelism: be(18),
        };
        check_kdf(&kdf)?;

        let mut header = Header {
            algorithm,
            kdf,
            salt: [0u8; SALT_SIZE],
            iv: [0u8; IV_SIZE],
            key_check: [0u8; KEY_CHECK_SIZE],
        };
        header.salt.copy_from_slice(&raw[22..38]);
        header.iv.copy_from_slice(&raw[38..54]);
        header.key_check.copy_from_slice(&raw[54..70]);
        Ok(header)
    }

    pub fn read_from<R: Read>(reader: &mut R) -> ResolveResult<Self> {
        let mut raw = [0u8; HEADER_LEN];
        reader.read_exact(&mut raw).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ResolveError::Format("truncated header".into()),
            _ => ResolveError::Io(e),
        })?;
        Self::decode(&raw)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.encode())
    }
}

/// Append PKCS#7 padding so `buf` becomes a whole number of blocks.
/// Always adds between 1 and `block_size` bytes.
pub fn pad(buf: &mut Vec<u8>, block_size: usize) {
    let n = block_size - buf.len() % block_size;
    buf.resize(buf.len() + n, n as u8);
}

/// Length of the data in a padded final block.
pub fn unpadded_len(last_block: &[u8]) -> ResolveResult<usize> {
    let bad = || ResolveError::Format("invalid padding; wrong key or corrupted data".into());
    let n = *last_block.last().ok_or_else(bad)? as usize;
    if n == 0 || n > last_block.len() {
        return Err(bad());
    }
    if last_block[last_block.len() - n..].iter().any(|&b| b as usize != n) {
        return Err(bad());
    }
    Ok(last_block.len() - n)
}
