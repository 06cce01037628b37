//! Block-aligned stream wrappers.
//!
//! The raw streams may move any number of bytes per call; the wrappers
//! buffer so the cipher context only ever sees whole blocks.

use std::io::{self, Read, Write};
use vfc_cipher::CipherContext;
use zeroize::Zeroizing;

use crate::error::ResolveError;
use crate::format::{pad, unpadded_len};

const READ_CHUNK: usize = 8 * 1024;

/// Decrypts a container body as it is read.
///
/// The last ciphertext block is held back until the raw stream reports
/// end-of-stream, since only then is it known to carry the padding.
pub struct DecryptingReader<R> {
    inner: R,
    ctx: CipherContext,
    block_size: usize,
    /// Ciphertext read but not yet decrypted
    pending: Zeroizing<Vec<u8>>,
    /// Decrypted bytes not yet handed out
    ready: Zeroizing<Vec<u8>>,
    ready_pos: usize,
    done: bool,
    failed: bool,
}

impl<R: Read> DecryptingReader<R> {
    /// `ctx` must be keyed with its decrypt IV set.
    pub fn new(inner: R, ctx: CipherContext) -> Self {
        let block_size = ctx.block_size();
        Self {
            inner,
            ctx,
            block_size,
            pending: Zeroizing::new(Vec::new()),
            ready: Zeroizing::new(Vec::new()),
            ready_pos: 0,
            done: false,
            failed: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn refill(&mut self) -> io::Result<()> {
        let start = self.pending.len();
        self.pending.resize(start + READ_CHUNK, 0);
        let n = loop {
            match self.inner.read(&mut self.pending[start..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.pending.truncate(start);
                    return Err(e);
                }
            }
        };
        self.pending.truncate(start + n);

        self.ready.clear();
        self.ready_pos = 0;
        let processed = if n == 0 {
            self.finish_body()
        } else {
            self.decrypt_available()
        };
        // chaining state is unusable after a failed block operation
        self.failed = processed.is_err();
        processed
    }

    /// Decrypt every whole block except the last one seen so far.
    fn decrypt_available(&mut self) -> io::Result<()> {
        let whole = self.pending.len() - self.pending.len() % self.block_size;
        let take = whole.saturating_sub(self.block_size);
        if take == 0 {
            return Ok(());
        }
        self.ctx
            .decrypt_in_place(&mut self.pending[..take])
            .map_err(|e| ResolveError::from(e).into_io())?;
        self.ready.extend_from_slice(&self.pending[..take]);
        self.pending.drain(..take);
        Ok(())
    }

    fn finish_body(&mut self) -> io::Result<()> {
        self.done = true;
        if self.pending.is_empty() {
            return Err(ResolveError::Format("body is empty; padding block missing".into()).into_io());
        }
        if self.pending.len() % self.block_size != 0 {
            return Err(ResolveError::Format(format!(
                "body is truncated: {} trailing bytes do not form a block",
                self.pending.len() % self.block_size
            ))
            .into_io());
        }
        self.ctx
            .decrypt_in_place(&mut self.pending)
            .map_err(|e| ResolveError::from(e).into_io())?;
        let last = self.pending.len() - self.block_size;
        let keep = last + unpadded_len(&self.pending[last..]).map_err(ResolveError::into_io)?;
        self.ready.extend_from_slice(&self.pending[..keep]);
        self.pending.clear();
        Ok(())
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.ready_pos < self.ready.len() {
                let n = buf.len().min(self.ready.len() - self.ready_pos);
                buf[..n].copy_from_slice(&self.ready[self.ready_pos..self.ready_pos + n]);
                self.ready_pos += n;
                return Ok(n);
            }
            if self.failed {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "decryption already failed"));
            }
            if self.done {
                return Ok(0);
            }
            self.refill()?;
        }
    }
}

/// Encrypts everything written into a container body.
///
/// Partial blocks are buffered. [`finish`](Self::finish) must be called to
/// write the padded final block; dropping the writer without it leaves a
/// truncated body that will not decrypt.
///
/// Once a block fails to encrypt or reach the raw stream, every later call
/// fails too: the chaining state has moved past bytes that were never stored.
pub struct EncryptingWriter<W> {
    inner: W,
    ctx: CipherContext,
    block_size: usize,
    pending: Zeroizing<Vec<u8>>,
    failed: bool,
}

impl<W: Write> EncryptingWriter<W> {
    /// `ctx` must be keyed with its encrypt IV set.
    pub fn new(inner: W, ctx: CipherContext) -> Self {
        let block_size = ctx.block_size();
        Self {
            inner,
            ctx,
            block_size,
            pending: Zeroizing::new(Vec::new()),
            failed: false,
        }
    }

    /// Pad, encrypt and write the final block; return the raw stream.
    pub fn finish(mut self) -> io::Result<W> {
        self.check_usable()?;
        pad(&mut self.pending, self.block_size);
        let len = self.pending.len();
        self.seal(len)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn check_usable(&self) -> io::Result<()> {
        if self.failed {
            return Err(io::Error::new(io::ErrorKind::Other, "encryption already failed"));
        }
        Ok(())
    }

    /// Encrypt and store the first `len` pending bytes.
    fn seal(&mut self, len: usize) -> io::Result<()> {
        let sealed = self
            .ctx
            .encrypt_in_place(&mut self.pending[..len])
            .map_err(|e| ResolveError::from(e).into_io())
            .and_then(|()| self.inner.write_all(&self.pending[..len]));
        self.failed = sealed.is_err();
        sealed
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_usable()?;
        self.pending.extend_from_slice(buf);
        let whole = self.pending.len() - self.pending.len() % self.block_size;
        if whole > 0 {
            self.seal(whole)?;
            self.pending.drain(..whole);
        }
        Ok(buf.len())
    }

    /// Flushes the raw stream; a buffered partial block stays buffered.
    fn flush(&mut self) -> io::Result<()> {
        self.check_usable()?;
        self.inner.flush()
    }
}
