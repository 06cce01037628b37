//! Encrypted resource resolution.
//!
//! Per open request:
//!
//! ```text
//! Unresolved ─► SchemeChecked ─┬─► PlainOpen
//!                              └─► SecretRequested ─► KeyDerived ─► DecryptingOpen
//! ```
//!
//! A resource without an encryption flag is handed back untouched; the secret
//! source and cipher registry are not consulted. Any failure after
//! `SchemeChecked` aborts the whole open.

use rand::RngCore;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::debug;
use vfc_cipher::{derive_key, generate_salt, CipherContext, CipherRegistry, KdfParams};
use vfc_core::config::VfcConfig;
use vfc_core::Algorithm;
use vfc_keyring::SecretSource;

use crate::error::{ResolveError, ResolveResult};
use crate::format::{check_kdf, Header, IV_SIZE};
use crate::policy::{encryption_params, EncryptionParams, SchemeKind};
use crate::resource::ResourceHandle;
use crate::staged::StagedFile;
use crate::stream::{DecryptingReader, EncryptingWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenState {
    Unresolved,
    SchemeChecked,
    PlainOpen,
    SecretRequested,
    KeyDerived,
    DecryptingOpen,
}

impl fmt::Display for OpenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpenState::Unresolved => "unresolved",
            OpenState::SchemeChecked => "scheme-checked",
            OpenState::PlainOpen => "plain-open",
            OpenState::SecretRequested => "secret-requested",
            OpenState::KeyDerived => "key-derived",
            OpenState::DecryptingOpen => "decrypting-open",
        };
        f.write_str(name)
    }
}

const PLAIN_TRAIL: &[OpenState] = &[OpenState::Unresolved, OpenState::SchemeChecked, OpenState::PlainOpen];

const DECRYPTING_TRAIL: &[OpenState] = &[
    OpenState::Unresolved,
    OpenState::SchemeChecked,
    OpenState::SecretRequested,
    OpenState::KeyDerived,
    OpenState::DecryptingOpen,
];

/// A resource opened for reading.
pub enum OpenedResource<R> {
    Plain(R),
    Decrypting {
        reader: DecryptingReader<R>,
        algorithm: Algorithm,
    },
}

impl<R> OpenedResource<R> {
    /// States the open went through, in order.
    pub fn states(&self) -> &'static [OpenState] {
        match self {
            OpenedResource::Plain(_) => PLAIN_TRAIL,
            OpenedResource::Decrypting { .. } => DECRYPTING_TRAIL,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, OpenedResource::Decrypting { .. })
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        match self {
            OpenedResource::Plain(_) => None,
            OpenedResource::Decrypting { algorithm, .. } => Some(*algorithm),
        }
    }
}

impl<R: Read> Read for OpenedResource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            OpenedResource::Plain(inner) => inner.read(buf),
            OpenedResource::Decrypting { reader, .. } => reader.read(buf),
        }
    }
}

/// A resource opened for writing.
pub enum CreatedResource<W> {
    Plain(W),
    Encrypting {
        writer: EncryptingWriter<W>,
        algorithm: Algorithm,
    },
}

impl<W: Write> CreatedResource<W> {
    pub fn states(&self) -> &'static [OpenState] {
        match self {
            CreatedResource::Plain(_) => PLAIN_TRAIL,
            CreatedResource::Encrypting { .. } => DECRYPTING_TRAIL,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, CreatedResource::Encrypting { .. })
    }

    /// Complete the resource (writing the padded final block when encrypted)
    /// and return the raw stream.
    pub fn finish(self) -> io::Result<W> {
        match self {
            CreatedResource::Plain(mut inner) => {
                inner.flush()?;
                Ok(inner)
            }
            CreatedResource::Encrypting { writer, .. } => writer.finish(),
        }
    }
}

impl CreatedResource<StagedFile> {
    /// Finish the resource and move it over its destination.
    pub fn commit(self) -> io::Result<()> {
        self.finish()?.commit()
    }
}

impl<W: Write> Write for CreatedResource<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CreatedResource::Plain(inner) => inner.write(buf),
            CreatedResource::Encrypting { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CreatedResource::Plain(inner) => inner.flush(),
            CreatedResource::Encrypting { writer, .. } => writer.flush(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Secret location used when a resource names none
    pub default_location: String,
    /// Algorithm for new resources that name none
    pub default_algorithm: Algorithm,
    /// Argon2id cost for new resources
    pub kdf: KdfParams,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            default_location: "default".into(),
            default_algorithm: Algorithm::Aes,
            kdf: KdfParams::default(),
        }
    }
}

impl From<&VfcConfig> for ResolverOptions {
    fn from(config: &VfcConfig) -> Self {
        Self {
            default_location: config.store.default_location.clone(),
            default_algorithm: config.crypto.default_algorithm,
            kdf: KdfParams::from(&config.crypto),
        }
    }
}

pub struct EncryptedResourceResolver<S> {
    secrets: S,
    registry: CipherRegistry,
    options: ResolverOptions,
}

impl<S: SecretSource> EncryptedResourceResolver<S> {
    pub fn new(secrets: S, registry: CipherRegistry, options: ResolverOptions) -> Self {
        Self {
            secrets,
            registry,
            options,
        }
    }

    /// Resolver over the process-wide cipher registry.
    pub fn from_config(secrets: S, config: &VfcConfig) -> Self {
        Self::new(secrets, CipherRegistry::global(), ResolverOptions::from(config))
    }

    pub fn secrets(&self) -> &S {
        &self.secrets
    }

    pub fn registry(&self) -> &CipherRegistry {
        &self.registry
    }

    /// Open `raw` (the resource's stored bytes) for reading.
    pub async fn open_read<H, R>(&self, handle: &H, mut raw: R) -> ResolveResult<OpenedResource<R>>
    where
        H: ResourceHandle + ?Sized,
        R: Read,
    {
        let Some(params) = self.check_scheme(handle)? else {
            trace(handle, OpenState::PlainOpen);
            return Ok(OpenedResource::Plain(raw));
        };

        let header = Header::read_from(&mut raw)?;
        if let Some(declared) = params.algorithm {
            if declared != header.algorithm {
                return Err(ResolveError::AlgorithmMismatch {
                    declared,
                    found: header.algorithm,
                });
            }
        }

        let location = self.location(&params);
        trace(handle, OpenState::SecretRequested);
        let passphrase = self.secrets.read_secret(location).await?;

        let cipher = self.registry.get(header.algorithm)?;
        let mut ctx = CipherContext::bind_named(cipher, handle.path())?;
        check_block_size(&ctx)?;
        let key = derive_key(passphrase.as_secret(), &header.salt, &header.kdf)?;
        drop(passphrase);
        if key.check_value() != header.key_check {
            return Err(ResolveError::WrongPassphrase);
        }
        ctx.set_key(key.as_bytes())?;
        ctx.set_decrypt_iv(&header.iv)?;
        trace(handle, OpenState::KeyDerived);

        trace(handle, OpenState::DecryptingOpen);
        Ok(OpenedResource::Decrypting {
            reader: DecryptingReader::new(raw, ctx),
            algorithm: header.algorithm,
        })
    }

    /// Open `raw` for writing the resource's stored bytes.
    ///
    /// Encrypted resources get a fresh salt and IV; the header is written
    /// before this returns.
    pub async fn open_write<H, W>(&self, handle: &H, raw: W) -> ResolveResult<CreatedResource<W>>
    where
        H: ResourceHandle + ?Sized,
        W: Write,
    {
        let keyed = self.prepare_write(handle).await?;
        start_write(handle, keyed, raw)
    }

    /// Open a `file` or `vfile` resource from the local filesystem.
    pub async fn open_path_read<H>(&self, handle: &H) -> ResolveResult<OpenedResource<File>>
    where
        H: ResourceHandle + ?Sized,
    {
        let file = File::open(local_path(handle)?)?;
        self.open_read(handle, file).await
    }

    /// Create a `file` or `vfile` resource on the local filesystem.
    ///
    /// Bytes go to a staging file next to the destination; an existing file
    /// is only replaced by [`CreatedResource::commit`].
    pub async fn create_path<H>(&self, handle: &H) -> ResolveResult<CreatedResource<StagedFile>>
    where
        H: ResourceHandle + ?Sized,
    {
        let path = Path::new(local_path(handle)?);
        let keyed = self.prepare_write(handle).await?;
        let staged = StagedFile::create(path)?;
        start_write(handle, keyed, staged)
    }

    /// Everything a write can fail on before the first byte is stored: the
    /// scheme, the secret, the cipher and the key. `None` for plain resources.
    async fn prepare_write<H>(&self, handle: &H) -> ResolveResult<Option<(CipherContext, Header)>>
    where
        H: ResourceHandle + ?Sized,
    {
        let Some(params) = self.check_scheme(handle)? else {
            return Ok(None);
        };
        let algorithm = params.algorithm.unwrap_or(self.options.default_algorithm);
        check_kdf(&self.options.kdf)?;

        let location = self.location(&params);
        trace(handle, OpenState::SecretRequested);
        let passphrase = self.secrets.read_secret(location).await?;

        let cipher = self.registry.get(algorithm)?;
        let mut ctx = CipherContext::bind_named(cipher, handle.path())?;
        check_block_size(&ctx)?;
        let salt = generate_salt();
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        let key = derive_key(passphrase.as_secret(), &salt, &self.options.kdf)?;
        drop(passphrase);
        ctx.set_key(key.as_bytes())?;
        ctx.set_encrypt_iv(&iv)?;
        trace(handle, OpenState::KeyDerived);

        let header = Header {
            algorithm,
            kdf: self.options.kdf,
            salt,
            iv,
            key_check: key.check_value(),
        };
        Ok(Some((ctx, header)))
    }

    fn check_scheme<H: ResourceHandle + ?Sized>(&self, handle: &H) -> ResolveResult<Option<EncryptionParams>> {
        trace(handle, OpenState::Unresolved);
        let params = encryption_params(handle)?;
        trace(handle, OpenState::SchemeChecked);
        Ok(params)
    }

    fn location<'a>(&'a self, params: &'a EncryptionParams) -> &'a str {
        params
            .location
            .as_deref()
            .unwrap_or(&self.options.default_location)
    }
}

impl<S> fmt::Debug for EncryptedResourceResolver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedResourceResolver")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish()
    }
}

fn trace<H: ResourceHandle + ?Sized>(handle: &H, state: OpenState) {
    debug!(scheme = handle.scheme(), path = handle.path(), %state, "resolve");
}

fn start_write<H, W>(handle: &H, keyed: Option<(CipherContext, Header)>, mut raw: W) -> ResolveResult<CreatedResource<W>>
where
    H: ResourceHandle + ?Sized,
    W: Write,
{
    let Some((ctx, header)) = keyed else {
        trace(handle, OpenState::PlainOpen);
        return Ok(CreatedResource::Plain(raw));
    };
    header.write_to(&mut raw)?;
    trace(handle, OpenState::DecryptingOpen);
    Ok(CreatedResource::Encrypting {
        writer: EncryptingWriter::new(raw, ctx),
        algorithm: header.algorithm,
    })
}

fn local_path<H: ResourceHandle + ?Sized>(handle: &H) -> ResolveResult<&str> {
    match handle.scheme() {
        "file" | "vfile" => Ok(handle.path()),
        other => {
            SchemeKind::of(other)?;
            Err(ResolveError::NotLocal(other.to_string()))
        }
    }
}

fn check_block_size(ctx: &CipherContext) -> ResolveResult<()> {
    if ctx.block_size() != IV_SIZE {
        return Err(ResolveError::Format(format!(
            "{} has a {}-byte block; containers need {IV_SIZE}",
            ctx.algorithm(),
            ctx.block_size()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourcePath;
    use vfc_keyring::{Passphrase, SecretResult};

    struct Unreachable;

    impl SecretSource for Unreachable {
        async fn read_secret(&self, location: &str) -> SecretResult<Passphrase> {
            panic!("secret requested for {location}");
        }
    }

    #[test]
    fn options_follow_config() {
        let mut config = VfcConfig::default();
        config.store.default_location = "ops/main".into();
        config.crypto.argon2_time_cost = 7;
        let options = ResolverOptions::from(&config);
        assert_eq!(options.default_location, "ops/main");
        assert_eq!(options.kdf.time_cost, 7);
        assert_eq!(options.default_algorithm, Algorithm::Aes);
    }

    #[test]
    fn plain_write_passes_bytes_through() {
        let resolver = EncryptedResourceResolver::new(Unreachable, CipherRegistry::new(), ResolverOptions::default());
        let handle = ResourcePath::parse("file:/tmp/out").unwrap();

        let mut created = tokio_test::block_on(resolver.open_write(&handle, Vec::new())).unwrap();
        assert!(!created.is_encrypted());
        assert_eq!(created.states().last(), Some(&OpenState::PlainOpen));
        created.write_all(b"as-is").unwrap();
        assert_eq!(created.finish().unwrap(), b"as-is");
    }

    #[test]
    fn state_names() {
        let names: Vec<String> = DECRYPTING_TRAIL.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            ["unresolved", "scheme-checked", "secret-requested", "key-derived", "decrypting-open"]
        );
    }
}
