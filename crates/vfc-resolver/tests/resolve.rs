use std::io::{Cursor, ErrorKind, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use vfc_cipher::{CipherRegistry, KdfParams};
use vfc_core::Algorithm;
use vfc_keyring::{AccessMode, ChannelConfig, Passphrase, SecretChannel, SecretResult, SecretSource};
use vfc_resolver::format::HEADER_LEN;
use vfc_resolver::{EncryptedResourceResolver, OpenState, ResolveError, ResolverOptions, ResourcePath};

/// In-memory secret holder that records every request.
struct FakeSecrets {
    secret: Vec<u8>,
    calls: AtomicUsize,
    locations: Mutex<Vec<String>>,
}

impl FakeSecrets {
    fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
            calls: AtomicUsize::new(0),
            locations: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SecretSource for FakeSecrets {
    async fn read_secret(&self, location: &str) -> SecretResult<Passphrase> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.locations.lock().unwrap().push(location.to_string());
        Passphrase::new(self.secret.clone())
    }
}

fn options() -> ResolverOptions {
    ResolverOptions {
        default_location: "default".into(),
        default_algorithm: Algorithm::Aes,
        kdf: KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        },
    }
}

fn resolver<S: SecretSource>(secrets: S) -> EncryptedResourceResolver<S> {
    EncryptedResourceResolver::new(secrets, CipherRegistry::new(), options())
}

fn path(s: &str) -> ResourcePath {
    ResourcePath::parse(s).unwrap()
}

async fn seal<S: SecretSource>(resolver: &EncryptedResourceResolver<S>, uri: &str, plaintext: &[u8]) -> Vec<u8> {
    let mut created = resolver.open_write(&path(uri), Vec::new()).await.unwrap();
    assert!(created.is_encrypted());
    created.write_all(plaintext).unwrap();
    created.finish().unwrap()
}

#[tokio::test]
async fn plain_resource_never_touches_secrets_or_ciphers() {
    let resolver = resolver(FakeSecrets::new(b"unused"));
    let raw = b"just some bytes".to_vec();

    for uri in ["file:/data/x", "vfile:/data/x", "https://host/x?enc=no"] {
        let mut opened = resolver.open_read(&path(uri), Cursor::new(raw.clone())).await.unwrap();
        assert!(!opened.is_encrypted());
        assert_eq!(opened.algorithm(), None);
        assert_eq!(
            opened.states(),
            &[OpenState::Unresolved, OpenState::SchemeChecked, OpenState::PlainOpen]
        );
        let mut out = Vec::new();
        opened.read_to_end(&mut out).unwrap();
        assert_eq!(out, raw, "{uri}");
    }

    assert_eq!(resolver.secrets().calls(), 0);
    for alg in Algorithm::ALL {
        assert_eq!(resolver.registry().constructions(alg), 0);
    }
}

#[tokio::test]
async fn encrypted_roundtrip() {
    let resolver = resolver(FakeSecrets::new(b"correct horse"));

    for len in [0usize, 5, 4096, 10_001] {
        let plaintext: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        let stored = seal(&resolver, "vfile:/secret.bin?enc", &plaintext).await;
        assert!(stored.len() >= HEADER_LEN + 16);
        assert_eq!((stored.len() - HEADER_LEN) % 16, 0);
        assert_ne!(&stored[HEADER_LEN..], &plaintext[..], "body must not be plaintext");

        let mut opened = resolver
            .open_read(&path("vfile:/secret.bin?enc"), Cursor::new(stored))
            .await
            .unwrap();
        assert!(opened.is_encrypted());
        assert_eq!(opened.algorithm(), Some(Algorithm::Aes));
        assert_eq!(
            opened.states(),
            &[
                OpenState::Unresolved,
                OpenState::SchemeChecked,
                OpenState::SecretRequested,
                OpenState::KeyDerived,
                OpenState::DecryptingOpen,
            ]
        );
        let mut out = Vec::new();
        opened.read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext, "len={len}");
    }

    assert_eq!(resolver.registry().constructions(Algorithm::Aes), 1);
}

#[tokio::test]
async fn fresh_salt_and_iv_per_resource() {
    let resolver = resolver(FakeSecrets::new(b"pw"));
    let a = seal(&resolver, "vfile:/a?enc", b"same plaintext").await;
    let b = seal(&resolver, "vfile:/a?enc", b"same plaintext").await;
    assert_ne!(a[22..54], b[22..54]);
    assert_ne!(a[HEADER_LEN..], b[HEADER_LEN..]);
}

#[tokio::test]
async fn secret_location_comes_from_resource_or_default() {
    let resolver = resolver(FakeSecrets::new(b"pw"));
    seal(&resolver, "acc:A1?enc&pwfile=team/alpha", b"x").await;
    seal(&resolver, "acc:A1?enc", b"x").await;

    let locations = resolver.secrets().locations.lock().unwrap().clone();
    assert_eq!(locations, vec!["team/alpha".to_string(), "default".to_string()]);
}

#[tokio::test]
async fn wrong_passphrase_is_detected_before_reading() {
    let stored = seal(&resolver(FakeSecrets::new(b"right")), "vfile:/x?enc", b"payload").await;

    let wrong = resolver(FakeSecrets::new(b"wrong"));
    let err = wrong
        .open_read(&path("vfile:/x?enc"), Cursor::new(stored))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolveError::WrongPassphrase), "{err}");
}

#[tokio::test]
async fn truncated_body_fails_the_read() {
    let resolver = resolver(FakeSecrets::new(b"pw"));
    let mut stored = seal(&resolver, "vfile:/x?enc", &[9u8; 100]).await;
    stored.pop();

    let mut opened = resolver
        .open_read(&path("vfile:/x?enc"), Cursor::new(stored))
        .await
        .unwrap();
    let err = opened.read_to_end(&mut Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[tokio::test]
async fn malformed_header_fails_without_asking_for_secret() {
    let resolver = resolver(FakeSecrets::new(b"pw"));

    let err = resolver
        .open_read(&path("vfile:/x?enc"), Cursor::new(b"plain text, not a container".repeat(4)))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolveError::Format(_)), "{err}");

    let err = resolver
        .open_read(&path("vfile:/x?enc"), Cursor::new(vec![0u8; 10]))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolveError::Format(_)), "{err}");

    assert_eq!(resolver.secrets().calls(), 0);
}

#[tokio::test]
async fn declared_cipher_must_match_container() {
    let resolver = resolver(FakeSecrets::new(b"pw"));
    let stored = seal(&resolver, "vfile:/x?enc&cipher=aes", b"payload").await;
    let calls = resolver.secrets().calls();

    let err = resolver
        .open_read(&path("vfile:/x?enc&cipher=aes-accel"), Cursor::new(stored))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err,
        ResolveError::AlgorithmMismatch {
            declared: Algorithm::AesAccel,
            found: Algorithm::Aes
        }
    ));
    assert_eq!(resolver.secrets().calls(), calls);
}

#[tokio::test]
async fn unsupported_scheme_is_rejected() {
    let resolver = resolver(FakeSecrets::new(b"pw"));
    let err = resolver
        .open_read(&path("ftp://host/x?enc"), Cursor::new(Vec::new()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolveError::UnsupportedScheme(ref s) if s == "ftp"));
    assert_eq!(resolver.secrets().calls(), 0);
}

fn unreachable_channel(dir: &std::path::Path) -> SecretChannel {
    SecretChannel::new(
        ChannelConfig {
            socket: dir.join("missing.sock"),
            connect_retries: 1,
            retry_backoff: Duration::from_millis(10),
            io_timeout: Duration::from_secs(1),
        },
        AccessMode::ReadOnly,
    )
}

#[tokio::test]
async fn unreachable_secret_holder_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver(unreachable_channel(dir.path()));

    let err = resolver
        .open_write(&path("vfile:/x?enc"), Vec::new())
        .await
        .err()
        .unwrap();
    assert!(err.is_secret_unavailable(), "{err}");
}

#[tokio::test]
async fn unreachable_secret_holder_fails_reads_of_real_containers() {
    let uri = "vfile:/vault/x.enc?enc";
    let sealed = seal(&resolver(FakeSecrets::new(b"pw")), uri, b"locked away").await;

    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver(unreachable_channel(dir.path()));
    let err = resolver
        .open_read(&path(uri), Cursor::new(sealed))
        .await
        .err()
        .unwrap();
    assert!(err.is_secret_unavailable(), "{err}");
}

#[tokio::test]
async fn failed_create_leaves_existing_file_intact() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("ledger.enc");
    std::fs::write(&file, b"precious existing contents").unwrap();
    let uri = format!("vfile:{}?enc", file.display());

    let resolver = resolver(unreachable_channel(dir.path()));
    let err = resolver.create_path(&path(&uri)).await.err().unwrap();
    assert!(err.is_secret_unavailable(), "{err}");

    assert_eq!(std::fs::read(&file).unwrap(), b"precious existing contents");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn abandoned_create_leaves_existing_file_intact() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("ledger.enc");
    std::fs::write(&file, b"precious existing contents").unwrap();
    let uri = format!("vfile:{}?enc", file.display());
    let resolver = resolver(FakeSecrets::new(b"pw"));

    let mut created = resolver.create_path(&path(&uri)).await.unwrap();
    created.write_all(b"never committed").unwrap();
    drop(created);

    assert_eq!(std::fs::read(&file).unwrap(), b"precious existing contents");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn local_files_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("notes.enc");
    let uri = format!("vfile:{}?enc&pwfile=notes", file.display());
    let resolver = resolver(FakeSecrets::new(b"pw"));

    let mut created = resolver.create_path(&path(&uri)).await.unwrap();
    created.write_all(b"dear diary").unwrap();
    assert!(!file.exists());
    created.commit().unwrap();

    let on_disk = std::fs::read(&file).unwrap();
    assert_eq!(&on_disk[..8], b"VFCRYPT\0");

    let mut opened = resolver.open_path_read(&path(&uri)).await.unwrap();
    let mut out = String::new();
    opened.read_to_string(&mut out).unwrap();
    assert_eq!(out, "dear diary");
}

#[tokio::test]
async fn configured_kdf_cost_is_bounded() {
    let mut opts = options();
    opts.kdf.mem_cost_kib = 2 * 1024 * 1024;
    let resolver = EncryptedResourceResolver::new(FakeSecrets::new(b"pw"), CipherRegistry::new(), opts);

    let err = resolver
        .open_write(&path("vfile:/x?enc"), Vec::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolveError::Format(_)), "{err}");
    assert_eq!(resolver.secrets().calls(), 0);
}

#[tokio::test]
async fn remote_schemes_have_no_local_path() {
    let resolver = resolver(FakeSecrets::new(b"pw"));
    let err = resolver
        .open_path_read(&path("https://host/x"))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ResolveError::NotLocal(_)), "{err}");
}
