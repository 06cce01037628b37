//! Passphrase store: one secret per file, served by the secret holder.
//!
//! A location is a path relative to the store root (or an absolute path used
//! as given). Each file holds a single line; one trailing `\n` or `\r\n` is
//! not part of the secret.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use zeroize::Zeroize;

use crate::error::{SecretError, SecretResult};
use crate::passphrase::{Passphrase, MAX_PASSPHRASE_LEN};

#[derive(Debug, Clone)]
pub struct PassphraseStore {
    root: PathBuf,
}

impl PassphraseStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `location`.
    pub fn resolve(&self, location: &str) -> SecretResult<PathBuf> {
        if location.is_empty() {
            return Err(SecretError::BadRequest("empty secret location".into()));
        }
        let path = Path::new(location);
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SecretError::BadRequest(format!("location '{location}' escapes the store")));
        }
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root.join(path))
        }
    }

    pub fn read(&self, location: &str) -> SecretResult<Passphrase> {
        let path = self.resolve(location)?;
        let unreadable = |e: io::Error| SecretError::StoreUnreadable {
            location: location.to_string(),
            reason: e.to_string(),
        };

        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SecretError::NotConfigured(location.to_string()))
            }
            Err(e) => return Err(unreadable(e)),
        };
        if !meta.is_file() {
            return Err(SecretError::StoreUnreadable {
                location: location.to_string(),
                reason: "not a regular file".into(),
            });
        }
        // secret plus a CRLF terminator
        if meta.len() > (MAX_PASSPHRASE_LEN + 2) as u64 {
            tracing::warn!(location, size = meta.len(), "stored secret exceeds limit");
            return Err(SecretError::TooLarge);
        }

        let mut bytes = fs::read(&path).map_err(unreadable)?;
        strip_line_ending(&mut bytes);
        if bytes.is_empty() {
            return Err(SecretError::NotConfigured(location.to_string()));
        }
        if bytes.len() > MAX_PASSPHRASE_LEN {
            bytes.zeroize();
            return Err(SecretError::TooLarge);
        }
        Passphrase::new(bytes)
    }

    /// Replace the secret at `location` atomically (temp file + rename).
    pub fn write(&self, location: &str, secret: &Passphrase) -> SecretResult<()> {
        let path = self.resolve(location)?;
        let incomplete = |reason: String| SecretError::WriteIncomplete {
            location: location.to_string(),
            reason,
        };

        let parent = path
            .parent()
            .ok_or_else(|| SecretError::BadRequest(format!("location '{location}' has no parent")))?;
        create_private_dir(parent).map_err(|e| incomplete(format!("creating {}: {e}", parent.display())))?;

        let file_name = path
            .file_name()
            .ok_or_else(|| SecretError::BadRequest(format!("location '{location}' names no file")))?;
        let tmp = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

        let written = write_private(&tmp, secret.expose());
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(incomplete(e.to_string()));
        }
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            incomplete(format!("rename: {e}"))
        })?;

        let expected = secret.len() as u64 + 1;
        let actual = fs::metadata(&path).map_err(|e| incomplete(e.to_string()))?.len();
        if actual != expected {
            return Err(incomplete(format!("wrote {actual} bytes, expected {expected}")));
        }
        tracing::info!(location, "secret updated");
        Ok(())
    }
}

fn strip_line_ending(bytes: &mut Vec<u8>) {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
}

fn write_private(path: &Path, secret: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(secret)?;
    file.write_all(b"\n")?;
    file.sync_all()
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PassphraseStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PassphraseStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn strips_one_line_ending() {
        let (dir, store) = store();
        fs::write(dir.path().join("lf"), b"secret\n").unwrap();
        fs::write(dir.path().join("crlf"), b"secret\r\n").unwrap();
        fs::write(dir.path().join("bare"), b"secret").unwrap();
        for loc in ["lf", "crlf", "bare"] {
            assert_eq!(store.read(loc).unwrap().expose(), b"secret", "{loc}");
        }
    }

    #[test]
    fn missing_or_empty_is_not_configured() {
        let (dir, store) = store();
        assert!(matches!(store.read("absent"), Err(SecretError::NotConfigured(_))));
        fs::write(dir.path().join("empty"), b"\n").unwrap();
        assert!(matches!(store.read("empty"), Err(SecretError::NotConfigured(_))));
    }

    #[test]
    fn oversize_is_rejected_not_truncated() {
        let (dir, store) = store();
        fs::write(dir.path().join("big"), vec![b'x'; MAX_PASSPHRASE_LEN + 1]).unwrap();
        assert!(matches!(store.read("big"), Err(SecretError::TooLarge)));

        let mut exact = vec![b'x'; MAX_PASSPHRASE_LEN];
        exact.extend_from_slice(b"\r\n");
        fs::write(dir.path().join("exact"), exact).unwrap();
        assert_eq!(store.read("exact").unwrap().len(), MAX_PASSPHRASE_LEN);
    }

    #[test]
    fn interior_line_break_is_forbidden() {
        let (dir, store) = store();
        fs::write(dir.path().join("two-lines"), b"first\nsecond\n").unwrap();
        assert!(matches!(store.read("two-lines"), Err(SecretError::ForbiddenByte)));
    }

    #[test]
    fn directory_is_unreadable() {
        let (dir, store) = store();
        fs::create_dir(dir.path().join("sub")).unwrap();
        assert!(matches!(store.read("sub"), Err(SecretError::StoreUnreadable { .. })));
    }

    #[test]
    fn parent_components_rejected() {
        let (_dir, store) = store();
        assert!(matches!(store.resolve("../etc/passwd"), Err(SecretError::BadRequest(_))));
        assert!(matches!(store.resolve(""), Err(SecretError::BadRequest(_))));
    }

    #[test]
    fn absolute_locations_used_as_given() {
        let (_dir, store) = store();
        let other = tempfile::tempdir().unwrap();
        let abs = other.path().join("pw");
        fs::write(&abs, b"elsewhere\n").unwrap();
        assert_eq!(store.read(abs.to_str().unwrap()).unwrap().expose(), b"elsewhere");
    }

    #[test]
    fn write_then_read() {
        let (dir, store) = store();
        let secret = Passphrase::from_string("correct horse".into()).unwrap();
        store.write("nested/db", &secret).unwrap();

        assert_eq!(fs::read(dir.path().join("nested/db")).unwrap(), b"correct horse\n");
        assert_eq!(store.read("nested/db").unwrap().expose(), b"correct horse");
        assert!(!dir.path().join("nested/.db.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join("nested/db")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
