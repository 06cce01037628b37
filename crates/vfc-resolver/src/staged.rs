//! Local resources written beside their destination and renamed into place.
//!
//! The destination is untouched until [`StagedFile::commit`]; dropping an
//! uncommitted file removes the temporary.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct StagedFile {
    file: File,
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Create `.<name>.tmp` in the destination's directory.
    pub fn create(dest: &Path) -> io::Result<Self> {
        let name = dest.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{} names no file", dest.display()))
        })?;
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = parent.join(format!(".{}.tmp", name.to_string_lossy()));
        let file = File::create(&tmp)?;
        debug!(tmp = %tmp.display(), dest = %dest.display(), "staging local resource");
        Ok(Self {
            file,
            tmp,
            dest: dest.to_path_buf(),
            committed: false,
        })
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Sync and rename over the destination.
    pub fn commit(mut self) -> io::Result<()> {
        self.file.sync_all()?;
        fs::rename(&self.tmp, &self.dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = fs::remove_file(&self.tmp) {
            warn!(tmp = %self.tmp.display(), "removing abandoned staging file: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");
        fs::write(&dest, b"old").unwrap();

        let mut staged = StagedFile::create(&dest).unwrap();
        staged.write_all(b"new contents").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"old");
        staged.commit().unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new contents");
        assert!(!dir.path().join(".out.bin.tmp").exists());
    }

    #[test]
    fn abandoned_file_leaves_destination_alone() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("keep.txt");
        fs::write(&dest, b"keep me").unwrap();

        let mut staged = StagedFile::create(&dest).unwrap();
        staged.write_all(b"half-writ").unwrap();
        drop(staged);

        assert_eq!(fs::read(&dest).unwrap(), b"keep me");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn directory_is_not_a_destination() {
        assert_eq!(
            StagedFile::create(Path::new("/")).err().map(|e| e.kind()),
            Some(io::ErrorKind::InvalidInput)
        );
    }
}
