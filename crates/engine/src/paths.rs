//! Filesystem layout under a database's data directory (spec.md §6).
//!
//! `<data_dir>/{store,index,wal,state/{kms,audit,retention,tmp,crash},backups}`.
//! Directory creation and the `0o700` permission mode follow the teacher's
//! `Database::open`, which creates its data directory before canonicalizing
//! it (`database/mod.rs`); this module generalizes that single-directory
//! creation into the full tree spec.md §6 names.

use std::io;
use std::path::{Path, PathBuf};

/// The resolved set of directories a [`crate::runtime::Runtime`] uses.
#[derive(Debug, Clone)]
pub struct DatabasePaths {
    root: PathBuf,
}

impl DatabasePaths {
    /// Create every directory this layout names under `root`, at `0o700`
    /// on Unix, and reject `root` if it is a symlink (spec.md §6: the
    /// data directory is not expected to be shared or aliased).
    pub fn ensure(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        if root.is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("data dir must not be a symlink: {}", root.display()),
            ));
        }
        let paths = DatabasePaths { root };
        for dir in [
            paths.store(),
            paths.index(),
            paths.wal(),
            paths.state_kms(),
            paths.state_audit(),
            paths.state_retention(),
            paths.state_tmp(),
            paths.state_crash(),
            paths.backups(),
        ] {
            create_dir(&dir)?;
        }
        Ok(paths)
    }

    /// The data directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Main storage engine's on-disk home.
    pub fn store(&self) -> PathBuf {
        self.root.join("store")
    }

    /// Periodic snapshot of the main engine's full keyspace, written by
    /// the apply worker on its flush cadence (spec.md §4.3, §6) so a
    /// restart only has to replay the WAL since the last snapshot
    /// instead of from the beginning of time.
    pub fn store_snapshot(&self) -> PathBuf {
        self.store().join("snapshot.bin")
    }

    /// Index storage engine's on-disk home.
    pub fn index(&self) -> PathBuf {
        self.root.join("index")
    }

    /// Periodic snapshot of the index engine's full keyspace; see
    /// [`Self::store_snapshot`].
    pub fn index_snapshot(&self) -> PathBuf {
        self.index().join("snapshot.bin")
    }

    /// Write-ahead log segment directory.
    pub fn wal(&self) -> PathBuf {
        self.root.join("wal")
    }

    /// KMS state, owned by an external key-management process.
    pub fn state_kms(&self) -> PathBuf {
        self.root.join("state").join("kms")
    }

    /// The local master-key file backing [`progressdb_security::LocalKms`]
    /// when no external KMS is configured.
    pub fn kms_master_key_file(&self) -> PathBuf {
        self.state_kms().join("master.key")
    }

    /// Append-only audit trail state.
    pub fn state_audit(&self) -> PathBuf {
        self.root.join("state").join("audit")
    }

    /// Retention/compaction bookkeeping.
    pub fn state_retention(&self) -> PathBuf {
        self.root.join("state").join("retention")
    }

    /// Scratch space for in-progress writes.
    pub fn state_tmp(&self) -> PathBuf {
        self.root.join("state").join("tmp")
    }

    /// Crash dumps written by a forced (timed-out) shutdown (spec.md §11).
    pub fn state_crash(&self) -> PathBuf {
        self.root.join("state").join("crash")
    }

    /// Backed-up originals of rewritten keys (`backup:migrate:*`, `backup:encrypt:*`).
    pub fn backups(&self) -> PathBuf {
        self.root.join("backups")
    }
}

fn create_dir(dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(dir)?.permissions();
        perms.set_mode(0o700);
        std::fs::set_permissions(dir, perms)?;
    }
    Ok(())
}
