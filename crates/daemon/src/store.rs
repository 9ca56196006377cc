//! Placeholder store for the managed directory
//!
//! Every managed file is either a zero-byte placeholder or a complete copy of
//! the remote content. Downloads are staged in a temporary file next to the
//! target and renamed over it, so readers never see a partial file under the
//! final name. Eviction renames an empty file over the target the same way.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::{mknod, Mode, SFlag};

/// Name prefix reserved for staging files inside the managed directory
pub const STAGING_PREFIX: &str = ".mylora-";

/// Name suffix of staging files
pub const STAGING_SUFFIX: &str = ".part";

/// Result of seeding placeholders from a catalog listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Placeholders created by this call
    pub created: usize,
    /// Files that already existed and were left untouched
    pub existing: usize,
    /// Remote names refused as unsafe local filenames
    pub rejected: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid managed filename: {0:?}")]
    InvalidName(String),
    #[error("file is already materialized: {0}")]
    AlreadyMaterialized(PathBuf),
    #[error("file does not exist: {0}")]
    NotFound(PathBuf),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The managed local directory
#[derive(Debug, Clone)]
pub struct PlaceholderStore {
    root: PathBuf,
}

impl PlaceholderStore {
    /// Open the store at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `name` is a staging file written by [`Self::materialize`]
    pub fn is_staging_name(name: &str) -> bool {
        name.starts_with(STAGING_PREFIX)
    }

    /// Resolve a remote filename to its local path.
    ///
    /// Only a single plain path component is accepted. Anything that could
    /// escape the managed directory or collide with staging files is refused.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\0')
            && !Self::is_staging_name(name);
        if valid {
            Ok(self.root.join(name))
        } else {
            Err(StoreError::InvalidName(name.to_string()))
        }
    }

    /// Current size of a managed file, or `None` if it does not exist.
    pub fn size(&self, path: &Path) -> Result<Option<u64>, StoreError> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Ensure an empty placeholder exists for every name.
    ///
    /// Existing files are never opened or modified, so re-seeding leaves
    /// materialized content alone.
    pub fn seed<I, S>(&self, names: I) -> Result<SeedReport, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = SeedReport::default();
        for name in names {
            let name = name.as_ref();
            let path = match self.path_for(name) {
                Ok(path) => path,
                Err(_) => {
                    tracing::warn!(file = %name, "refusing unsafe remote filename");
                    report.rejected += 1;
                    continue;
                }
            };

            match Self::create_placeholder(&path) {
                Ok(()) => report.created += 1,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => report.existing += 1,
                Err(e) => return Err(StoreError::io(&path, e)),
            }
        }
        Ok(report)
    }

    /// Create an empty regular file, failing with `AlreadyExists` if taken.
    ///
    /// `mknod` creates the file without opening it, so seeding while the
    /// directory is watched does not look like a reader opening the file.
    fn create_placeholder(path: &Path) -> io::Result<()> {
        match mknod(path, SFlag::S_IFREG, Mode::from_bits_truncate(0o644), 0) {
            Ok(()) => Ok(()),
            Err(Errno::EPERM | Errno::EINVAL | Errno::EOPNOTSUPP) => OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .map(drop),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    /// Replace an empty placeholder with `content`.
    ///
    /// The bytes go to a staging file in the same directory, are synced, and
    /// the staging file is renamed over the placeholder. Returns the number
    /// of bytes written.
    pub fn materialize(&self, path: &Path, content: &[u8]) -> Result<u64, StoreError> {
        let meta = Self::existing(path)?;
        if meta.len() > 0 {
            return Err(StoreError::AlreadyMaterialized(path.to_path_buf()));
        }

        self.replace(path, meta.permissions(), content)?;
        Ok(content.len() as u64)
    }

    /// Turn a materialized file back into a zero-byte placeholder.
    ///
    /// An empty staging file is renamed over the target, so the path never
    /// disappears and processes still holding the old file open or mapped
    /// keep reading the old inode until they close it. The only events this
    /// produces on the watched directory carry the staging name.
    pub fn evict(&self, path: &Path) -> Result<(), StoreError> {
        let meta = Self::existing(path)?;
        self.replace(path, meta.permissions(), &[])
    }

    fn existing(path: &Path) -> Result<fs::Metadata, StoreError> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_path_buf()))
            }
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Stage `content` next to `path` and rename it into place.
    fn replace(
        &self,
        path: &Path,
        permissions: fs::Permissions,
        content: &[u8],
    ) -> Result<(), StoreError> {
        let mut staged = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&self.root)
            .map_err(|e| StoreError::io(&self.root, e))?;
        let staged_path = staged.path().to_path_buf();

        staged
            .write_all(content)
            .and_then(|_| staged.as_file().sync_all())
            .and_then(|_| fs::set_permissions(&staged_path, permissions))
            .map_err(|e| StoreError::io(&staged_path, e))?;

        // closed before the rename so its CLOSE_WRITE carries the staging
        // name; a failed persist removes the staging file
        staged
            .into_temp_path()
            .persist(path)
            .map_err(|e| StoreError::io(path, e.error))?;
        Ok(())
    }

    /// Remove staging files left behind by an interrupted download.
    pub fn clean_staging(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        let entries = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if Self::is_staging_name(name) && name.ends_with(STAGING_SUFFIX) {
                let path = entry.path();
                match fs::remove_file(&path) {
                    Ok(()) => {
                        tracing::info!(file = %name, "removed stale staging file");
                        removed += 1;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StoreError::io(&path, e)),
                }
            }
        }
        Ok(removed)
    }
}
