//! File-based media for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::medium::{ByteMedium, MediumMetadata, MediumProvider};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Advisory lock file inside a store directory.
const LOCK_FILE: &str = "LOCK";
/// Extension of the per-store data files.
const STORE_EXTENSION: &str = "store";

/// A byte medium backed by a single file.
///
/// The file is opened lazily and kept open until [`ByteMedium::unlink`].
///
/// # Durability
///
/// - Writes go straight to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
/// - Growth reserves real blocks with `fs2::FileExt::allocate`, so running
///   out of disk fails the growth instead of leaving a sparse hole
///
/// # Example
///
/// ```no_run
/// use rangestore_storage::{ByteMedium, FileMedium};
/// use std::path::Path;
///
/// let medium = FileMedium::new(Path::new("data.store"));
/// medium.write_bytes(0, b"persistent data").unwrap();
/// medium.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileMedium {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileMedium {
    /// Creates a medium for `path`. Nothing is touched on disk yet.
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Mutex::new(None),
        }
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` against the open file.
    ///
    /// Returns `Ok(None)` if the file does not exist and `create` is false.
    fn with_file<T>(
        &self,
        create: bool,
        f: impl FnOnce(&mut File) -> StorageResult<T>,
    ) -> StorageResult<Option<T>> {
        let mut slot = self.file.lock();
        if slot.is_none() {
            let opened = OpenOptions::new()
                .read(true)
                .write(true)
                .create(create)
                .truncate(false)
                .open(&self.path);
            match opened {
                Ok(file) => *slot = Some(file),
                Err(err) if err.kind() == io::ErrorKind::NotFound && !create => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }

        match slot.as_mut() {
            Some(file) => f(file).map(Some),
            None => Ok(None),
        }
    }
}

impl ByteMedium for FileMedium {
    fn read_bytes(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.with_file(false, |file| {
            let size = file.metadata()?.len();
            let end = offset.saturating_add(len as u64);
            if offset > size || end > size {
                return Err(StorageError::ReadPastEnd { offset, len, size });
            }
            if len == 0 {
                return Ok(Vec::new());
            }

            file.seek(SeekFrom::Start(offset))?;
            let mut buffer = vec![0u8; len];
            file.read_exact(&mut buffer)?;
            Ok(buffer)
        })?
        .ok_or(StorageError::NotFound)
    }

    fn write_bytes(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        self.with_file(true, |file| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
            Ok(())
        })?;
        Ok(())
    }

    fn set_length(&self, len: u64) -> StorageResult<()> {
        self.with_file(true, |file| {
            let current = file.metadata()?.len();
            if len > current {
                if let Err(err) = file.allocate(len) {
                    // allocate may have extended the file before failing
                    let _ = file.set_len(current);
                    return Err(err.into());
                }
            }
            file.set_len(len)?;
            Ok(())
        })?;
        Ok(())
    }

    fn current_length(&self) -> StorageResult<Option<u64>> {
        if let Some(file) = self.file.lock().as_ref() {
            return Ok(Some(file.metadata()?.len()));
        }
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn unlink(&self) -> StorageResult<bool> {
        let mut slot = self.file.lock();
        slot.take();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn metadata(&self) -> StorageResult<Option<MediumMetadata>> {
        let meta = match fs::metadata(&self.path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let modified = meta.modified()?;
        // Not every filesystem records birth time
        let created = meta.created().unwrap_or(modified);
        Ok(Some(MediumMetadata {
            size: meta.len(),
            created,
            modified,
        }))
    }

    fn sync(&self) -> StorageResult<()> {
        if let Some(file) = self.file.lock().as_ref() {
            file.sync_all()?;
        }
        Ok(())
    }
}

/// A provider that keeps one file per store inside a directory.
///
/// ```text
/// <root>/
/// ├─ LOCK                # Advisory lock, one process per directory
/// └─ <hex(name)>.store   # One data file per store
/// ```
///
/// Store names are hex-encoded so any string maps to a safe file name.
/// The directory lock exists because range locks are tracked per process:
/// two processes sharing a directory would not see each other's locks.
#[derive(Debug)]
pub struct DirectoryProvider {
    root: PathBuf,
    media: Mutex<HashMap<String, Arc<FileMedium>>>,
    _lock_file: File,
}

impl DirectoryProvider {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the
    /// directory, or an I/O error if it cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        tracing::debug!(root = %root.display(), "opened store directory");
        Ok(Self {
            root: root.to_path_buf(),
            media: Mutex::new(HashMap::new()),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the data file path used for `name`.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        let mut file_name = String::with_capacity(name.len() * 2 + STORE_EXTENSION.len() + 1);
        for byte in name.as_bytes() {
            let _ = write!(file_name, "{byte:02x}");
        }
        file_name.push('.');
        file_name.push_str(STORE_EXTENSION);
        self.root.join(file_name)
    }
}

impl MediumProvider for DirectoryProvider {
    fn medium(&self, name: &str) -> StorageResult<Arc<dyn ByteMedium>> {
        let mut media = self.media.lock();
        let medium = media
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(FileMedium::new(&self.path_for(name))));
        Ok(Arc::clone(medium) as Arc<dyn ByteMedium>)
    }
}
