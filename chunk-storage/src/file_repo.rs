use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::fcntl::FallocateFlags;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::attrs;
use crate::error::StoreError;

const PUT_FILE_MODE: u32 = 0o644;
const PUT_MKDIR_MODE: u32 = 0o755;
const TEMP_SUFFIX: &str = ".pending";

const DEFAULT_HASH_WIDTH: usize = 3;
const DEFAULT_HASH_DEPTH: usize = 1;

/// Side-band sink for repository mutations, e.g. an index crawler feed.
///
/// Deliberately minimal: two notifications, no payload beyond the name.
pub trait Notifier: Send + Sync {
    fn on_put(&self, name: &str);
    fn on_del(&self, name: &str);
}

/// Default notifier, discards everything.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn on_put(&self, _name: &str) {}
    fn on_del(&self, _name: &str) {}
}

/// A flat file store under a single root, fanning entries out over a hashed
/// directory tree.
///
/// Writes go through [`FileWriter`]: content lands in a `<path>.pending` temp
/// file and is published atomically by a rename, so any file whose name does
/// not end in `.pending` is fully written and carries all its attributes.
pub struct FileRepository {
    root: PathBuf,
    hash_width: usize,
    hash_depth: usize,
    hash_start: bool,
    fsync_file: bool,
    fsync_dir: bool,
    fallocate: bool,
    notifier: Arc<dyn Notifier>,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileRepository {
            root: root.into(),
            hash_width: DEFAULT_HASH_WIDTH,
            hash_depth: DEFAULT_HASH_DEPTH,
            hash_start: true,
            fsync_file: false,
            fsync_dir: true,
            fallocate: false,
            notifier: Arc::new(NoopNotifier),
        }
    }

    /// Layout of the hashed tree. `hash_start = false` reproduces legacy
    /// layouts that hashed the tail of the name instead of its head.
    pub fn with_layout(mut self, width: usize, depth: usize, hash_start: bool) -> Self {
        self.hash_width = width;
        self.hash_depth = depth;
        self.hash_start = hash_start;
        self
    }

    /// Durability of commits: fdatasync the file before rename, fsync the
    /// parent directory after. The file sync is off by default, trading
    /// durability for throughput.
    pub fn with_durability(mut self, fsync_file: bool, fsync_dir: bool) -> Self {
        self.fsync_file = fsync_file;
        self.fsync_dir = fsync_dir;
        self
    }

    /// Preallocate temp files when a content length is known up front.
    pub fn with_fallocate(mut self, fallocate: bool) -> Self {
        self.fallocate = fallocate;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bind the repository root to a (namespace, address) identity.
    ///
    /// Set-or-equal semantics: the two lock attributes are created with
    /// `XATTR_CREATE`; when one already exists its value must match, otherwise
    /// the root belongs to another node and locking fails.
    pub fn lock(&self, ns: &str, url: &str) -> Result<(), StoreError> {
        set_or_equal(&self.root, attrs::ATTR_REPO_ADDRESS, url.as_bytes())?;
        set_or_equal(&self.root, attrs::ATTR_REPO_NAMESPACE, ns.as_bytes())?;
        Ok(())
    }

    /// Hashed path of a name. Rejects empty names and names shorter than the
    /// hashed prefix.
    pub fn entry_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let name = sanitize(name)?;
        if name.len() < self.hash_width * self.hash_depth {
            return Err(StoreError::InvalidChunkName);
        }
        let mut path = self.root.clone();
        for i in 0..self.hash_depth {
            let slice = if self.hash_start {
                &name[i * self.hash_width..(i + 1) * self.hash_width]
            } else {
                let end = name.len() - i * self.hash_width;
                &name[end - self.hash_width..end]
            };
            path.push(slice);
        }
        path.push(&name);
        Ok(path)
    }

    pub async fn has(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(name)?;
        match fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, name: &str) -> Result<FileReader, StoreError> {
        let path = self.entry_path(name)?;
        let file = File::open(&path).await.map_err(StoreError::from_io)?;
        Ok(FileReader { file, path })
    }

    pub async fn del(&self, name: &str) -> Result<(), StoreError> {
        let path = self.entry_path(name)?;
        fs::remove_file(&path).await.map_err(StoreError::from_io)?;
        self.notifier.on_del(name);
        Ok(())
    }

    /// Open a writer for `name`.
    ///
    /// The temp file is created exclusively; a missing parent directory is
    /// created and the open retried once. An existing final file, or an
    /// in-flight temp file, yields [`StoreError::ChunkExists`].
    pub async fn put(&self, name: &str, content_length: u64) -> Result<FileWriter, StoreError> {
        let final_path = self.entry_path(name)?;
        let mut temp_path = final_path.clone().into_os_string();
        temp_path.push(TEMP_SUFFIX);
        let temp_path = PathBuf::from(temp_path);

        let file = match self.open_exclusive(&temp_path).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // Lazy directory creation, one retry.
                if let Some(parent) = temp_path.parent() {
                    make_dirs(parent)?;
                }
                self.open_exclusive(&temp_path).await.map_err(StoreError::from_io)?
            }
            Err(e) => return Err(StoreError::from_io(e)),
        };

        let file = if self.fallocate && content_length > 0 {
            let std_file = file.into_std().await;
            if let Err(e) = nix::fcntl::fallocate(
                std_file.as_raw_fd(),
                FallocateFlags::empty(),
                0,
                content_length as libc::off_t,
            ) {
                drop(std_file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(io::Error::from(e).into());
            }
            File::from_std(std_file)
        } else {
            file
        };

        // The final name may have been published while we opened the temp
        // file; a duplicate must not be overwritten.
        if fs::metadata(&final_path).await.is_ok() {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StoreError::ChunkExists);
        }

        Ok(FileWriter {
            state: WriterState::Open(file),
            name: name.to_string(),
            final_path,
            temp_path,
            fsync_file: self.fsync_file,
            fsync_dir: self.fsync_dir,
            notifier: self.notifier.clone(),
        })
    }

    async fn open_exclusive(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(PUT_FILE_MODE)
            .open(path)
            .await
    }

    /// Lexicographic listing of entry names across the hashed tree.
    ///
    /// Returns up to `max` names strictly greater than `marker` and starting
    /// with `prefix`, plus a flag telling whether more remained. Synchronous;
    /// callers on the runtime should use `spawn_blocking`.
    pub fn list(
        &self,
        marker: &str,
        prefix: &str,
        max: usize,
    ) -> Result<(Vec<String>, bool), StoreError> {
        let mut names = Vec::new();
        collect_names(&self.root, self.hash_depth, &mut names)?;
        names.sort_unstable();

        let mut out = Vec::new();
        let mut truncated = false;
        for name in names {
            if name.as_str() <= marker && !marker.is_empty() {
                continue;
            }
            if !prefix.is_empty() && !name.starts_with(prefix) {
                continue;
            }
            if max > 0 && out.len() == max {
                truncated = true;
                break;
            }
            out.push(name);
        }
        Ok((out, truncated))
    }
}

/// Hash directories are created with a fixed mode, independent of the umask.
pub(crate) fn make_dirs(parent: &Path) -> io::Result<()> {
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(PUT_MKDIR_MODE)
        .create(parent)
}

/// Reject empty names and fold path separators into a flat name.
fn sanitize(name: &str) -> Result<String, StoreError> {
    if name.is_empty() {
        return Err(StoreError::InvalidChunkName);
    }
    let cleaned: Vec<&str> = name
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if cleaned.is_empty() {
        return Err(StoreError::InvalidChunkName);
    }
    Ok(cleaned.join("@"))
}

fn collect_names(dir: &Path, depth: usize, out: &mut Vec<String>) -> Result<(), StoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if depth > 0 && file_type.is_dir() {
            collect_names(&entry.path(), depth - 1, out)?;
        } else if depth == 0 && file_type.is_file() && !name.ends_with(TEMP_SUFFIX) {
            out.push(name.to_string());
        }
    }
    Ok(())
}

/// Create the xattr, or verify the existing value matches.
fn set_or_equal(path: &Path, name: &str, value: &[u8]) -> Result<(), StoreError> {
    match xattr_create(path, name, value) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let current = xattr::get(path, name)?;
            if current.as_deref() == Some(value) {
                Ok(())
            } else {
                Err(StoreError::LockMismatch {
                    attr: name.to_string(),
                })
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// `setxattr(2)` with `XATTR_CREATE`, the crate-level helpers only replace.
fn xattr_create(path: &Path, name: &str, value: &[u8]) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())?;
    let c_name = CString::new(name)?;
    let rc = unsafe {
        libc::setxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            libc::XATTR_CREATE,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

enum WriterState {
    Open(File),
    Committed,
    Aborted,
}

/// In-flight upload of a single entry.
///
/// State machine: `Open → {Committed, Aborted}`. Writing or committing after
/// a terminal transition is an error; `abort` is idempotent.
pub struct FileWriter {
    state: WriterState,
    name: String,
    final_path: PathBuf,
    temp_path: PathBuf,
    fsync_file: bool,
    fsync_dir: bool,
    notifier: Arc<dyn Notifier>,
}

impl FileWriter {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn file_mut(&mut self) -> Result<&mut File, StoreError> {
        match &mut self.state {
            WriterState::Open(f) => Ok(f),
            _ => Err(StoreError::WriterClosed),
        }
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<(), StoreError> {
        self.file_mut()?.write_all(buf).await?;
        Ok(())
    }

    /// Attach an attribute to the entry; readable only after commit.
    pub fn set_attr(&mut self, name: &str, value: &[u8]) -> Result<(), StoreError> {
        if !matches!(self.state, WriterState::Open(_)) {
            return Err(StoreError::WriterClosed);
        }
        xattr::set(&self.temp_path, name, value)?;
        Ok(())
    }

    pub async fn sync(&mut self) -> Result<(), StoreError> {
        self.file_mut()?.sync_data().await?;
        Ok(())
    }

    /// Publish the entry: optional fdatasync, close, rename over the final
    /// name, optional parent-directory fsync, notify.
    pub async fn commit(&mut self) -> Result<(), StoreError> {
        let file = match std::mem::replace(&mut self.state, WriterState::Committed) {
            WriterState::Open(f) => f,
            prev => {
                self.state = prev;
                return Err(StoreError::WriterClosed);
            }
        };
        if self.fsync_file {
            file.sync_data().await?;
        }
        drop(file);

        if let Err(e) = fs::rename(&self.temp_path, &self.final_path).await {
            let _ = fs::remove_file(&self.temp_path).await;
            self.state = WriterState::Aborted;
            return Err(e.into());
        }

        if self.fsync_dir {
            if let Some(parent) = self.final_path.parent() {
                File::open(parent).await?.sync_all().await?;
            }
        }

        self.notifier.on_put(&self.name);
        Ok(())
    }

    /// Drop the pending content. Safe to call more than once.
    pub async fn abort(&mut self) -> Result<(), StoreError> {
        match std::mem::replace(&mut self.state, WriterState::Aborted) {
            WriterState::Open(file) => {
                drop(file);
                match fs::remove_file(&self.temp_path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            WriterState::Committed => {
                self.state = WriterState::Committed;
                Err(StoreError::WriterClosed)
            }
            WriterState::Aborted => Ok(()),
        }
    }
}

/// Read side of a published entry.
pub struct FileReader {
    file: File,
    path: PathBuf,
}

impl FileReader {
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub async fn size(&self) -> Result<u64, StoreError> {
        Ok(self.file.metadata().await?.len())
    }

    pub async fn seek(&mut self, offset: u64) -> Result<(), StoreError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        Ok(())
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StoreError> {
        Ok(self.file.read(buf).await?)
    }

    pub fn get_attr(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(xattr::get(&self.path, name)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_file(self) -> File {
        self.file
    }
}
