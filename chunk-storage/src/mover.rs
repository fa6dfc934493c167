use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{symlink, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::fcntl::FallocateFlags;
use nix::sys::sendfile::sendfile;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::file_repo::FileRepository;

const TEMP_SUFFIX: &str = ".pending";
const LINK_SUFFIX: &str = ".lnk";

/// What to do with a chunk sitting on tier `src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOp {
    /// Copy one tier down (slower), leave a symlink behind.
    Demote = 0,
    /// Drop the chunk from its tier.
    Delete = 1,
    /// Copy one tier up (faster), leave a symlink behind.
    Promote = 2,
}

#[derive(Debug, Clone)]
pub struct MoveOrder {
    pub src: usize,
    pub chunkid: String,
    pub op: MoveOp,
}

/// Producer side of the mover queue, handed to the repository.
pub trait MoveSink: Send + Sync {
    fn push(&self, order: MoveOrder);
}

#[derive(Clone)]
pub struct MoverHandle {
    tx: mpsc::UnboundedSender<MoveOrder>,
}

impl MoveSink for MoverHandle {
    fn push(&self, order: MoveOrder) {
        if self.tx.send(order).is_err() {
            warn!("move order dropped, mover is gone");
        }
    }
}

/// Background migration of chunks between adjacent tiers.
///
/// A single worker drains an unbounded queue, one order at a time; each order
/// crosses exactly one tier boundary. Orders are attempted once, failures are
/// logged and forgotten: the mover is an opportunistic optimizer, not a
/// durable queue.
pub struct Mover {
    rx: mpsc::UnboundedReceiver<MoveOrder>,
    tiers: Vec<Arc<FileRepository>>,
    fallocate: bool,
}

impl Mover {
    pub fn new(tiers: Vec<Arc<FileRepository>>) -> (Mover, MoverHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Mover {
                rx,
                tiers,
                fallocate: true,
            },
            MoverHandle { tx },
        )
    }

    pub fn with_fallocate(mut self, fallocate: bool) -> Self {
        self.fallocate = fallocate;
        self
    }

    fn validate(&self, order: &MoveOrder) -> Result<(), StoreError> {
        let last = self.tiers.len().saturating_sub(1);
        if order.src >= self.tiers.len() {
            return Err(StoreError::InvalidMoveOrder(format!(
                "source tier {} out of range",
                order.src
            )));
        }
        match order.op {
            MoveOp::Promote if order.src == 0 => Err(StoreError::InvalidMoveOrder(
                "cannot promote from tier 0".to_string(),
            )),
            MoveOp::Demote if order.src == last => Err(StoreError::InvalidMoveOrder(
                "cannot demote from the last tier".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Drain the queue until every handle is dropped.
    pub async fn run(mut self) {
        while let Some(order) = self.rx.recv().await {
            if let Err(e) = self.validate(&order) {
                warn!(chunkid = %order.chunkid, error = %e, "move order dropped");
                continue;
            }
            let src = self.tiers[order.src].clone();
            let fallocate = self.fallocate;
            let result = match order.op {
                MoveOp::Demote | MoveOp::Promote => {
                    let dst = if order.op == MoveOp::Demote {
                        self.tiers[order.src + 1].clone()
                    } else {
                        self.tiers[order.src - 1].clone()
                    };
                    let chunkid = order.chunkid.clone();
                    tokio::task::spawn_blocking(move || {
                        move_entry(&src, &dst, &chunkid, fallocate)
                    })
                    .await
                }
                MoveOp::Delete => {
                    let chunkid = order.chunkid.clone();
                    tokio::task::spawn_blocking(move || delete_entry(&src, &chunkid)).await
                }
            };
            match result {
                Ok(Ok(())) => info!(chunkid = %order.chunkid, op = ?order.op, "move order completed"),
                Ok(Err(e)) => warn!(chunkid = %order.chunkid, op = ?order.op, error = %e, "move order failed"),
                Err(e) => warn!(chunkid = %order.chunkid, error = %e, "move task panicked"),
            }
        }
        debug!("mover queue closed");
    }
}

fn delete_entry(repo: &FileRepository, name: &str) -> Result<(), StoreError> {
    let path = repo.entry_path(name)?;
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Copy one entry from `src` to `dst`, then swap the source path for a
/// symlink so the chunk stays addressable under both tiers.
fn move_entry(
    src: &FileRepository,
    dst: &FileRepository,
    name: &str,
    fallocate: bool,
) -> Result<(), StoreError> {
    let src_path = src.entry_path(name)?;
    let src_file = match File::open(&src_path) {
        Ok(f) => f,
        // Raced with a delete, nothing left to move.
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let content_length = src_file.metadata()?.len();

    let dst_path = dst.entry_path(name)?;
    let tmp_path = suffixed(&dst_path, TEMP_SUFFIX);
    let dst_file = open_move_target(&tmp_path, content_length, fallocate)?;

    if dst_path.exists() {
        drop(dst_file);
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::ChunkExists);
    }

    let mut remaining = content_length as usize;
    while remaining > 0 {
        let sent = sendfile(&dst_file, &src_file, None, remaining)
            .map_err(io::Error::from)?;
        if sent == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "sendfile stalled").into());
        }
        remaining -= sent;
    }

    dst_file.sync_data()?;
    drop(dst_file);
    drop(src_file);

    // The source vanished mid-flight: a delete won the race, drop our copy.
    if !src_path.exists() {
        let _ = fs::remove_file(&tmp_path);
        return Ok(());
    }

    fs::rename(&tmp_path, &dst_path)?;

    let lnk_path = suffixed(&src_path, LINK_SUFFIX);
    symlink(&dst_path, &lnk_path)?;
    fs::rename(&lnk_path, &src_path)?;
    Ok(())
}

fn open_move_target(
    tmp_path: &Path,
    content_length: u64,
    fallocate: bool,
) -> Result<File, StoreError> {
    let open = |path: &Path| {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(path)
    };
    let file = match open(tmp_path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let parent = tmp_path
                .parent()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no parent dir"))?;
            crate::file_repo::make_dirs(parent)?;
            File::open(parent)?.sync_all()?;
            open(tmp_path).map_err(StoreError::from_io)?
        }
        Err(e) => return Err(StoreError::from_io(e)),
    };
    if fallocate && content_length > 0 {
        if let Err(e) = nix::fcntl::fallocate(
            file.as_raw_fd(),
            FallocateFlags::empty(),
            0,
            content_length as libc::off_t,
        ) {
            drop(file);
            let _ = fs::remove_file(tmp_path);
            return Err(io::Error::from(e).into());
        }
    }
    Ok(file)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.to_path_buf().into_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
