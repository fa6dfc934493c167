//! # Chunk Storage Library
//!
//! Durable per-chunk persistence for a blob node.
//!
//! ## Features
//!
//! - **Hashed layout**: chunk names are fanned out over a configurable
//!   directory tree (`<root>/<3-hex>/<name>` by default)
//! - **Atomic publication**: uploads land in a `.pending` temp file and become
//!   visible only through a rename, so a published name is always complete
//! - **Xattr metadata**: content and chunk attributes travel with the file as
//!   `user.grid.*` extended attributes
//! - **Identity lock**: a repository root is bound to one (namespace, address)
//!   pair through set-or-equal xattrs
//! - **Tiered storage**: an ordered list of repositories with a background
//!   mover promoting and demoting chunks between adjacent tiers
//!
//! ## Example
//!
//! ```no_run
//! use chunk_storage::{ChunkRepository, FileRepository};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), chunk_storage::StoreError> {
//! let tier = Arc::new(FileRepository::new("/var/lib/blob/0"));
//! tier.lock("NS", "127.0.0.1:5999")?;
//!
//! let repo = ChunkRepository::new(vec![tier]);
//! let mut w = repo.put("0000000000000000000000000000000000000000000000000000000000000000", 4).await?;
//! w.write(b"body").await?;
//! w.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod attrs;
mod chunk_repo;
mod error;
mod file_repo;
mod mover;
mod stats;

pub use chunk_repo::{ChunkRepository, ChunkWriter};
pub use error::StoreError;
pub use file_repo::{FileReader, FileRepository, FileWriter, NoopNotifier, Notifier};
pub use mover::{MoveOp, MoveOrder, MoveSink, Mover, MoverHandle};
pub use stats::{Stat, StatSet, STAT_COUNT, STAT_NAMES};
