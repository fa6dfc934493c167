//! # Grid Storage Client SDK
//!
//! Client side of the grid object storage: asks the proxy for chunk
//! placements, stripes and fan-out-writes object bodies to the chunk servers,
//! and commits the object metadata back through the proxy.
//!
//! The entities involved: a **namespace** names a platform; an **account**
//! partitions it; a **user** owns **containers**; containers hold
//! **contents**, stored as chunks spread over the blob nodes.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::io::AsyncReadExt;
//! use grid_sdk::{FlatName, ObjectClient, StaticConfig};
//!
//! # async fn example() -> Result<(), grid_sdk::SdkError> {
//! let mut cfg = StaticConfig::new();
//! cfg.set("NS", "proxy", "127.0.0.1:6002");
//! cfg.set("NS", "autocreate", "true");
//!
//! let client = ObjectClient::new("NS", Arc::new(cfg))?;
//! let name = FlatName::object("NS", "ACCT", "myuser", "myobject");
//! let mut src = tokio::io::repeat(0).take(4000);
//! client.put_content(&name, 4000, true, &mut src).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod container;
pub mod directory;
pub mod download;
pub mod error;
pub mod metachunk;
pub mod name;
pub mod object;
pub mod polyput;
mod proxy;
pub mod slice_reader;
pub mod types;

pub use config::{Config, StaticConfig};
pub use container::ContainerClient;
pub use directory::DirectoryClient;
pub use download::ChunksReader;
pub use error::SdkError;
pub use metachunk::MetaChunk;
pub use name::{AccountName, ContainerName, FlatName, ObjectName, UserName};
pub use object::{compute_user_id, ObjectClient};
pub use polyput::PolyPut;
pub use slice_reader::SliceReader;
pub use types::{Chunk, ContainerListing, Content, ContentHeader, ObjectEntry, Property, RefDump, Service};

/// Prefix of every chunk metadata header on the blob node surface.
pub const RAWX_HEADER_PREFIX: &str = "X-oio-chunk-meta-";
