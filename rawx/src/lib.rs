//! Chunk server library: the HTTP surface over a [`chunk_storage`] repository.

pub mod config;
pub mod handlers;
pub mod headers;
pub mod server;

pub use config::NodeConfig;
pub use server::RawxService;
