//! Extended-attribute names carried by chunk files and repository roots.

/// Prefix of every chunk metadata attribute.
pub const ATTR_PREFIX: &str = "user.grid.";

/// Compression scheme of the stored body, absent when uncompressed.
pub const ATTR_COMPRESSION: &str = "user.grid.compression";

/// Uppercase hex MD5 of the chunk body, written by the server at commit.
pub const ATTR_CHUNK_HASH: &str = "user.grid.chunk.hash";

/// The only compression value a node knows how to undo.
pub const COMPRESSION_ZLIB: &[u8] = b"zlib";

/// Identity lock on a repository root: the address the node serves.
pub const ATTR_REPO_ADDRESS: &str = "user.rawx_server.address";

/// Identity lock on a repository root: the namespace the node belongs to.
pub const ATTR_REPO_NAMESPACE: &str = "user.rawx_server.namespace";
