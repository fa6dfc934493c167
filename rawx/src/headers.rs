//! The header ↔ xattr contract of the chunk surface.

pub use chunk_storage::attrs::{ATTR_CHUNK_HASH, ATTR_COMPRESSION, ATTR_PREFIX, COMPRESSION_ZLIB};

/// Attribute suffix (under `user.grid.`) paired with the request/response
/// header carrying it. Every entry is mandatory on PUT and echoed on GET.
pub const ATTR_MAP: [(&str, &str); 12] = [
    ("container.id", "X-Oio-Chunk-Meta-Container-Id"),
    ("content.path", "X-Oio-Chunk-Meta-Content-Path"),
    ("content.id", "X-Oio-Chunk-Meta-Content-Id"),
    ("content.ver", "X-Oio-Chunk-Meta-Content-Version"),
    ("content.size", "X-Oio-Chunk-Meta-Content-Size"),
    ("chunks.nb", "X-Oio-Chunk-Meta-Content-Chunksnb"),
    ("content.storage-policy", "X-Oio-Chunk-Meta-Content-Storage-Policy"),
    ("content.mime-type", "X-Oio-Chunk-Meta-Content-Mime-Type"),
    ("content.chunk-method", "X-Oio-Chunk-Meta-Content-Chunk-Method"),
    ("chunk.id", "X-Oio-Chunk-Meta-Chunk-Id"),
    ("chunk.size", "X-Oio-Chunk-Meta-Chunk-Size"),
    ("chunk.pos", "X-Oio-Chunk-Meta-Chunk-Pos"),
];

/// The hash pair is not required on PUT (the server computes it) but is
/// persisted and echoed on GET like the rest of the table.
pub const HEADER_CHUNK_META_HASH: &str = "X-Oio-Chunk-Meta-Chunk-Hash";

/// Uppercase hex MD5 of the body: optional on PUT (verified when present),
/// always set on the PUT response.
pub const HEADER_CHUNK_HASH: &str = "chunkhash";

/// Request correlation: either request header is accepted, both are set on
/// the response.
pub const HEADER_REQID: &str = "X-oio-reqid";
pub const HEADER_TRANS_ID: &str = "X-trans-id";

/// Diagnostic detail attached to non-2xx replies.
pub const HEADER_ERROR: &str = "X-Error";

/// Truncation flag of a `/list` reply.
pub const HEADER_LIST_TRUNCATED: &str = "X-Oio-List-Truncated";

pub fn attr_name(suffix: &str) -> String {
    format!("{ATTR_PREFIX}{suffix}")
}
