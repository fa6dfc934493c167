use std::io;

/// Errors surfaced by the repository layer.
///
/// The HTTP layer maps these onto statuses; everything unexpected travels as
/// a wrapped [`io::Error`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("chunk not found")]
    NotFound,

    #[error("chunk already exists")]
    ChunkExists,

    #[error("invalid chunk name")]
    InvalidChunkName,

    #[error("invalid list marker")]
    InvalidListMarker,

    #[error("invalid list prefix")]
    InvalidListPrefix,

    /// The repository root carries a different identity than the one offered.
    #[error("repository lock mismatch on {attr}")]
    LockMismatch { attr: String },

    #[error("invalid move order: {0}")]
    InvalidMoveOrder(String),

    #[error("writer already finalized")]
    WriterClosed,

    #[error("not implemented")]
    Unimplemented,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    /// True for the "try the next tier" class of errors.
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound => true,
            StoreError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_chunk_exists(&self) -> bool {
        matches!(self, StoreError::ChunkExists)
    }

    /// Collapses the io NotFound/AlreadyExists kinds into their repository
    /// meanings.
    pub(crate) fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound,
            io::ErrorKind::AlreadyExists => StoreError::ChunkExists,
            _ => StoreError::Io(e),
        }
    }
}
