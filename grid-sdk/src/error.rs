use std::io;

/// Errors surfaced by the SDK.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// The target resource is absent, whatever the level: user, container or
    /// object.
    #[error("resource not found")]
    NotFound,

    /// The client only serves the namespace it was built for.
    #[error("namespace not managed")]
    NsNotManaged,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Erasure coding is surface-visible but not implemented.
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),

    /// Too many replicas rejected the upload.
    #[error("quorum not reached")]
    QuorumNotReached,

    /// Neither the caller nor the proxy provided a content id.
    #[error("missing content id")]
    MissingContentId,

    /// Neither the caller nor the proxy provided a content version.
    #[error("missing content version")]
    MissingVersion,

    /// A chunk target answered outside the 2xx class.
    #[error("chunk target replied {0}")]
    TargetStatus(u16),

    /// Decoded proxy error, both status codes preserved.
    #[error("proxy error: ({http}) ({status}) {message}")]
    Proxy {
        http: u16,
        status: i64,
        message: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SdkError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SdkError::NotFound)
    }
}
