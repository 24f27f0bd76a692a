//! Error types for the export client.

use meterwire_common::ScopeError;
use thiserror::Error;

/// Result type alias using [`ExportError`].
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors surfaced by the export client.
///
/// The client never swallows an error: a failed call either normalizes to
/// success (an error status carrying the OK code) or propagates here
/// verbatim, possibly after the injected retry strategy gave up.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Connection could not be established at construction time. Fatal; no
    /// client is returned.
    #[error("failed to establish connection: {0}")]
    Connect(#[from] tonic::transport::Error),

    /// The export call failed with a gRPC status.
    #[error("export failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// The scope governing the call was cancelled or past its deadline.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// A configured header name or value is not valid gRPC metadata.
    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },

    /// The client was already shut down; its connection and service stub
    /// have been released.
    #[error("client has been shut down")]
    Shutdown,
}
