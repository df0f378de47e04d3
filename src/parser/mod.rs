//! XDR reply parsing for the RPC, MOUNT and NFSv3 protocols.
//!
//! Every RPC reply is read off the wire as one complete record (the
//! transport reassembles fragments) and then decoded here with synchronous
//! readers over the in-memory buffer.

pub mod mount;
pub mod nfs3;
pub mod primitive;
pub mod rpc;

/// Result of parsing operations with error type [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while decoding an XDR reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The buffer ended early or another read failure occurred.
    #[error("reply truncated: {0}")]
    IO(#[from] std::io::Error),
    /// Padding bytes were missing after a variable-length field.
    #[error("incorrect XDR padding")]
    IncorrectPadding,
    /// A union discriminant or enum value was out of range.
    #[error("enum discriminant mismatch")]
    EnumDiscMismatch,
    /// A string field held malformed UTF-8.
    #[error("malformed string in reply")]
    IncorrectString(#[from] std::string::FromUtf8Error),
    /// A counted field exceeded its protocol-imposed maximum.
    #[error("element exceeds size limit")]
    MaxElemLimit,
    /// A file handle exceeded `NFS3_FHSIZE`.
    #[error("bad file handle in reply")]
    BadFileHandle,
    /// The reply was rejected or structurally invalid at the RPC layer.
    #[error("RPC reply error: {0}")]
    Rpc(String),
}
