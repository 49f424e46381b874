//! XHDR Protocol
//!
//! Wire types for the XHDR display extension: clients attach HDR static
//! metadata to windows and ask whether a screen can present HDR content.
//!
//! The codec in [`wire`] is transport-agnostic. It knows nothing about
//! sockets, event loops or the objects a request names; it only maps typed
//! values to fixed-layout bytes and back.

pub mod error;
pub mod metadata;
pub mod wire;

pub use error::{ProtocolError, Result};
pub use metadata::{CapabilityRecord, Eotf, HdrMetadata, MetadataError};
pub use wire::{
    decode_reply, decode_request, encode_reply, encode_request, ErrorCode, ErrorReply, Opcode,
    Reply, ReplyKind, Request,
};

/// Extension name advertised to clients
pub const EXTENSION_NAME: &str = "XHDR";

/// Protocol major version
pub const MAJOR_VERSION: u16 = 1;

/// Protocol minor version
pub const MINOR_VERSION: u16 = 0;

/// Socket path for the extension server
///
/// `XHDR_SOCKET` wins when set; otherwise the socket lives in the user's
/// runtime directory.
pub fn socket_path() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("XHDR_SOCKET") {
        return std::path::PathBuf::from(path);
    }
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    std::path::PathBuf::from(runtime_dir).join("xhdr.sock")
}
