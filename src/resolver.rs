//! Resource resolution contract
//!
//! The dispatcher never touches window or screen objects directly. It asks a
//! [`ResourceResolver`] to turn a client-supplied ID into a handle, which is
//! also where access control happens.

use thiserror::Error;

/// A display output (X screen) the rendering backend can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputHandle {
    pub screen: u32,
}

/// A resolved window or screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    /// Resource ID as named by the client
    pub id: u32,
    /// Output the resource lives on
    pub output: OutputHandle,
}

/// Who is making a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    pub uid: u32,
    pub pid: Option<i32>,
}

impl ClientIdentity {
    pub fn new(uid: u32) -> Self {
        Self { uid, pid: None }
    }
}

/// What the client wants to do with the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    SetAttributes,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("no such resource")]
    InvalidResource,

    /// The resolver could not answer at all (lost display connection, ...)
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
}

/// Maps client resource IDs to handles, enforcing access rules
pub trait ResourceResolver: Send + Sync {
    fn resolve_window(
        &self,
        window: u32,
        client: &ClientIdentity,
        access: AccessKind,
    ) -> Result<ResourceHandle, AccessError>;

    fn resolve_screen(
        &self,
        screen: u32,
        client: &ClientIdentity,
        access: AccessKind,
    ) -> Result<ResourceHandle, AccessError>;
}
