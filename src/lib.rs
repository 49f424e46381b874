//! XHDR
//!
//! Server side and client stubs of the XHDR display extension. Clients tag
//! windows with HDR static metadata and ask screens for their HDR
//! capabilities; the server validates requests, stores metadata per window
//! and bridges to the rendering backend.

pub mod backend;
pub mod capability;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod resolver;
pub mod server;
pub mod store;
pub mod x11;

pub use backend::{BackendError, HdrProbe, RenderBackend};
pub use capability::{CapabilityBridge, HdrSettings};
pub use client::{ClientError, Transport, UnixTransport, XhdrClient};
pub use dispatch::{DispatchTimeouts, Dispatcher, Outcome, RequestState};
pub use resolver::{
    AccessError, AccessKind, ClientIdentity, OutputHandle, ResourceHandle, ResourceResolver,
};
pub use store::MetadataStore;
