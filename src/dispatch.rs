//! Request dispatcher
//!
//! Each request walks `Received → Validated → Handled` and then ends in
//! either a reply or an error reply. There is no retry; one request is one
//! round trip. Malformed input from a client is a client error, never a
//! server fault, so nothing here can take the server down.
//!
//! Resolver lookups, backend probes and metadata application may all block
//! on the display server or driver. Each runs on a blocking worker under its
//! own deadline so a wedged display never holds a runtime thread.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};
use xhdr_proto::{
    decode_request, encode_reply, ErrorCode, ErrorReply, HdrMetadata, Opcode, ProtocolError,
    Reply, Request,
};

use crate::backend::RenderBackend;
use crate::capability::CapabilityBridge;
use crate::resolver::{AccessError, AccessKind, ClientIdentity, ResourceHandle, ResourceResolver};
use crate::store::MetadataStore;

/// Stage a request reached before it finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RequestState {
    /// Bytes arrived; decoding
    Received,
    /// Decoded; resolving the target and checking the payload
    Validated,
    /// Target resolved and payload accepted; performing the operation
    Handled,
}

/// Result of dispatching one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Last stage entered; an error reply means that stage failed
    pub state: RequestState,
    pub reply: Reply,
}

struct Exchange {
    opcode: u8,
    state: RequestState,
}

impl Exchange {
    fn new(opcode: u8) -> Self {
        Self {
            opcode,
            state: RequestState::Received,
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        debug!("{}: {:?} -> {:?}", opcode_name(self.opcode), self.state, next);
        self.state = next;
    }

    fn error(&self, code: ErrorCode, bad_value: u32) -> ErrorReply {
        ErrorReply {
            code,
            opcode: self.opcode,
            bad_value,
        }
    }

    fn access_error(&self, e: AccessError, missing: ErrorCode, id: u32) -> ErrorReply {
        let code = match e {
            AccessError::PermissionDenied => ErrorCode::Access,
            AccessError::InvalidResource => missing,
            AccessError::Unavailable(reason) => {
                warn!("Resolver unavailable for {}: {}", opcode_name(self.opcode), reason);
                ErrorCode::Implementation
            }
        };
        self.error(code, id)
    }
}

/// Deadlines for the blocking collaborator calls made per request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTimeouts {
    /// Resolving a window or screen ID
    pub resolve: Duration,
    /// Handing metadata to the backend
    pub apply: Duration,
}

impl Default for DispatchTimeouts {
    fn default() -> Self {
        Self {
            resolve: Duration::from_millis(250),
            apply: Duration::from_millis(250),
        }
    }
}

pub struct Dispatcher {
    resolver: Arc<dyn ResourceResolver>,
    backend: Arc<dyn RenderBackend>,
    bridge: Arc<CapabilityBridge>,
    store: Arc<MetadataStore>,
    timeouts: DispatchTimeouts,
}

impl Dispatcher {
    pub fn new(
        resolver: Arc<dyn ResourceResolver>,
        backend: Arc<dyn RenderBackend>,
        bridge: Arc<CapabilityBridge>,
        store: Arc<MetadataStore>,
        timeouts: DispatchTimeouts,
    ) -> Self {
        Self {
            resolver,
            backend,
            bridge,
            store,
            timeouts,
        }
    }

    pub fn store(&self) -> &Arc<MetadataStore> {
        &self.store
    }

    pub fn bridge(&self) -> &Arc<CapabilityBridge> {
        &self.bridge
    }

    /// Process raw request bytes and produce the encoded reply
    pub async fn dispatch(&self, raw: &[u8], client: &ClientIdentity) -> Vec<u8> {
        let outcome = self.dispatch_request(raw, client).await;
        match encode_reply(&outcome.reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode reply: {}", e);
                let fallback = ErrorReply {
                    code: ErrorCode::Implementation,
                    opcode: raw.first().copied().unwrap_or_default(),
                    bad_value: 0,
                };
                // error replies are fixed-size and always encode
                encode_reply(&Reply::Error(fallback)).unwrap_or_default()
            }
        }
    }

    /// Process raw request bytes, returning the typed reply and final stage
    pub async fn dispatch_request(&self, raw: &[u8], client: &ClientIdentity) -> Outcome {
        let mut exchange = Exchange::new(raw.first().copied().unwrap_or_default());
        let reply = match self.run(&mut exchange, raw, client).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(
                    "{} failed in {:?}: {:?} (bad value {:#x})",
                    opcode_name(e.opcode),
                    exchange.state,
                    e.code,
                    e.bad_value
                );
                Reply::Error(e)
            }
        };
        Outcome {
            state: exchange.state,
            reply,
        }
    }

    async fn run(
        &self,
        exchange: &mut Exchange,
        raw: &[u8],
        client: &ClientIdentity,
    ) -> Result<Reply, ErrorReply> {
        let request = decode_request(raw).map_err(|e| match e {
            ProtocolError::UnknownOpcode(_) => exchange.error(ErrorCode::Request, 0),
            _ => exchange.error(ErrorCode::Length, raw.len() as u32),
        })?;
        exchange.advance(RequestState::Validated);
        let client = *client;

        match request {
            Request::SetHdrMetadata { window, metadata } => {
                let target = self
                    .resolve("window", window, move |resolver| {
                        resolver.resolve_window(window, &client, AccessKind::SetAttributes)
                    })
                    .await
                    .map_err(|e| exchange.access_error(e, ErrorCode::Window, window))?;
                metadata
                    .validate()
                    .map_err(|e| {
                        debug!("Rejected metadata for window {:#x}: {}", window, e);
                        exchange.error(ErrorCode::Value, e.bad_value())
                    })?;
                exchange.advance(RequestState::Handled);

                debug!(
                    "SetHdrMetadata window={:#x} primaries={:#x} eotf={} max_cll={} min_lum={} max_lum={}",
                    window,
                    metadata.primaries,
                    metadata.eotf,
                    metadata.max_cll,
                    metadata.min_lum,
                    metadata.max_lum
                );
                self.store.set(window, metadata);
                self.apply(target, metadata).await;
                Ok(Reply::Ack)
            }
            Request::QueryHdrCapabilities { screen } => {
                let target = self
                    .resolve("screen", screen, move |resolver| {
                        resolver.resolve_screen(screen, &client, AccessKind::Read)
                    })
                    .await
                    .map_err(|e| exchange.access_error(e, ErrorCode::Value, screen))?;
                exchange.advance(RequestState::Handled);

                let record = self.bridge.query(target.output).await;
                debug!(
                    "QueryHdrCapabilities screen={} supported={} max_depth={}",
                    screen, record.supported, record.max_depth
                );
                Ok(Reply::Capabilities(record))
            }
        }
    }

    /// Run one resolver lookup on a blocking worker. A lookup that misses its
    /// deadline is reported as [`AccessError::Unavailable`]; the worker is
    /// left to finish on its own.
    async fn resolve<F>(
        &self,
        what: &str,
        id: u32,
        lookup: F,
    ) -> Result<ResourceHandle, AccessError>
    where
        F: FnOnce(&dyn ResourceResolver) -> Result<ResourceHandle, AccessError> + Send + 'static,
    {
        let resolver = self.resolver.clone();
        let task = tokio::task::spawn_blocking(move || lookup(&*resolver));

        match tokio::time::timeout(self.timeouts.resolve, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(AccessError::Unavailable(format!(
                "lookup of {} {:#x} failed: {}",
                what, id, e
            ))),
            Err(_) => Err(AccessError::Unavailable(format!(
                "lookup of {} {:#x} exceeded {:?}",
                what, id, self.timeouts.resolve
            ))),
        }
    }

    /// Hand stored metadata to the backend. Failures are logged, not returned:
    /// the metadata is already stored on the window.
    async fn apply(&self, target: ResourceHandle, metadata: HdrMetadata) {
        let backend = self.backend.clone();
        let task =
            tokio::task::spawn_blocking(move || backend.apply_metadata(&target, &metadata));

        match tokio::time::timeout(self.timeouts.apply, task).await {
            Ok(Ok(Ok(()))) => debug!("Applied HDR metadata to window {:#x}", target.id),
            Ok(Ok(Err(e))) => warn!(
                "Backend could not apply HDR metadata to window {:#x}: {}",
                target.id, e
            ),
            Ok(Err(e)) => warn!("HDR apply task failed for window {:#x}: {}", target.id, e),
            Err(_) => warn!(
                "HDR apply for window {:#x} exceeded {:?}",
                target.id, self.timeouts.apply
            ),
        }
    }
}

/// Opcode name for logs
pub fn opcode_name(opcode: u8) -> &'static str {
    match Opcode::from_u8(opcode) {
        Some(Opcode::SetHdrMetadata) => "SetHdrMetadata",
        Some(Opcode::QueryHdrCapabilities) => "QueryHdrCapabilities",
        None => "unknown",
    }
}
