//! Rendering backend contract

use thiserror::Error;
use xhdr_proto::HdrMetadata;

use crate::resolver::{OutputHandle, ResourceHandle};

/// Raw answer from a backend capability probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HdrProbe {
    /// The output exposes an HDR metadata path
    pub supported: bool,
    /// Transfer function codes the output accepts
    pub eotfs: Vec<u32>,
    /// Highest bits-per-channel the output reports, if it reports one
    pub max_bpc: Option<u8>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("no such output: screen {0}")]
    NoSuchOutput(u32),

    #[error("driver error: {0}")]
    Driver(String),
}

/// The GPU / display side of the extension
///
/// Both calls may block on driver I/O; callers run them on blocking workers
/// with a timeout.
pub trait RenderBackend: Send + Sync + 'static {
    fn probe_hdr_support(&self, output: OutputHandle) -> Result<HdrProbe, BackendError>;

    /// Hand metadata to the presentation path for `target`. Best effort.
    fn apply_metadata(
        &self,
        target: &ResourceHandle,
        metadata: &HdrMetadata,
    ) -> Result<(), BackendError>;
}
