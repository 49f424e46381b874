//! RandR-backed HDR probing
//!
//! KMS exposes HDR capable connectors through an `HDR_OUTPUT_METADATA`
//! property and the channel depth through `max bpc`; the X server mirrors
//! connector properties onto RandR outputs. Applied metadata goes onto the
//! window as `_XHDR_METADATA` (CARDINAL[5], wire field order) where the
//! compositor's presentation path reads it.

use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt as _, PropMode};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use xhdr_proto::{Eotf, HdrMetadata};

use crate::backend::{BackendError, HdrProbe, RenderBackend};
use crate::resolver::{OutputHandle, ResourceHandle};

const NONE: u32 = 0;

fn driver<E: std::fmt::Display>(e: E) -> BackendError {
    BackendError::Driver(e.to_string())
}

/// Atoms the backend needs, interned once
#[derive(Debug, Clone, Copy)]
struct Atoms {
    /// `NONE` if no driver ever created it
    hdr_output_metadata: u32,
    /// `NONE` if no driver ever created it
    max_bpc: u32,
    xhdr_metadata: u32,
}

pub struct X11Backend {
    conn: Arc<RustConnection>,
    atoms: Atoms,
}

impl X11Backend {
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let version = conn
            .randr_query_version(1, 5)
            .context("Failed to query RandR version")?
            .reply()
            .context("RandR is not available")?;
        info!(
            "RandR {}.{} available",
            version.major_version, version.minor_version
        );

        let atoms = Atoms {
            hdr_output_metadata: Self::intern(&conn, true, b"HDR_OUTPUT_METADATA")?,
            max_bpc: Self::intern(&conn, true, b"max bpc")?,
            xhdr_metadata: Self::intern(&conn, false, b"_XHDR_METADATA")?,
        };
        debug!("Interned atoms: {:?}", atoms);

        Ok(Self { conn, atoms })
    }

    fn intern(conn: &RustConnection, only_if_exists: bool, name: &[u8]) -> Result<u32> {
        Ok(conn
            .intern_atom(only_if_exists, name)
            .context("Failed to intern atom")?
            .reply()
            .context("Failed to intern atom")?
            .atom)
    }

    /// Highest `max bpc` value an output accepts
    fn output_max_bpc(&self, output: randr::Output) -> Result<Option<u8>, BackendError> {
        let property = self
            .conn
            .randr_query_output_property(output, self.atoms.max_bpc)
            .map_err(driver)?
            .reply()
            .map_err(driver)?;

        let max = if property.range {
            property.valid_values.get(1).copied()
        } else {
            property.valid_values.iter().copied().max()
        };
        Ok(max.and_then(|v| u8::try_from(v).ok()))
    }
}

impl RenderBackend for X11Backend {
    fn probe_hdr_support(&self, output: OutputHandle) -> Result<HdrProbe, BackendError> {
        let root = self
            .conn
            .setup()
            .roots
            .get(output.screen as usize)
            .map(|screen| screen.root)
            .ok_or(BackendError::NoSuchOutput(output.screen))?;

        let resources = self
            .conn
            .randr_get_screen_resources_current(root)
            .map_err(driver)?
            .reply()
            .map_err(driver)?;

        let mut probe = HdrProbe::default();
        for &out in &resources.outputs {
            let info = self
                .conn
                .randr_get_output_info(out, resources.config_timestamp)
                .map_err(driver)?
                .reply()
                .map_err(driver)?;
            if info.connection != randr::Connection::CONNECTED {
                continue;
            }

            let properties = self
                .conn
                .randr_list_output_properties(out)
                .map_err(driver)?
                .reply()
                .map_err(driver)?;

            if self.atoms.hdr_output_metadata != NONE
                && properties.atoms.contains(&self.atoms.hdr_output_metadata)
            {
                debug!(
                    "Output {} ({}) has HDR_OUTPUT_METADATA",
                    out,
                    String::from_utf8_lossy(&info.name)
                );
                probe.supported = true;
            }

            if self.atoms.max_bpc != NONE && properties.atoms.contains(&self.atoms.max_bpc) {
                let bpc = self.output_max_bpc(out)?;
                probe.max_bpc = probe.max_bpc.max(bpc);
            }
        }

        if probe.supported {
            probe.eotfs = vec![Eotf::Sdr.to_u32(), Eotf::Pq.to_u32()];
        } else {
            probe.eotfs = vec![Eotf::Sdr.to_u32()];
        }
        Ok(probe)
    }

    fn apply_metadata(
        &self,
        target: &ResourceHandle,
        metadata: &HdrMetadata,
    ) -> Result<(), BackendError> {
        self.conn
            .change_property32(
                PropMode::REPLACE,
                target.id,
                self.atoms.xhdr_metadata,
                AtomEnum::CARDINAL,
                &metadata.to_words(),
            )
            .map_err(driver)?
            .check()
            .map_err(driver)?;
        debug!("Published _XHDR_METADATA on window {:#x}", target.id);
        Ok(())
    }
}
