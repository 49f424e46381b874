//! Window and screen lookup against the X server

use std::sync::Arc;
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{ChangeWindowAttributesAux, ConnectionExt as _, EventMask};
use x11rb::rust_connection::RustConnection;

use crate::resolver::{
    AccessError, AccessKind, ClientIdentity, OutputHandle, ResourceHandle, ResourceResolver,
};

/// Resolves XIDs through a client connection to the X server
///
/// Reads are open to everyone. Setting attributes is limited to root, the
/// user the server runs as, and explicitly trusted users.
pub struct X11Resolver {
    conn: Arc<RustConnection>,
    server_uid: u32,
    trusted_uids: Vec<u32>,
}

fn lookup_failed(err: ReplyError) -> AccessError {
    match err {
        ReplyError::X11Error(_) => AccessError::InvalidResource,
        ReplyError::ConnectionError(e) => AccessError::Unavailable(e.to_string()),
    }
}

impl X11Resolver {
    pub fn new(conn: Arc<RustConnection>, trusted_uids: Vec<u32>) -> Self {
        Self {
            conn,
            server_uid: unsafe { libc::getuid() },
            trusted_uids,
        }
    }

    fn may_set_attributes(&self, client: &ClientIdentity) -> bool {
        client.uid == 0 || client.uid == self.server_uid || self.trusted_uids.contains(&client.uid)
    }

    fn check(&self, client: &ClientIdentity, access: AccessKind) -> Result<(), AccessError> {
        match access {
            AccessKind::Read => Ok(()),
            AccessKind::SetAttributes if self.may_set_attributes(client) => Ok(()),
            AccessKind::SetAttributes => {
                debug!("uid {} may not set window attributes", client.uid);
                Err(AccessError::PermissionDenied)
            }
        }
    }

    /// Ask for DestroyNotify on a window so its metadata can be dropped
    fn watch(&self, window: u32) {
        let aux = ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY);
        if let Err(e) = self.conn.change_window_attributes(window, &aux) {
            debug!("Failed to watch window {:#x}: {}", window, e);
        }
        if let Err(e) = self.conn.flush() {
            debug!("Failed to flush watch request for window {:#x}: {}", window, e);
        }
    }
}

impl ResourceResolver for X11Resolver {
    fn resolve_window(
        &self,
        window: u32,
        client: &ClientIdentity,
        access: AccessKind,
    ) -> Result<ResourceHandle, AccessError> {
        self.check(client, access)?;

        // QueryTree fails with BadWindow for anything that isn't a window
        let tree = self
            .conn
            .query_tree(window)
            .map_err(|e| AccessError::Unavailable(e.to_string()))?
            .reply()
            .map_err(lookup_failed)?;
        let screen = super::screen_of_root(&self.conn, tree.root)
            .ok_or(AccessError::InvalidResource)?;

        if access == AccessKind::SetAttributes {
            self.watch(window);
        }

        Ok(ResourceHandle {
            id: window,
            output: OutputHandle { screen },
        })
    }

    fn resolve_screen(
        &self,
        screen: u32,
        client: &ClientIdentity,
        access: AccessKind,
    ) -> Result<ResourceHandle, AccessError> {
        self.check(client, access)?;

        let count = self.conn.setup().roots.len();
        if screen as usize >= count {
            return Err(AccessError::InvalidResource);
        }
        Ok(ResourceHandle {
            id: screen,
            output: OutputHandle { screen },
        })
    }
}
