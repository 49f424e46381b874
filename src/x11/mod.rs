//! X11 collaborators
//!
//! The extension server runs beside an X server and uses a regular client
//! connection to it: windows and screens are looked up over the wire, HDR
//! support is read from RandR output properties, and applied metadata is
//! published as a window property for the compositor to pick up.

pub mod backend;
pub mod events;
pub mod resolver;

pub use backend::X11Backend;
pub use events::LifecycleWatcher;
pub use resolver::X11Resolver;

use x11rb::connection::Connection;
use x11rb::rust_connection::RustConnection;

/// Screen number whose root window is `root`
pub fn screen_of_root(conn: &RustConnection, root: u32) -> Option<u32> {
    conn.setup()
        .roots
        .iter()
        .position(|screen| screen.root == root)
        .and_then(|index| u32::try_from(index).ok())
}
