//! Display lifecycle events
//!
//! Watches the X connection for the events that make cached HDR state stale:
//! RandR screen and output changes (hotplug, mode set, driver reload) clear
//! the capability cache, and DestroyNotify drops a window's metadata.
//!
//! The X11 file descriptor is polled with mio on a blocking thread which
//! wakes the async loop when events are readable.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::randr::{ConnectionExt as _, NotifyMask};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::capability::CapabilityBridge;
use crate::store::MetadataStore;

/// How often the poll thread checks whether the watcher was dropped. The
/// thread blocks in `poll` and has no other way to notice shutdown.
const SHUTDOWN_CHECK: Duration = Duration::from_millis(100);

/// Fallback drain period for the async loop. Resolver and backend round
/// trips on the shared connection read the socket themselves, so events they
/// pull in sit in x11rb's queue without the fd turning readable again.
const DRAIN_INTERVAL: Duration = Duration::from_millis(250);

const X11_FD: mio::Token = mio::Token(0);

pub struct LifecycleWatcher {
    conn: Arc<RustConnection>,
    readable: Arc<Notify>,
    _poller: oneshot::Receiver<()>,
}

impl LifecycleWatcher {
    /// Start polling the X11 connection and subscribe to RandR changes
    pub fn new(conn: Arc<RustConnection>) -> Result<Self> {
        let readable = Arc::new(Notify::new());
        let poller = spawn_fd_poller(conn.stream().as_raw_fd(), readable.clone())?;

        let watcher = Self {
            conn,
            readable,
            _poller: poller,
        };
        watcher.select_inputs()?;
        Ok(watcher)
    }

    fn select_inputs(&self) -> Result<()> {
        let mask = NotifyMask::SCREEN_CHANGE | NotifyMask::OUTPUT_CHANGE | NotifyMask::OUTPUT_PROPERTY;
        for screen in &self.conn.setup().roots {
            self.conn
                .randr_select_input(screen.root, mask)
                .context("Failed to select RandR input")?;
        }
        self.conn.flush()?;
        Ok(())
    }

    /// Process events until the connection fails
    pub async fn run(self, bridge: Arc<CapabilityBridge>, store: Arc<MetadataStore>) -> Result<()> {
        loop {
            self.conn.flush()?;
            while let Some(event) = self
                .conn
                .poll_for_event()
                .context("X11 connection lost")?
            {
                self.handle_event(event, &bridge, &store).await;
            }

            tokio::select! {
                _ = self.readable.notified() => {}
                _ = tokio::time::sleep(DRAIN_INTERVAL) => {}
            }
        }
    }

    async fn handle_event(&self, event: Event, bridge: &CapabilityBridge, store: &MetadataStore) {
        match event {
            Event::RandrScreenChangeNotify(ev) => match super::screen_of_root(&self.conn, ev.root) {
                Some(screen) => {
                    info!("Screen {} changed, dropping cached HDR capabilities", screen);
                    bridge.invalidate(screen).await;
                }
                None => bridge.invalidate_all().await,
            },
            Event::RandrNotify(_) => {
                info!("RandR output change, dropping cached HDR capabilities");
                bridge.invalidate_all().await;
            }
            Event::DestroyNotify(ev) => {
                if store.remove(ev.window).is_some() {
                    debug!("Window {:#x} destroyed, dropped its HDR metadata", ev.window);
                }
            }
            Event::Error(e) => {
                debug!("X11 error on lifecycle connection: {:?}", e);
            }
            _ => {}
        }
    }
}

/// Wake `readable` whenever `fd` has data. The thread exits once the
/// returned receiver is dropped.
fn spawn_fd_poller(fd: RawFd, readable: Arc<Notify>) -> Result<oneshot::Receiver<()>> {
    let mut poll = mio::Poll::new().context("Failed to create mio Poll")?;
    poll.registry()
        .register(&mut mio::unix::SourceFd(&fd), X11_FD, mio::Interest::READABLE)
        .context("Failed to register X11 FD with mio")?;

    let (alive, poller) = oneshot::channel::<()>();
    tokio::task::spawn_blocking(move || {
        let mut events = mio::Events::with_capacity(1);
        while !alive.is_closed() {
            match poll.poll(&mut events, Some(SHUTDOWN_CHECK)) {
                Ok(()) if events.iter().any(|event| event.token() == X11_FD) => {
                    readable.notify_one();
                }
                Ok(()) => {}
                Err(e) => warn!("X11 socket poll failed: {}", e),
            }
        }
        debug!("Lifecycle poll thread stopped");
    });

    Ok(poller)
}
