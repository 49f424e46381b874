//! In-memory collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use xhdr::{
    AccessError, AccessKind, BackendError, CapabilityBridge, ClientIdentity, DispatchTimeouts,
    Dispatcher, HdrProbe, HdrSettings, MetadataStore, OutputHandle, RenderBackend, ResourceHandle,
    ResourceResolver,
};
use xhdr_proto::HdrMetadata;

pub const OWNER: ClientIdentity = ClientIdentity {
    uid: 1000,
    pid: None,
};

pub const STRANGER: ClientIdentity = ClientIdentity {
    uid: 2000,
    pid: None,
};

/// Windows live on screens; denied users may read but not set attributes,
/// unreadable users may not even query screens
#[derive(Default)]
pub struct FakeResolver {
    /// window → screen
    pub windows: HashMap<u32, u32>,
    pub screens: HashSet<u32>,
    pub denied_uids: HashSet<u32>,
    pub unreadable_uids: HashSet<u32>,
    /// Every lookup fails as if the display connection dropped
    pub offline: bool,
    /// Every lookup sleeps this long first
    pub delay: Option<Duration>,
}

impl FakeResolver {
    pub fn with_window(mut self, window: u32, screen: u32) -> Self {
        self.screens.insert(screen);
        self.windows.insert(window, screen);
        self
    }

    pub fn with_screen(mut self, screen: u32) -> Self {
        self.screens.insert(screen);
        self
    }

    pub fn deny(mut self, uid: u32) -> Self {
        self.denied_uids.insert(uid);
        self
    }

    pub fn deny_read(mut self, uid: u32) -> Self {
        self.unreadable_uids.insert(uid);
        self
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn check(&self, client: &ClientIdentity, access: AccessKind) -> Result<(), AccessError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.offline {
            return Err(AccessError::Unavailable("display connection lost".into()));
        }
        let denied = match access {
            AccessKind::Read => &self.unreadable_uids,
            AccessKind::SetAttributes => &self.denied_uids,
        };
        if denied.contains(&client.uid) {
            return Err(AccessError::PermissionDenied);
        }
        Ok(())
    }
}

impl ResourceResolver for FakeResolver {
    fn resolve_window(
        &self,
        window: u32,
        client: &ClientIdentity,
        access: AccessKind,
    ) -> Result<ResourceHandle, AccessError> {
        self.check(client, access)?;
        let screen = *self.windows.get(&window).ok_or(AccessError::InvalidResource)?;
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
        if !self.screens.contains(&screen) {
            return Err(AccessError::InvalidResource);
        }
        Ok(ResourceHandle {
            id: screen,
            output: OutputHandle { screen },
        })
    }
}

/// Scriptable backend that counts probes and records applied metadata
pub struct FakeBackend {
    pub probe_result: Mutex<Result<HdrProbe, BackendError>>,
    pub probe_delay: Option<Duration>,
    pub apply_fails: bool,
    pub probes: AtomicUsize,
    pub applied: Mutex<Vec<(u32, HdrMetadata)>>,
}

impl FakeBackend {
    /// Backend reporting PQ support at 10 bpc
    pub fn hdr10() -> Self {
        Self::with_probe(Ok(HdrProbe {
            supported: true,
            eotfs: vec![0, 1],
            max_bpc: Some(10),
        }))
    }

    pub fn with_probe(result: Result<HdrProbe, BackendError>) -> Self {
        Self {
            probe_result: Mutex::new(result),
            probe_delay: None,
            apply_fails: false,
            probes: AtomicUsize::new(0),
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn set_probe(&self, result: Result<HdrProbe, BackendError>) {
        *self.probe_result.lock().unwrap() = result;
    }
}

impl RenderBackend for FakeBackend {
    fn probe_hdr_support(&self, _output: OutputHandle) -> Result<HdrProbe, BackendError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.probe_delay {
            std::thread::sleep(delay);
        }
        self.probe_result.lock().unwrap().clone()
    }

    fn apply_metadata(
        &self,
        target: &ResourceHandle,
        metadata: &HdrMetadata,
    ) -> Result<(), BackendError> {
        self.applied.lock().unwrap().push((target.id, *metadata));
        if self.apply_fails {
            return Err(BackendError::Driver("swapchain lost".into()));
        }
        Ok(())
    }
}

pub fn settings() -> HdrSettings {
    HdrSettings {
        enabled: true,
        probe_timeout: Duration::from_millis(200),
        default_max_depth: 10,
    }
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MetadataStore>,
    pub bridge: Arc<CapabilityBridge>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new(resolver: FakeResolver, backend: FakeBackend, settings: HdrSettings) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(MetadataStore::new());
        let bridge = Arc::new(CapabilityBridge::new(backend.clone(), settings));
        let dispatcher = Dispatcher::new(
            Arc::new(resolver),
            backend.clone(),
            bridge.clone(),
            store.clone(),
            DispatchTimeouts {
                resolve: Duration::from_millis(200),
                apply: Duration::from_millis(200),
            },
        );
        Self {
            backend,
            store,
            bridge,
            dispatcher,
        }
    }

    /// Window 42 and screen 0 on an HDR10 backend; STRANGER may not write
    pub fn standard() -> Self {
        Self::new(
            FakeResolver::default()
                .with_window(42, 0)
                .with_screen(0)
                .deny(STRANGER.uid),
            FakeBackend::hdr10(),
            settings(),
        )
    }
}
