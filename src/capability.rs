//! Capability bridge
//!
//! Answers "can this screen do HDR" from a per-screen cache, probing the
//! rendering backend only on a miss. Probes are best effort: a driver error
//! or a probe that outlives its timeout yields an unsupported record instead
//! of an error. Driver errors are cached like any other answer; timeouts are
//! not, so the next query probes again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as SlotLock;
use tracing::{debug, info, warn};
use xhdr_proto::{CapabilityRecord, Eotf};

use crate::backend::{HdrProbe, RenderBackend};
use crate::resolver::OutputHandle;

/// Bridge construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HdrSettings {
    /// Feature toggle; `false` short-circuits every query
    pub enabled: bool,
    pub probe_timeout: Duration,
    /// Depth reported for HDR outputs that don't advertise one
    pub default_max_depth: u8,
}

impl Default for HdrSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_timeout: Duration::from_millis(500),
            default_max_depth: 10,
        }
    }
}

type Slot = Arc<SlotLock<Option<CapabilityRecord>>>;

pub struct CapabilityBridge {
    backend: Arc<dyn RenderBackend>,
    settings: HdrSettings,
    /// One guard per screen; held across a probe so concurrent misses on the
    /// same screen probe once
    slots: Mutex<HashMap<u32, Slot>>,
}

impl CapabilityBridge {
    pub fn new(backend: Arc<dyn RenderBackend>, settings: HdrSettings) -> Self {
        info!(
            "Capability bridge ready (hdr10 {}, probe timeout {:?})",
            if settings.enabled { "enabled" } else { "disabled" },
            settings.probe_timeout
        );
        Self {
            backend,
            settings,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> HdrSettings {
        self.settings
    }

    fn slot(&self, screen: u32) -> Slot {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(screen)
            .or_default()
            .clone()
    }

    /// Capability record for an output, probing on a cache miss
    pub async fn query(&self, output: OutputHandle) -> CapabilityRecord {
        if !self.settings.enabled {
            debug!("HDR disabled, screen {} reported unsupported", output.screen);
            return CapabilityRecord::unsupported();
        }

        let slot = self.slot(output.screen);
        let mut cached = slot.lock().await;
        if let Some(record) = cached.as_ref() {
            debug!("Capability cache hit for screen {}", output.screen);
            return record.clone();
        }

        let Some(record) = self.probe(output).await else {
            return CapabilityRecord::unsupported();
        };
        info!(
            "Screen {} HDR capabilities: supported={}, max_depth={}, eotfs={:?}",
            output.screen, record.supported, record.max_depth, record.eotfs
        );
        *cached = Some(record.clone());
        record
    }

    /// Drop the cached record for a screen; the next query re-probes
    pub async fn invalidate(&self, screen: u32) {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&screen)
            .cloned();

        if let Some(slot) = slot {
            *slot.lock().await = None;
            debug!("Invalidated capabilities for screen {}", screen);
        }
    }

    /// Drop every cached record (device or driver change)
    pub async fn invalidate_all(&self) {
        let slots: Vec<(u32, Slot)> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(screen, slot)| (*screen, slot.clone()))
            .collect();

        for (_, slot) in &slots {
            *slot.lock().await = None;
        }
        debug!("Invalidated capabilities for {} screens", slots.len());
    }

    /// `None` when the backend did not answer in time
    async fn probe(&self, output: OutputHandle) -> Option<CapabilityRecord> {
        let backend = self.backend.clone();
        let task = tokio::task::spawn_blocking(move || backend.probe_hdr_support(output));

        match tokio::time::timeout(self.settings.probe_timeout, task).await {
            Ok(Ok(Ok(probe))) => Some(self.record_from(probe)),
            Ok(Ok(Err(e))) => {
                warn!("HDR probe failed on screen {}: {}", output.screen, e);
                Some(CapabilityRecord::unsupported())
            }
            Ok(Err(e)) => {
                warn!("HDR probe task failed on screen {}: {}", output.screen, e);
                Some(CapabilityRecord::unsupported())
            }
            Err(_) => {
                warn!(
                    "HDR probe on screen {} exceeded {:?}, reporting unsupported until it answers",
                    output.screen, self.settings.probe_timeout
                );
                None
            }
        }
    }

    fn record_from(&self, probe: HdrProbe) -> CapabilityRecord {
        if !probe.supported {
            return CapabilityRecord::unsupported();
        }

        let eotfs = if probe.eotfs.is_empty() {
            vec![Eotf::Sdr.to_u32(), Eotf::Pq.to_u32()]
        } else {
            probe.eotfs
        };

        CapabilityRecord {
            supported: true,
            max_depth: probe.max_bpc.unwrap_or(self.settings.default_max_depth),
            eotfs,
        }
    }
}
