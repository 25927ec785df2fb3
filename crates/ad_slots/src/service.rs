//! The ad-serving network boundary.
//!
//! The engine never talks to an ad network directly. It decides what to
//! register and when, and an [`AdService`] implementation carries it out.

use crate::registry::TargetingValue;
use crate::size::{Size, SizeMapping};
use anyhow::{Error, anyhow};
use log::{debug, info};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Opaque handle to a placement the service created.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotHandle(pub u64);

/// Service-wide switches applied once at activation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Collapse placement containers that end up with no creative.
    pub collapse_empty_placements: bool,
    /// Fetch all placements of a page in one request.
    pub enable_batched_requests: bool,
    /// Register placements without rendering them until an explicit refresh.
    pub defer_initial_render: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            collapse_empty_placements: true,
            enable_batched_requests: true,
            defer_initial_render: false,
        }
    }
}

/// The capability the engine drives.
///
/// Calls arrive in the order the engine enqueued them.
pub trait AdService {
    /// Apply service settings and enable the service.
    ///
    /// # Errors
    /// Returns an error if the service cannot be brought up.
    fn enable(&mut self, settings: &ServiceSettings) -> Result<(), Error>;

    /// Create a placement bound to the element with `element_id`.
    ///
    /// An empty `sizes` list is legal and means no creative fits right now.
    ///
    /// # Errors
    /// Returns an error if the service could not create the placement.
    fn define_slot(
        &mut self,
        unit_path: &str,
        sizes: &[Size],
        element_id: &str,
    ) -> Result<SlotHandle, Error>;

    /// Attach responsive breakpoints to a placement.
    fn apply_size_mapping(&mut self, handle: SlotHandle, mapping: &SizeMapping);

    /// Attach one key-value targeting pair to a placement.
    fn apply_targeting(&mut self, handle: SlotHandle, key: &str, value: &TargetingValue);

    /// Render the placement bound to `element_id`.
    fn display(&mut self, element_id: &str);

    /// Re-render every registered placement.
    fn refresh_all(&mut self);
}

/// One call observed by a [`RecordingService`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServiceCall {
    Enable(ServiceSettings),
    DefineSlot {
        unit_path: String,
        sizes: Vec<Size>,
        element_id: String,
        handle: Option<SlotHandle>,
    },
    ApplySizeMapping {
        handle: SlotHandle,
        mapping: SizeMapping,
    },
    ApplyTargeting {
        handle: SlotHandle,
        key: String,
        value: TargetingValue,
    },
    Display {
        element_id: String,
    },
    RefreshAll,
}

/// Shared, append-only log of service calls.
#[derive(Clone, Debug, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl CallJournal {
    fn record(&self, call: ServiceCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// A copy of every call recorded so far.
    pub fn snapshot(&self) -> Vec<ServiceCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Forget every recorded call.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

/// An [`AdService`] that logs and records every call instead of contacting a network.
///
/// Used by the headless driver and by tests. Definitions for ids registered
/// with [`RecordingService::fail_definitions_for`] are refused.
#[derive(Debug, Default)]
pub struct RecordingService {
    journal: CallJournal,
    next_handle: u64,
    enabled: bool,
    failing_ids: HashSet<String>,
}

impl RecordingService {
    /// Create a service and the journal it writes to.
    pub fn new() -> (Self, CallJournal) {
        let service = Self::default();
        let journal = service.journal.clone();
        (service, journal)
    }

    /// Refuse to define placements for these element ids.
    #[must_use]
    pub fn fail_definitions_for<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_ids.extend(ids.into_iter().map(Into::into));
        self
    }
}

impl AdService for RecordingService {
    fn enable(&mut self, settings: &ServiceSettings) -> Result<(), Error> {
        info!(
            "Ad service enabled (collapse empty: {}, batched: {}, deferred render: {})",
            settings.collapse_empty_placements,
            settings.enable_batched_requests,
            settings.defer_initial_render
        );
        self.enabled = true;
        self.journal.record(ServiceCall::Enable(settings.clone()));
        Ok(())
    }

    fn define_slot(
        &mut self,
        unit_path: &str,
        sizes: &[Size],
        element_id: &str,
    ) -> Result<SlotHandle, Error> {
        let handle = if !self.enabled || self.failing_ids.contains(element_id) {
            None
        } else {
            self.next_handle += 1;
            Some(SlotHandle(self.next_handle))
        };
        let listed: Vec<String> = sizes.iter().map(ToString::to_string).collect();
        debug!("defineSlot({unit_path}, [{}], {element_id}) -> {handle:?}", listed.join(", "));
        self.journal.record(ServiceCall::DefineSlot {
            unit_path: unit_path.to_owned(),
            sizes: sizes.to_vec(),
            element_id: element_id.to_owned(),
            handle,
        });
        handle.ok_or_else(|| anyhow!("service refused placement '{element_id}'"))
    }

    fn apply_size_mapping(&mut self, handle: SlotHandle, mapping: &SizeMapping) {
        debug!(
            "defineSizeMapping({handle:?}) with {} breakpoints",
            mapping.breakpoints().len()
        );
        self.journal.record(ServiceCall::ApplySizeMapping {
            handle,
            mapping: mapping.clone(),
        });
    }

    fn apply_targeting(&mut self, handle: SlotHandle, key: &str, value: &TargetingValue) {
        debug!("setTargeting({handle:?}, {key}, {value})");
        self.journal.record(ServiceCall::ApplyTargeting {
            handle,
            key: key.to_owned(),
            value: value.clone(),
        });
    }

    fn display(&mut self, element_id: &str) {
        debug!("display({element_id})");
        self.journal.record(ServiceCall::Display {
            element_id: element_id.to_owned(),
        });
    }

    fn refresh_all(&mut self) {
        debug!("refresh()");
        self.journal.record(ServiceCall::RefreshAll);
    }
}
