//! The composition root: one `AdManager` per page.
//!
//! The manager owns every piece of engine state and is driven from a single
//! cooperative loop. Two event sources feed it (viewport resizes and document
//! mutations) and the only timer is the resize debounce deadline owned by the
//! coalescer. Outbound work goes through the [`CommandQueue`] and is never
//! awaited, except for the one-time activation gate.

use crate::coalescer::ResizeCoalescer;
use crate::config::ManagerConfig;
use crate::discovery::{DiscoveryContext, DiscoveryReport, Reconciler};
use crate::positions::PositionTable;
use crate::queue::{AdCommand, CommandQueue};
use crate::registry::SlotRegistry;
use crate::size::SizeMapping;
use anyhow::{Error, anyhow};
use core::future;
use core::ops::ControlFlow;
use dom::{DOMMirror, DomIndex, DomIndexState};
use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

/// Something that happened on the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageEvent {
    /// The viewport changed size.
    Resized { width: u32, height: u32 },
    /// The document runtime broadcast new mutation batches.
    DomChanged,
    /// The page is going away; stop the loop.
    Shutdown,
}

/// A pending activation: resolves once the ad service confirms it is enabled.
#[must_use = "activation only completes through AdManager::finish_activation"]
#[derive(Debug)]
pub struct Activation {
    ready: oneshot::Receiver<()>,
}

/// Discovers placements, keeps them sized for the viewport and drives the ad service.
pub struct AdManager {
    config: ManagerConfig,
    positions: PositionTable,
    registry: SlotRegistry,
    coalescer: ResizeCoalescer,
    reconciler: Reconciler,
    dom: DOMMirror<DomIndex>,
    queue: CommandQueue,
    viewport_width: u32,
    activated: bool,
    watching: bool,
}

impl AdManager {
    /// Build a manager over a DOM mirror and an outbound queue.
    ///
    /// Position overrides from `config.positions` are applied over the stock
    /// table one by one: empty, invalid or malformed entries are skipped and
    /// leave the stock mapping in place.
    pub fn new(
        config: ManagerConfig,
        dom: DOMMirror<DomIndex>,
        queue: CommandQueue,
        viewport_width: u32,
    ) -> Self {
        let mut positions = PositionTable::with_defaults();
        for (position, value) in &config.positions {
            positions.set_from_value(position, value.clone());
        }
        Self {
            positions,
            registry: SlotRegistry::new(),
            coalescer: ResizeCoalescer::new(config.resize_debounce()),
            reconciler: Reconciler::new(&config),
            dom,
            queue,
            viewport_width,
            activated: false,
            watching: false,
            config,
        }
    }

    /// Enqueue the service activation. Returns `None` when already active.
    pub fn begin_activation(&mut self) -> Option<Activation> {
        if self.activated {
            return None;
        }
        let (ready_tx, ready) = oneshot::channel();
        self.queue.push(AdCommand::Enable {
            settings: self.config.service_settings(),
            ready: ready_tx,
        });
        Some(Activation { ready })
    }

    /// Wait for a pending activation to be confirmed.
    ///
    /// # Errors
    /// Returns an error if the service could not be enabled or its runner is gone.
    pub async fn finish_activation(&mut self, activation: Activation) -> Result<(), Error> {
        activation
            .ready
            .await
            .map_err(|_| anyhow!("Ad service did not confirm activation"))?;
        self.activated = true;
        info!("Ad service active for {}{}", self.config.network_identifier, self.config.base_path);
        Ok(())
    }

    /// Activate the ad service, waiting for its confirmation. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the service could not be enabled or its runner is gone.
    pub async fn activate(&mut self) -> Result<(), Error> {
        match self.begin_activation() {
            Some(activation) => self.finish_activation(activation).await,
            None => Ok(()),
        }
    }

    /// Activate, run one discovery, then start reacting to resizes and marker insertions.
    ///
    /// # Errors
    /// Returns an error if activation fails; nothing is scanned in that case.
    pub async fn activate_and_scan(&mut self) -> Result<(), Error> {
        self.activate().await?;
        self.discover();
        self.watch();
        Ok(())
    }

    /// Start reacting to resize and mutation events.
    pub const fn watch(&mut self) {
        self.watching = true;
    }

    /// Rebuild the registry from the document and register every marker.
    ///
    /// Before activation this only logs a warning and returns `None`.
    pub fn discover(&mut self) -> Option<DiscoveryReport> {
        if !self.activated {
            warn!("Discovery requested before the ad service is active; ignoring");
            return None;
        }
        self.sync_dom();
        let mut ctx = DiscoveryContext {
            index: self.dom.mirror_mut().state_mut(),
            positions: &self.positions,
            registry: &mut self.registry,
            queue: &self.queue,
            viewport_width: self.viewport_width,
        };
        let report = self.reconciler.discover(&mut ctx);
        if !report.write_backs.is_empty() {
            if let Err(err) = self.dom.send_dom_change(report.write_backs.clone()) {
                warn!("Could not write placement ids back to the document: {err:#}");
            }
        }
        // Every marker present now has been scanned.
        self.dom.mirror_mut().state_mut().take_inserted();
        Some(report)
    }

    /// Re-resolve sizes for the current viewport and enqueue one bulk refresh.
    ///
    /// Returns how many registry entries were updated. Does nothing before activation.
    pub fn refresh(&mut self) -> usize {
        if !self.activated {
            return 0;
        }
        self.sync_dom();
        let mut ctx = DiscoveryContext {
            index: self.dom.mirror_mut().state_mut(),
            positions: &self.positions,
            registry: &mut self.registry,
            queue: &self.queue,
            viewport_width: self.viewport_width,
        };
        self.reconciler.refresh_all(&mut ctx)
    }

    /// Replace or create the mapping for `position`; empty or invalid mappings are ignored.
    pub fn set_size_mapping(&mut self, position: &str, mapping: SizeMapping) -> bool {
        self.positions.set(position, mapping)
    }

    /// Same contract as [`AdManager::set_size_mapping`].
    pub fn add_position(&mut self, position: &str, mapping: SizeMapping) -> bool {
        self.positions.add_position(position, mapping)
    }

    /// Record a viewport resize at `now`. Schedules a debounced refresh when watching.
    pub fn on_resize(&mut self, width: u32, now: Instant) {
        self.viewport_width = width;
        if self.watching {
            self.coalescer.notify(width, now);
        }
    }

    /// Apply pending document batches; re-discover if a marker was inserted.
    ///
    /// A resync snapshot after the mirror fell behind reinserts every node, so
    /// it always ends in a full rescan when markers exist.
    ///
    /// Returns whether a discovery pass ran.
    pub fn on_dom_batches(&mut self) -> bool {
        self.sync_dom();
        let inserted = self.dom.mirror_mut().state_mut().take_inserted();
        if !self.watching || inserted.is_empty() {
            return false;
        }
        if !self
            .reconciler
            .is_marker_insertion(self.dom.mirror().state(), &inserted)
        {
            return false;
        }
        debug!("New placement marker inserted; rescanning");
        self.discover().is_some()
    }

    /// Fire the debounced refresh if its deadline has passed. Returns whether it fired.
    pub fn poll_timers(&mut self, now: Instant) -> bool {
        let Some(width) = self.coalescer.poll(now) else {
            return false;
        };
        self.viewport_width = width;
        self.refresh();
        true
    }

    /// Dispatch one page event.
    pub fn handle_event(&mut self, event: PageEvent, now: Instant) -> ControlFlow<()> {
        match event {
            PageEvent::Resized { width, height } => {
                debug!("Viewport resized to {width}x{height}");
                self.on_resize(width, now);
            }
            PageEvent::DomChanged => {
                self.on_dom_batches();
            }
            PageEvent::Shutdown => {
                self.coalescer.cancel();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Process page events and the debounce deadline until shutdown or until
    /// the event source closes.
    pub async fn run(&mut self, mut events: mpsc::UnboundedReceiver<PageEvent>) {
        loop {
            let deadline = self.coalescer.deadline();
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Page event source closed");
                        break;
                    };
                    if self.handle_event(event, Instant::now()).is_break() {
                        break;
                    }
                }
                () = wait_for(deadline) => {
                    self.poll_timers(Instant::now());
                }
            }
        }
        info!(
            "Ad manager stopped ({} placements, {} resizes coalesced)",
            self.registry.len(),
            self.coalescer.coalesced()
        );
    }

    fn sync_dom(&mut self) {
        if let Err(err) = self.dom.try_update_sync() {
            warn!("Failed to apply document updates: {err:#}");
        }
    }

    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub const fn positions(&self) -> &PositionTable {
        &self.positions
    }

    pub const fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    pub const fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    pub const fn is_activated(&self) -> bool {
        self.activated
    }

    pub const fn is_watching(&self) -> bool {
        self.watching
    }

    /// When the pending debounced refresh is due, if any.
    pub const fn next_deadline(&self) -> Option<Instant> {
        self.coalescer.deadline()
    }

    /// The manager's view of the document.
    pub const fn dom_index(&self) -> &DomIndexState {
        self.dom.mirror().state()
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
