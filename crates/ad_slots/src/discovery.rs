//! Marker discovery and the refresh pass.
//!
//! The reconciler turns the current document into registry entries and
//! registration commands. It holds no state of its own beyond the selectors
//! and placement path settings; everything it reads or mutates is passed in
//! through a [`DiscoveryContext`].

use crate::config::ManagerConfig;
use crate::positions::{DEFAULT_POSITION, PositionTable};
use crate::queue::{AdCommand, CommandQueue, SlotDefinition};
use crate::registry::{SlotConfig, SlotRegistry, Targeting};
use crate::size::resolve;
use dom::{DOMUpdate, DomIndexState, NodeKey};
use log::{debug, info, warn};
use tracing::info_span;

/// Prefix of ids synthesized for markers that carry none.
pub const SYNTHESIZED_ID_PREFIX: &str = "ad-slot-";

/// Borrowed view of the state one discovery or refresh pass works on.
pub struct DiscoveryContext<'ctx> {
    pub index: &'ctx mut DomIndexState,
    pub positions: &'ctx PositionTable,
    pub registry: &'ctx mut SlotRegistry,
    pub queue: &'ctx CommandQueue,
    pub viewport_width: u32,
}

/// Outcome of one discovery pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Ids registered, in document order.
    pub registered: Vec<String>,
    /// Ids that were synthesized and written back onto their markers.
    pub assigned_ids: Vec<String>,
    /// `SetAttr` updates the document runtime must apply to persist the ids.
    pub write_backs: Vec<DOMUpdate>,
}

/// Finds placement markers and keeps the registry in step with them.
#[derive(Clone, Debug)]
pub struct Reconciler {
    marker_class: String,
    position_attribute: String,
    targeting_attribute: String,
    /// `{network}{base_path}`, shared by every placement.
    unit_path_prefix: String,
    append_position_to_path: bool,
}

impl Reconciler {
    pub fn new(config: &ManagerConfig) -> Self {
        Self {
            marker_class: config.marker_class.clone(),
            position_attribute: config.position_attribute.clone(),
            targeting_attribute: config.targeting_attribute.clone(),
            unit_path_prefix: format!("{}{}", config.network_identifier, config.base_path),
            append_position_to_path: config.append_position_to_path,
        }
    }

    /// Placement path for a slot at `position`.
    pub fn unit_path(&self, position: &str) -> String {
        if self.append_position_to_path {
            format!("{}/{position}", self.unit_path_prefix)
        } else {
            self.unit_path_prefix.clone()
        }
    }

    /// Rebuild the registry from every marker in the document.
    ///
    /// Markers are visited in document order and each one is enqueued for
    /// registration as soon as its entry is stored. A marker without an id gets
    /// `ad-slot-<n>`, `n` being its zero-based index among all markers; the id is
    /// set on the local index right away and returned as a write-back.
    pub fn discover(&self, ctx: &mut DiscoveryContext<'_>) -> DiscoveryReport {
        let markers = ctx.index.elements_by_class(&self.marker_class);
        let _span = info_span!("slots.discover", markers = markers.len()).entered();
        ctx.registry.clear();

        let mut report = DiscoveryReport::default();
        for (ordinal, marker) in markers.into_iter().enumerate() {
            let id = match ctx.index.attribute(marker, "id").filter(|id| !id.is_empty()) {
                Some(existing) => existing.to_owned(),
                None => {
                    let synthesized = format!("{SYNTHESIZED_ID_PREFIX}{ordinal}");
                    ctx.index.set_attribute(marker, "id", &synthesized);
                    report.write_backs.push(DOMUpdate::SetAttr {
                        node: marker,
                        name: "id".to_owned(),
                        value: synthesized.clone(),
                    });
                    report.assigned_ids.push(synthesized.clone());
                    synthesized
                }
            };
            let config = self.slot_config(ctx, marker, id);
            ctx.queue.push(AdCommand::Define(SlotDefinition {
                unit_path: self.unit_path(&config.position),
                element_id: config.id.clone(),
                sizes: config.sizes.clone(),
                size_mapping: config.size_mapping.clone(),
                targeting: config.targeting.clone(),
            }));
            report.registered.push(config.id.clone());
            ctx.registry.upsert(config.id.clone(), config);
        }
        info!(
            "Discovered {} placements ({} ids assigned)",
            report.registered.len(),
            report.assigned_ids.len()
        );
        report
    }

    fn slot_config(&self, ctx: &DiscoveryContext<'_>, marker: NodeKey, id: String) -> SlotConfig {
        let position = ctx
            .index
            .attribute(marker, &self.position_attribute)
            .map(str::trim)
            .filter(|position| !position.is_empty())
            .unwrap_or(DEFAULT_POSITION)
            .to_owned();
        let size_mapping = ctx.positions.get(&position).clone();
        let sizes = resolve(&size_mapping, ctx.viewport_width);
        if sizes.is_empty() {
            debug!("Placement '{id}' has no sizes at width {}", ctx.viewport_width);
        }
        let targeting = ctx
            .index
            .attribute(marker, &self.targeting_attribute)
            .and_then(|raw| match Targeting::from_json(raw) {
                Ok(targeting) => Some(targeting),
                Err(err) => {
                    warn!("Ignoring malformed targeting on placement '{id}': {err}");
                    None
                }
            });
        SlotConfig {
            id,
            position,
            sizes,
            size_mapping,
            targeting,
        }
    }

    /// Re-resolve sizes of every registered slot whose marker still exists,
    /// then enqueue one bulk refresh. Returns how many entries were updated.
    ///
    /// Entries whose marker is gone keep their stale sizes.
    pub fn refresh_all(&self, ctx: &mut DiscoveryContext<'_>) -> usize {
        let _span = info_span!("slots.refresh", width = ctx.viewport_width).entered();
        let index = &*ctx.index;
        let mut updated = 0_usize;
        for (id, config) in ctx.registry.iter_mut() {
            let attached = index
                .element_by_id(id)
                .is_some_and(|node| index.contains(node));
            if !attached {
                debug!("Skipping refresh of '{id}': marker is gone");
                continue;
            }
            config.sizes = resolve(&config.size_mapping, ctx.viewport_width);
            updated += 1;
        }
        ctx.queue.push(AdCommand::RefreshAll);
        debug!("Refreshed {updated} of {} placements", ctx.registry.len());
        updated
    }

    /// Whether any of the `inserted` nodes is, or contains, a marker.
    pub fn is_marker_insertion(&self, index: &DomIndexState, inserted: &[NodeKey]) -> bool {
        inserted
            .iter()
            .any(|node| index.contains(*node) && index.subtree_has_class(*node, &self.marker_class))
    }
}
