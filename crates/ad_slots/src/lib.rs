//! Responsive ad placement engine.
//!
//! This crate finds placement markers in a document, resolves which creative
//! sizes fit the current viewport, registers the placements with an ad service
//! and refreshes them once a burst of viewport resizes has settled. The
//! [`AdManager`] ties the pieces together; each piece is usable on its own.

#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]

/// Resize debouncing.
pub mod coalescer;
pub mod config;
/// Marker discovery and the refresh pass.
pub mod discovery;
pub mod manager;
/// Named positions and their breakpoints.
pub mod positions;
/// Outbound command queue and its runner.
pub mod queue;
pub mod registry;
/// The ad service boundary and a recording implementation.
pub mod service;
/// Sizes, breakpoints and the resolver.
pub mod size;

pub use coalescer::{DEFAULT_RESIZE_DEBOUNCE, MAX_RESIZE_DEBOUNCE, ResizeCoalescer};
pub use config::ManagerConfig;
pub use discovery::{DiscoveryContext, DiscoveryReport, Reconciler};
pub use manager::{Activation, AdManager, PageEvent};
pub use positions::{DEFAULT_POSITION, PositionTable};
pub use queue::{AdCommand, CommandQueue, CommandRunner, SlotDefinition, command_queue};
pub use registry::{SlotConfig, SlotRegistry, Targeting, TargetingValue};
pub use service::{AdService, CallJournal, RecordingService, ServiceCall, ServiceSettings, SlotHandle};
pub use size::{Breakpoint, FALLBACK_SIZE, Size, SizeMapping, resolve};
