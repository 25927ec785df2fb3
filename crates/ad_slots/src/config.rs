//! Configuration settings for the placement engine.
//!
//! Configuration can be deserialized from JSON (camelCase keys, every field
//! optional), loaded from environment variables, or constructed programmatically.

use crate::service::ServiceSettings;
use anyhow::{Error, anyhow};
use core::time::Duration;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;

/// Runtime configuration for an `AdManager`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManagerConfig {
    /// Ad network identifier, the first part of every placement path.
    pub network_identifier: String,
    /// Path appended to the network identifier for every placement.
    pub base_path: String,
    /// Collapse placements that receive no creative.
    pub collapse_empty_placements: bool,
    /// Fetch every placement of the page in one request.
    pub enable_batched_requests: bool,
    /// Register placements without rendering until refreshed.
    pub defer_initial_render: bool,
    /// Quiet period after the last resize before refreshing, in milliseconds.
    /// Values above a day are clamped to a day.
    pub resize_debounce_ms: u64,
    /// Class token that designates a placement marker element.
    pub marker_class: String,
    /// Attribute carrying the position name of a marker.
    pub position_attribute: String,
    /// Attribute carrying a JSON targeting object for a marker.
    pub targeting_attribute: String,
    /// Append `/<position>` to the placement path of each slot.
    pub append_position_to_path: bool,
    /// Extra or replacement position mappings, applied over the stock table.
    ///
    /// Kept as raw JSON so one malformed entry is skipped on its own instead
    /// of rejecting the whole configuration.
    pub positions: BTreeMap<String, Value>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            network_identifier: "1234567".to_owned(),
            base_path: "/rede/site".to_owned(),
            collapse_empty_placements: true,
            enable_batched_requests: true,
            defer_initial_render: false,
            resize_debounce_ms: 300,
            marker_class: "pubad".to_owned(),
            position_attribute: "data-pos".to_owned(),
            targeting_attribute: "data-targeting".to_owned(),
            append_position_to_path: false,
            positions: BTreeMap::new(),
        }
    }
}

impl ManagerConfig {
    /// Parse a JSON configuration document. Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns an error if the document is not valid configuration JSON.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|err| anyhow!("Invalid manager configuration: {err}"))
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables, falling back to defaults:
    /// - `ADMANAGER_NETWORK`: network identifier
    /// - `ADMANAGER_BASE_PATH`: base placement path
    /// - `ADMANAGER_DEBOUNCE_MS`: resize debounce in milliseconds (minimum 1)
    /// - `ADMANAGER_COLLAPSE_EMPTY`: "0" disables collapsing empty placements
    /// - `ADMANAGER_SINGLE_REQUEST`: "0" disables batched requests
    /// - `ADMANAGER_DEFER_INITIAL`: "1" defers the initial render
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let network_identifier =
            env::var("ADMANAGER_NETWORK").unwrap_or(defaults.network_identifier.clone());
        let base_path = env::var("ADMANAGER_BASE_PATH").unwrap_or(defaults.base_path.clone());
        let resize_debounce_ms = env::var("ADMANAGER_DEBOUNCE_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .unwrap_or(defaults.resize_debounce_ms)
            .max(1);
        let collapse_empty_placements =
            env::var("ADMANAGER_COLLAPSE_EMPTY").ok().as_deref() != Some("0");
        let enable_batched_requests =
            env::var("ADMANAGER_SINGLE_REQUEST").ok().as_deref() != Some("0");
        let defer_initial_render = env::var("ADMANAGER_DEFER_INITIAL").ok().as_deref() == Some("1");
        Self {
            network_identifier,
            base_path,
            collapse_empty_placements,
            enable_batched_requests,
            defer_initial_render,
            resize_debounce_ms,
            ..defaults
        }
    }

    /// Get the resize debounce period as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }

    /// Settings handed to the ad service at activation.
    #[must_use]
    pub const fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            collapse_empty_placements: self.collapse_empty_placements,
            enable_batched_requests: self.enable_batched_requests,
            defer_initial_render: self.defer_initial_render,
        }
    }
}
