//! The position table: which breakpoints apply to each named placement position.

use crate::size::{Breakpoint, Size, SizeMapping};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;

/// Name of the entry used for unknown or unspecified positions.
pub const DEFAULT_POSITION: &str = "default";

/// Mapping from position name to its `SizeMapping`.
///
/// The `default` entry always exists; it can be replaced but never removed.
/// Aliases resolve to another position name before every lookup or update.
#[derive(Clone, Debug)]
pub struct PositionTable {
    default: SizeMapping,
    entries: HashMap<String, SizeMapping>,
    aliases: HashMap<String, String>,
}

const fn size(width: u32, height: u32) -> Size {
    Size { width, height }
}

impl PositionTable {
    /// A table holding only the given default mapping.
    pub fn new(default: SizeMapping) -> Self {
        Self {
            default,
            entries: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// The stock table: `top`, `sidebar`, `footer`, `inread` and `default`.
    ///
    /// Pages marked up with the older position names `topo`, `lateral` and
    /// `rodape` resolve to `top`, `sidebar` and `footer`.
    pub fn with_defaults() -> Self {
        let mut table = Self::new(SizeMapping::new(vec![
            Breakpoint::new(0, [size(300, 250)]),
            Breakpoint::new(750, [size(300, 250)]),
        ]));
        table.entries.insert(
            "top".to_owned(),
            SizeMapping::new(vec![
                Breakpoint::new(0, [size(320, 50), size(320, 100)]),
                Breakpoint::new(750, [size(728, 90)]),
                Breakpoint::new(1050, [size(970, 90), size(970, 250)]),
            ]),
        );
        // No sidebar ads on narrow viewports.
        table.entries.insert(
            "sidebar".to_owned(),
            SizeMapping::new(vec![
                Breakpoint::new(0, Vec::new()),
                Breakpoint::new(1000, [size(300, 250), size(300, 600)]),
            ]),
        );
        table.entries.insert(
            "footer".to_owned(),
            SizeMapping::new(vec![
                Breakpoint::new(0, [size(320, 50)]),
                Breakpoint::new(750, [size(728, 90)]),
            ]),
        );
        table.entries.insert(
            "inread".to_owned(),
            SizeMapping::new(vec![
                Breakpoint::new(0, [size(300, 250)]),
                Breakpoint::new(750, [size(640, 360)]),
            ]),
        );
        table.add_alias("topo", "top");
        table.add_alias("lateral", "sidebar");
        table.add_alias("rodape", "footer");
        table
    }

    /// Make `alias` resolve to `target`. Returns false if either name is
    /// `default`, if they are equal, or if `alias` already has its own entry.
    pub fn add_alias(&mut self, alias: &str, target: &str) -> bool {
        if alias == target
            || alias == DEFAULT_POSITION
            || target == DEFAULT_POSITION
            || self.entries.contains_key(alias)
        {
            debug!("Refusing alias '{alias}' -> '{target}'");
            return false;
        }
        self.aliases.insert(alias.to_owned(), target.to_owned());
        true
    }

    fn canonical<'name>(&'name self, position: &'name str) -> &'name str {
        self.aliases.get(position).map_or(position, String::as_str)
    }

    /// The mapping registered for `position`, or the default mapping.
    pub fn get(&self, position: &str) -> &SizeMapping {
        let position = self.canonical(position);
        if position == DEFAULT_POSITION {
            return &self.default;
        }
        self.entries.get(position).unwrap_or(&self.default)
    }

    /// Whether `position` has its own entry.
    pub fn contains(&self, position: &str) -> bool {
        let position = self.canonical(position);
        position == DEFAULT_POSITION || self.entries.contains_key(position)
    }

    /// Replace or create the entry for `position`.
    ///
    /// Empty or invalid mappings are ignored and leave the table untouched.
    /// Returns whether the table changed.
    pub fn set(&mut self, position: &str, mapping: SizeMapping) -> bool {
        if !mapping.is_valid() {
            debug!("Ignoring empty or invalid size mapping for position '{position}'");
            return false;
        }
        let position = self.canonical(position).to_owned();
        if position == DEFAULT_POSITION {
            self.default = mapping;
        } else {
            self.entries.insert(position, mapping);
        }
        true
    }

    /// Same contract as [`PositionTable::set`].
    pub fn add_position(&mut self, position: &str, mapping: SizeMapping) -> bool {
        self.set(position, mapping)
    }

    /// Parse a JSON breakpoint list and apply it through [`PositionTable::set`].
    ///
    /// Malformed JSON is ignored the same way an empty mapping is.
    pub fn set_from_json(&mut self, position: &str, json: &str) -> bool {
        match serde_json::from_str::<SizeMapping>(json) {
            Ok(mapping) => self.set(position, mapping),
            Err(err) => {
                debug!("Ignoring malformed size mapping for position '{position}': {err}");
                false
            }
        }
    }

    /// Apply an already parsed JSON breakpoint list through [`PositionTable::set`].
    pub fn set_from_value(&mut self, position: &str, value: Value) -> bool {
        match serde_json::from_value::<SizeMapping>(value) {
            Ok(mapping) => self.set(position, mapping),
            Err(err) => {
                warn!("Ignoring malformed size mapping for position '{position}': {err}");
                false
            }
        }
    }

    /// Remove a position. The default entry cannot be removed.
    pub fn remove(&mut self, position: &str) -> bool {
        let position = self.canonical(position).to_owned();
        if position == DEFAULT_POSITION {
            debug!("Refusing to remove the default position");
            return false;
        }
        self.entries.remove(&position).is_some()
    }

    /// Every position name, sorted, `default` included. Aliases are not listed.
    pub fn positions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entries
            .keys()
            .map(String::as_str)
            .chain([DEFAULT_POSITION])
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for PositionTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}
