#![allow(clippy::excessive_nesting)]
//! A DOM index mirror for host lookups (ids, class tokens and attributes).
//!
//! This mirror subscribes to `DOMUpdate` batches and maintains small indices
//! for quick lookups by id and class name, plus the raw attribute table.
//! It also remembers which elements were inserted since the last time the
//! owner asked, which is how insertion-only mutation watching is built.

use crate::updating::{DOMSubscriber, DOMUpdate};
use crate::NodeKey;
use anyhow::Error;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

/// Internal mutable state for the DOM index.
#[derive(Default, Debug)]
pub struct DomIndexState {
    /// Map node -> current tag name (for elements), lowercase.
    tag_by_key: HashMap<NodeKey, String>,
    /// Map node -> current attributes, names lowercase.
    attrs_by_key: HashMap<NodeKey, SmallVec<(String, String), 4>>,
    /// Map node -> current class list tokens.
    classes_by_key: HashMap<NodeKey, HashSet<String>>,
    /// Parent -> children relation, in document order.
    children_by_parent: HashMap<NodeKey, Vec<NodeKey>>,
    /// Child -> parent relation.
    parent_by_child: HashMap<NodeKey, NodeKey>,
    /// Lookup indices
    id_index: HashMap<String, NodeKey>,
    /// Elements inserted since the last `take_inserted`.
    inserted: Vec<NodeKey>,
}

impl DomIndexState {
    /// Remove a node (and its descendants) from all indices.
    fn remove_recursively(&mut self, node: NodeKey) {
        if let Some(children) = self.children_by_parent.remove(&node) {
            for child in children {
                self.remove_recursively(child);
            }
        }
        // Detach from parent mapping
        if let Some(parent) = self.parent_by_child.remove(&node) {
            if let Some(siblings) = self.children_by_parent.get_mut(&parent) {
                siblings.retain(|sibling| *sibling != node);
            }
        }
        if let Some(id) = self.attribute(node, "id").map(str::to_owned) {
            if self.id_index.get(&id) == Some(&node) {
                self.id_index.remove(&id);
            }
        }
        self.attrs_by_key.remove(&node);
        self.tag_by_key.remove(&node);
        self.classes_by_key.remove(&node);
    }

    /// Link a node under its parent at the given position.
    fn link(&mut self, parent: NodeKey, node: NodeKey, pos: usize) {
        if let Some(previous) = self.parent_by_child.insert(node, parent) {
            if let Some(siblings) = self.children_by_parent.get_mut(&previous) {
                siblings.retain(|sibling| *sibling != node);
            }
        }
        let siblings = self.children_by_parent.entry(parent).or_default();
        let pos = pos.min(siblings.len());
        siblings.insert(pos, node);
    }

    /// Replace the class tokens of a node from a whitespace-separated class attribute.
    fn set_classes_for(&mut self, node: NodeKey, class_attr: &str) {
        let tokens: HashSet<String> = class_attr
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        if tokens.is_empty() {
            self.classes_by_key.remove(&node);
        } else {
            self.classes_by_key.insert(node, tokens);
        }
    }

    /// Record an attribute value and keep the derived indices in step.
    fn store_attribute(&mut self, node: NodeKey, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if name == "id" {
            // Update reverse index: remove old mapping only if it pointed to this node
            if let Some(old) = self.attribute(node, "id").map(str::to_owned) {
                if self.id_index.get(&old) == Some(&node) {
                    self.id_index.remove(&old);
                }
            }
            if !value.is_empty() {
                self.id_index.insert(value.to_owned(), node);
            }
        } else if name == "class" {
            self.set_classes_for(node, value);
        }
        let attrs = self.attrs_by_key.entry(node).or_default();
        if let Some(slot) = attrs.iter_mut().find(|(attr, _)| *attr == name) {
            value.clone_into(&mut slot.1);
        } else {
            attrs.push((name, value.to_owned()));
        }
    }
}

/// Accessor helpers for host-side lookups.
impl DomIndexState {
    /// Return the `NodeKey` for the element with the given id (case-sensitive).
    pub fn element_by_id(&self, id: &str) -> Option<NodeKey> {
        self.id_index.get(id).copied()
    }

    /// Return `NodeKey`s for elements that carry the given class token, in document order.
    pub fn elements_by_class(&self, class: &str) -> Vec<NodeKey> {
        fn walk(state: &DomIndexState, node: NodeKey, needle: &str, out: &mut Vec<NodeKey>) {
            if state.has_class(node, needle) {
                out.push(node);
            }
            if let Some(children) = state.children_by_parent.get(&node) {
                for child in children {
                    walk(state, *child, needle, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(self, NodeKey::ROOT, class, &mut out);
        out
    }

    /// Whether the element's class list contains the token.
    pub fn has_class(&self, node: NodeKey, class: &str) -> bool {
        self.classes_by_key
            .get(&node)
            .is_some_and(|classes| classes.contains(class))
    }

    /// Whether the node itself or any of its descendants carries the class token.
    pub fn subtree_has_class(&self, node: NodeKey, class: &str) -> bool {
        if self.has_class(node, class) {
            return true;
        }
        self.children_by_parent.get(&node).is_some_and(|children| {
            children
                .iter()
                .any(|child| self.subtree_has_class(*child, class))
        })
    }

    /// Current value of an attribute (names are case-insensitive).
    pub fn attribute(&self, node: NodeKey, name: &str) -> Option<&str> {
        self.attrs_by_key
            .get(&node)?
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Lowercase tag name of an element.
    pub fn tag(&self, node: NodeKey) -> Option<&str> {
        self.tag_by_key.get(&node).map(String::as_str)
    }

    /// Whether the node is known and attached somewhere under the root.
    pub fn contains(&self, node: NodeKey) -> bool {
        let mut current = node;
        loop {
            if current == NodeKey::ROOT {
                return true;
            }
            match self.parent_by_child.get(&current) {
                Some(parent) => current = *parent,
                None => return false,
            }
        }
    }

    /// Set an attribute ahead of the DOM round trip.
    ///
    /// Used by writers that also send a `SetAttr` to the runtime, so same-tick
    /// lookups already see the new value. The echoed update is idempotent.
    pub fn set_attribute(&mut self, node: NodeKey, name: &str, value: &str) {
        self.store_attribute(node, name, value);
    }

    /// Take the elements inserted since the previous call, in insertion order.
    pub fn take_inserted(&mut self) -> Vec<NodeKey> {
        core::mem::take(&mut self.inserted)
    }
}

/// A `DOMSubscriber` implementation that keeps a `DomIndexState` current.
#[derive(Default, Debug)]
pub struct DomIndex {
    state: DomIndexState,
}

impl DomIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access to the indices.
    pub const fn state(&self) -> &DomIndexState {
        &self.state
    }

    /// Write access for local attribute write-back and insertion bookkeeping.
    pub const fn state_mut(&mut self) -> &mut DomIndexState {
        &mut self.state
    }
}

impl DOMSubscriber for DomIndex {
    /// Apply a DOM update to keep indices current.
    fn apply_update(&mut self, update: DOMUpdate) -> Result<(), Error> {
        let state = &mut self.state;
        match update {
            DOMUpdate::InsertElement {
                parent,
                node,
                tag,
                pos,
            } => {
                state.link(parent, node, pos);
                state.tag_by_key.insert(node, tag.to_ascii_lowercase());
                state.inserted.push(node);
            }
            DOMUpdate::InsertText { parent, node, pos, .. } => {
                state.link(parent, node, pos);
            }
            DOMUpdate::SetAttr { node, name, value } => {
                state.store_attribute(node, &name, &value);
            }
            DOMUpdate::RemoveNode { node } => {
                state.remove_recursively(node);
            }
            DOMUpdate::EndOfDocument => {}
            DOMUpdate::Resync => {
                *state = DomIndexState::default();
            }
        }
        Ok(())
    }
}
