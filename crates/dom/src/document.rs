use crate::updating::{DOMMirror, DOMSubscriber, DOMUpdate};
use crate::NodeKey;
use anyhow::{Error, anyhow};
use indextree::{Arena, Node, NodeId};
use log::debug;
use smallvec::SmallVec;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};

/// Capacity of the broadcast channel feeding mirrors.
const MIRROR_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeKind {
    #[default]
    Document,
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DOMNode {
    pub key: NodeKey,
    pub kind: NodeKind,
    pub attrs: SmallVec<(String, String), 4>,
}

/// The page runtime: the authoritative tree that update batches are applied to.
///
/// Every batch applied here, whether produced locally or written back by a
/// mirror, is rebroadcast so all mirrors observe the same sequence.
#[derive(Debug)]
pub struct Document {
    dom: Arena<DOMNode>,
    nodes: HashMap<NodeKey, NodeId>,
    update_sender: broadcast::Sender<Vec<DOMUpdate>>,
    in_sender: mpsc::UnboundedSender<Vec<DOMUpdate>>,
    in_receiver: mpsc::UnboundedReceiver<Vec<DOMUpdate>>,
    finished: bool,
}

impl Document {
    /// Create an empty document containing only the root node.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mirror_capacity(MIRROR_CHANNEL_CAPACITY)
    }

    /// Like [`Document::new`], keeping at most `capacity` unread batches per mirror.
    #[must_use]
    pub fn with_mirror_capacity(capacity: usize) -> Self {
        let mut dom = Arena::new();
        let root = dom.new_node(DOMNode::default());
        let (update_sender, _) = broadcast::channel(capacity.max(1));
        let (in_sender, in_receiver) = mpsc::unbounded_channel();
        let mut nodes = HashMap::new();
        nodes.insert(NodeKey::ROOT, root);
        Self {
            dom,
            nodes,
            update_sender,
            in_sender,
            in_receiver,
            finished: false,
        }
    }

    /// Subscribe a new mirror to this document's update stream.
    ///
    /// The mirror only sees batches applied after this call.
    pub fn mirror<T: DOMSubscriber>(&self, subscriber: T) -> DOMMirror<T> {
        DOMMirror::new(
            self.in_sender.clone(),
            self.update_sender.subscribe(),
            subscriber,
        )
    }

    /// Apply a batch produced by the page itself and forward it to mirrors.
    ///
    /// Updates are applied one at a time. Mirrors receive exactly the updates
    /// that were applied, even when some of the batch was rejected.
    ///
    /// # Errors
    /// Returns the first rejection if an update references an unknown node.
    pub fn apply_batch(&mut self, batch: Vec<DOMUpdate>) -> Result<(), Error> {
        let (applied, rejected) = self.apply_each(batch);
        self.broadcast(applied);
        rejected.into_iter().next().map_or(Ok(()), Err)
    }

    /// Apply every change batch mirrors have written back, returning how many were received.
    ///
    /// Write-backs can race with the page: an update aimed at a node removed
    /// since the mirror saw it is skipped, and the rest of its batch still applies.
    ///
    /// A mirror that fell behind asks for a resync; every mirror is then sent
    /// a full snapshot after the write-backs.
    pub fn update(&mut self) -> usize {
        let mut received = 0_usize;
        let mut resync = false;
        while let Ok(batch) = self.in_receiver.try_recv() {
            let (requests, batch): (Vec<_>, Vec<_>) = batch
                .into_iter()
                .partition(|update| *update == DOMUpdate::Resync);
            resync |= !requests.is_empty();
            let (applied, rejected) = self.apply_each(batch);
            for err in rejected {
                debug!("Skipping stale write-back: {err:#}");
            }
            self.broadcast(applied);
            received += 1;
        }
        if resync {
            debug!("Sending a DOM snapshot to resync mirrors");
            self.broadcast(self.snapshot());
        }
        received
    }

    /// The whole tree as one batch: `Resync`, then every node in document
    /// order with its attributes, then `EndOfDocument` if it was applied.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DOMUpdate> {
        let mut batch = vec![DOMUpdate::Resync];
        let Some(&root) = self.nodes.get(&NodeKey::ROOT) else {
            return batch;
        };
        for id in root.descendants(&self.dom) {
            let Some(entry) = self.dom.get(id) else {
                continue;
            };
            let node = entry.get();
            let parent = entry
                .parent()
                .and_then(|parent| self.dom.get(parent))
                .map_or(NodeKey::ROOT, |parent| parent.get().key);
            let pos = id.preceding_siblings(&self.dom).skip(1).count();
            match &node.kind {
                NodeKind::Document => {}
                NodeKind::Element { tag } => batch.push(DOMUpdate::InsertElement {
                    parent,
                    node: node.key,
                    tag: tag.clone(),
                    pos,
                }),
                NodeKind::Text { text } => batch.push(DOMUpdate::InsertText {
                    parent,
                    node: node.key,
                    text: text.clone(),
                    pos,
                }),
            }
            batch.extend(node.attrs.iter().map(|(name, value)| DOMUpdate::SetAttr {
                node: node.key,
                name: name.clone(),
                value: value.clone(),
            }));
        }
        if self.finished {
            batch.push(DOMUpdate::EndOfDocument);
        }
        batch
    }

    fn apply_each(&mut self, batch: Vec<DOMUpdate>) -> (Vec<DOMUpdate>, Vec<Error>) {
        let mut applied = Vec::with_capacity(batch.len());
        let mut rejected = Vec::new();
        for update in batch {
            match self.apply_update(&update) {
                Ok(()) => applied.push(update),
                Err(err) => rejected.push(err),
            }
        }
        (applied, rejected)
    }

    fn broadcast(&self, applied: Vec<DOMUpdate>) {
        if applied.is_empty() {
            return;
        }
        if self.update_sender.send(applied).is_err() {
            debug!("No DOM mirrors subscribed; batch applied locally only");
        }
    }

    /// Whether `EndOfDocument` has been applied.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the node is currently attached to this document.
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Tag name of an element node.
    pub fn tag(&self, key: NodeKey) -> Option<&str> {
        match &self.node(key)?.kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            NodeKind::Document | NodeKind::Text { .. } => None,
        }
    }

    /// Current value of an attribute on an element.
    pub fn attribute(&self, key: NodeKey, name: &str) -> Option<&str> {
        self.node(key)?
            .attrs
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Child keys of a node, in document order.
    pub fn children(&self, key: NodeKey) -> Vec<NodeKey> {
        let Some(&id) = self.nodes.get(&key) else {
            return Vec::new();
        };
        id.children(&self.dom)
            .filter_map(|child| self.dom.get(child).map(|node| node.get().key))
            .collect()
    }

    fn node(&self, key: NodeKey) -> Option<&DOMNode> {
        let id = self.nodes.get(&key)?;
        self.dom.get(*id).map(Node::get)
    }

    fn node_id(&self, key: NodeKey) -> Result<NodeId, Error> {
        self.nodes
            .get(&key)
            .copied()
            .ok_or_else(|| anyhow!("Unknown DOM node {key:?}"))
    }

    fn insert(&mut self, parent: NodeKey, node: DOMNode, pos: usize) -> Result<(), Error> {
        let key = node.key;
        let parent_id = self.node_id(parent)?;
        // Re-inserting a known key moves the existing subtree.
        let id = match self.nodes.get(&key) {
            Some(&existing) => {
                existing.detach(&mut self.dom);
                existing
            }
            None => self.dom.new_node(node),
        };
        let sibling = parent_id.children(&self.dom).nth(pos);
        match sibling {
            Some(sibling) => sibling.checked_insert_before(id, &mut self.dom),
            None => parent_id.checked_append(id, &mut self.dom),
        }
        .map_err(|err| anyhow!("Failed to insert {key:?} under {parent:?}: {err:?}"))?;
        self.nodes.insert(key, id);
        Ok(())
    }

    fn apply_update(&mut self, update: &DOMUpdate) -> Result<(), Error> {
        match update {
            DOMUpdate::InsertElement {
                parent,
                node,
                tag,
                pos,
            } => {
                let element = DOMNode {
                    key: *node,
                    kind: NodeKind::Element {
                        tag: tag.to_ascii_lowercase(),
                    },
                    attrs: SmallVec::new(),
                };
                self.insert(*parent, element, *pos)
            }
            DOMUpdate::InsertText {
                parent,
                node,
                text,
                pos,
            } => {
                let text_node = DOMNode {
                    key: *node,
                    kind: NodeKind::Text { text: text.clone() },
                    attrs: SmallVec::new(),
                };
                self.insert(*parent, text_node, *pos)
            }
            DOMUpdate::SetAttr { node, name, value } => {
                let id = self.node_id(*node)?;
                let data = self
                    .dom
                    .get_mut(id)
                    .ok_or_else(|| anyhow!("DOM node {node:?} was removed"))?
                    .get_mut();
                let name = name.to_ascii_lowercase();
                if let Some(slot) = data.attrs.iter_mut().find(|(attr, _)| *attr == name) {
                    slot.1.clone_from(value);
                } else {
                    data.attrs.push((name, value.clone()));
                }
                Ok(())
            }
            DOMUpdate::RemoveNode { node } => {
                if *node == NodeKey::ROOT {
                    return Err(anyhow!("The document root cannot be removed"));
                }
                let id = self.node_id(*node)?;
                let removed: Vec<NodeKey> = id
                    .descendants(&self.dom)
                    .filter_map(|desc| self.dom.get(desc).map(|entry| entry.get().key))
                    .collect();
                for key in removed {
                    self.nodes.remove(&key);
                }
                id.remove_subtree(&mut self.dom);
                Ok(())
            }
            DOMUpdate::EndOfDocument => {
                self.finished = true;
                Ok(())
            }
            DOMUpdate::Resync => Err(anyhow!("Resync is a mirror request, not a document change")),
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
