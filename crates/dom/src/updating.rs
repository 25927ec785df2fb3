use crate::NodeKey;
use anyhow::{Error, anyhow};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::mpsc;

/// A batchable update applied to the runtime DOM and mirrored to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DOMUpdate {
    InsertElement {
        parent: NodeKey,
        node: NodeKey,
        tag: String,
        pos: usize,
    },
    InsertText {
        parent: NodeKey,
        node: NodeKey,
        text: String,
        pos: usize,
    },
    SetAttr {
        node: NodeKey,
        name: String,
        value: String,
    },
    RemoveNode {
        node: NodeKey,
    },
    EndOfDocument,
    /// Written back by a mirror that fell behind to ask for a full snapshot.
    /// The runtime answers with a batch that starts with `Resync`, telling
    /// every mirror to discard its state before the snapshot follows.
    Resync,
}

/// A subscriber that receives `DOMUpdate` values and mirrors them into its own state.
pub trait DOMSubscriber {
    /// Apply a single `DOMUpdate` to the subscriber state.
    ///
    /// # Errors
    /// Returns an error if the update references state the subscriber cannot reconcile.
    fn apply_update(&mut self, update: DOMUpdate) -> Result<(), Error>;
}

/// Generic mirror that can apply incoming DOM updates and send changes back to the DOM runtime.
pub struct DOMMirror<T: DOMSubscriber> {
    in_updater: broadcast::Receiver<Vec<DOMUpdate>>,
    out_updater: mpsc::UnboundedSender<Vec<DOMUpdate>>,
    mirror: T,
}

impl<T: DOMSubscriber> DOMMirror<T> {
    pub const fn new(
        out_updater: mpsc::UnboundedSender<Vec<DOMUpdate>>,
        in_updater: broadcast::Receiver<Vec<DOMUpdate>>,
        mirror: T,
    ) -> Self {
        Self {
            in_updater,
            out_updater,
            mirror,
        }
    }

    /// Drain and apply every pending batch, returning how many batches were applied.
    ///
    /// Falling behind the broadcast channel loses batches, so the mirror asks
    /// the runtime for a snapshot and catches up once the runtime next updates.
    ///
    /// # Errors
    /// Returns an error if the runtime side of the channel is gone or the
    /// subscriber rejects an update.
    pub fn try_update_sync(&mut self) -> Result<usize, Error> {
        let mut applied = 0_usize;
        loop {
            match self.in_updater.try_recv() {
                Ok(batch) => {
                    for update in batch {
                        self.mirror.apply_update(update)?;
                    }
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    log::error!(
                        "DOM mirror lagged behind by {skipped} batches; requesting a resync"
                    );
                    self.send_dom_change(vec![DOMUpdate::Resync])?;
                }
                Err(TryRecvError::Closed) => {
                    return Err(anyhow!("Recv channel was closed before document ended!"));
                }
            }
        }
        Ok(applied)
    }

    /// Access the inner mirror mutably (engine-level integration)
    pub const fn mirror_mut(&mut self) -> &mut T {
        &mut self.mirror
    }

    /// Access the inner mirror immutably (read-only access)
    pub const fn mirror(&self) -> &T {
        &self.mirror
    }

    /// Send a batch of DOM changes back to the DOM runtime.
    ///
    /// # Errors
    /// Returns an error if the runtime has been dropped.
    pub fn send_dom_change(&self, changes: Vec<DOMUpdate>) -> Result<(), Error> {
        self.out_updater
            .send(changes)
            .map_err(|_| anyhow!("DOM runtime is gone; change batch dropped"))
    }
}
