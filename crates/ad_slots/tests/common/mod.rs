//! Shared fixture: a parsed page, a manager mirroring it and a recording service.

#![allow(dead_code, reason = "Not every test binary uses every helper")]

use ad_slots::{
    AdManager, CallJournal, CommandRunner, ManagerConfig, RecordingService, ServiceCall, Size,
    command_queue,
};
use anyhow::Result;
use dom::{DomIndex, Document, KeyAllocator, NodeKey, parse_html};

pub struct Page {
    pub document: Document,
    pub manager: AdManager,
    pub runner: CommandRunner<RecordingService>,
    pub journal: CallJournal,
    /// Keys for nodes the test inserts after load.
    pub keys: KeyAllocator,
}

impl Page {
    /// Load `html` with a default service and configuration.
    pub fn load(html: &str, width: u32) -> Result<Self> {
        let (service, journal) = RecordingService::new();
        Self::load_with(html, width, ManagerConfig::default(), service, journal)
    }

    pub fn load_with(
        html: &str,
        width: u32,
        config: ManagerConfig,
        service: RecordingService,
        journal: CallJournal,
    ) -> Result<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut document = Document::new();
        let mirror = document.mirror(DomIndex::new());
        document.apply_batch(parse_html(html, &mut KeyAllocator::new(1))?)?;
        let (queue, runner) = command_queue(service);
        let mut manager = AdManager::new(config, mirror, queue, width);
        // Not watching yet: this only brings the manager's index up to date.
        manager.on_dom_batches();
        Ok(Self {
            document,
            manager,
            runner,
            journal,
            keys: KeyAllocator::new(2),
        })
    }

    /// Activate the manager by running the queued `Enable` in place.
    pub async fn activate(&mut self) -> Result<()> {
        if let Some(activation) = self.manager.begin_activation() {
            self.runner.drain();
            self.manager.finish_activation(activation).await?;
        }
        Ok(())
    }

    /// Apply write-backs to the document and execute queued service commands.
    pub fn settle(&mut self) {
        self.document.update();
        self.runner.drain();
    }

    /// Element ids passed to `define_slot`, in call order.
    pub fn defined_ids(&self) -> Vec<String> {
        self.journal
            .snapshot()
            .into_iter()
            .filter_map(|call| match call {
                ServiceCall::DefineSlot { element_id, .. } => Some(element_id),
                _ => None,
            })
            .collect()
    }

    pub fn refresh_count(&self) -> usize {
        self.journal
            .snapshot()
            .iter()
            .filter(|call| **call == ServiceCall::RefreshAll)
            .count()
    }
}

pub const fn size(width: u32, height: u32) -> Size {
    Size { width, height }
}

/// Depth-first search for the first element with the given tag.
pub fn find_tag(document: &Document, node: NodeKey, tag: &str) -> Option<NodeKey> {
    if document.tag(node) == Some(tag) {
        return Some(node);
    }
    document
        .children(node)
        .into_iter()
        .find_map(|child| find_tag(document, child, tag))
}
