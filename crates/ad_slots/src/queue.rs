//! Outbound command queue between the engine and the ad service.
//!
//! The engine only enqueues intents; a [`CommandRunner`] owns the service and
//! executes them in FIFO order. Each command is delivered at most once and
//! nothing is retried. Failures are logged where they happen.

use crate::registry::Targeting;
use crate::service::{AdService, ServiceSettings};
use crate::size::{Size, SizeMapping};
use log::{debug, error, warn};
use tokio::sync::{mpsc, oneshot};

/// Everything the service needs to create and render one placement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotDefinition {
    pub unit_path: String,
    pub element_id: String,
    pub sizes: Vec<Size>,
    pub size_mapping: SizeMapping,
    pub targeting: Option<Targeting>,
}

/// An intent for the ad service.
#[derive(Debug)]
pub enum AdCommand {
    /// Enable the service; `ready` fires once it is up.
    Enable {
        settings: ServiceSettings,
        ready: oneshot::Sender<()>,
    },
    /// Define, configure and display one placement.
    Define(SlotDefinition),
    /// Re-render every registered placement.
    RefreshAll,
}

/// Sending half held by the engine. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<AdCommand>,
}

impl CommandQueue {
    /// Enqueue without waiting. A queue whose runner is gone drops the command.
    pub fn push(&self, command: AdCommand) {
        if let Err(err) = self.sender.send(command) {
            warn!("Ad command queue is closed; dropping {:?}", err.0);
        }
    }
}

/// Create a queue and the runner that executes it against `service`.
pub fn command_queue<S: AdService>(service: S) -> (CommandQueue, CommandRunner<S>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        CommandQueue { sender },
        CommandRunner { service, receiver },
    )
}

/// Receiving half: owns the service and executes commands in order.
#[derive(Debug)]
pub struct CommandRunner<S: AdService> {
    service: S,
    receiver: mpsc::UnboundedReceiver<AdCommand>,
}

impl<S: AdService> CommandRunner<S> {
    /// Execute commands until every [`CommandQueue`] handle is dropped.
    pub async fn run(mut self) -> S {
        while let Some(command) = self.receiver.recv().await {
            self.execute(command);
        }
        debug!("Ad command queue closed; runner stopping");
        self.service
    }

    /// Execute every command already queued, returning how many ran.
    pub fn drain(&mut self) -> usize {
        let mut executed = 0_usize;
        while let Ok(command) = self.receiver.try_recv() {
            self.execute(command);
            executed += 1;
        }
        executed
    }

    /// Access the service (for inspection between drains).
    pub const fn service(&self) -> &S {
        &self.service
    }

    fn execute(&mut self, command: AdCommand) {
        match command {
            AdCommand::Enable { settings, ready } => match self.service.enable(&settings) {
                Ok(()) => {
                    if ready.send(()).is_err() {
                        debug!("Nobody is waiting for ad service activation");
                    }
                }
                // Dropping `ready` tells the waiter activation failed.
                Err(err) => error!("Ad service activation failed: {err:#}"),
            },
            AdCommand::Define(definition) => self.define(&definition),
            AdCommand::RefreshAll => self.service.refresh_all(),
        }
    }

    fn define(&mut self, definition: &SlotDefinition) {
        let handle = match self.service.define_slot(
            &definition.unit_path,
            &definition.sizes,
            &definition.element_id,
        ) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(
                    "Could not define slot '{}': {err:#}",
                    definition.element_id
                );
                return;
            }
        };
        if definition.size_mapping.has_sizes() {
            self.service
                .apply_size_mapping(handle, &definition.size_mapping);
        }
        if let Some(targeting) = &definition.targeting {
            for (key, value) in targeting.iter() {
                self.service.apply_targeting(handle, key, value);
            }
        }
        self.service.display(&definition.element_id);
    }
}
