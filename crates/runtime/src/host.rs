//! Async host running many independent worlds.
//!
//! Each world lives in its own [`WorldWorker`] task, which owns the
//! authoritative [`World`] and processes [`Command`]s one at a time, so
//! ticks within a world are serialized while different worlds advance
//! concurrently. Clients talk to a worker through a cloneable
//! [`WorldHandle`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use sim_core::{
    Kernel, PlayerCommand, Rejection, SimError, SimEvent, TickIndex, TickOutcome, TickRecord,
    WorldEnvelope,
};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::world::World;

/// Notifications published on a world's broadcast channel.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TickEvent {
    /// A tick completed and was appended to the log.
    #[serde(rename_all = "camelCase")]
    Committed {
        record: TickRecord,
        events: Vec<SimEvent>,
        rejections: Vec<Rejection>,
    },
    /// A tick aborted; the world is unchanged.
    #[serde(rename_all = "camelCase")]
    Failed {
        world_id: String,
        tick_index: TickIndex,
        code: &'static str,
        message: String,
    },
}

/// Commands that can be sent to a world worker.
enum Command {
    Tick {
        commands: Vec<PlayerCommand>,
        reply: oneshot::Sender<Result<TickOutcome>>,
    },
    QueryState {
        reply: oneshot::Sender<WorldEnvelope>,
    },
    Records {
        reply: oneshot::Sender<Vec<TickRecord>>,
    },
}

/// Background task owning one world.
struct WorldWorker {
    world: World,
    command_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<TickEvent>,
}

impl WorldWorker {
    async fn run(mut self) {
        while let Some(command) = self.command_rx.recv().await {
            self.handle_command(command);
        }
        debug!(target: "sim::host", world = %self.world.world_id(), "worker stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Tick { commands, reply } => {
                let result = self.tick(&commands);
                if reply.send(result).is_err() {
                    debug!("Tick reply channel closed (caller dropped)");
                }
            }
            Command::QueryState { reply } => {
                if reply.send(self.world.snapshot().clone()).is_err() {
                    debug!("QueryState reply channel closed (caller dropped)");
                }
            }
            Command::Records { reply } => {
                if reply.send(self.world.records().to_vec()).is_err() {
                    debug!("Records reply channel closed (caller dropped)");
                }
            }
        }
    }

    fn tick(&mut self, commands: &[PlayerCommand]) -> Result<TickOutcome> {
        let tick_index = self.world.tick_index();
        match self.world.tick(commands) {
            Ok(outcome) => {
                // no subscribers is fine
                let _ = self.event_tx.send(TickEvent::Committed {
                    record: outcome.record.clone(),
                    events: outcome.events.clone(),
                    rejections: outcome.rejections.clone(),
                });
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    target: "sim::host",
                    world = %self.world.world_id(),
                    tick = tick_index,
                    code = e.error_code(),
                    "tick failed: {e}"
                );
                let _ = self.event_tx.send(TickEvent::Failed {
                    world_id: self.world.world_id().to_string(),
                    tick_index,
                    code: e.error_code(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

/// Client-facing handle to one hosted world.
#[derive(Clone, Debug)]
pub struct WorldHandle {
    world_id: Arc<str>,
    command_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<TickEvent>,
}

impl WorldHandle {
    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    /// Runs one tick with the given commands and waits for the outcome.
    pub async fn tick(&self, commands: Vec<PlayerCommand>) -> Result<TickOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::Tick {
                commands,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)?
    }

    /// Query the current envelope (read-only snapshot).
    pub async fn query_state(&self) -> Result<WorldEnvelope> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::QueryState { reply: reply_tx })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// All tick records committed since the world was hosted.
    pub async fn records(&self) -> Result<Vec<TickRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(Command::Records { reply: reply_tx })
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Subscribe to this world's tick notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.event_tx.subscribe()
    }
}

/// Owns the worker tasks for every hosted world.
pub struct WorldHost {
    config: RuntimeConfig,
    kernel: Arc<Kernel>,
    worlds: BTreeMap<String, (WorldHandle, JoinHandle<()>)>,
}

impl WorldHost {
    pub fn new(kernel: Arc<Kernel>, config: RuntimeConfig) -> Self {
        Self {
            config,
            kernel,
            worlds: BTreeMap::new(),
        }
    }

    /// Starts a worker for `envelope`. Must be called inside a tokio runtime.
    ///
    /// Envelopes from another kernel version or with an inconsistent rules
    /// digest are refused.
    pub fn spawn_world(&mut self, envelope: WorldEnvelope) -> Result<WorldHandle> {
        let world_id = envelope.world_id.clone();
        if self.worlds.contains_key(&world_id) {
            return Err(RuntimeError::WorldExists(world_id));
        }

        let world = World::new(envelope, Arc::clone(&self.kernel))?;
        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer_size);
        let (event_tx, _event_rx) = broadcast::channel(self.config.event_buffer_size);

        let worker = WorldWorker {
            world,
            command_rx,
            event_tx: event_tx.clone(),
        };
        let join = tokio::spawn(worker.run());

        let handle = WorldHandle {
            world_id: Arc::from(world_id.as_str()),
            command_tx,
            event_tx,
        };
        info!(target: "sim::host", world = %world_id, "world hosted");
        self.worlds.insert(world_id, (handle.clone(), join));
        Ok(handle)
    }

    pub fn handle(&self, world_id: &str) -> Result<WorldHandle> {
        self.worlds
            .get(world_id)
            .map(|(handle, _)| handle.clone())
            .ok_or_else(|| RuntimeError::UnknownWorld(world_id.to_string()))
    }

    pub fn world_ids(&self) -> impl Iterator<Item = &str> {
        self.worlds.keys().map(String::as_str)
    }

    /// Stops hosting a world and waits for its worker to drain.
    ///
    /// Outstanding client handles keep the worker alive until they drop.
    pub async fn remove_world(&mut self, world_id: &str) -> Result<()> {
        let (handle, join) = self
            .worlds
            .remove(world_id)
            .ok_or_else(|| RuntimeError::UnknownWorld(world_id.to_string()))?;
        drop(handle);
        join.await.map_err(RuntimeError::WorkerJoin)
    }

    /// Shut down every worker gracefully.
    ///
    /// Workers exit once every handle to them is dropped, including clones
    /// held by callers.
    pub async fn shutdown(self) -> Result<()> {
        for (world_id, (handle, join)) in self.worlds {
            drop(handle);
            join.await.map_err(RuntimeError::WorkerJoin)?;
            debug!(target: "sim::host", world = %world_id, "world shut down");
        }
        Ok(())
    }
}
