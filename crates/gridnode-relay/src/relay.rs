//! Command relay — turns inbound hex commands into hex responses.
//!
//! One command is processed at a time. Before the first command of a
//! process, and whenever the object store is empty, the last snapshot is
//! merged back into the store. The store is shared with the model manager,
//! so "empty" alone cannot tell a fresh process apart: loading a Plan puts
//! its state tensors in the store before any command arrives. After every
//! successful execution the full object store is snapshotted, so durable
//! state is never more than one command behind memory.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use gridnode_core::transport;
use gridnode_models::ObjectStore;
use gridnode_state::SnapshotStore;

use crate::engine::ExecutionEngine;
use crate::error::{RelayError, RelayResult};

pub struct CommandRelay {
    objects: ObjectStore,
    engine: Arc<dyn ExecutionEngine>,
    snapshots: Arc<dyn SnapshotStore>,
    /// Serializes command processing.
    gate: Mutex<()>,
    /// Set once a snapshot has been merged in by this process.
    recovered: AtomicBool,
}

impl CommandRelay {
    pub fn new(
        objects: ObjectStore,
        engine: Arc<dyn ExecutionEngine>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            objects,
            engine,
            snapshots,
            gate: Mutex::new(()),
            recovered: AtomicBool::new(false),
        }
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// Process a command and always produce a reply.
    ///
    /// On failure the reply is the error's text instead of a hex payload.
    pub fn handle(&self, message: &str) -> String {
        match self.process(message) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "command failed");
                e.to_string()
            }
        }
    }

    /// Process a command, surfacing failures as [`RelayError`].
    pub fn process(&self, message: &str) -> RelayResult<String> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);

        if !self.recovered.load(Ordering::Acquire) || self.objects.is_empty() {
            self.recover()?;
        }

        let command =
            transport::decode(message).map_err(|e| RelayError::Decode(e.to_string()))?;

        let engine = &self.engine;
        let objects = &self.objects;
        let response = catch_unwind(AssertUnwindSafe(|| engine.execute(&command, objects)))
            .map_err(|panic| RelayError::Execution(panic_message(panic.as_ref())))?
            .map_err(|e| RelayError::Execution(e.to_string()))?;

        self.snapshot()?;
        debug!(
            command_bytes = command.len(),
            response_bytes = response.len(),
            "command executed"
        );
        Ok(transport::encode(&response))
    }

    /// Merge the last snapshot into the object store. Objects already live
    /// are kept. Returns the number of objects added.
    pub fn recover(&self) -> RelayResult<usize> {
        let objects = self
            .snapshots
            .recover()
            .map_err(|e| RelayError::Persistence(e.to_string()))?;
        let added = self.objects.restore(objects);
        self.recovered.store(true, Ordering::Release);
        info!(added, objects = self.objects.len(), "object store recovered from snapshot");
        Ok(added)
    }

    /// Write the full object store image. Returns the object count.
    pub fn snapshot(&self) -> RelayResult<usize> {
        let image = self.objects.snapshot();
        self.snapshots
            .snapshot(&image)
            .map_err(|e| RelayError::Persistence(e.to_string()))?;
        Ok(image.len())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("engine panicked: {detail}")
}
