//! In-process worker stub: event loop plus local data registry.
//!
//! The event loop reads NDJSON messages from the worker's stdout and keeps
//! the data registry in step with the objects the worker holds.
//!
//! | Method              | Effect                                   |
//! |---------------------|------------------------------------------|
//! | `object/registered` | insert or replace `{id, tags, shape}`    |
//! | `object/removed`    | drop the object with `id`                |
//! | `log`               | forwarded to `DEBUG`                     |
//! | *(any other)*       | skipped                                  |

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::codec::WorkerCodec;
use super::directory::WorkerDirectory;
use crate::{AppError, Result};

/// Object held by a worker, as announced on its stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredObject {
    /// Worker-local object identifier.
    pub id: String,
    /// Search tags such as `#y` or `#train`.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Tensor shape, if reported.
    #[serde(default)]
    pub shape: Vec<usize>,
}

/// Shared registry of the objects a worker currently holds.
#[derive(Debug, Clone, Default)]
pub struct DataRegistry {
    objects: Arc<RwLock<HashMap<String, RegisteredObject>>>,
}

impl DataRegistry {
    /// Insert or replace an object.
    pub fn insert(&self, object: RegisteredObject) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(object.id.clone(), object);
    }

    /// Remove an object by id.
    pub fn remove(&self, id: &str) -> Option<RegisteredObject> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Objects carrying every tag in `tags`, ordered by id.
    #[must_use]
    pub fn search(&self, tags: &[&str]) -> Vec<RegisteredObject> {
        let guard = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<RegisteredObject> = guard
            .values()
            .filter(|object| tags.iter().all(|tag| object.tags.contains(*tag)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    /// Number of objects held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the registry holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Deserialize)]
struct WorkerEnvelope {
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RemovedParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LogParams {
    message: String,
}

/// Apply one NDJSON line to `registry`.
///
/// Returns `Ok(true)` when the line changed the registry.
///
/// # Errors
///
/// Returns `AppError::Worker` if the line is not valid JSON or a known
/// method is missing required parameters.
pub fn apply_line(worker_id: &str, line: &str, registry: &DataRegistry) -> Result<bool> {
    if line.trim().is_empty() {
        return Ok(false);
    }

    let envelope: WorkerEnvelope = serde_json::from_str(line)
        .map_err(|e| AppError::Worker(format!("malformed json: {e}")))?;

    match envelope.method.as_str() {
        "object/registered" => {
            let object: RegisteredObject = serde_json::from_value(envelope.params)
                .map_err(|e| AppError::Worker(format!("invalid object/registered: {e}")))?;
            registry.insert(object);
            Ok(true)
        }
        "object/removed" => {
            let params: RemovedParams = serde_json::from_value(envelope.params)
                .map_err(|e| AppError::Worker(format!("invalid object/removed: {e}")))?;
            Ok(registry.remove(&params.id).is_some())
        }
        "log" => {
            if let Ok(params) = serde_json::from_value::<LogParams>(envelope.params) {
                debug!(worker_id, message = %params.message, "worker log");
            }
            Ok(false)
        }
        other => {
            debug!(worker_id, method = other, "skipping unknown worker method");
            Ok(false)
        }
    }
}

async fn run_loop<R>(
    worker_id: String,
    stdout: R,
    registry: DataRegistry,
    stop: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, WorkerCodec::new());

    loop {
        tokio::select! {
            biased;

            () = stop.cancelled() => {
                debug!(worker_id, "event loop: stop received");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(worker_id, "event loop: worker stream closed");
                        break;
                    }
                    Some(Err(AppError::Worker(ref msg))) => {
                        warn!(worker_id, error = msg.as_str(), "event loop: framing error, skipping");
                    }
                    Some(Err(e)) => {
                        warn!(worker_id, error = %e, "event loop: stream error, stopping");
                        break;
                    }
                    Some(Ok(line)) => {
                        if let Err(e) = apply_line(&worker_id, &line, &registry) {
                            warn!(worker_id, error = %e, "event loop: skipping line");
                        }
                    }
                }
            }
        }
    }
}

/// Cooperative event loop owned by a stub.
///
/// `stop` may be called from any thread; `close` then joins the task.
#[derive(Debug)]
pub struct EventLoop {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Start the loop over `stdout`, feeding `registry`.
    pub fn spawn<R>(worker_id: String, stdout: R, registry: DataRegistry) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let stop = CancellationToken::new();
        let handle = tokio::spawn(run_loop(worker_id, stdout, registry, stop.clone()));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Whether the loop task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Schedule the loop to stop at its next suspension point.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Join the loop task, bounded by `limit`.
    ///
    /// A stop must already have been scheduled, otherwise the loop runs
    /// until the worker closes its stdout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ResourceTeardown` if the task does not finish
    /// within `limit` (it is aborted) or panicked.
    pub async fn close(&mut self, limit: Duration) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(AppError::ResourceTeardown(format!(
                "event loop task failed: {err}"
            ))),
            Err(_elapsed) => {
                handle.abort();
                Err(AppError::ResourceTeardown(format!(
                    "event loop did not close within {limit:?}"
                )))
            }
        }
    }
}

/// In-process stub paired with one worker process.
#[derive(Debug)]
pub struct WorkerStub {
    worker_id: String,
    event_loop: EventLoop,
    data: DataRegistry,
    directory: WorkerDirectory,
}

impl WorkerStub {
    /// Start a stub over the worker's stdout and register it in `directory`.
    pub fn start<R>(worker_id: String, stdout: R, directory: WorkerDirectory) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let data = DataRegistry::default();
        let event_loop = EventLoop::spawn(worker_id.clone(), stdout, data.clone());
        if !directory.register(&worker_id) {
            warn!(worker_id, "worker id was already registered in the directory");
        }
        Self {
            worker_id,
            event_loop,
            data,
            directory,
        }
    }

    /// Directory id of this stub.
    #[must_use]
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Objects the worker currently holds.
    #[must_use]
    pub fn data(&self) -> &DataRegistry {
        &self.data
    }

    /// Search the worker's objects by tag.
    #[must_use]
    pub fn search(&self, tags: &[&str]) -> Vec<RegisteredObject> {
        self.data.search(tags)
    }

    /// The stub's event loop.
    #[must_use]
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Mutable access to the event loop for teardown.
    pub fn event_loop_mut(&mut self) -> &mut EventLoop {
        &mut self.event_loop
    }

    /// Remove this stub from the worker directory.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the stub was not registered.
    pub fn detach(&self) -> Result<()> {
        self.directory.remove(&self.worker_id)
    }
}
