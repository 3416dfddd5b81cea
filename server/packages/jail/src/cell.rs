use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use boa_engine::Context;
use jail_error::JailError;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};

use crate::script::ScriptVm;

type Job = Box<dyn FnOnce(&mut Context) + Send>;

/// One isolated script engine. The engine lives on a dedicated thread and
/// only ever sees jobs submitted through [`Cell::run`], one at a time.
pub(crate) struct Cell {
    id: String,
    gate: Arc<Semaphore>,
    jobs: mpsc::Sender<Job>,
}

impl Cell {
    pub(crate) fn spawn(id: &str) -> Result<Self, JailError> {
        let (jobs, queue) = mpsc::channel::<Job>();
        std::thread::Builder::new()
            .name(format!("jail-cell-{id}"))
            .spawn(move || {
                let mut context = Context::default();
                while let Ok(job) = queue.recv() {
                    job(&mut context);
                }
            })
            .map_err(|err| JailError::internal(format!("failed to start cell {id}: {err}")))?;

        tracing::debug!(cell_id = id, "cell started");
        Ok(Self {
            id: id.to_string(),
            gate: Arc::new(Semaphore::new(1)),
            jobs,
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    /// Takes the gate, waiting at most `gate_timeout` before failing with
    /// [`JailError::Busy`].
    pub(crate) async fn lock(&self, gate_timeout: Duration) -> Result<OwnedSemaphorePermit, JailError> {
        match tokio::time::timeout(gate_timeout, self.gate.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(JailError::internal(format!("cell {} is closed", self.id))),
            Err(_) => {
                let waited_ms = u64::try_from(gate_timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(cell_id = %self.id, waited_ms, "cell gate not acquired in time");
                Err(JailError::Busy {
                    cell_id: self.id.clone(),
                    waited_ms,
                })
            }
        }
    }

    /// Runs `f` against the engine while holding the gate.
    pub(crate) async fn run<F, R>(&self, gate_timeout: Duration, f: F) -> Result<R, JailError>
    where
        F: FnOnce(&mut ScriptVm<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = self.lock(gate_timeout).await?;
        self.run_locked(permit, f).await
    }

    /// Runs `f` under an already acquired gate. The permit travels with the
    /// job and is released on the cell thread once `f` returns, so a caller
    /// that stops waiting does not free the gate early.
    ///
    /// The job enters the caller's runtime, which is what the bridge uses for
    /// backend round trips.
    pub(crate) async fn run_locked<F, R>(&self, permit: OwnedSemaphorePermit, f: F) -> Result<R, JailError>
    where
        F: FnOnce(&mut ScriptVm<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|err| JailError::internal(format!("no async runtime available: {err}")))?;
        let (reply, result) = oneshot::channel();
        let cell_id = self.id.clone();
        let job: Job = Box::new(move |context: &mut Context| {
            let _permit = permit;
            let _runtime = runtime.enter();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut vm = ScriptVm::new(&cell_id, context);
                f(&mut vm)
            }))
            .map_err(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(cell_id = %cell_id, panic = %message, "cell job panicked");
                JailError::internal(format!("cell {cell_id} job panicked: {message}"))
            });
            let _ = reply.send(outcome);
        });
        self.jobs
            .send(job)
            .map_err(|_| JailError::internal(format!("cell {} has stopped", self.id)))?;
        result
            .await
            .map_err(|_| JailError::internal(format!("cell {} dropped its reply", self.id)))?
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for Cell {
    fn drop(&mut self) {
        tracing::debug!(cell_id = %self.id, "cell released");
    }
}
