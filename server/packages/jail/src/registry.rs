use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use jail_error::{Envelope, JailError};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::bootstrap::{CALL_ENTRY_POINT, PREAMBLE, TRAILER};
use crate::bridge::RpcBridge;
use crate::cell::Cell;
use crate::config::JailConfig;
use crate::node::{NodeLink, NodeManager};
use crate::script::{script_error, ScriptVm};

/// Registry of script cells keyed by caller-chosen ids.
///
/// Cheap to clone; clones share cells, the base script and the cached node
/// handles.
#[derive(Clone)]
pub struct Jail {
    inner: Arc<JailInner>,
}

struct JailInner {
    cells: RwLock<HashMap<String, Arc<Cell>>>,
    base_script: StdRwLock<String>,
    link: Arc<NodeLink>,
    config: JailConfig,
}

impl Jail {
    pub fn new(base_script: impl Into<String>, node: Arc<dyn NodeManager>, config: JailConfig) -> Self {
        Self {
            inner: Arc::new(JailInner {
                cells: RwLock::new(HashMap::new()),
                base_script: StdRwLock::new(base_script.into()),
                link: Arc::new(NodeLink::new(node)),
                config,
            }),
        }
    }

    pub fn config(&self) -> &JailConfig {
        &self.inner.config
    }

    pub fn base_script(&self) -> String {
        self.inner
            .base_script
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the base script used by cells bootstrapped from now on.
    pub fn set_base_script(&self, base_script: impl Into<String>) {
        *self
            .inner
            .base_script
            .write()
            .unwrap_or_else(PoisonError::into_inner) = base_script.into();
    }

    pub fn has_node(&self) -> bool {
        self.inner.link.has_node()
    }

    pub async fn has_cell(&self, cell_id: &str) -> bool {
        self.inner.cells.read().await.contains_key(cell_id)
    }

    pub async fn cell_count(&self) -> usize {
        self.inner.cells.read().await.len()
    }

    /// Creates or replaces the cell `cell_id` and evaluates `script` in it.
    /// Returns the envelope around the serialized `_status_catalog`.
    pub async fn bootstrap_cell(&self, cell_id: &str, script: &str) -> String {
        let result = self.try_bootstrap_cell(cell_id, script).await;
        if let Err(err) = &result {
            tracing::warn!(cell_id, error = %err, "cell bootstrap failed");
        }
        Envelope::from_result(result).to_json_string()
    }

    pub async fn try_bootstrap_cell(&self, cell_id: &str, script: &str) -> Result<Value, JailError> {
        let cell = Arc::new(Cell::spawn(cell_id)?);
        // Callers that find the new cell queue behind its bootstrap.
        let permit = cell.lock(self.inner.config.gate_timeout).await?;
        let replaced = self
            .inner
            .cells
            .write()
            .await
            .insert(cell_id.to_string(), cell.clone());
        if replaced.is_some() {
            tracing::info!(cell_id, "replacing existing cell");
        }

        let bridge = Arc::new(RpcBridge::new(
            cell_id,
            self.inner.link.clone(),
            self.inner.config.rpc_timeout,
        ));
        let base_script = self.base_script();
        let web3_library = self.inner.config.web3_library.clone();
        let script = script.to_string();

        cell.run_locked(permit, move |vm| {
            vm.run(&format!("{base_script};"))?;
            bridge.install(vm.context()).map_err(script_error)?;
            if let Some(library) = &web3_library {
                vm.run(library)?;
            }
            vm.run(PREAMBLE)?;
            vm.run(&script)?;
            let catalog = vm.run(TRAILER)?;
            vm.entry_result(&catalog)
        })
        .await?
    }

    /// Invokes the cell's global `call(path, args)` and wraps its return
    /// value in the envelope.
    pub async fn dispatch_call(&self, cell_id: &str, path: &str, args: &str) -> String {
        let result = self.try_dispatch_call(cell_id, path, args).await;
        if let Err(err) = &result {
            tracing::debug!(cell_id, path, error = %err, "cell call failed");
        }
        Envelope::from_result(result).to_json_string()
    }

    pub async fn try_dispatch_call(&self, cell_id: &str, path: &str, args: &str) -> Result<Value, JailError> {
        let cell = self.cell(cell_id).await?;
        if let Err(err) = self.inner.link.client() {
            tracing::debug!(cell_id, error = %err, "node client unavailable");
            return Err(JailError::NodeUnavailable);
        }

        let path = path.to_string();
        let args = args.to_string();
        cell.run(self.inner.config.gate_timeout, move |vm| {
            let value = vm.call_global(CALL_ENTRY_POINT, &[path.as_str(), args.as_str()])?;
            vm.entry_result(&value)
        })
        .await?
    }

    /// Runs `f` against the engine of `cell_id` on the cell's own thread,
    /// under the cell gate.
    pub async fn with_vm<F, R>(&self, cell_id: &str, f: F) -> Result<R, JailError>
    where
        F: FnOnce(&mut ScriptVm<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let cell = self.cell(cell_id).await?;
        cell.run(self.inner.config.gate_timeout, f).await
    }

    async fn cell(&self, cell_id: &str) -> Result<Arc<Cell>, JailError> {
        self.inner
            .cells
            .read()
            .await
            .get(cell_id)
            .cloned()
            .ok_or_else(|| JailError::CellNotFound {
                cell_id: cell_id.to_string(),
            })
    }
}
