//! Interfaces to the node collaborator: availability, a restart-tolerant
//! RPC client, and the request hooks run around every dispatched call.

use std::error::Error;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use jail_error::JailError;
use serde_json::Value;

use crate::rpc::RpcCall;
use crate::script::ScriptVm;

pub type HookError = Box<dyn Error + Send + Sync>;

/// A JSON-RPC client bound to the running node.
pub trait RpcClient: Send + Sync {
    /// Performs one round trip. Structured node errors come back as
    /// [`JailError::Backend`].
    fn call<'a>(
        &'a self,
        method: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Result<Value, JailError>>;
}

/// Hooks invoked around each dispatched call. Failures are logged by the
/// caller and never change the call outcome.
pub trait RequestHooks: Send + Sync {
    fn pre_dispatch(&self, vm: &mut ScriptVm<'_>, call: &RpcCall) -> Result<(), HookError>;
    fn post_dispatch(&self, vm: &mut ScriptVm<'_>, call: &RpcCall) -> Result<(), HookError>;
}

pub trait NodeManager: Send + Sync {
    fn has_node(&self) -> bool;
    /// Returns a client handle that stays valid across node restarts.
    fn client(&self) -> Result<Arc<dyn RpcClient>, JailError>;
    fn request_hooks(&self) -> Result<Arc<dyn RequestHooks>, JailError>;
}

/// Lazily resolved handles to the node's client and hooks. A successful
/// resolution is cached for the lifetime of the registry; failures are not.
pub(crate) struct NodeLink {
    node: Arc<dyn NodeManager>,
    client: Mutex<Option<Arc<dyn RpcClient>>>,
    hooks: Mutex<Option<Arc<dyn RequestHooks>>>,
}

impl NodeLink {
    pub(crate) fn new(node: Arc<dyn NodeManager>) -> Self {
        Self {
            node,
            client: Mutex::new(None),
            hooks: Mutex::new(None),
        }
    }

    pub(crate) fn has_node(&self) -> bool {
        self.node.has_node()
    }

    pub(crate) fn client(&self) -> Result<Arc<dyn RpcClient>, JailError> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| JailError::internal("client slot poisoned"))?;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = self.node.client()?;
        tracing::debug!("resolved node rpc client");
        *slot = Some(client.clone());
        Ok(client)
    }

    pub(crate) fn hooks(&self) -> Result<Arc<dyn RequestHooks>, JailError> {
        let mut slot = self
            .hooks
            .lock()
            .map_err(|_| JailError::internal("hook slot poisoned"))?;
        if let Some(hooks) = slot.as_ref() {
            return Ok(hooks.clone());
        }
        let hooks = self.node.request_hooks()?;
        *slot = Some(hooks.clone());
        Ok(hooks)
    }
}

/// Default hooks: record each call in the trace log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHooks;

impl RequestHooks for TracingHooks {
    fn pre_dispatch(&self, vm: &mut ScriptVm<'_>, call: &RpcCall) -> Result<(), HookError> {
        tracing::debug!(cell_id = vm.cell_id(), method = %call.method, id = %call.id, "rpc call dispatching");
        Ok(())
    }

    fn post_dispatch(&self, vm: &mut ScriptVm<'_>, call: &RpcCall) -> Result<(), HookError> {
        tracing::debug!(cell_id = vm.cell_id(), method = %call.method, id = %call.id, "rpc call finished");
        Ok(())
    }
}
