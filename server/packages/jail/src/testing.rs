//! In-process node doubles for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use jail_error::JailError;
use serde_json::{json, Value};

use crate::node::{HookError, NodeManager, RequestHooks, RpcClient, TracingHooks};
use crate::rpc::RpcCall;
use crate::script::ScriptVm;

/// How long `slow_call` takes to answer on [`StubClient`].
pub const SLOW_CALL_DELAY: Duration = Duration::from_millis(500);

/// Scripted node answers:
/// - `eth_blockNumber` → `"0x10"`
/// - `net_version` → `"1"`
/// - `eth_getTransactionReceipt` → `null`
/// - `echo_params` → the params array
/// - `slow_call` → `"late"` after [`SLOW_CALL_DELAY`]
/// - anything else → backend error `-32601`
#[derive(Debug, Default, Clone, Copy)]
pub struct StubClient;

impl RpcClient for StubClient {
    fn call<'a>(
        &'a self,
        method: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Result<Value, JailError>> {
        Box::pin(async move {
            match method {
                "eth_blockNumber" => Ok(json!("0x10")),
                "net_version" => Ok(json!("1")),
                "eth_getTransactionReceipt" => Ok(Value::Null),
                "echo_params" => Ok(Value::Array(params.to_vec())),
                "slow_call" => {
                    tokio::time::sleep(SLOW_CALL_DELAY).await;
                    Ok(json!("late"))
                }
                _ => Err(JailError::Backend {
                    code: -32601,
                    message: format!("the method {method} does not exist/is not available"),
                }),
            }
        })
    }
}

pub struct StubNode {
    running: AtomicBool,
    hooks: Arc<dyn RequestHooks>,
}

impl StubNode {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            hooks: Arc::new(TracingHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RequestHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }
}

impl Default for StubNode {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeManager for StubNode {
    fn has_node(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn client(&self) -> Result<Arc<dyn RpcClient>, JailError> {
        if !self.has_node() {
            return Err(JailError::NodeUnavailable);
        }
        Ok(Arc::new(StubClient))
    }

    fn request_hooks(&self) -> Result<Arc<dyn RequestHooks>, JailError> {
        Ok(self.hooks.clone())
    }
}

/// Node that counts how often its client and hooks are resolved.
pub struct CountingNode {
    available: AtomicBool,
    client_resolutions: AtomicUsize,
    hook_resolutions: AtomicUsize,
}

impl Default for CountingNode {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
            client_resolutions: AtomicUsize::new(0),
            hook_resolutions: AtomicUsize::new(0),
        }
    }
}

impl CountingNode {
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn client_resolutions(&self) -> usize {
        self.client_resolutions.load(Ordering::SeqCst)
    }

    pub fn hook_resolutions(&self) -> usize {
        self.hook_resolutions.load(Ordering::SeqCst)
    }
}

impl NodeManager for CountingNode {
    fn has_node(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn client(&self) -> Result<Arc<dyn RpcClient>, JailError> {
        self.client_resolutions.fetch_add(1, Ordering::SeqCst);
        if !self.has_node() {
            return Err(JailError::NodeUnavailable);
        }
        Ok(Arc::new(StubClient))
    }

    fn request_hooks(&self) -> Result<Arc<dyn RequestHooks>, JailError> {
        self.hook_resolutions.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(TracingHooks))
    }
}

/// Records `pre:<method>` / `post:<method>` events. With `failing` set every
/// hook records its event and then returns an error.
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingHooks {
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: String) -> Result<(), HookError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        if self.failing {
            return Err("hook rejected the call".into());
        }
        Ok(())
    }
}

impl RequestHooks for RecordingHooks {
    fn pre_dispatch(&self, _vm: &mut ScriptVm<'_>, call: &RpcCall) -> Result<(), HookError> {
        self.record(format!("pre:{}", call.method))
    }

    fn post_dispatch(&self, _vm: &mut ScriptVm<'_>, call: &RpcCall) -> Result<(), HookError> {
        self.record(format!("post:{}", call.method))
    }
}
