use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::BoxFuture;
use jail_error::JailError;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::node::{NodeManager, RequestHooks, RpcClient, TracingHooks};
use crate::rpc::{RpcErrorObject, JSONRPC_VERSION};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type SharedEndpoint = Arc<RwLock<Option<String>>>;

fn read_endpoint(endpoint: &SharedEndpoint) -> Option<String> {
    match endpoint.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write_endpoint(endpoint: &SharedEndpoint, value: Option<String>) {
    match endpoint.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}

/// Node collaborator talking JSON-RPC over HTTP.
///
/// Clients handed out by [`NodeManager::client`] share the node's endpoint
/// slot, so a restart on a new address or a stop is seen by every cached
/// handle without re-resolving it.
pub struct HttpNode {
    endpoint: SharedEndpoint,
    http: reqwest::Client,
    hooks: Arc<dyn RequestHooks>,
}

impl HttpNode {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, JailError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| JailError::internal(format!("failed to build http client: {err}")))?;
        Ok(Self {
            endpoint: Arc::new(RwLock::new(Some(endpoint.into()))),
            http,
            hooks: Arc::new(TracingHooks),
        })
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RequestHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn endpoint(&self) -> Option<String> {
        read_endpoint(&self.endpoint)
    }

    /// Points every client at a restarted node.
    pub fn restart_at(&self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        tracing::info!(endpoint = %endpoint, "node endpoint updated");
        write_endpoint(&self.endpoint, Some(endpoint));
    }

    pub fn stop(&self) {
        tracing::info!("node stopped");
        write_endpoint(&self.endpoint, None);
    }
}

impl NodeManager for HttpNode {
    fn has_node(&self) -> bool {
        self.endpoint().is_some()
    }

    fn client(&self) -> Result<Arc<dyn RpcClient>, JailError> {
        if !self.has_node() {
            return Err(JailError::NodeUnavailable);
        }
        Ok(Arc::new(HttpRpcClient {
            endpoint: self.endpoint.clone(),
            http: self.http.clone(),
            next_id: AtomicU64::new(1),
        }))
    }

    fn request_hooks(&self) -> Result<Arc<dyn RequestHooks>, JailError> {
        Ok(self.hooks.clone())
    }
}

pub struct HttpRpcClient {
    endpoint: SharedEndpoint,
    http: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

impl RpcClient for HttpRpcClient {
    fn call<'a>(
        &'a self,
        method: &'a str,
        params: &'a [Value],
    ) -> BoxFuture<'a, Result<Value, JailError>> {
        Box::pin(async move {
            let endpoint = read_endpoint(&self.endpoint).ok_or(JailError::NodeUnavailable)?;
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let body = json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "method": method,
                "params": params,
            });

            let response = self
                .http
                .post(&endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|err| JailError::internal(format!("rpc transport error: {err}")))?;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(endpoint = %endpoint, status = %status, method, "node returned non-success status");
                return Err(JailError::internal(format!("node returned HTTP {status}")));
            }

            let reply: WireReply = response
                .json()
                .await
                .map_err(|err| JailError::internal(format!("invalid rpc reply: {err}")))?;
            if let Some(error) = reply.error {
                return Err(JailError::Backend {
                    code: error.code,
                    message: error.message,
                });
            }
            Ok(reply.result.unwrap_or(Value::Null))
        })
    }
}
