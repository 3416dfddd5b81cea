//! Script cells that talk JSON-RPC to a blockchain node.

mod bootstrap;
mod bridge;
mod cell;
pub mod config;
pub mod global;
pub mod http_node;
pub mod node;
mod registry;
pub mod rpc;
pub mod script;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bootstrap::{BRIDGE_GLOBAL, CALL_ENTRY_POINT};
pub use config::JailConfig;
pub use http_node::{HttpNode, HttpRpcClient};
pub use jail_error::{Envelope, JailError};
pub use node::{HookError, NodeManager, RequestHooks, RpcClient, TracingHooks};
pub use registry::Jail;
pub use rpc::{RpcCall, RpcRequest, RpcResponse};
pub use script::ScriptVm;
