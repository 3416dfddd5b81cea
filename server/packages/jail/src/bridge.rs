//! The `jeth` object: scripts hand it JSON-RPC requests and get node
//! responses back as script values.

use std::sync::Arc;
use std::time::Duration;

use boa_engine::object::ObjectInitializer;
use boa_engine::object::builtins::JsArray;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsArgs, JsNativeError, JsResult, JsString, JsValue, NativeFunction};
use jail_error::{JailError, INTERNAL_ERROR_CODE};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::bootstrap::BRIDGE_GLOBAL;
use crate::node::{NodeLink, RequestHooks};
use crate::rpc::{RpcCall, RpcErrorObject, RpcRequest, RpcResponse, JSONRPC_VERSION};
use crate::script::{self, ScriptVm};

pub(crate) struct RpcBridge {
    cell_id: String,
    link: Arc<NodeLink>,
    rpc_timeout: Duration,
}

impl RpcBridge {
    pub(crate) fn new(
        cell_id: impl Into<String>,
        link: Arc<NodeLink>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            cell_id: cell_id.into(),
            link,
            rpc_timeout,
        }
    }

    /// Binds `jeth.send` and `jeth.sendAsync` into `context`.
    pub(crate) fn install(self: Arc<Self>, context: &mut Context) -> JsResult<()> {
        let make_send = |bridge: Arc<Self>| {
            // SAFETY: the closure captures only host data behind an `Arc`,
            // never a garbage-collected value.
            unsafe {
                NativeFunction::from_closure(move |_this, args, context| bridge.send(args, context))
            }
        };
        let jeth = ObjectInitializer::new(context)
            .function(make_send(self.clone()), js_string!("send"), 1)
            .function(make_send(self), js_string!("sendAsync"), 2)
            .build();
        context.register_global_property(JsString::from(BRIDGE_GLOBAL), jeth, Attribute::all())
    }

    fn send(&self, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
        let payload = script::stringify(context, args.get_or_undefined(0))?.ok_or_else(|| {
            JsNativeError::typ().with_message("jeth.send expects a request object or array")
        })?;
        let request = RpcRequest::decode(&payload)
            .map_err(|err| JsNativeError::syntax().with_message(err.to_string()))?;

        let outcome = {
            let mut vm = ScriptVm::new(&self.cell_id, context);
            self.dispatch(&mut vm, &request)
        };
        let reply = reply_value(context, &request, outcome)?;

        if let Some(callback) = args.get_or_undefined(1).as_callable() {
            callback.call(&JsValue::undefined(), &[JsValue::null(), reply], context)?;
            return Ok(JsValue::undefined());
        }
        Ok(reply)
    }

    /// Runs every call in order. `Err` carries the single response that
    /// replaces the whole reply when the node client cannot be resolved.
    fn dispatch(
        &self,
        vm: &mut ScriptVm<'_>,
        request: &RpcRequest,
    ) -> Result<Vec<RpcResponse>, RpcResponse> {
        let hooks = self
            .link
            .hooks()
            .map_err(|err| RpcResponse::internal_error(Value::Null, err.to_string()))?;
        tracing::debug!(
            cell_id = %self.cell_id,
            batch = request.is_batch(),
            batch_len = request.calls().len(),
            "dispatching rpc request"
        );
        let mut scope = BatchScope::new(hooks);
        let outcome = request
            .calls()
            .iter()
            .map(|call| self.dispatch_one(vm, &mut scope, call))
            .collect();
        scope.close(vm);
        outcome
    }

    fn dispatch_one(
        &self,
        vm: &mut ScriptVm<'_>,
        scope: &mut BatchScope,
        call: &RpcCall,
    ) -> Result<RpcResponse, RpcResponse> {
        scope.enter(vm, call);

        let client = self.link.client().map_err(|err| {
            tracing::warn!(cell_id = %self.cell_id, method = %call.method, error = %err, "rpc client unavailable");
            RpcResponse::internal_error(Value::Null, err.to_string())
        })?;

        // Cell jobs enter the runtime of whoever submitted them.
        let runtime = Handle::try_current().map_err(|err| {
            tracing::warn!(cell_id = %self.cell_id, method = %call.method, error = %err, "no async runtime for rpc call");
            RpcResponse::internal_error(Value::Null, format!("no async runtime available: {err}"))
        })?;
        let outcome = runtime.block_on(async {
            match tokio::time::timeout(self.rpc_timeout, client.call(&call.method, &call.params)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(JailError::internal(format!(
                    "rpc call {} timed out after {}ms",
                    call.method,
                    self.rpc_timeout.as_millis()
                ))),
            }
        });
        if let Err(err) = &outcome {
            tracing::debug!(cell_id = %self.cell_id, method = %call.method, error = %err, "rpc call failed");
        }
        Ok(RpcResponse::from_outcome(call.id.clone(), outcome))
    }
}

/// Post-dispatch hooks queued for one `send`. Closing the scope runs them in
/// registration order whatever happened to the calls.
struct BatchScope {
    hooks: Arc<dyn RequestHooks>,
    pending: Vec<RpcCall>,
}

impl BatchScope {
    fn new(hooks: Arc<dyn RequestHooks>) -> Self {
        Self {
            hooks,
            pending: Vec::new(),
        }
    }

    fn enter(&mut self, vm: &mut ScriptVm<'_>, call: &RpcCall) {
        if let Err(err) = self.hooks.pre_dispatch(vm, call) {
            tracing::warn!(cell_id = vm.cell_id(), method = %call.method, error = %err, "pre-dispatch hook failed");
        }
        self.pending.push(call.clone());
    }

    fn close(self, vm: &mut ScriptVm<'_>) {
        for call in &self.pending {
            if let Err(err) = self.hooks.post_dispatch(vm, call) {
                tracing::warn!(cell_id = vm.cell_id(), method = %call.method, error = %err, "post-dispatch hook failed");
            }
        }
    }
}

fn reply_value(
    context: &mut Context,
    request: &RpcRequest,
    outcome: Result<Vec<RpcResponse>, RpcResponse>,
) -> JsResult<JsValue> {
    let responses = match outcome {
        Ok(responses) => responses,
        Err(failure) => return response_to_js(context, &failure),
    };
    if !request.is_batch() {
        return match responses.first() {
            Some(response) => response_to_js(context, response),
            None => Ok(JsValue::undefined()),
        };
    }
    let array = JsArray::new(context);
    for response in &responses {
        let value = response_to_js(context, response)?;
        array.push(value, context)?;
    }
    Ok(array.into())
}

fn response_to_js(context: &mut Context, response: &RpcResponse) -> JsResult<JsValue> {
    let id = script::from_host(context, &response.id)?;
    let payload = match (&response.result, &response.error) {
        (Some(Value::Null), _) | (None, None) => Ok(JsValue::null()),
        (Some(result), _) => script::from_host(context, result).map_err(|err| RpcErrorObject {
            code: INTERNAL_ERROR_CODE,
            message: err.to_string(),
        }),
        (None, Some(error)) => Err(error.clone()),
    };

    let (key, value) = match payload {
        Ok(result) => (js_string!("result"), result),
        Err(error) => {
            let error = ObjectInitializer::new(context)
                .property(js_string!("code"), error.code, Attribute::all())
                .property(
                    js_string!("message"),
                    JsString::from(error.message.as_str()),
                    Attribute::all(),
                )
                .build();
            (js_string!("error"), JsValue::from(error))
        }
    };

    let object = ObjectInitializer::new(context)
        .property(js_string!("jsonrpc"), JsString::from(JSONRPC_VERSION), Attribute::all())
        .property(js_string!("id"), id, Attribute::all())
        .property(key, value, Attribute::all())
        .build();
    Ok(object.into())
}
