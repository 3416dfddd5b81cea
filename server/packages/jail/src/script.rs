//! Host ↔ script value conversion. Everything crossing the engine boundary
//! goes through the engine's own `JSON.stringify` / `JSON.parse`, so values
//! are read exactly the way the script environment would serialize them.

use boa_engine::{js_string, Context, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, Source};
use jail_error::JailError;
use serde_json::Value;

/// Direct access to one cell's engine, handed to hooks and to
/// [`Jail::with_vm`](crate::Jail::with_vm) callers. Only valid on the cell's
/// own thread while the cell gate is held.
pub struct ScriptVm<'a> {
    cell_id: &'a str,
    context: &'a mut Context,
}

impl<'a> ScriptVm<'a> {
    pub(crate) fn new(cell_id: &'a str, context: &'a mut Context) -> Self {
        Self { cell_id, context }
    }

    pub fn cell_id(&self) -> &str {
        self.cell_id
    }

    /// Evaluates `source` as a script and returns its completion value.
    pub fn eval(&mut self, source: &str) -> Result<Value, JailError> {
        let value = self.run(source)?;
        to_host(self.context, &value)
    }

    pub(crate) fn run(&mut self, source: &str) -> Result<JsValue, JailError> {
        self.context
            .eval(Source::from_bytes(source))
            .map_err(script_error)
    }

    /// Reads a global binding; missing globals read as `null`.
    pub fn get_global(&mut self, name: &str) -> Result<Value, JailError> {
        let value = self
            .context
            .global_object()
            .get(JsString::from(name), self.context)
            .map_err(script_error)?;
        to_host(self.context, &value)
    }

    pub fn set_global(&mut self, name: &str, value: &Value) -> Result<(), JailError> {
        let value = from_host(self.context, value).map_err(script_error)?;
        self.context
            .global_object()
            .set(JsString::from(name), value, true, self.context)
            .map_err(script_error)?;
        Ok(())
    }

    pub fn context(&mut self) -> &mut Context {
        self.context
    }

    /// Calls the global function `name` with string arguments.
    pub(crate) fn call_global(&mut self, name: &str, args: &[&str]) -> Result<JsValue, JailError> {
        let function = self
            .context
            .global_object()
            .get(JsString::from(name), self.context)
            .map_err(script_error)?;
        let Some(function) = function.as_callable() else {
            return Err(JailError::internal(format!("{name} is not a function")));
        };
        let args: Vec<JsValue> = args
            .iter()
            .map(|arg| JsValue::from(JsString::from(*arg)))
            .collect();
        function
            .call(&JsValue::undefined(), &args, self.context)
            .map_err(script_error)
    }

    /// Converts an entry-point return value for the envelope. Strings are
    /// treated as JSON text produced by the script; text that is not valid
    /// JSON is carried as a plain string. `undefined` becomes `null`.
    pub(crate) fn entry_result(&mut self, value: &JsValue) -> Result<Value, JailError> {
        if value.is_undefined() {
            return Ok(Value::Null);
        }
        if let Some(text) = value.as_string() {
            let text = text.to_std_string_escaped();
            return Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)));
        }
        to_host(self.context, value)
    }
}

fn json_function(context: &mut Context, name: &str) -> JsResult<JsObject> {
    let json = context.global_object().get(js_string!("JSON"), context)?;
    let Some(json) = json.as_object() else {
        return Err(JsNativeError::typ()
            .with_message("JSON is not available in this cell")
            .into());
    };
    let function = json.get(JsString::from(name), context)?;
    function.as_callable().cloned().ok_or_else(|| {
        JsNativeError::typ()
            .with_message(format!("JSON.{name} is not callable"))
            .into()
    })
}

/// `JSON.stringify(value)`; `None` when the engine yields `undefined`.
pub(crate) fn stringify(context: &mut Context, value: &JsValue) -> JsResult<Option<String>> {
    let stringify = json_function(context, "stringify")?;
    let text = stringify.call(&JsValue::undefined(), &[value.clone()], context)?;
    Ok(text.as_string().map(JsString::to_std_string_escaped))
}

/// `JSON.parse(text)` inside the engine.
pub(crate) fn parse(context: &mut Context, text: &str) -> JsResult<JsValue> {
    let parse = json_function(context, "parse")?;
    parse.call(
        &JsValue::undefined(),
        &[JsValue::from(JsString::from(text))],
        context,
    )
}

pub(crate) fn from_host(context: &mut Context, value: &Value) -> JsResult<JsValue> {
    parse(context, &value.to_string())
}

pub(crate) fn to_host(context: &mut Context, value: &JsValue) -> Result<Value, JailError> {
    match stringify(context, value).map_err(script_error)? {
        Some(text) => serde_json::from_str(&text)
            .map_err(|err| JailError::internal(format!("script produced invalid JSON: {err}"))),
        None => Ok(Value::Null),
    }
}

pub(crate) fn script_error(err: JsError) -> JailError {
    JailError::internal(err.to_string())
}
