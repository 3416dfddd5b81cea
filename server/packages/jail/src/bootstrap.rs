//! Fixed script fragments evaluated around a cell's own script.

/// Global name of the bridge object bound into every cell.
pub const BRIDGE_GLOBAL: &str = "jeth";

/// Global function invoked by [`Jail::dispatch_call`](crate::Jail::dispatch_call).
pub const CALL_ENTRY_POINT: &str = "call";

/// Wires a web3 client to the bridge when a library providing `require` is
/// loaded, and defines the `bn` helper.
pub const PREAMBLE: &str = r#"
var web3, Bignumber;
if (typeof require === 'function') {
    var Web3 = require('web3');
    web3 = new Web3(jeth);
    Bignumber = require('bignumber.js');
}
function bn(val) {
    return new Bignumber(val);
}
"#;

/// Completion value of a bootstrap: the serialized status catalog, or
/// `undefined` when the script did not declare one.
pub const TRAILER: &str =
    "typeof _status_catalog === 'undefined' ? undefined : JSON.stringify(_status_catalog)";
