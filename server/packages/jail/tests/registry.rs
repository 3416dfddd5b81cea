use std::sync::Arc;
use std::time::{Duration, Instant};

use jail::testing::StubNode;
use jail::{Jail, JailConfig, JailError};
use serde_json::json;

const BASE_SCRIPT: &str = r#"
function call(path, args) {
    var params = JSON.parse(args);
    return JSON.stringify(_status_catalog[path].apply(null, params));
}
"#;

const CATALOG: &str = r#"
var _status_catalog = {
    ping: function() { return "pong"; },
    nothing: function() {},
    spin: function(ms) {
        var end = Date.now() + ms;
        while (Date.now() < end) {}
        return "done";
    }
};
"#;

fn jail_with(node: Arc<StubNode>, config: JailConfig) -> Jail {
    Jail::new(BASE_SCRIPT, node, config)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ping_returns_pong() {
    let jail = jail_with(Arc::new(StubNode::new()), JailConfig::default());
    assert_eq!(jail.bootstrap_cell("chat-1", CATALOG).await, r#"{"result":{}}"#);
    assert_eq!(jail.dispatch_call("chat-1", "ping", "[]").await, r#"{"result":"pong"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undefined_return_becomes_null() {
    let jail = jail_with(Arc::new(StubNode::new()), JailConfig::default());
    jail.try_bootstrap_cell("chat-1", CATALOG).await.expect("bootstrap");
    assert_eq!(jail.dispatch_call("chat-1", "nothing", "[]").await, r#"{"result":null}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rebootstrap_discards_previous_globals() {
    let jail = jail_with(Arc::new(StubNode::new()), JailConfig::default());
    jail.try_bootstrap_cell("chat-1", "var leftover = 42;")
        .await
        .expect("first bootstrap");
    jail.try_bootstrap_cell("chat-1", CATALOG)
        .await
        .expect("second bootstrap");

    let kind = jail
        .with_vm("chat-1", |vm| vm.eval("typeof leftover"))
        .await
        .expect("with_vm")
        .expect("eval");
    assert_eq!(kind, json!("undefined"));
    assert_eq!(jail.cell_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_cell_is_not_created() {
    let jail = jail_with(Arc::new(StubNode::new()), JailConfig::default());
    assert_eq!(
        jail.dispatch_call("ghost", "ping", "[]").await,
        r#"{"error":"Cell[ghost] doesn't exist."}"#
    );
    assert!(!jail.has_cell("ghost").await);

    let err = jail
        .with_vm("ghost", |vm| vm.eval("1"))
        .await
        .expect_err("missing cell");
    assert_eq!(
        err,
        JailError::CellNotFound {
            cell_id: "ghost".to_string()
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatch_fails_fast_without_node() {
    let node = Arc::new(StubNode::new());
    let jail = jail_with(node.clone(), JailConfig::default());
    jail.try_bootstrap_cell("chat-1", CATALOG).await.expect("bootstrap");

    node.set_running(false);
    assert_eq!(
        jail.dispatch_call("chat-1", "ping", "[]").await,
        r#"{"error":"no running node is available"}"#
    );
    assert!(!jail.has_node());

    node.set_running(true);
    assert_eq!(jail.dispatch_call("chat-1", "ping", "[]").await, r#"{"result":"pong"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_cell_rejects_second_caller() {
    let config = JailConfig::default().with_gate_timeout(Duration::from_millis(50));
    let jail = jail_with(Arc::new(StubNode::new()), config);
    jail.try_bootstrap_cell("chat-1", CATALOG).await.expect("bootstrap");

    let first = {
        let jail = jail.clone();
        tokio::spawn(async move { jail.dispatch_call("chat-1", "spin", "[1000]").await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = jail
        .try_dispatch_call("chat-1", "ping", "[]")
        .await
        .expect_err("cell is busy");
    assert_eq!(
        err,
        JailError::Busy {
            cell_id: "chat-1".to_string(),
            waited_ms: 50
        }
    );

    assert_eq!(first.await.expect("join"), r#"{"result":"done"}"#);
    assert_eq!(jail.dispatch_call("chat-1", "ping", "[]").await, r#"{"result":"pong"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiting_caller_runs_once_gate_frees() {
    let config = JailConfig::default().with_gate_timeout(Duration::from_secs(2));
    let jail = jail_with(Arc::new(StubNode::new()), config);
    jail.try_bootstrap_cell("chat-1", CATALOG).await.expect("bootstrap");

    let first = {
        let jail = jail.clone();
        tokio::spawn(async move { jail.dispatch_call("chat-1", "spin", "[300]").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    assert_eq!(jail.dispatch_call("chat-1", "ping", "[]").await, r#"{"result":"pong"}"#);
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(first.await.expect("join"), r#"{"result":"done"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_call_keeps_gate_until_script_returns() {
    let config = JailConfig::default().with_gate_timeout(Duration::from_millis(50));
    let jail = jail_with(Arc::new(StubNode::new()), config);
    jail.try_bootstrap_cell("chat-1", CATALOG).await.expect("bootstrap");

    let first = {
        let jail = jail.clone();
        tokio::spawn(async move { jail.dispatch_call("chat-1", "spin", "[1000]").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    first.abort();
    assert!(first.await.expect_err("aborted").is_cancelled());

    let err = jail
        .try_dispatch_call("chat-1", "ping", "[]")
        .await
        .expect_err("script is still running");
    assert_eq!(
        err,
        JailError::Busy {
            cell_id: "chat-1".to_string(),
            waited_ms: 50
        }
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(jail.dispatch_call("chat-1", "ping", "[]").await, r#"{"result":"pong"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panic_in_host_closure_leaves_cell_usable() {
    let jail = jail_with(Arc::new(StubNode::new()), JailConfig::default());
    jail.try_bootstrap_cell("chat-1", CATALOG).await.expect("bootstrap");

    let err = jail
        .with_vm("chat-1", |_vm| -> () { panic!("host closure failed") })
        .await
        .expect_err("panic surfaces as an error");
    assert!(matches!(err, JailError::Internal { ref message } if message.contains("host closure failed")));

    assert_eq!(jail.dispatch_call("chat-1", "ping", "[]").await, r#"{"result":"pong"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn calls_wait_for_inflight_bootstrap() {
    let jail = jail_with(Arc::new(StubNode::new()), JailConfig::default());
    let slow_catalog = format!(
        "var end = Date.now() + 300; while (Date.now() < end) {{}}\n{CATALOG}"
    );

    let bootstrap = {
        let jail = jail.clone();
        tokio::spawn(async move { jail.bootstrap_cell("chat-1", &slow_catalog).await })
    };
    while !jail.has_cell("chat-1").await {
        tokio::task::yield_now().await;
    }

    assert_eq!(jail.dispatch_call("chat-1", "ping", "[]").await, r#"{"result":"pong"}"#);
    assert_eq!(bootstrap.await.expect("join"), r#"{"result":{}}"#);
}

#[test]
fn cells_follow_the_calling_runtime() {
    let runtime = || {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("build runtime")
    };
    let jail = jail_with(Arc::new(StubNode::new()), JailConfig::default());
    let catalog = r#"
        var _status_catalog = {
            block: function() {
                return jeth.send({jsonrpc: "2.0", id: 1, method: "eth_blockNumber", params: []}).result;
            }
        };
    "#;

    let first = runtime();
    first
        .block_on(jail.try_bootstrap_cell("chat-1", catalog))
        .expect("bootstrap");
    drop(first);

    let second = runtime();
    assert_eq!(
        second.block_on(jail.dispatch_call("chat-1", "block", "[]")),
        r#"{"result":"0x10"}"#
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn distinct_cells_run_independently() {
    let config = JailConfig::default().with_gate_timeout(Duration::from_millis(50));
    let jail = jail_with(Arc::new(StubNode::new()), config);
    jail.try_bootstrap_cell("a", CATALOG).await.expect("bootstrap a");
    jail.try_bootstrap_cell("b", CATALOG).await.expect("bootstrap b");

    let slow = {
        let jail = jail.clone();
        tokio::spawn(async move { jail.dispatch_call("a", "spin", "[1000]").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(jail.dispatch_call("b", "ping", "[]").await, r#"{"result":"pong"}"#);
    assert!(!slow.is_finished());
    assert_eq!(slow.await.expect("join"), r#"{"result":"done"}"#);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_entry_point_is_reported() {
    let jail = Jail::new("", Arc::new(StubNode::new()), JailConfig::default());
    jail.try_bootstrap_cell("bare", CATALOG).await.expect("bootstrap");
    assert_eq!(
        jail.dispatch_call("bare", "ping", "[]").await,
        r#"{"error":"call is not a function"}"#
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn web3_library_runs_before_preamble() {
    let library = r#"
        function require(name) {
            if (name === 'web3') {
                return function Web3(provider) { this.currentProvider = provider; };
            }
            return function Bignumber(value) { this.value = String(value); };
        }
    "#;
    let config = JailConfig::default().with_web3_library(library);
    let jail = jail_with(Arc::new(StubNode::new()), config);
    let catalog = jail
        .try_bootstrap_cell("w3", "var _status_catalog = {wired: web3.currentProvider === jeth};")
        .await
        .expect("bootstrap");
    assert_eq!(catalog, json!({"wired": true}));

    let value = jail
        .with_vm("w3", |vm| vm.eval("bn(12).value"))
        .await
        .expect("with_vm")
        .expect("eval");
    assert_eq!(value, json!("12"));
}
