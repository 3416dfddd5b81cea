//! Process-wide registry slot for hosts that want singleton access.

use std::sync::{Arc, PoisonError, RwLock};

use jail_error::{Envelope, JailError};

use crate::config::JailConfig;
use crate::node::NodeManager;
use crate::registry::Jail;
use crate::script::ScriptVm;

static INSTANCE: RwLock<Option<Jail>> = RwLock::new(None);

/// Creates the process registry on first use. Later calls keep the existing
/// registry (and its node and config) and only replace its base script.
pub fn init(base_script: impl Into<String>, node: Arc<dyn NodeManager>, config: JailConfig) -> Jail {
    let mut slot = INSTANCE.write().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(jail) => {
            jail.set_base_script(base_script);
            jail.clone()
        }
        None => {
            tracing::info!("jail registry initialized");
            let jail = Jail::new(base_script, node, config);
            *slot = Some(jail.clone());
            jail
        }
    }
}

pub fn instance() -> Option<Jail> {
    INSTANCE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn not_initialized() -> String {
    Envelope::from(JailError::NotInitialized).to_json_string()
}

pub async fn bootstrap_cell(cell_id: &str, script: &str) -> String {
    match instance() {
        Some(jail) => jail.bootstrap_cell(cell_id, script).await,
        None => not_initialized(),
    }
}

pub async fn dispatch_call(cell_id: &str, path: &str, args: &str) -> String {
    match instance() {
        Some(jail) => jail.dispatch_call(cell_id, path, args).await,
        None => not_initialized(),
    }
}

pub async fn with_vm<F, R>(cell_id: &str, f: F) -> Result<R, JailError>
where
    F: FnOnce(&mut ScriptVm<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    let jail = instance().ok_or(JailError::NotInitialized)?;
    jail.with_vm(cell_id, f).await
}
