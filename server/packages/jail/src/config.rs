use std::time::Duration;

pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct JailConfig {
    /// How long a caller waits for a busy cell before giving up.
    pub gate_timeout: Duration,
    /// Deadline for a single backend round trip.
    pub rpc_timeout: Duration,
    /// Web3-compatible client library evaluated before the preamble. It is
    /// expected to define a CommonJS-style `require` for `web3` and
    /// `bignumber.js`.
    pub web3_library: Option<String>,
}

impl Default for JailConfig {
    fn default() -> Self {
        Self {
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            web3_library: None,
        }
    }
}

impl JailConfig {
    pub fn with_gate_timeout(mut self, gate_timeout: Duration) -> Self {
        self.gate_timeout = gate_timeout;
        self
    }

    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    pub fn with_web3_library(mut self, source: impl Into<String>) -> Self {
        self.web3_library = Some(source.into());
        self
    }
}
