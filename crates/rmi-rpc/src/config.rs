//! Tunables for the in-process connection.

use std::time::Duration;

/// Settings for a `LocalRpc` pair.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// How long `call_and_wait` waits for a reply.
    pub call_timeout: Duration,
    /// Queue depth of the best-effort channel. Calls beyond it are dropped.
    pub unreliable_capacity: usize,
}

impl RpcConfig {
    pub fn new() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            unreliable_capacity: 256,
        }
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn unreliable_capacity(mut self, capacity: usize) -> Self {
        self.unreliable_capacity = capacity.max(1);
        self
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::new()
    }
}
