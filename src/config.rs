use std::net::SocketAddr;

use crate::scheduler::job::{Priority, Target};

/// Default agent/device composition: five agents, fifteen devices.
/// Insertion order matters — it is the assignment tie-break.
pub const DEFAULT_POOL_SPEC: &str = "agent-1:emulator-1,device-1;\
agent-2:emulator-2,device-2,browserstack-1,browserstack-2;\
agent-3:emulator-3,device-3,browserstack-3;\
agent-4:emulator-4,device-4;\
agent-5:emulator-5,device-5,browserstack-4,browserstack-5";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Backing store endpoint (`redis://...` or `memory`).
    pub store_url: String,
    pub listen_addr: SocketAddr,
    pub tick_interval_ms: u64,
    /// Default `max_retries` stamped on new jobs.
    pub max_retries: u32,
    pub default_priority: Priority,
    pub default_target: Target,
    /// Pool spec string, `agent:device,device;agent:device,...` format.
    pub pool_spec: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            store_url: "redis://localhost:6379".to_string(),
            listen_addr: "0.0.0.0:8080".parse().unwrap(),
            tick_interval_ms: 5000,
            max_retries: 3,
            default_priority: Priority::Medium,
            default_target: Target::Emulator,
            pool_spec: DEFAULT_POOL_SPEC.to_string(),
        }
    }
}
