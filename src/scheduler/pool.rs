use serde::Serialize;

use crate::scheduler::job::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Available,
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Busy,
    Offline,
}

/// A capability-typed execution slot owned by an agent.
///
/// The device stores `agent_id` as a lookup key, not a pointer; agent
/// status is recomputed from its devices on every mutation.
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub target: Target,
    pub status: DeviceStatus,
    pub agent_id: String,
    pub current_jobs: Vec<String>,
}

/// A worker process/host exposing one or more devices.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    pub status: AgentStatus,
    pub devices: Vec<Device>,
}

/// Flat device view for the read API.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: Target,
    pub status: DeviceStatus,
    pub target: Target,
    pub agent_id: String,
    pub current_jobs: Vec<String>,
}

/// In-memory registry of agents and devices, mutated by the scheduler only.
///
/// Insertion order is the tie-break for assignment, so agents and devices
/// live in `Vec`s, never maps.
#[derive(Debug, Default)]
pub struct ResourcePool {
    agents: Vec<Agent>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from its spec string:
    /// `agent-1:emulator-1,device-1;agent-2:emulator-2,browserstack-1;...`
    ///
    /// The device target is inferred from the name prefix. Malformed
    /// entries are logged and skipped.
    pub fn from_spec(spec: &str) -> Self {
        let mut pool = Self::new();
        for agent_entry in spec.split(';').filter(|s| !s.trim().is_empty()) {
            let Some((agent_id, device_list)) = agent_entry.trim().split_once(':') else {
                tracing::warn!(entry = agent_entry, "Invalid pool entry, expected agent:devices");
                continue;
            };
            let mut devices = Vec::new();
            for device_id in device_list.split(',').filter(|s| !s.trim().is_empty()) {
                let device_id = device_id.trim();
                match device_target(device_id) {
                    Some(target) => devices.push(Device {
                        id: device_id.to_string(),
                        target,
                        status: DeviceStatus::Available,
                        agent_id: agent_id.trim().to_string(),
                        current_jobs: Vec::new(),
                    }),
                    None => {
                        tracing::warn!(device_id, "Unknown device target prefix, skipping device");
                    }
                }
            }
            pool.agents.push(Agent {
                id: agent_id.trim().to_string(),
                status: AgentStatus::Online,
                devices,
            });
        }
        tracing::info!(
            agents = pool.agent_count(),
            devices = pool.device_count(),
            "Resource pool seeded"
        );
        pool
    }

    /// First online agent with an available device of the requested target,
    /// in insertion order.
    pub fn find_available(&self, target: Target) -> Option<(String, String)> {
        for agent in &self.agents {
            if agent.status == AgentStatus::Offline {
                continue;
            }
            for device in &agent.devices {
                if device.status == DeviceStatus::Available && device.target == target {
                    return Some((agent.id.clone(), device.id.clone()));
                }
            }
        }
        None
    }

    /// Whether the named device exists and is currently available.
    pub fn is_available(&self, agent_id: &str, device_id: &str) -> bool {
        self.agents
            .iter()
            .filter(|a| a.id == agent_id)
            .flat_map(|a| a.devices.iter())
            .any(|d| d.id == device_id && d.status == DeviceStatus::Available)
    }

    /// Mark a device busy and record the jobs bound to it.
    pub fn acquire(&mut self, device_id: &str, job_ids: Vec<String>) {
        for agent in &mut self.agents {
            if let Some(device) = agent.devices.iter_mut().find(|d| d.id == device_id) {
                device.status = DeviceStatus::Busy;
                device.current_jobs = job_ids;
                tracing::debug!(device_id, agent_id = %agent.id, "Device acquired");
                recompute_status(agent);
                return;
            }
        }
        tracing::warn!(device_id, "Acquire on unknown device");
    }

    /// Return a device to the pool and clear its job list.
    pub fn release(&mut self, device_id: &str) {
        for agent in &mut self.agents {
            if let Some(device) = agent.devices.iter_mut().find(|d| d.id == device_id) {
                device.status = DeviceStatus::Available;
                device.current_jobs.clear();
                tracing::debug!(device_id, agent_id = %agent.id, "Device released");
                recompute_status(agent);
                return;
            }
        }
        tracing::warn!(device_id, "Release on unknown device");
    }

    /// Flat snapshot of every device, in insertion order.
    pub fn devices(&self) -> Vec<DeviceSnapshot> {
        self.agents
            .iter()
            .flat_map(|agent| {
                agent.devices.iter().map(|device| DeviceSnapshot {
                    id: device.id.clone(),
                    device_type: device.target,
                    status: device.status,
                    target: device.target,
                    agent_id: device.agent_id.clone(),
                    current_jobs: device.current_jobs.clone(),
                })
            })
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn device_count(&self) -> usize {
        self.agents.iter().map(|a| a.devices.len()).sum()
    }

    /// Total number of jobs currently bound to busy devices.
    pub fn bound_job_count(&self) -> usize {
        self.agents
            .iter()
            .flat_map(|a| a.devices.iter())
            .map(|d| d.current_jobs.len())
            .sum()
    }
}

/// Agent is busy iff every owned device is busy. `Offline` is an external
/// signal and never overwritten here.
fn recompute_status(agent: &mut Agent) {
    if agent.status == AgentStatus::Offline {
        return;
    }
    let all_busy =
        !agent.devices.is_empty() && agent.devices.iter().all(|d| d.status == DeviceStatus::Busy);
    agent.status = if all_busy {
        AgentStatus::Busy
    } else {
        AgentStatus::Online
    };
}

fn device_target(device_id: &str) -> Option<Target> {
    let prefix = device_id.rsplit_once('-').map(|(p, _)| p).unwrap_or(device_id);
    prefix.parse().ok()
}
