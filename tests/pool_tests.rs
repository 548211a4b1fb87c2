use fleetrun::config::DEFAULT_POOL_SPEC;
use fleetrun::scheduler::job::Target;
use fleetrun::scheduler::pool::DeviceStatus;
use fleetrun::scheduler::ResourcePool;

#[test]
fn test_default_spec_seeds_five_agents_fifteen_devices() {
    let pool = ResourcePool::from_spec(DEFAULT_POOL_SPEC);
    assert_eq!(pool.agent_count(), 5);
    assert_eq!(pool.device_count(), 15);
}

#[test]
fn test_find_available_uses_insertion_order() {
    let pool = ResourcePool::from_spec(DEFAULT_POOL_SPEC);

    let (agent, device) = pool.find_available(Target::Emulator).unwrap();
    assert_eq!(agent, "agent-1");
    assert_eq!(device, "emulator-1");

    // agent-1 has no browserstack device; first match is on agent-2.
    let (agent, device) = pool.find_available(Target::Browserstack).unwrap();
    assert_eq!(agent, "agent-2");
    assert_eq!(device, "browserstack-1");
}

#[test]
fn test_acquire_skips_to_next_matching_device() {
    let mut pool = ResourcePool::from_spec(DEFAULT_POOL_SPEC);

    pool.acquire("emulator-1", vec!["job_1_00000001".to_string()]);
    let (agent, device) = pool.find_available(Target::Emulator).unwrap();
    assert_eq!(agent, "agent-1");
    assert_eq!(device, "device-1");

    // Physical device targets never match an emulator slot.
    pool.acquire("device-1", vec!["job_2_00000002".to_string()]);
    let (agent, device) = pool.find_available(Target::Emulator).unwrap();
    assert_eq!(agent, "agent-2");
    assert_eq!(device, "emulator-2");
}

#[test]
fn test_release_restores_availability() {
    let mut pool = ResourcePool::from_spec(DEFAULT_POOL_SPEC);

    pool.acquire("emulator-1", vec!["job_1_00000001".to_string()]);
    pool.release("emulator-1");

    let (agent, device) = pool.find_available(Target::Emulator).unwrap();
    assert_eq!(agent, "agent-1");
    assert_eq!(device, "emulator-1");

    let snapshot = pool.devices();
    let emulator_1 = snapshot.iter().find(|d| d.id == "emulator-1").unwrap();
    assert!(emulator_1.current_jobs.is_empty());
}

#[test]
fn test_exhausted_target_has_no_capacity() {
    let mut pool = ResourcePool::from_spec("agent-1:browserstack-1;agent-2:browserstack-2");

    pool.acquire("browserstack-1", vec![]);
    pool.acquire("browserstack-2", vec![]);

    assert!(pool.find_available(Target::Browserstack).is_none());
    assert!(pool.find_available(Target::Emulator).is_none());
}

#[test]
fn test_is_available_tracks_device_state() {
    let mut pool = ResourcePool::from_spec(DEFAULT_POOL_SPEC);

    assert!(pool.is_available("agent-1", "emulator-1"));
    pool.acquire("emulator-1", vec![]);
    assert!(!pool.is_available("agent-1", "emulator-1"));
    // Wrong agent for the device is not a match either.
    assert!(!pool.is_available("agent-2", "emulator-1"));
}

#[test]
fn test_devices_snapshot_shape() {
    let mut pool = ResourcePool::from_spec(DEFAULT_POOL_SPEC);
    pool.acquire("browserstack-1", vec!["job_1_00000001".to_string()]);

    let snapshot = pool.devices();
    assert_eq!(snapshot.len(), 15);

    let busy = snapshot.iter().find(|d| d.id == "browserstack-1").unwrap();
    assert_eq!(busy.status, DeviceStatus::Busy);
    assert_eq!(busy.target, Target::Browserstack);
    assert_eq!(busy.device_type, Target::Browserstack);
    assert_eq!(busy.agent_id, "agent-2");
    assert_eq!(busy.current_jobs, vec!["job_1_00000001".to_string()]);
}

#[test]
fn test_malformed_spec_entries_are_skipped() {
    let pool = ResourcePool::from_spec("agent-1:emulator-1;garbage;agent-2:floppy-1,device-9");

    // "garbage" has no device list; "floppy-1" has an unknown target prefix.
    assert_eq!(pool.agent_count(), 2);
    assert_eq!(pool.device_count(), 2);
    assert!(pool.find_available(Target::Device).is_some());
}
