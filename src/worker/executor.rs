use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::Result;
use crate::scheduler::job::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    Pass,
    Fail,
}

/// Result of running one test job on a device.
#[derive(Debug, Clone)]
pub struct TestReport {
    pub outcome: TestOutcome,
    pub message: String,
    pub duration: Duration,
}

/// Injected collaborator that actually drives the test on a device.
///
/// Implementations may block for the test duration but must never touch
/// the job store; the scheduler owns all state transitions.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn run(&self, job: &Job) -> Result<TestReport>;
}

/// Stand-in executor used in tests and standalone mode: sleeps a uniform
/// random time in the configured range and passes with the configured
/// probability.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    min_latency_ms: u64,
    max_latency_ms: u64,
    pass_rate: f64,
}

impl SimulatedExecutor {
    pub fn new(min_latency_ms: u64, max_latency_ms: u64, pass_rate: f64) -> Self {
        Self {
            min_latency_ms,
            max_latency_ms,
            pass_rate,
        }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(1000, 5000, 0.9)
    }
}

#[async_trait]
impl TestExecutor for SimulatedExecutor {
    async fn run(&self, job: &Job) -> Result<TestReport> {
        // Decide before sleeping so the RNG is not held across the await.
        let (delay_ms, passed) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.min_latency_ms..=self.max_latency_ms),
                rng.gen_bool(self.pass_rate),
            )
        };
        tracing::info!(
            job_id = %job.job_id,
            test_path = %job.test_path,
            device_id = ?job.device_id,
            "Executing test"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let (outcome, message) = if passed {
            (
                TestOutcome::Pass,
                format!("{} passed in {}ms", job.test_path, delay_ms),
            )
        } else {
            (
                TestOutcome::Fail,
                format!("{} failed after {}ms: assertion did not hold", job.test_path, delay_ms),
            )
        };
        Ok(TestReport {
            outcome,
            message,
            duration: Duration::from_millis(delay_ms),
        })
    }
}
