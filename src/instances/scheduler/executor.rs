//! Job execution seam
//!
//! The scheduler only decides where and when jobs run. Whether an attempt
//! succeeds is reported by a `JobExecutor`.

use super::models::{Job, JobOutcome};
use super::node::ResourceNode;

/// Decides the outcome of a job attempt once its run time has elapsed
#[cfg_attr(test, mockall::automock)]
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &Job, node: &ResourceNode) -> JobOutcome;
}

/// Executor for simulated nodes: fails attempts at a fixed rate
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    failure_rate: f64,
}

impl SimulatedExecutor {
    pub fn new(failure_rate: f64) -> Self {
        Self { failure_rate: failure_rate.clamp(0.0, 1.0) }
    }
}

impl JobExecutor for SimulatedExecutor {
    fn execute(&self, job: &Job, node: &ResourceNode) -> JobOutcome {
        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            JobOutcome::Failure(format!("Simulated failure of {} on node {}", job.name, node.id))
        } else {
            JobOutcome::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::instances::scheduler::models::{JobRequest, ResourceVector};

    fn sample_job() -> Job {
        let request = JobRequest {
            name: "sample".to_string(),
            owner: "tests".to_string(),
            priority: Default::default(),
            requirements: ResourceVector::default(),
            estimated_duration_secs: 1.0,
            deadline: None,
            max_cost: None,
            max_retries: 0,
        };
        Job::from_request(request, Utc::now(), 0)
    }

    #[test]
    fn test_simulated_executor_extremes() {
        let node = ResourceNode::new("n", "n", ResourceVector::new(1.0, 1.0, 0.0, 0.0, 0.0), 0.0);
        let job = sample_job();

        assert_eq!(SimulatedExecutor::new(0.0).execute(&job, &node), JobOutcome::Success);
        assert!(matches!(SimulatedExecutor::new(1.0).execute(&job, &node), JobOutcome::Failure(_)));
    }
}
