//! Resource Scheduler
//!
//! Queues jobs with multi-dimensional resource requirements and places them
//! on simulated nodes. The ordering of the queue is pluggable (priority,
//! fair share, deadline, round robin, shortest job, cost), node choice
//! supports best-fit packing or spreading, and job outcomes come from a
//! `JobExecutor`.

pub mod executor;
pub mod instance;
pub mod models;
pub mod node;
pub mod policy;
pub mod queue;

pub use executor::{JobExecutor, SimulatedExecutor};
pub use instance::ResourceSchedulerInstance;
pub use models::{
    Job, JobPriority, JobRequest, JobStatus, PlacementStrategy, ResourceVector, SchedulerConfig,
    SchedulerStats, SchedulingAlgorithm,
};
pub use node::ResourceNode;
