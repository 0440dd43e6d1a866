//! Data models for the Resource Scheduler
//!
//! This file contains the data structures shared by the scheduler's queue,
//! node and policy code.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::component::ComponentError;

use super::node::{default_nodes, ResourceNode};

/// Tolerance used when comparing resource amounts
pub const RESOURCE_EPSILON: f64 = 1e-9;

/// Longest estimated duration a job may declare (ten years)
pub const MAX_JOB_DURATION_SECS: f64 = 10.0 * 365.0 * 24.0 * 3600.0;

/// Vector of resource amounts across every dimension a node offers
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceVector {
    /// CPU cores
    pub cpu_cores: f64,
    /// Memory in gigabytes
    pub memory_gb: f64,
    /// Number of GPUs
    pub gpu_count: f64,
    /// Network bandwidth in Mbps
    pub network_mbps: f64,
    /// Disk throughput in MB/s
    pub disk_io_mbps: f64,
}

impl ResourceVector {
    pub fn new(cpu_cores: f64, memory_gb: f64, gpu_count: f64, network_mbps: f64, disk_io_mbps: f64) -> Self {
        Self { cpu_cores, memory_gb, gpu_count, network_mbps, disk_io_mbps }
    }

    fn dimensions(&self) -> [f64; 5] {
        [self.cpu_cores, self.memory_gb, self.gpu_count, self.network_mbps, self.disk_io_mbps]
    }

    fn from_dimensions(d: [f64; 5]) -> Self {
        Self::new(d[0], d[1], d[2], d[3], d[4])
    }

    /// All amounts finite and non-negative
    pub fn is_valid(&self) -> bool {
        self.dimensions().iter().all(|v| v.is_finite() && *v >= 0.0)
    }

    /// True if every dimension is no larger than `other`'s
    pub fn fits_within(&self, other: &ResourceVector) -> bool {
        self.dimensions()
            .iter()
            .zip(other.dimensions().iter())
            .all(|(need, have)| *need <= *have + RESOURCE_EPSILON)
    }

    pub fn add(&self, other: &ResourceVector) -> ResourceVector {
        let (a, b) = (self.dimensions(), other.dimensions());
        Self::from_dimensions([a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3], a[4] + b[4]])
    }

    /// Component-wise subtraction clamped at zero
    pub fn saturating_sub(&self, other: &ResourceVector) -> ResourceVector {
        let (a, b) = (self.dimensions(), other.dimensions());
        let mut out = [0.0; 5];
        for i in 0..5 {
            out[i] = (a[i] - b[i]).max(0.0);
        }
        Self::from_dimensions(out)
    }

    /// Largest fraction of `total` this vector claims in any dimension
    pub fn dominant_share(&self, total: &ResourceVector) -> f64 {
        self.dimensions()
            .iter()
            .zip(total.dimensions().iter())
            .filter(|(_, t)| **t > 0.0)
            .map(|(v, t)| v / t)
            .fold(0.0, f64::max)
    }

    /// Mean fraction of `total` used, over the dimensions `total` actually has
    pub fn mean_share(&self, total: &ResourceVector) -> f64 {
        let shares: Vec<f64> = self.dimensions()
            .iter()
            .zip(total.dimensions().iter())
            .filter(|(_, t)| **t > 0.0)
            .map(|(v, t)| (v / t).min(1.0))
            .collect();

        if shares.is_empty() {
            0.0
        } else {
            shares.iter().sum::<f64>() / shares.len() as f64
        }
    }
}

/// Job priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl JobPriority {
    /// Numeric weight used for ordering
    pub fn value(&self) -> u8 {
        match self {
            JobPriority::Low => 1,
            JobPriority::Normal => 5,
            JobPriority::High => 8,
            JobPriority::Critical => 10,
        }
    }

    /// Map a numeric priority onto the nearest level at or below it
    pub fn from_value(value: u8) -> Self {
        match value {
            0..=4 => JobPriority::Low,
            5..=7 => JobPriority::Normal,
            8..=9 => JobPriority::High,
            _ => JobPriority::Critical,
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

impl FromStr for JobPriority {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(JobPriority::Low),
            "normal" | "medium" => Ok(JobPriority::Normal),
            "high" => Ok(JobPriority::High),
            "critical" => Ok(JobPriority::Critical),
            other => other
                .parse::<u8>()
                .map(JobPriority::from_value)
                .map_err(|_| ComponentError::ValidationError(format!("Unknown priority: {}", s))),
        }
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    DeadlineMissed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::DeadlineMissed => "deadline_missed",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "deadline_missed" => Ok(JobStatus::DeadlineMissed),
            _ => Err(ComponentError::ValidationError(format!("Unknown job status: {}", s))),
        }
    }
}

/// Rule used to choose which queued job runs next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingAlgorithm {
    Priority,
    FairShare,
    DeadlineAware,
    RoundRobin,
    ShortestJobFirst,
    CostOptimized,
}

impl Default for SchedulingAlgorithm {
    fn default() -> Self {
        SchedulingAlgorithm::Priority
    }
}

impl FromStr for SchedulingAlgorithm {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "priority" => Ok(SchedulingAlgorithm::Priority),
            "fair_share" => Ok(SchedulingAlgorithm::FairShare),
            "deadline_aware" | "deadline" => Ok(SchedulingAlgorithm::DeadlineAware),
            "round_robin" => Ok(SchedulingAlgorithm::RoundRobin),
            "shortest_job_first" | "sjf" => Ok(SchedulingAlgorithm::ShortestJobFirst),
            "cost_optimized" => Ok(SchedulingAlgorithm::CostOptimized),
            _ => Err(ComponentError::ValidationError(format!("Unknown scheduling algorithm: {}", s))),
        }
    }
}

/// How a node is chosen among those that can accommodate a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Pack jobs onto the node left with the least free capacity
    BestFit,
    /// Spread jobs onto the node with the most free capacity
    Spread,
}

impl Default for PlacementStrategy {
    fn default() -> Self {
        PlacementStrategy::BestFit
    }
}

/// Payload for submitting a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: String,
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub priority: JobPriority,
    #[serde(default)]
    pub requirements: ResourceVector,
    pub estimated_duration_secs: f64,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Upper bound on the estimated cost of a single attempt
    #[serde(default)]
    pub max_cost: Option<f64>,
    #[serde(default)]
    pub max_retries: u32,
}

fn default_owner() -> String {
    "default".to_string()
}

/// A job tracked by the scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Submission order, used to break ties between equal timestamps
    pub sequence: u64,
    pub name: String,
    pub owner: String,
    pub priority: JobPriority,
    pub requirements: ResourceVector,
    pub estimated_duration_secs: f64,
    pub deadline: Option<DateTime<Utc>>,
    pub max_cost: Option<f64>,
    pub max_retries: u32,
    /// Number of times the job has been started
    pub attempts: u32,
    pub status: JobStatus,
    pub assigned_node: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Accrued cost across attempts
    pub cost: f64,
    pub error: Option<String>,
}

impl Job {
    pub fn from_request(request: JobRequest, now: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sequence,
            name: request.name,
            owner: request.owner,
            priority: request.priority,
            requirements: request.requirements,
            estimated_duration_secs: request.estimated_duration_secs,
            deadline: request.deadline,
            max_cost: request.max_cost,
            max_retries: request.max_retries,
            attempts: 0,
            status: JobStatus::Pending,
            assigned_node: None,
            submitted_at: now,
            started_at: None,
            completed_at: None,
            cost: 0.0,
            error: None,
        }
    }

    /// Time at which the current attempt is expected to finish
    ///
    /// `None` when the job has not started or the end is past the range of
    /// `DateTime`, so such a job is never due.
    pub fn expected_completion(&self) -> Option<DateTime<Utc>> {
        let start = self.started_at?;
        start.checked_add_signed(duration_from_secs(self.estimated_duration_secs)?)
    }
}

/// Convert fractional seconds into a chrono duration, `None` when out of range
pub fn duration_from_secs(secs: f64) -> Option<chrono::Duration> {
    let millis = (secs * 1000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    chrono::Duration::try_milliseconds(millis as i64)
}

/// Result reported by a job executor
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success,
    Failure(String),
}

/// Node-level view used in statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStats {
    pub node_id: String,
    pub online: bool,
    pub utilization: f64,
    pub running_jobs: usize,
    pub available: ResourceVector,
}

/// Aggregate scheduler statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub algorithm: SchedulingAlgorithm,
    pub jobs_by_status: HashMap<String, u64>,
    pub queue_depth: usize,
    pub running: usize,
    pub total_submitted: u64,
    pub avg_wait_secs: f64,
    pub avg_turnaround_secs: f64,
    /// Share of finished jobs with a deadline that completed on time
    pub on_time_rate: Option<f64>,
    pub total_cost: f64,
    pub node_stats: Vec<NodeStats>,
    pub owner_usage: HashMap<String, f64>,
}

/// Scheduler configuration, passed in through `ComponentConfig.parameters`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub algorithm: SchedulingAlgorithm,
    pub placement: PlacementStrategy,
    /// Maximum number of pending jobs
    pub max_queue_size: usize,
    /// Interval of the background scheduling loop
    pub tick_interval_ms: u64,
    /// Probability that the simulated executor fails an attempt
    pub failure_rate: f64,
    /// Number of finished jobs kept for inspection
    pub history_limit: usize,
    pub nodes: Vec<ResourceNode>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            algorithm: SchedulingAlgorithm::Priority,
            placement: PlacementStrategy::BestFit,
            max_queue_size: 10_000,
            tick_interval_ms: 1000,
            failure_rate: 0.0,
            history_limit: 1000,
            nodes: default_nodes(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ComponentError> {
        if self.max_queue_size == 0 {
            return Err(ComponentError::ValidationError("max_queue_size must be positive".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ComponentError::ValidationError("tick_interval_ms must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ComponentError::ValidationError("failure_rate must be between 0 and 1".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(ComponentError::ValidationError(format!("Duplicate node id: {}", node.id)));
            }
            if !node.capacity.is_valid() || node.cost_per_hour < 0.0 {
                return Err(ComponentError::ValidationError(format!("Invalid capacity or cost for node {}", node.id)));
            }
        }

        Ok(())
    }
}
