//! Job queue and placement for the Resource Scheduler
//!
//! `SchedulerState` owns the nodes and every job. All operations take the
//! current time as an argument so the component's background loop and the
//! tests drive the same code.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::core::component::ComponentError;
use crate::core::metrics::{JOBS_FINISHED, JOBS_SUBMITTED, QUEUE_DEPTH, RUNNING_JOBS};

use super::executor::JobExecutor;
use super::models::*;
use super::node::ResourceNode;
use super::policy::{order_jobs, PolicyContext};

/// Placements and completions produced by one scheduling pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    /// Jobs whose attempt finished during this pass
    pub finished: Vec<String>,
    /// `(job_id, node_id)` pairs placed during this pass
    pub placed: Vec<(String, String)>,
}

/// Serializable snapshot used for export/import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub algorithm: SchedulingAlgorithm,
    pub nodes: Vec<ResourceNode>,
    pub active: Vec<Job>,
    pub history: Vec<Job>,
    pub owner_usage: HashMap<String, f64>,
    pub next_sequence: u64,
    pub total_submitted: u64,
}

/// Running totals kept outside the bounded history
#[derive(Debug, Clone, Default)]
struct Counters {
    by_status: HashMap<JobStatus, u64>,
    wait_secs_total: f64,
    wait_samples: u64,
    turnaround_secs_total: f64,
    turnaround_samples: u64,
    deadline_jobs: u64,
    deadline_met: u64,
    total_cost: f64,
}

pub struct SchedulerState {
    config: SchedulerConfig,
    algorithm: SchedulingAlgorithm,
    nodes: Vec<ResourceNode>,
    /// Pending and running jobs
    active: HashMap<String, Job>,
    /// Finished jobs, oldest first
    history: VecDeque<Job>,
    owner_usage: HashMap<String, f64>,
    last_served_owner: Option<String>,
    next_sequence: u64,
    total_submitted: u64,
    counters: Counters,
    executor: Arc<dyn JobExecutor>,
}

impl fmt::Debug for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerState")
            .field("algorithm", &self.algorithm)
            .field("nodes", &self.nodes.len())
            .field("active", &self.active.len())
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl SchedulerState {
    pub fn new(config: SchedulerConfig, executor: Arc<dyn JobExecutor>) -> Self {
        let nodes = config.nodes.iter().cloned().map(fresh_node).collect();
        Self {
            algorithm: config.algorithm,
            nodes,
            active: HashMap::new(),
            history: VecDeque::new(),
            owner_usage: HashMap::new(),
            last_served_owner: None,
            next_sequence: 0,
            total_submitted: 0,
            counters: Counters::default(),
            executor,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn algorithm(&self) -> SchedulingAlgorithm {
        self.algorithm
    }

    pub fn set_algorithm(&mut self, algorithm: SchedulingAlgorithm) {
        if self.algorithm != algorithm {
            info!("Scheduling algorithm changed from {:?} to {:?}", self.algorithm, algorithm);
            self.algorithm = algorithm;
        }
    }

    pub fn set_executor(&mut self, executor: Arc<dyn JobExecutor>) {
        self.executor = executor;
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn add_node(&mut self, node: ResourceNode) -> Result<(), ComponentError> {
        if node.id.trim().is_empty() {
            return Err(ComponentError::ValidationError("Node id must not be empty".to_string()));
        }
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(ComponentError::ValidationError(format!("Node already exists: {}", node.id)));
        }
        if !node.capacity.is_valid() || !node.cost_per_hour.is_finite() || node.cost_per_hour < 0.0 {
            return Err(ComponentError::ValidationError(format!(
                "Invalid capacity or cost for node {}", node.id
            )));
        }

        info!("Added node {} ({})", node.id, node.name);
        self.nodes.push(fresh_node(node));
        Ok(())
    }

    pub fn remove_node(&mut self, node_id: &str) -> Result<ResourceNode, ComponentError> {
        let idx = self.node_index(node_id)?;
        if !self.nodes[idx].running_jobs.is_empty() {
            return Err(ComponentError::InvalidStateError(format!(
                "Node {} still runs {} job(s)", node_id, self.nodes[idx].running_jobs.len()
            )));
        }

        info!("Removed node {}", node_id);
        Ok(self.nodes.remove(idx))
    }

    pub fn set_node_online(&mut self, node_id: &str, online: bool) -> Result<(), ComponentError> {
        let idx = self.node_index(node_id)?;
        self.nodes[idx].online = online;
        info!("Node {} is now {}", node_id, if online { "online" } else { "offline" });
        Ok(())
    }

    fn node_index(&self, node_id: &str) -> Result<usize, ComponentError> {
        self.nodes
            .iter()
            .position(|n| n.id == node_id)
            .ok_or_else(|| ComponentError::NotFound(format!("Node {}", node_id)))
    }

    pub fn pending_count(&self) -> usize {
        self.active.values().filter(|j| j.status == JobStatus::Pending).count()
    }

    pub fn running_count(&self) -> usize {
        self.active.values().filter(|j| j.status == JobStatus::Running).count()
    }

    /// Validate and enqueue a job, returning its id
    pub fn submit_job(&mut self, request: JobRequest, now: DateTime<Utc>) -> Result<String, ComponentError> {
        if request.name.trim().is_empty() {
            return Err(ComponentError::ValidationError("Job name must not be empty".to_string()));
        }
        if !request.requirements.is_valid() {
            return Err(ComponentError::ValidationError(format!(
                "Invalid resource requirements for job {}", request.name
            )));
        }
        if !request.estimated_duration_secs.is_finite() || request.estimated_duration_secs <= 0.0 {
            return Err(ComponentError::ValidationError(format!(
                "Estimated duration of job {} must be positive", request.name
            )));
        }
        if request.estimated_duration_secs > MAX_JOB_DURATION_SECS {
            return Err(ComponentError::ValidationError(format!(
                "Estimated duration of job {} exceeds {} seconds", request.name, MAX_JOB_DURATION_SECS
            )));
        }
        if let Some(max_cost) = request.max_cost {
            if !max_cost.is_finite() || max_cost < 0.0 {
                return Err(ComponentError::ValidationError(format!(
                    "max_cost of job {} must be non-negative", request.name
                )));
            }
        }
        if !self.nodes.iter().any(|n| n.could_ever_fit(&request.requirements)) {
            return Err(ComponentError::ResourceError(format!(
                "Job {} is unschedulable: no node has enough capacity", request.name
            )));
        }
        if self.pending_count() >= self.config.max_queue_size {
            return Err(ComponentError::ResourceError(format!(
                "Queue is full ({} pending jobs)", self.config.max_queue_size
            )));
        }

        let job = Job::from_request(request, now, self.next_sequence);
        self.next_sequence += 1;
        self.total_submitted += 1;
        JOBS_SUBMITTED.inc();

        debug!("Submitted job {} ({}) for {} at {:?}", job.id, job.name, job.owner, job.priority);
        let id = job.id.clone();
        self.active.insert(id.clone(), job);
        self.refresh_gauges();
        Ok(id)
    }

    /// Cancel a pending or running job
    pub fn cancel_job(&mut self, job_id: &str, now: DateTime<Utc>) -> Result<Job, ComponentError> {
        let mut job = match self.active.remove(job_id) {
            Some(job) => job,
            None if self.history.iter().any(|j| j.id == job_id) => {
                return Err(ComponentError::InvalidStateError(format!(
                    "Job {} has already finished", job_id
                )));
            }
            None => return Err(ComponentError::NotFound(format!("Job {}", job_id))),
        };

        if job.status == JobStatus::Running {
            self.release_job(&job);
        }

        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        info!("Cancelled job {} ({})", job.id, job.name);

        let snapshot = job.clone();
        self.finalize(job);
        Ok(snapshot)
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.active
            .get(job_id)
            .or_else(|| self.history.iter().rev().find(|j| j.id == job_id))
            .cloned()
    }

    /// Known jobs in submission order, optionally filtered by status
    pub fn list_jobs(&self, status: Option<JobStatus>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.active
            .values()
            .chain(self.history.iter())
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.sequence);
        jobs
    }

    /// Pending job ids in the order the active algorithm would try them
    pub fn queue_snapshot(&self) -> Vec<String> {
        self.ordered_pending().into_iter().map(|j| j.id.clone()).collect()
    }

    fn ordered_pending(&self) -> Vec<&Job> {
        let pending: Vec<&Job> = self.active
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .collect();
        let ctx = PolicyContext {
            owner_usage: &self.owner_usage,
            last_served_owner: self.last_served_owner.as_deref(),
            nodes: &self.nodes,
        };
        order_jobs(self.algorithm, pending, &ctx)
    }

    /// Expire overdue jobs, then place as many pending jobs as fit
    pub fn schedule_pending_at(&mut self, now: DateTime<Utc>) -> Result<Vec<(String, String)>, ComponentError> {
        self.expire_overdue(now);

        let order = self.queue_snapshot();
        let mut placements = Vec::new();

        for job_id in order {
            let Some(job) = self.active.get(&job_id) else { continue };
            let Some(node_idx) = self.choose_node(job) else {
                debug!("No node can take job {} right now", job_id);
                continue;
            };

            let requirements = job.requirements;
            self.nodes[node_idx].allocate(&job_id, &requirements)?;
            let node_id = self.nodes[node_idx].id.clone();

            let Some(job) = self.active.get_mut(&job_id) else { continue };
            job.status = JobStatus::Running;
            job.started_at = Some(now);
            job.assigned_node = Some(node_id.clone());
            job.attempts += 1;
            if job.attempts == 1 {
                let wait = (now - job.submitted_at).num_milliseconds().max(0) as f64 / 1000.0;
                self.counters.wait_secs_total += wait;
                self.counters.wait_samples += 1;
            }
            self.last_served_owner = Some(job.owner.clone());

            debug!("Placed job {} on node {} (attempt {})", job_id, node_id, job.attempts);
            placements.push((job_id, node_id));
        }

        self.refresh_gauges();
        Ok(placements)
    }

    fn expire_overdue(&mut self, now: DateTime<Utc>) {
        let deadline_aware = self.algorithm == SchedulingAlgorithm::DeadlineAware;
        let mut overdue: Vec<&Job> = self.active
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .filter(|j| match j.deadline {
                Some(deadline) if deadline < now => true,
                Some(deadline) if deadline_aware => duration_from_secs(j.estimated_duration_secs)
                    .and_then(|d| now.checked_add_signed(d))
                    .map_or(true, |end| end > deadline),
                _ => false,
            })
            .collect();
        overdue.sort_by_key(|j| j.sequence);
        let overdue: Vec<String> = overdue.into_iter().map(|j| j.id.clone()).collect();

        for job_id in overdue {
            if let Some(mut job) = self.active.remove(&job_id) {
                warn!("Job {} ({}) cannot meet its deadline", job.id, job.name);
                job.status = JobStatus::DeadlineMissed;
                job.completed_at = Some(now);
                job.error = Some("Deadline cannot be met".to_string());
                self.finalize(job);
            }
        }
    }

    fn choose_node(&self, job: &Job) -> Option<usize> {
        let candidates = self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.can_accommodate(&job.requirements))
            .filter(|(_, n)| {
                job.max_cost
                    .map_or(true, |budget| n.estimated_cost(job.estimated_duration_secs) <= budget + RESOURCE_EPSILON)
            });

        if self.algorithm == SchedulingAlgorithm::CostOptimized {
            candidates
                .min_by(|(_, a), (_, b)| {
                    a.cost_per_hour
                        .partial_cmp(&b.cost_per_hour)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.id.cmp(&b.id))
                })
                .map(|(idx, _)| idx)
        } else {
            let strategy = self.config.placement;
            candidates
                .max_by(|(_, a), (_, b)| {
                    a.placement_score(&job.requirements, strategy)
                        .partial_cmp(&b.placement_score(&job.requirements, strategy))
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.id.cmp(&a.id))
                })
                .map(|(idx, _)| idx)
        }
    }

    /// Finish every running attempt whose estimated duration has elapsed
    pub fn advance_at(&mut self, now: DateTime<Utc>) -> Result<Vec<String>, ComponentError> {
        let mut due: Vec<&Job> = self.active
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .filter(|j| j.expected_completion().map_or(false, |end| end <= now))
            .collect();
        due.sort_by_key(|j| j.sequence);
        let due: Vec<String> = due.into_iter().map(|j| j.id.clone()).collect();

        let mut finished = Vec::with_capacity(due.len());
        for job_id in due {
            let outcome = {
                let job = self.active.get(&job_id).ok_or_else(|| ComponentError::NotFound(format!("Job {}", job_id)))?;
                let node_id = job.assigned_node.as_deref().unwrap_or_default();
                let node = self.nodes.iter().find(|n| n.id == node_id).ok_or_else(|| {
                    ComponentError::InvalidStateError(format!("Job {} runs on unknown node {}", job_id, node_id))
                })?;
                self.executor.execute(job, node)
            };
            self.finish_attempt(&job_id, outcome, now)?;
            finished.push(job_id);
        }

        self.refresh_gauges();
        Ok(finished)
    }

    /// Report the outcome of a running job immediately
    pub fn complete_job(
        &mut self,
        job_id: &str,
        success: bool,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Job, ComponentError> {
        match self.active.get(job_id) {
            Some(job) if job.status == JobStatus::Running => {}
            Some(job) => {
                return Err(ComponentError::InvalidStateError(format!(
                    "Job {} is {}, not running", job_id, job.status
                )));
            }
            None if self.history.iter().any(|j| j.id == job_id) => {
                return Err(ComponentError::InvalidStateError(format!(
                    "Job {} has already finished", job_id
                )));
            }
            None => return Err(ComponentError::NotFound(format!("Job {}", job_id))),
        }

        let outcome = if success {
            JobOutcome::Success
        } else {
            JobOutcome::Failure(reason.unwrap_or_else(|| "Reported as failed".to_string()))
        };
        self.finish_attempt(job_id, outcome, now)?;
        self.refresh_gauges();

        self.get_job(job_id).ok_or_else(|| ComponentError::NotFound(format!("Job {}", job_id)))
    }

    /// One scheduling pass: finish due attempts, then place pending jobs
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Result<TickReport, ComponentError> {
        let finished = self.advance_at(now)?;
        let placed = self.schedule_pending_at(now)?;
        Ok(TickReport { finished, placed })
    }

    fn finish_attempt(&mut self, job_id: &str, outcome: JobOutcome, now: DateTime<Utc>) -> Result<(), ComponentError> {
        let mut job = self.active
            .remove(job_id)
            .ok_or_else(|| ComponentError::NotFound(format!("Job {}", job_id)))?;

        let runtime_secs = job.started_at
            .map(|start| (now - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);

        if let Some(node) = job.assigned_node.as_deref().and_then(|id| self.nodes.iter().find(|n| n.id == id)) {
            let share = job.requirements.dominant_share(&node.capacity);
            *self.owner_usage.entry(job.owner.clone()).or_insert(0.0) += share * runtime_secs;

            let attempt_cost = node.estimated_cost(runtime_secs);
            job.cost += attempt_cost;
            self.counters.total_cost += attempt_cost;
        }
        self.release_job(&job);

        match outcome {
            JobOutcome::Success => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(now);
                job.error = None;
                debug!("Job {} completed after {} attempt(s)", job.id, job.attempts);
                self.finalize(job);
            }
            JobOutcome::Failure(reason) if job.attempts <= job.max_retries => {
                warn!("Job {} failed ({}), retrying ({}/{})", job.id, reason, job.attempts, job.max_retries);
                job.status = JobStatus::Pending;
                job.assigned_node = None;
                job.started_at = None;
                job.error = Some(reason);
                self.active.insert(job.id.clone(), job);
            }
            JobOutcome::Failure(reason) => {
                warn!("Job {} failed permanently: {}", job.id, reason);
                job.status = JobStatus::Failed;
                job.completed_at = Some(now);
                job.error = Some(reason);
                self.finalize(job);
            }
        }

        Ok(())
    }

    fn release_job(&mut self, job: &Job) {
        if let Some(node_id) = job.assigned_node.as_deref() {
            if let Some(node) = self.nodes.iter_mut().find(|n| n.id == node_id) {
                node.release(&job.id, &job.requirements);
            }
        }
    }

    /// Record a terminal job in the counters and the bounded history
    fn finalize(&mut self, job: Job) {
        *self.counters.by_status.entry(job.status).or_insert(0) += 1;
        JOBS_FINISHED.with_label_values(&[job.status.as_str()]).inc();

        if let (Some(_), Some(completed)) = (job.started_at, job.completed_at) {
            let turnaround = (completed - job.submitted_at).num_milliseconds().max(0) as f64 / 1000.0;
            self.counters.turnaround_secs_total += turnaround;
            self.counters.turnaround_samples += 1;
        }

        if let Some(deadline) = job.deadline {
            if job.status != JobStatus::Cancelled {
                self.counters.deadline_jobs += 1;
                let on_time = job.status == JobStatus::Completed
                    && job.completed_at.map_or(false, |done| done <= deadline);
                if on_time {
                    self.counters.deadline_met += 1;
                }
            }
        }

        self.history.push_back(job);
        while self.history.len() > self.config.history_limit {
            self.history.pop_front();
        }
        self.refresh_gauges();
    }

    fn refresh_gauges(&self) {
        QUEUE_DEPTH.set(self.pending_count() as i64);
        RUNNING_JOBS.set(self.running_count() as i64);
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut jobs_by_status: HashMap<String, u64> = self.counters.by_status
            .iter()
            .map(|(status, count)| (status.to_string(), *count))
            .collect();
        jobs_by_status.insert(JobStatus::Pending.to_string(), self.pending_count() as u64);
        jobs_by_status.insert(JobStatus::Running.to_string(), self.running_count() as u64);

        SchedulerStats {
            algorithm: self.algorithm,
            jobs_by_status,
            queue_depth: self.pending_count(),
            running: self.running_count(),
            total_submitted: self.total_submitted,
            avg_wait_secs: average(self.counters.wait_secs_total, self.counters.wait_samples),
            avg_turnaround_secs: average(self.counters.turnaround_secs_total, self.counters.turnaround_samples),
            on_time_rate: if self.counters.deadline_jobs > 0 {
                Some(self.counters.deadline_met as f64 / self.counters.deadline_jobs as f64)
            } else {
                None
            },
            total_cost: self.counters.total_cost,
            node_stats: self.nodes.iter().map(ResourceNode::stats).collect(),
            owner_usage: self.owner_usage.clone(),
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let mut active: Vec<Job> = self.active.values().cloned().collect();
        active.sort_by_key(|j| j.sequence);

        SchedulerSnapshot {
            algorithm: self.algorithm,
            nodes: self.nodes.clone(),
            active,
            history: self.history.iter().cloned().collect(),
            owner_usage: self.owner_usage.clone(),
            next_sequence: self.next_sequence,
            total_submitted: self.total_submitted,
        }
    }

    /// Replace all jobs and nodes with a previously exported snapshot
    pub fn restore(&mut self, snapshot: SchedulerSnapshot) -> Result<(), ComponentError> {
        for job in &snapshot.active {
            if job.status.is_terminal() {
                return Err(ComponentError::ValidationError(format!(
                    "Snapshot lists finished job {} as active", job.id
                )));
            }
            if job.status == JobStatus::Running {
                let node_id = job.assigned_node.as_deref().unwrap_or_default();
                let known = snapshot.nodes.iter().any(|n| n.id == node_id && n.running_jobs.contains(&job.id));
                if !known {
                    return Err(ComponentError::ValidationError(format!(
                        "Running job {} is not registered on node {}", job.id, node_id
                    )));
                }
            }
        }

        self.algorithm = snapshot.algorithm;
        self.nodes = snapshot.nodes;
        self.active = snapshot.active.into_iter().map(|j| (j.id.clone(), j)).collect();
        self.history = snapshot.history.into_iter().collect();
        self.owner_usage = snapshot.owner_usage;
        self.next_sequence = snapshot.next_sequence;
        self.total_submitted = snapshot.total_submitted;
        self.last_served_owner = None;
        self.refresh_gauges();

        info!("Restored scheduler state: {} nodes, {} active jobs", self.nodes.len(), self.active.len());
        Ok(())
    }
}

/// A configured node always starts empty
fn fresh_node(mut node: ResourceNode) -> ResourceNode {
    node.allocated = ResourceVector::default();
    node.running_jobs.clear();
    node
}

fn average(total: f64, samples: u64) -> f64 {
    if samples > 0 {
        total / samples as f64
    } else {
        0.0
    }
}
