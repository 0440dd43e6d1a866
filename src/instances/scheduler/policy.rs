//! Scheduling policies
//!
//! Each algorithm turns the set of pending jobs into the order in which the
//! scheduler tries to place them. Placement itself (which node) lives in
//! `queue.rs`; the only node knowledge needed here is cost, for the
//! cost-optimized ordering.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};

use super::models::{Job, SchedulingAlgorithm};
use super::node::ResourceNode;

/// State the policies read when ordering the queue
pub struct PolicyContext<'a> {
    /// Accumulated usage per owner, in dominant-share seconds
    pub owner_usage: &'a HashMap<String, f64>,
    /// Owner that received the last round-robin placement
    pub last_served_owner: Option<&'a str>,
    pub nodes: &'a [ResourceNode],
}

/// Order pending jobs for placement under `algorithm`
pub fn order_jobs<'a>(
    algorithm: SchedulingAlgorithm,
    mut jobs: Vec<&'a Job>,
    ctx: &PolicyContext<'_>,
) -> Vec<&'a Job> {
    match algorithm {
        SchedulingAlgorithm::Priority => {
            jobs.sort_by(|a, b| by_priority(a, b).then_with(|| by_submission(a, b)));
            jobs
        }
        SchedulingAlgorithm::FairShare => {
            jobs.sort_by(|a, b| {
                let ua = ctx.owner_usage.get(&a.owner).copied().unwrap_or(0.0);
                let ub = ctx.owner_usage.get(&b.owner).copied().unwrap_or(0.0);
                ua.partial_cmp(&ub)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| by_priority(a, b))
                    .then_with(|| by_submission(a, b))
            });
            jobs
        }
        SchedulingAlgorithm::DeadlineAware => {
            jobs.sort_by(|a, b| {
                let deadline_order = match (a.deadline, b.deadline) {
                    (Some(da), Some(db)) => da.cmp(&db),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                deadline_order
                    .then_with(|| by_priority(a, b))
                    .then_with(|| by_submission(a, b))
            });
            jobs
        }
        SchedulingAlgorithm::RoundRobin => round_robin(jobs, ctx.last_served_owner),
        SchedulingAlgorithm::ShortestJobFirst => {
            jobs.sort_by(|a, b| {
                a.estimated_duration_secs
                    .partial_cmp(&b.estimated_duration_secs)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| by_submission(a, b))
            });
            jobs
        }
        SchedulingAlgorithm::CostOptimized => {
            jobs.sort_by(|a, b| {
                let ca = cheapest_feasible_cost(a, ctx.nodes);
                let cb = cheapest_feasible_cost(b, ctx.nodes);
                ca.partial_cmp(&cb)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| by_priority(a, b))
                    .then_with(|| by_submission(a, b))
            });
            jobs
        }
    }
}

/// Lowest cost of one attempt over online nodes whose capacity could hold the job
pub fn cheapest_feasible_cost(job: &Job, nodes: &[ResourceNode]) -> f64 {
    nodes
        .iter()
        .filter(|n| n.online && n.could_ever_fit(&job.requirements))
        .map(|n| n.estimated_cost(job.estimated_duration_secs))
        .fold(f64::INFINITY, f64::min)
}

fn by_priority(a: &Job, b: &Job) -> Ordering {
    b.priority.cmp(&a.priority)
}

fn by_submission(a: &Job, b: &Job) -> Ordering {
    a.submitted_at
        .cmp(&b.submitted_at)
        .then_with(|| a.sequence.cmp(&b.sequence))
}

/// Interleave owners in name order, starting after the last owner served
fn round_robin<'a>(jobs: Vec<&'a Job>, last_served: Option<&str>) -> Vec<&'a Job> {
    let mut by_owner: BTreeMap<&str, Vec<&'a Job>> = BTreeMap::new();
    for job in jobs {
        by_owner.entry(job.owner.as_str()).or_default().push(job);
    }

    let mut owners: Vec<&str> = by_owner.keys().copied().collect();
    if let Some(last) = last_served {
        let start = owners.iter().position(|o| *o > last).unwrap_or(0);
        owners.rotate_left(start);
    }

    let mut queues: Vec<VecDeque<&'a Job>> = owners
        .iter()
        .map(|owner| {
            let mut owned = by_owner.remove(owner).unwrap_or_default();
            owned.sort_by(|a, b| by_submission(a, b));
            VecDeque::from(owned)
        })
        .collect();

    let total: usize = queues.iter().map(|q| q.len()).sum();
    let mut ordered = Vec::with_capacity(total);
    while ordered.len() < total {
        for queue in queues.iter_mut() {
            if let Some(job) = queue.pop_front() {
                ordered.push(job);
            }
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::instances::scheduler::models::{JobPriority, JobRequest, ResourceVector};

    fn job(seq: u64, owner: &str, priority: JobPriority, duration: f64) -> Job {
        let request = JobRequest {
            name: format!("job-{}", seq),
            owner: owner.to_string(),
            priority,
            requirements: ResourceVector::new(1.0, 1.0, 0.0, 0.0, 0.0),
            estimated_duration_secs: duration,
            deadline: None,
            max_cost: None,
            max_retries: 0,
        };
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Job::from_request(request, base + Duration::seconds(seq as i64), seq)
    }

    fn names(jobs: &[&Job]) -> Vec<String> {
        jobs.iter().map(|j| j.name.clone()).collect()
    }

    fn ctx<'a>(usage: &'a HashMap<String, f64>, last: Option<&'a str>, nodes: &'a [ResourceNode]) -> PolicyContext<'a> {
        PolicyContext { owner_usage: usage, last_served_owner: last, nodes }
    }

    #[test]
    fn test_priority_then_fifo() {
        let jobs = vec![
            job(1, "a", JobPriority::Normal, 10.0),
            job(2, "a", JobPriority::Critical, 10.0),
            job(3, "a", JobPriority::Normal, 10.0),
        ];
        let usage = HashMap::new();
        let ordered = order_jobs(SchedulingAlgorithm::Priority, jobs.iter().collect(), &ctx(&usage, None, &[]));
        assert_eq!(names(&ordered), vec!["job-2", "job-1", "job-3"]);
    }

    #[test]
    fn test_fair_share_prefers_light_owner() {
        let jobs = vec![
            job(1, "heavy", JobPriority::Critical, 10.0),
            job(2, "light", JobPriority::Low, 10.0),
        ];
        let usage = HashMap::from([("heavy".to_string(), 500.0), ("light".to_string(), 1.0)]);
        let ordered = order_jobs(SchedulingAlgorithm::FairShare, jobs.iter().collect(), &ctx(&usage, None, &[]));
        assert_eq!(names(&ordered), vec!["job-2", "job-1"]);
    }

    #[test]
    fn test_deadline_aware_puts_undated_last() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut late = job(1, "a", JobPriority::Normal, 10.0);
        late.deadline = Some(base + Duration::hours(2));
        let mut soon = job(2, "a", JobPriority::Low, 10.0);
        soon.deadline = Some(base + Duration::hours(1));
        let undated = job(3, "a", JobPriority::Critical, 10.0);

        let jobs = vec![undated, late, soon];
        let usage = HashMap::new();
        let ordered = order_jobs(SchedulingAlgorithm::DeadlineAware, jobs.iter().collect(), &ctx(&usage, None, &[]));
        assert_eq!(names(&ordered), vec!["job-2", "job-1", "job-3"]);
    }

    #[test]
    fn test_round_robin_interleaves_owners() {
        let jobs = vec![
            job(1, "alice", JobPriority::Normal, 10.0),
            job(2, "alice", JobPriority::Normal, 10.0),
            job(3, "alice", JobPriority::Normal, 10.0),
            job(4, "bob", JobPriority::Normal, 10.0),
            job(5, "carol", JobPriority::Normal, 10.0),
        ];
        let usage = HashMap::new();

        let ordered = order_jobs(SchedulingAlgorithm::RoundRobin, jobs.iter().collect(), &ctx(&usage, None, &[]));
        assert_eq!(names(&ordered), vec!["job-1", "job-4", "job-5", "job-2", "job-3"]);

        let ordered = order_jobs(SchedulingAlgorithm::RoundRobin, jobs.iter().collect(), &ctx(&usage, Some("alice"), &[]));
        assert_eq!(names(&ordered), vec!["job-4", "job-5", "job-1", "job-2", "job-3"]);
    }

    #[test]
    fn test_shortest_job_first() {
        let jobs = vec![
            job(1, "a", JobPriority::Critical, 300.0),
            job(2, "a", JobPriority::Low, 5.0),
            job(3, "a", JobPriority::Normal, 60.0),
        ];
        let usage = HashMap::new();
        let ordered = order_jobs(SchedulingAlgorithm::ShortestJobFirst, jobs.iter().collect(), &ctx(&usage, None, &[]));
        assert_eq!(names(&ordered), vec!["job-2", "job-3", "job-1"]);
    }

    #[test]
    fn test_cost_optimized_orders_by_cheapest_node() {
        let nodes = vec![
            ResourceNode::new("cheap", "cheap", ResourceVector::new(2.0, 2.0, 0.0, 0.0, 0.0), 1.0),
            ResourceNode::new("pricey", "pricey", ResourceVector::new(64.0, 64.0, 0.0, 0.0, 0.0), 10.0),
        ];
        let mut big = job(1, "a", JobPriority::Critical, 3600.0);
        big.requirements = ResourceVector::new(32.0, 32.0, 0.0, 0.0, 0.0);
        let small = job(2, "a", JobPriority::Low, 3600.0);

        assert!((cheapest_feasible_cost(&big, &nodes) - 10.0).abs() < 1e-9);
        assert!((cheapest_feasible_cost(&small, &nodes) - 1.0).abs() < 1e-9);

        let jobs = vec![big, small];
        let usage = HashMap::new();
        let ordered = order_jobs(SchedulingAlgorithm::CostOptimized, jobs.iter().collect(), &ctx(&usage, None, &nodes));
        assert_eq!(names(&ordered), vec!["job-2", "job-1"]);
    }
}
