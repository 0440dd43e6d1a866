//! Simulated resource nodes

use serde::{Deserialize, Serialize};

use crate::core::component::ComponentError;

use super::models::{NodeStats, PlacementStrategy, ResourceVector};

/// A simulated compute unit with a fixed capacity vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    pub id: String,
    pub name: String,
    pub capacity: ResourceVector,
    #[serde(default)]
    pub allocated: ResourceVector,
    /// Price of running on this node, per hour
    #[serde(default)]
    pub cost_per_hour: f64,
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default)]
    pub running_jobs: Vec<String>,
}

fn default_online() -> bool {
    true
}

impl ResourceNode {
    pub fn new(id: &str, name: &str, capacity: ResourceVector, cost_per_hour: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            capacity,
            allocated: ResourceVector::default(),
            cost_per_hour,
            online: true,
            running_jobs: Vec::new(),
        }
    }

    pub fn available(&self) -> ResourceVector {
        self.capacity.saturating_sub(&self.allocated)
    }

    /// Whether the node could ever hold `req`, ignoring current load
    pub fn could_ever_fit(&self, req: &ResourceVector) -> bool {
        req.fits_within(&self.capacity)
    }

    pub fn can_accommodate(&self, req: &ResourceVector) -> bool {
        self.online && req.fits_within(&self.available())
    }

    pub fn allocate(&mut self, job_id: &str, req: &ResourceVector) -> Result<(), ComponentError> {
        if !self.can_accommodate(req) {
            return Err(ComponentError::ResourceError(format!(
                "Node {} cannot accommodate job {}", self.id, job_id
            )));
        }

        self.allocated = self.allocated.add(req);
        self.running_jobs.push(job_id.to_string());
        Ok(())
    }

    pub fn release(&mut self, job_id: &str, req: &ResourceVector) {
        self.allocated = self.allocated.saturating_sub(req);
        self.running_jobs.retain(|id| id != job_id);
    }

    pub fn utilization(&self) -> f64 {
        self.allocated.mean_share(&self.capacity)
    }

    pub fn estimated_cost(&self, duration_secs: f64) -> f64 {
        self.cost_per_hour * duration_secs / 3600.0
    }

    /// Higher is a better placement for `req` under `strategy`
    pub fn placement_score(&self, req: &ResourceVector, strategy: PlacementStrategy) -> f64 {
        let leftover = self.available().saturating_sub(req).mean_share(&self.capacity);
        match strategy {
            PlacementStrategy::BestFit => 1.0 - leftover,
            PlacementStrategy::Spread => leftover,
        }
    }

    pub fn stats(&self) -> NodeStats {
        NodeStats {
            node_id: self.id.clone(),
            online: self.online,
            utilization: self.utilization(),
            running_jobs: self.running_jobs.len(),
            available: self.available(),
        }
    }
}

/// The node set used when no nodes are configured
pub fn default_nodes() -> Vec<ResourceNode> {
    vec![
        ResourceNode::new("cpu-small", "General purpose (small)", ResourceVector::new(8.0, 32.0, 0.0, 1000.0, 500.0), 0.40),
        ResourceNode::new("cpu-large", "General purpose (large)", ResourceVector::new(32.0, 128.0, 0.0, 10000.0, 2000.0), 1.60),
        ResourceNode::new("gpu-node", "GPU accelerated", ResourceVector::new(16.0, 64.0, 4.0, 10000.0, 1000.0), 3.20),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> ResourceNode {
        ResourceNode::new("n1", "Node 1", ResourceVector::new(8.0, 16.0, 1.0, 100.0, 100.0), 3.6)
    }

    #[test]
    fn test_allocate_and_release() {
        let mut node = node();
        let req = ResourceVector::new(4.0, 8.0, 0.0, 0.0, 0.0);

        node.allocate("a", &req).unwrap();
        node.allocate("b", &req).unwrap();
        assert!(node.allocate("c", &req).is_err());
        assert_eq!(node.running_jobs, vec!["a", "b"]);

        node.release("a", &req);
        assert_eq!(node.available().cpu_cores, 4.0);
        assert_eq!(node.running_jobs, vec!["b"]);
    }

    #[test]
    fn test_offline_node_accepts_nothing() {
        let mut node = node();
        node.online = false;
        assert!(!node.can_accommodate(&ResourceVector::default()));
        assert!(node.could_ever_fit(&ResourceVector::new(1.0, 1.0, 0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_cost_and_utilization() {
        let mut node = node();
        assert!((node.estimated_cost(1800.0) - 1.8).abs() < 1e-9);

        node.allocate("a", &ResourceVector::new(8.0, 16.0, 1.0, 100.0, 100.0)).unwrap();
        assert!((node.utilization() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_placement_score_strategies() {
        let small = ResourceNode::new("s", "small", ResourceVector::new(4.0, 4.0, 0.0, 0.0, 0.0), 1.0);
        let large = ResourceNode::new("l", "large", ResourceVector::new(16.0, 16.0, 0.0, 0.0, 0.0), 1.0);
        let req = ResourceVector::new(4.0, 4.0, 0.0, 0.0, 0.0);

        assert!(small.placement_score(&req, PlacementStrategy::BestFit) > large.placement_score(&req, PlacementStrategy::BestFit));
        assert!(large.placement_score(&req, PlacementStrategy::Spread) > small.placement_score(&req, PlacementStrategy::Spread));
    }
}
