//! Component instances for the Granger hub
//!
//! Each instance implements the `Component` trait and is driven by the
//! orchestrator and the management API.

pub mod common;
pub mod scheduler;
pub mod cache;

// Re-export instances for convenience
pub use scheduler::ResourceSchedulerInstance;
pub use cache::IntelligentCacheInstance;
