//! Core framework: the component contract, configuration, metrics and the
//! orchestrator that ties the components together.

pub mod component;
pub mod config;
pub mod metrics;
pub mod orchestrator;
