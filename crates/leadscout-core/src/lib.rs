/// Core library for the LeadScout prospect discovery pipeline.
///
/// Given a CRM account identifying a target organization, the pipeline
/// produces a ranked list of decision-maker prospects with enriched
/// professional profiles and queues them for human-approved CRM
/// write-back. See [`pipeline::Orchestrator`] for the entry points.
pub mod adapters;
pub mod artifact;
pub mod budget;
pub mod config;
pub mod error;
pub mod matching;
pub mod model;
pub mod names;
pub mod pipeline;
pub mod titles;

pub use error::*;

/// Returns the version of the leadscout-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
