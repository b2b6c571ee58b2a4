//! Job orchestration and background-merge coordination for NeuroGraph.
//!
//! This crate ties the graph builder, the pattern miner and shared storage
//! together into end-to-end workflows (e.g., [`Orchestrator::generate_graph`]).

pub mod auxiliary;
pub mod layout;
pub mod materialize;
pub mod merge;
pub mod metadata;
pub mod mining;
pub mod pipeline;
pub mod runner;

pub use auxiliary::AuxiliaryBuild;
pub use materialize::{LocalOutputPaths, ResultMaterializer};
pub use merge::{MergeOutcome, MergeReport, SkipReason};
pub use mining::{MiningDispatcher, MiningOutcome, OutcomeStatus};
pub use pipeline::{AuxiliaryStatus, BuildOutcome, ExecuteOutcome, MotifSelection, Orchestrator};
pub use runner::BackgroundRunner;
