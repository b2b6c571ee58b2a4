//! Shared types, error model, and configuration for NeuroGraph.
//!
//! This crate is the foundation depended on by all other NeuroGraph crates.
//! It provides:
//! - [`NeurographError`], the unified error type
//! - Domain types ([`JobId`], [`BuildRequest`], [`MiningConfig`], [`WriterType`])
//! - Configuration ([`AppConfig`], [`OrchestratorConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AuxiliaryConfig, AuxiliaryMode, DefaultsConfig, OrchestratorConfig, ServerConfig,
    ServicesConfig, StorageConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from,
};
pub use error::{NeurographError, Result};
pub use types::{
    BuildId, BuildRequest, GraphType, InputFile, JobId, MiningConfig, VISUALIZE_INSTANCES_KEY,
    WriterType,
};
