// src/config/mod.rs

//! Configuration loading and validation for taskpoll.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Parse compact duration strings (`duration.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::{HumanDuration, parse_duration};
pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path, load_from_str};
pub use model::{
    ConfigFile, FlagNames, RawConfigFile, RegistrySection, TaskClassConfig, WorkerSection,
};
