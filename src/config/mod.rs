// src/config/mod.rs

//! Configuration loading and validation for subdag.
//!
//! - [`model`] defines the TOML-backed data model.
//! - [`loader`] reads a config file from disk.
//! - [`validate`] turns a raw model into a checked [`ConfigFile`].
//! - [`duration`] parses compact duration strings.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    ConfigFile, DagSection, OperatorConfig, OperatorSection, PoolSection, RawConfigFile,
    TaskConfig,
};
pub use validate::validate_subdag_name;
