// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Leadflow message backbone.
//!
//! TOML files merged with `LEADFLOW_`-prefixed environment variable
//! overrides via Figment. All model structs reject unknown keys at
//! startup so typos surface as actionable errors.

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::LeadflowConfig;
