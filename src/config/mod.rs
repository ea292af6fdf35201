// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads careerline.yaml, resolves variable interpolation, fills defaults,
// validates values, and computes a deterministic config hash.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use defaults::{
    DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MAX_BODY_BYTES, DEFAULT_MODEL,
    DEFAULT_PREAMBLE, DEFAULT_THROTTLE_DELAY_MS,
};
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{Config, ModelConfig, PromptConfig, ServerConfig, ThrottleConfig};
