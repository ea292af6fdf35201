// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the public Config structs: interpolation, defaulting and
// validation happen between raw and typed.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub careerline: String,
    pub environment: Option<String>,
    pub model: Option<RawModelConfig>,
    pub prompt: Option<RawPromptConfig>,
    pub throttle: Option<RawThrottleConfig>,
    pub server: Option<RawServerConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawModelConfig {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPromptConfig {
    pub preamble: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawThrottleConfig {
    pub mode: Option<String>,
    pub delay_ms: Option<u64>,
    pub capacity: Option<u32>,
    pub refill_per_sec: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawServerConfig {
    pub max_body_bytes: Option<usize>,
}
