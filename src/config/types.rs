// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use super::defaults;

/// Top-level parsed and validated careerline config.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Config format version. Always "v1".
    pub version: String,
    /// Environment label (e.g. "development", "production").
    pub environment: String,
    pub model: ModelConfig,
    pub prompt: PromptConfig,
    pub throttle: ThrottleConfig,
    pub server: ServerConfig,
    /// SHA256 of the raw YAML: "sha256:{hex}". Built-in defaults hash the
    /// empty document.
    pub config_hash: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            environment: String::new(),
            model: ModelConfig::default(),
            prompt: PromptConfig::default(),
            throttle: ThrottleConfig::default(),
            server: ServerConfig::default(),
            config_hash: super::loader::compute_hash(""),
        }
    }
}

/// Upstream generative model settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model identifier, e.g. "gemini-1.5-flash".
    pub name: String,
    /// API root without trailing slash.
    pub base_url: String,
    /// Environment variable holding the API key. Read per request, never at load.
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: defaults::DEFAULT_MODEL.to_string(),
            base_url: defaults::DEFAULT_BASE_URL.to_string(),
            api_key_env: defaults::DEFAULT_API_KEY_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    /// Instructional text placed ahead of every user prompt.
    pub preamble: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            preamble: defaults::DEFAULT_PREAMBLE.to_string(),
        }
    }
}

/// Admission throttle applied before each upstream call.
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleConfig {
    /// Sleep a fixed delay per request.
    FixedDelay { delay: Duration },
    /// Token bucket shared by all requests.
    TokenBucket { capacity: u32, refill_per_sec: f64 },
    Off,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        ThrottleConfig::FixedDelay {
            delay: Duration::from_millis(defaults::DEFAULT_THROTTLE_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Upper bound on an accepted `/api/chat` request body.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: defaults::DEFAULT_MAX_BODY_BYTES,
        }
    }
}
