// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use sha2::{Digest, Sha256};

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a careerline config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version
/// 5. Resolve variable interpolation in string fields
/// 6. Fill defaults and validate values
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.careerline != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.careerline
        )));
    }

    let environment = match raw.environment {
        Some(env) => resolve_variables(&env)?,
        None => String::new(),
    };

    Ok(Config {
        version: raw.careerline,
        environment,
        model: build_model_config(raw.model)?,
        prompt: build_prompt_config(raw.prompt)?,
        throttle: build_throttle_config(raw.throttle)?,
        server: build_server_config(raw.server)?,
        config_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_model_config(raw: Option<raw::RawModelConfig>) -> Result<ModelConfig, ConfigError> {
    let mut model = ModelConfig::default();
    let Some(raw) = raw else {
        return Ok(model);
    };

    if let Some(name) = raw.name {
        let name = resolve_variables(&name)?;
        if name.trim().is_empty() || name.contains('/') {
            return Err(ConfigError::Validation(format!(
                "model.name \"{name}\" must be a bare model identifier"
            )));
        }
        model.name = name;
    }

    if let Some(base_url) = raw.base_url {
        let base_url = resolve_variables(&base_url)?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "model.base_url \"{base_url}\" must be an http(s) URL"
            )));
        }
        model.base_url = base_url.trim_end_matches('/').to_string();
    }

    if let Some(var) = raw.api_key_env {
        let var = resolve_variables(&var)?;
        if var.trim().is_empty() {
            return Err(ConfigError::Validation(
                "model.api_key_env must not be empty".to_string(),
            ));
        }
        model.api_key_env = var;
    }

    Ok(model)
}

fn build_prompt_config(raw: Option<raw::RawPromptConfig>) -> Result<PromptConfig, ConfigError> {
    match raw.and_then(|p| p.preamble) {
        Some(preamble) => Ok(PromptConfig {
            preamble: resolve_variables(&preamble)?.trim().to_string(),
        }),
        None => Ok(PromptConfig::default()),
    }
}

fn build_throttle_config(
    raw: Option<raw::RawThrottleConfig>,
) -> Result<ThrottleConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(ThrottleConfig::default());
    };

    match raw.mode.as_deref().unwrap_or("fixed_delay") {
        "fixed_delay" => {
            let delay_ms = raw
                .delay_ms
                .unwrap_or(super::defaults::DEFAULT_THROTTLE_DELAY_MS);
            Ok(ThrottleConfig::FixedDelay {
                delay: Duration::from_millis(delay_ms),
            })
        }
        "token_bucket" => {
            let capacity = raw.capacity.unwrap_or(3);
            let refill_per_sec = raw.refill_per_sec.unwrap_or(3.0);
            if capacity == 0 {
                return Err(ConfigError::Validation(
                    "throttle.capacity must be at least 1".to_string(),
                ));
            }
            if !refill_per_sec.is_finite() || refill_per_sec <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "throttle.refill_per_sec must be a positive number, got {refill_per_sec}"
                )));
            }
            Ok(ThrottleConfig::TokenBucket {
                capacity,
                refill_per_sec,
            })
        }
        "off" => Ok(ThrottleConfig::Off),
        other => Err(ConfigError::Validation(format!(
            "throttle.mode must be \"fixed_delay\", \"token_bucket\" or \"off\", got \"{other}\""
        ))),
    }
}

fn build_server_config(raw: Option<raw::RawServerConfig>) -> Result<ServerConfig, ConfigError> {
    let mut server = ServerConfig::default();
    if let Some(max) = raw.and_then(|s| s.max_body_bytes) {
        if max == 0 {
            return Err(ConfigError::Validation(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }
        server.max_body_bytes = max;
    }
    Ok(server)
}
