// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

pub mod config;
pub mod consumer;
pub mod message;
pub mod model;
pub mod prompt;
pub mod relay;
pub mod throttle;
