// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Keeps upstream QPS under the free-tier ceiling for a single instance.
pub const DEFAULT_THROTTLE_DELAY_MS: u64 = 200;

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Instructions prepended to every user prompt.
pub const DEFAULT_PREAMBLE: &str = "You are a friendly and knowledgeable assistant for a university \
career center. Help students and alumni with job and internship searches, resumes and cover \
letters, interview preparation, networking, graduate school decisions, and career exploration. \
Give concrete, actionable advice in a supportive tone. When a question depends on current \
postings, deadlines, or office hours, say so and point the user to the career center's \
official resources instead of inventing details. If a request is unrelated to careers or \
professional development, answer briefly and steer the conversation back to how the career \
center can help.";
