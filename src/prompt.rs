// Copyright 2026 The Careerline Project
// SPDX-License-Identifier: Apache-2.0

/// Separator between the preamble and the user's words.
pub const USER_PROMPT_LABEL: &str = "\n\nUser Prompt: ";

/// Build the prompt envelope sent upstream: preamble, blank line, labelled
/// user text. Recomputed for every request.
pub fn compose_prompt(preamble: &str, user_text: &str) -> String {
    let mut prompt =
        String::with_capacity(preamble.len() + USER_PROMPT_LABEL.len() + user_text.len());
    prompt.push_str(preamble);
    prompt.push_str(USER_PROMPT_LABEL);
    prompt.push_str(user_text);
    prompt
}
