// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filename → session id heuristic.
//!
//! Session logs are usually named `<uuid>.jsonl` or
//! `<timestamp>_<uuid>.jsonl`. When neither pattern matches, the raw file
//! base is the session id.

use regex::Regex;
use std::sync::OnceLock;

const UUID: &str = "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

fn uuid_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(&format!("({UUID})$")).unwrap()
    })
}

/// Derive a session id from a log file name.
pub fn session_id_for_file(file_name: &str) -> String {
    let base = file_name
        .rsplit('/')
        .next()
        .unwrap_or(file_name)
        .trim_end_matches(".jsonl")
        .trim_end_matches(".log");
    match uuid_suffix().captures(base) {
        // `<uuid>` or `<timestamp>_<uuid>`: the uuid is the session id.
        Some(caps) => caps[1].to_ascii_lowercase(),
        None => base.to_string(),
    }
}

#[cfg(test)]
#[path = "session_key_tests.rs"]
mod tests;
