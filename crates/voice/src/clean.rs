// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sentence cleaning before synthesis.
//!
//! Code blocks, markdown syntax, URLs, file paths, list markers, and emoji
//! read badly aloud; strip them all. A sentence that is nothing but markup
//! cleans to the empty string and is skipped by the bridge.

use regex::Regex;
use std::sync::OnceLock;

fn regexes() -> &'static [Regex; 6] {
    static RE: OnceLock<[Regex; 6]> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        [
            // Fenced code blocks, including unterminated tails.
            Regex::new(r"(?s)```.*?(```|$)").unwrap(),
            // Inline code spans.
            Regex::new(r"`[^`]*`").unwrap(),
            // Markdown links: keep the text, drop the target.
            Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap(),
            // Bare URLs.
            Regex::new(r"https?://\S+").unwrap(),
            // File paths: two or more /-separated path-ish segments.
            Regex::new(r"~?/?(?:[\w.-]+/){1,}[\w.-]+").unwrap(),
            // List lines: leading bullet or ordinal marker.
            Regex::new(r"(?m)^\s*(?:[-*+]|\d+[.)])\s+").unwrap(),
        ]
    })
}

/// Strip a sentence down to speakable text.
pub fn clean_sentence(text: &str) -> String {
    let [code_fence, code_span, link, url, path, list] = regexes();

    let mut out = code_fence.replace_all(text, " ").into_owned();
    out = code_span.replace_all(&out, " ").into_owned();
    out = link.replace_all(&out, "$1").into_owned();
    out = url.replace_all(&out, " ").into_owned();
    out = path.replace_all(&out, " ").into_owned();
    out = list.replace_all(&out, "").into_owned();

    // Markdown emphasis/heading markers and emoji.
    let mut cleaned = String::with_capacity(out.len());
    for c in out.chars() {
        match c {
            '*' | '_' | '#' | '`' | '>' | '|' => {}
            c if is_emoji(c) => {}
            c => cleaned.push(c),
        }
    }

    collapse_whitespace(&cleaned)
}

/// Characters in the common emoji and symbol planes.
fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1FAFF   // pictographs, transport, supplemental symbols
        | 0x2600..=0x27BF   // misc symbols and dingbats
        | 0x2190..=0x21FF   // arrows
        | 0xFE00..=0xFE0F   // variation selectors
        | 0x1F1E6..=0x1F1FF // regional indicators
    )
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "clean_tests.rs"]
mod tests;
