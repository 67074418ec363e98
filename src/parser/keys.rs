use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::tokens::{parse_fragment, plain_text, LinkDefinitions, Token, TokenKind};
use crate::options::{KeySource, Options};

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9A-Za-z_]+").unwrap());
static CODE_SPAN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^`([^`]+)`$").unwrap());

/// Turn label or heading text into a property key. Never fails, never empty.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let key = NON_WORD_RE.replace_all(&lower, "_");
    let key = key.strip_suffix('_').unwrap_or(&key);
    let key = key.trim_start_matches(|c: char| c == '_' || c.is_ascii_digit());
    if key.is_empty() {
        "_".to_string()
    } else {
        key.to_string()
    }
}

/// A heading that is exactly one code span names its key verbatim;
/// anything else goes through the configured key policy. `links` are the
/// definitions of the text the heading came from.
pub fn key_from_heading(
    heading: &Token,
    links: &Arc<LinkDefinitions>,
    options: &Options,
) -> String {
    let raw = match &heading.kind {
        TokenKind::Heading { text, .. } => text.as_str(),
        _ => heading.source.trim(),
    };
    if let Some(caps) = CODE_SPAN_RE.captures(raw) {
        return caps[1].to_string();
    }
    let events = parse_fragment(raw, links);
    (options.key_from_text)(plain_text(&events).trim(), KeySource::Heading)
}
