//! Deterministic cleanup of the model's JSON reply.
//!
//! Models wrap the object in ```json fences, prepend a sentence, or append a
//! note after the closing brace even when told not to. These rules recover
//! the object without touching its content.
//!
//! Order: normalise line endings, strip fences, strip invisible characters,
//! then cut the outermost `{ ... }` span.

use crate::error::ExtractError;
use crate::fields::RawFields;
use once_cell::sync::Lazy;
use regex::Regex;

/// Parse a model reply into [`RawFields`].
pub fn parse_fields(reply: &str) -> Result<RawFields, ExtractError> {
    let cleaned = clean_reply(reply);
    let object = json_object(&cleaned).ok_or_else(|| {
        ExtractError::failed(format!("Model reply contains no JSON object: {}", preview(reply)))
    })?;
    serde_json::from_str(object)
        .map_err(|e| ExtractError::failed(format!("Model reply is not valid JSON: {e}")))
}

/// Apply the cleanup rules in order.
pub fn clean_reply(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let s = strip_fences(&s);
    remove_invisible_chars(&s)
}

// ── Fences ──────────────────────────────────────────────────────────────────

static RE_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n(.*?)\n?```").unwrap());

fn strip_fences(input: &str) -> String {
    match RE_FENCES.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Invisible characters ────────────────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{FEFF}\u{00AD}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").into_owned()
}

// ── Object span ─────────────────────────────────────────────────────────────

/// The text between the first `{` and the last `}`, inclusive.
fn json_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

fn preview(reply: &str) -> String {
    let trimmed = reply.trim();
    match trimmed.char_indices().nth(80) {
        Some((i, _)) => format!("{}…", &trimmed[..i]),
        None => trimmed.to_string(),
    }
}
