//! Tolerant parsing of raw model completions into Fact records.
//!
//! Models wrap their JSON in chat filler, truncate arrays, or emit one flat
//! object per line. The parser first tries the well-formed `findings` shape
//! and then falls back to scanning for flat JSON objects, keeping every
//! finding that reaches the minimum required shape (a non-empty summary).

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::timeline::parse_flexible_date;

use super::types::Fact;

/// Result of parsing one window's completion.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub facts: Vec<Fact>,
    /// Candidate objects that failed the minimum shape.
    pub rejected: usize,
    /// No JSON structure was found at all.
    pub malformed: bool,
}

impl ParseOutcome {
    /// True when this window should be surfaced as a parse error.
    pub fn degraded(&self) -> bool {
        self.malformed || (self.facts.is_empty() && self.rejected > 0)
    }
}

/// Matches flat JSON objects embedded in chat filler.
fn object_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").expect("static regex"))
}

/// Parse one raw completion. Never errors: malformed output degrades to
/// zero facts with `malformed` set, so one bad window cannot abort a batch.
pub fn parse_completion(raw: &str, fingerprint: &str, window_index: usize) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        outcome.malformed = true;
        return outcome;
    }

    let candidates = collect_candidates(trimmed);
    if candidates.is_empty() {
        outcome.malformed = true;
        return outcome;
    }

    for candidate in candidates {
        match finding_to_fact(&candidate, fingerprint, window_index) {
            Some(fact) => outcome.facts.push(fact),
            None => outcome.rejected += 1,
        }
    }
    outcome
}

/// Candidate finding objects, best shape first.
fn collect_candidates(raw: &str) -> Vec<Value> {
    // Well-formed path: a top-level object with a findings array, or a bare
    // array. Code fences are stripped first.
    let unfenced = strip_code_fence(raw);
    if let Ok(value) = serde_json::from_str::<Value>(unfenced) {
        match value {
            Value::Object(ref map) => {
                if let Some(Value::Array(items)) = map.get("findings") {
                    return items.clone();
                }
                return vec![value];
            }
            Value::Array(items) => return items,
            _ => {}
        }
    }

    // Degraded path: scan for flat objects, ignoring whatever surrounds them.
    object_pattern()
        .find_iter(raw)
        .filter_map(|m| serde_json::from_str::<Value>(&m.as_str().replace('\n', " ")).ok())
        .collect()
}

fn strip_code_fence(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix("```json")
        .or_else(|| raw.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(raw)
}

/// Coerce one candidate object into a Fact. Minimum shape: a non-empty
/// summary. Everything else degrades to a documented default.
fn finding_to_fact(value: &Value, fingerprint: &str, window_index: usize) -> Option<Fact> {
    let obj = value.as_object()?;

    let summary = string_field(obj, &["summary"])?;
    if summary.trim().is_empty() {
        return None;
    }

    let quote = string_field(obj, &["quote", "source"]).unwrap_or_else(|| "N/A".to_string());
    let date = string_field(obj, &["date"]).unwrap_or_else(|| "Unknown".to_string());
    let category = string_field(obj, &["category", "type"])
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "General".to_string());
    let crime = string_field(obj, &["crime"])
        .filter(|c| !c.trim().is_empty() && !c.eq_ignore_ascii_case("none") && !c.eq_ignore_ascii_case("null"));
    let severity = severity_field(obj.get("severity"));
    let date_valid = parse_flexible_date(&date).is_some();

    Some(Fact {
        fingerprint: fingerprint.to_string(),
        window_index,
        quote,
        date,
        summary,
        category,
        crime,
        severity,
        date_valid,
    })
}

fn string_field(obj: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match obj.get(*key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => continue,
        }
    }
    None
}

/// Severity arrives as a number, a numeric string, or garbage. Clamp to 1-5.
fn severity_field(value: Option<&Value>) -> i64 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(1),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(1),
        _ => 1,
    };
    raw.clamp(1, 5)
}
