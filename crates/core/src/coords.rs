//! Liberal decoding of location values of unknown shape.
//!
//! Upstream producers report coordinates in at least four shapes: a typed
//! `{x, y}` object, an ordered `[x, y]` array, a free-text string (log lines,
//! bracketed pairs), or a well-known place name. [`resolve`] runs an ordered
//! cascade of increasingly permissive rules and returns the first hit; each
//! rule is its own function so it can be tested in isolation.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::types::WorldPos;

/// Well-known place names, keyed lower-case.
const NAMED_LOCATIONS: &[(&str, WorldPos)] = &[
    ("downtown", WorldPos { x: -1500.0, y: 1200.0 }),
    ("docks", WorldPos { x: 2000.0, y: -800.0 }),
    ("airport", WorldPos { x: 500.0, y: 1800.0 }),
];

/// Bracketed pair like `[123, -456]`, separators comma/semicolon/whitespace.
static BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*(-?\d+(?:\.\d+)?)\s*[,;\s]+\s*(-?\d+(?:\.\d+)?)\s*\]").expect("valid regex")
});

/// A line that is exactly a pair, like `123 -456` or `123,-456`.
static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(-?\d+(?:\.\d+)?)[,\s]+(-?\d+(?:\.\d+)?)$").expect("valid regex")
});

/// Any numeric substring, for the free-text fallback.
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"));

/// Decode a location value into a world position.
///
/// Rules are tried in priority order:
/// 1. an object exposing `x` and `y` (both must be finite numbers, otherwise
///    the value is malformed and rejected outright);
/// 2. an array of at least two numerics;
/// 3. a string: bracketed pair, exact pair, first two numbers found anywhere
///    in free text, then a case-insensitive named-location lookup.
///
/// Returns `None` when no rule matches.
pub fn resolve(value: &Value) -> Option<WorldPos> {
    match value {
        Value::Object(_) => from_object(value),
        Value::Array(items) => from_array(items),
        Value::String(s) => from_text(s),
        _ => None,
    }
}

/// Rule 1: `{x, y}` object. No fall-through: an object that carries `x`/`y`
/// which fail to parse is malformed, not free text.
fn from_object(value: &Value) -> Option<WorldPos> {
    let x = numeric(value.get("x")?)?;
    let y = numeric(value.get("y")?)?;
    Some(WorldPos::new(x, y))
}

/// Rule 2: `[x, y, ...]` array — the first two elements are taken.
fn from_array(items: &[Value]) -> Option<WorldPos> {
    if items.len() < 2 {
        return None;
    }
    let x = numeric(&items[0])?;
    let y = numeric(&items[1])?;
    Some(WorldPos::new(x, y))
}

/// Rule 3: string cascade, most structured form first.
fn from_text(s: &str) -> Option<WorldPos> {
    let s = s.trim();
    parse_bracketed(s)
        .or_else(|| parse_pair(s))
        .or_else(|| parse_freeform(s))
        .or_else(|| named_location(s))
}

/// `[123, -456]` with comma, semicolon, or whitespace separators.
fn parse_bracketed(s: &str) -> Option<WorldPos> {
    let caps = BRACKET_RE.captures(s)?;
    pair_from_captures(&caps)
}

/// A line that is exactly `123 -456` or `123,-456`.
fn parse_pair(s: &str) -> Option<WorldPos> {
    let caps = PAIR_RE.captures(s)?;
    pair_from_captures(&caps)
}

/// Free-form text: the first two numeric substrings found anywhere.
/// Useful for pasted log lines and chat fragments.
fn parse_freeform(s: &str) -> Option<WorldPos> {
    let mut nums = NUMBER_RE.find_iter(s);
    let x: f64 = nums.next()?.as_str().parse().ok()?;
    let y: f64 = nums.next()?.as_str().parse().ok()?;
    finite_pair(x, y)
}

/// Case-insensitive lookup in the static named-location table.
fn named_location(s: &str) -> Option<WorldPos> {
    let key = s.to_lowercase();
    NAMED_LOCATIONS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, pos)| *pos)
}

/// Accept a JSON number or a numeric string, rejecting non-finite values.
fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn pair_from_captures(caps: &regex::Captures<'_>) -> Option<WorldPos> {
    let x: f64 = caps.get(1)?.as_str().parse().ok()?;
    let y: f64 = caps.get(2)?.as_str().parse().ok()?;
    finite_pair(x, y)
}

fn finite_pair(x: f64, y: f64) -> Option<WorldPos> {
    (x.is_finite() && y.is_finite()).then(|| WorldPos::new(x, y))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
