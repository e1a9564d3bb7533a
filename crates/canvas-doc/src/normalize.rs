//! Canonical forms for formulas and serialized fragments.
//!
//! Two fragments that differ only in serialization incidentals normalize
//! to the same text:
//!
//! - formulas: whitespace runs and comments collapse, numeric literals take
//!   one spelling (`1.50` → `1.5`, `007` → `7`); string literals and
//!   quoted identifiers are kept verbatim
//! - JSON: object keys sorted, integral floats written as integers,
//!   insignificant whitespace dropped
//! - other text: line endings unified, trailing blanks trimmed

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::model::PropertyValue;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("invalid JSON in `{name}`: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

// ── Formulas ──────────────────────────────────────────────────────────────

/// Canonical comparison form of a formula.
pub fn normalize_formula(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            pending_space = true;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            pending_space = true;
            continue;
        }

        let start = i;
        let token: String = if c == '"' || c == '\'' {
            i = scan_quoted(&chars, i, c);
            chars[start..i].iter().collect()
        } else if c.is_ascii_digit()
            || (c == '.' && next_is_digit(&chars, i) && !ends_with_word(&out))
        {
            i = scan_number(&chars, i);
            let raw: String = chars[start..i].iter().collect();
            canonical_number(&raw)
        } else if is_word_char(c) {
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            chars[start..i].iter().collect()
        } else {
            i += 1;
            c.to_string()
        };

        if pending_space && ends_with_word(&out) && token.chars().next().is_some_and(is_word_like) {
            out.push(' ');
        }
        pending_space = false;
        out.push_str(&token);
    }
    out
}

/// Formula equality modulo formatting.
pub fn formulas_equal(a: &str, b: &str) -> bool {
    a == b || normalize_formula(a) == normalize_formula(b)
}

/// Property value equality modulo formatting.
pub fn values_equal(a: &PropertyValue, b: &PropertyValue) -> bool {
    match (a, b) {
        (PropertyValue::Formula(a), PropertyValue::Formula(b)) => formulas_equal(a, b),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_word_like(c: char) -> bool {
    is_word_char(c) || c == '"' || c == '\''
}

fn ends_with_word(out: &str) -> bool {
    out.chars().next_back().is_some_and(is_word_like)
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

/// Scan a `"..."` or `'...'` literal where a doubled quote is an escape.
fn scan_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    i
}

fn scan_number(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if chars.get(i) == Some(&'.') && next_is_digit(chars, i) {
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    } else if chars.get(i) == Some(&'.')
        && i > start
        && !chars.get(i + 1).is_some_and(|c| is_word_char(*c))
    {
        // `1.` as a complete literal
        i += 1;
    }
    if matches!(chars.get(i), Some('e' | 'E')) {
        let mut j = i + 1;
        if matches!(chars.get(j), Some('+' | '-')) {
            j += 1;
        }
        if chars.get(j).is_some_and(|c| c.is_ascii_digit()) {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d*)(?:\.(\d*))?(?:[eE]([+-]?\d+))?$").ok())
        .as_ref()
}

fn canonical_number(raw: &str) -> String {
    let Some(caps) = number_pattern().and_then(|re| re.captures(raw)) else {
        return raw.to_string();
    };
    let int = caps.get(1).map_or("", |m| m.as_str()).trim_start_matches('0');
    let frac = caps.get(2).map_or("", |m| m.as_str()).trim_end_matches('0');
    let mut out = if int.is_empty() { "0".to_string() } else { int.to_string() };
    if !frac.is_empty() {
        out.push('.');
        out.push_str(frac);
    }
    if let Some(exp) = caps.get(3) {
        let exp = exp.as_str();
        let (negative, digits) = match exp.strip_prefix('-') {
            Some(digits) => (true, digits),
            None => (false, exp.trim_start_matches('+')),
        };
        // Kept as text; exponents may exceed i64.
        let digits = digits.trim_start_matches('0');
        if !digits.is_empty() && out != "0" {
            out.push('e');
            if negative {
                out.push('-');
            }
            out.push_str(digits);
        }
    }
    out
}

// ── JSON ──────────────────────────────────────────────────────────────────

/// Canonical copy of a JSON value.
pub fn normalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), normalize_json(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_json).collect()),
        Value::Number(n) => Value::Number(canonical_json_number(n)),
        other => other.clone(),
    }
}

/// Canonical compact JSON text.
pub fn canonical_json_string(value: &Value) -> String {
    normalize_json(value).to_string()
}

fn canonical_json_number(n: &Number) -> Number {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            // 2^53: integral floats above this are not exactly representable
            if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                return Number::from(f as i64);
            }
        }
    }
    n.clone()
}

// ── Fragments ─────────────────────────────────────────────────────────────

/// Canonical bytes of one named fragment (archive entry or source file).
///
/// `.json` fragments must parse; text fragments (`.yaml`, `.txt`, ...)
/// get line-ending and trailing-blank normalization; anything else is
/// returned unchanged.
pub fn normalize_fragment(name: &str, bytes: &[u8]) -> Result<Vec<u8>, NormalizeError> {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".json") {
        let value: Value = serde_json::from_slice(bytes).map_err(|source| NormalizeError::Json {
            name: name.to_string(),
            source,
        })?;
        return Ok(canonical_json_string(&value).into_bytes());
    }
    if is_text_name(&lower) {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok(normalize_text(text).into_bytes());
        }
    }
    Ok(bytes.to_vec())
}

fn is_text_name(lower: &str) -> bool {
    [".yaml", ".yml", ".txt", ".md"]
        .iter()
        .any(|ext| lower.ends_with(ext))
}

fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    let mut out = String::with_capacity(unified.len());
    for line in unified.split('\n') {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    let trimmed = out.trim_end_matches('\n').len();
    out.truncate(trimmed);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_between_punctuation_is_dropped() {
        assert_eq!(normalize_formula("If( x ,1 )"), "If(x,1)");
        assert!(formulas_equal("If(x, 1, 2)", "If( x,1,2 )"));
    }

    #[test]
    fn whitespace_between_words_is_kept() {
        assert_eq!(normalize_formula("a  And\n b"), "a And b");
        assert!(!formulas_equal("Not x", "Notx"));
    }

    #[test]
    fn string_literals_are_verbatim() {
        assert_eq!(normalize_formula("\"a  b\""), "\"a  b\"");
        assert!(!formulas_equal("\"a b\"", "\"a  b\""));
        assert_eq!(normalize_formula("\"say \"\"hi\"\" \" & x"), "\"say \"\"hi\"\" \"&x");
    }

    #[test]
    fn quoted_identifiers_are_verbatim() {
        assert_eq!(normalize_formula("'My  Table' . Col"), "'My  Table'.Col");
    }

    #[test]
    fn numbers_take_one_spelling() {
        assert!(formulas_equal("100", "100.0"));
        assert!(formulas_equal("1.50", "1.5"));
        assert!(formulas_equal("007", "7"));
        assert!(formulas_equal(".5", "0.5"));
        assert!(formulas_equal("1e0", "1"));
        assert!(!formulas_equal("1.5", "15"));
        assert_eq!(normalize_formula("2E+3"), "2e3");
    }

    #[test]
    fn oversized_exponents_are_not_dropped() {
        assert!(!formulas_equal("1e99999999999999999999", "1"));
        assert_eq!(
            normalize_formula("1.0E+0099999999999999999999"),
            "1e99999999999999999999"
        );
        assert_eq!(normalize_formula("5e-00000000000000000000012"), "5e-12");
        assert!(formulas_equal("3e-0", "3"));
    }

    #[test]
    fn digits_inside_identifiers_untouched() {
        assert_eq!(normalize_formula("Label007.Text"), "Label007.Text");
    }

    #[test]
    fn comments_are_ignored() {
        assert!(formulas_equal("x + 1 // bump", "x+1"));
        assert!(formulas_equal("x /* a */ + 1", "x+1"));
    }

    #[test]
    fn json_keys_sorted_and_floats_integral() {
        let a = json!({"b": 1.0, "a": [2, {"d": 3, "c": 4}]});
        let b = json!({"a": [2, {"c": 4, "d": 3}], "b": 1});
        assert_eq!(canonical_json_string(&a), canonical_json_string(&b));
        assert_eq!(canonical_json_string(&a), r#"{"a":[2,{"c":4,"d":3}],"b":1}"#);
    }

    #[test]
    fn json_fragments_ignore_whitespace() {
        let a = normalize_fragment("x.json", b"{ \"a\" : 1,\n \"b\": 2 }").unwrap();
        let b = normalize_fragment("x.json", br#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bad_json_fragment_is_error() {
        assert!(normalize_fragment("x.json", b"{").is_err());
    }

    #[test]
    fn text_fragments_unify_line_endings() {
        let a = normalize_fragment("a.pa.yaml", b"Screen: \r\nName: S\r\n").unwrap();
        let b = normalize_fragment("a.pa.yaml", b"Screen:\nName: S").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn binary_fragments_untouched() {
        let bytes = [0u8, 159, 146, 150];
        assert_eq!(normalize_fragment("logo.png", &bytes).unwrap(), bytes);
    }
}
