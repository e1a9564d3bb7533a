//! Detailed comparison of two JSON fragments.
//!
//! Used after a fingerprint mismatch to say *what* differs: every leaf
//! present on both sides with different values is `Changed`, every key or
//! array slot present only in the first is `Removed`, only in the second
//! `Added`. Objects are matched by key, arrays by index.

use serde_json::Value;

use crate::error::ErrorList;
use crate::normalize::normalize_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MismatchKind {
    Changed,
    Removed,
    Added,
}

/// One property-level difference inside a named fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMismatch {
    /// Archive entry or source file name.
    pub entry: String,
    /// Dotted path inside the fragment, `$` for the fragment root.
    pub path: String,
    pub kind: MismatchKind,
}

/// All differences between `a` and `b`, in document order of `a` then `b`.
pub fn compare_json(entry: &str, a: &Value, b: &Value) -> Vec<PropertyMismatch> {
    let mut out = Vec::new();
    let a = normalize_json(a);
    let b = normalize_json(b);
    walk(entry, "", &a, &b, &mut out);
    out
}

/// Push every difference into `errors`, returning how many were found.
pub fn report_json_mismatches(entry: &str, a: &Value, b: &Value, errors: &mut ErrorList) -> usize {
    let mismatches = compare_json(entry, a, b);
    for mismatch in &mismatches {
        errors.property_mismatch(mismatch);
    }
    mismatches.len()
}

fn walk(entry: &str, path: &str, a: &Value, b: &Value, out: &mut Vec<PropertyMismatch>) {
    match (a, b) {
        (Value::Object(ma), Value::Object(mb)) => {
            for (key, va) in ma {
                let child = join_key(path, key);
                match mb.get(key) {
                    Some(vb) => walk(entry, &child, va, vb, out),
                    None => push(entry, child, MismatchKind::Removed, out),
                }
            }
            for key in mb.keys().filter(|k| !ma.contains_key(*k)) {
                push(entry, join_key(path, key), MismatchKind::Added, out);
            }
        }
        (Value::Array(xa), Value::Array(xb)) => {
            for (i, va) in xa.iter().enumerate() {
                let child = format!("{path}[{i}]");
                match xb.get(i) {
                    Some(vb) => walk(entry, &child, va, vb, out),
                    None => push(entry, child, MismatchKind::Removed, out),
                }
            }
            for i in xa.len()..xb.len() {
                push(entry, format!("{path}[{i}]"), MismatchKind::Added, out);
            }
        }
        _ if a != b => push(entry, path.to_string(), MismatchKind::Changed, out),
        _ => {}
    }
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn push(entry: &str, path: String, kind: MismatchKind, out: &mut Vec<PropertyMismatch>) {
    let path = if path.is_empty() { "$".to_string() } else { path };
    out.push(PropertyMismatch {
        entry: entry.to_string(),
        path,
        kind,
    });
}
