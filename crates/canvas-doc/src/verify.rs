//! Round-trip verification used by conformance tooling.
//!
//! [`compare_archives`] is the primitive: a whole-archive checksum over
//! normalized entries decides equality, and only on a mismatch is each
//! entry examined to report what changed. The stress tests chain the codecs,
//! the diff engine and the merge engine and check that nothing drifts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::codec::archive::Archive;
use crate::codec::entropy::{is_entropy_entry, Entropy, ENTROPY_DIR};
use crate::codec::msapp::{load_archive, report_archive_error, save_archive, to_archive};
use crate::codec::source::{load_from_source, save_to_source};
use crate::codec::SaveOptions;
use crate::compare::report_json_mismatches;
use crate::diff::content_deltas;
use crate::error::{CanvasError, ErrorList};
use crate::fingerprint::{content_equal, fingerprint_bytes, Fingerprint, FingerprintBuilder};
use crate::merge::merge;
use crate::model::Document;
use crate::normalize::normalize_fragment;

const ARCHIVE_TAG: u8 = b'A';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Compare entropy entries too.
    pub strict: bool,
}

impl CompareOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// Normalized entry contents, entropy dropped unless strict.
fn normalized_entries(
    archive: &Archive,
    options: &CompareOptions,
    errors: &mut ErrorList,
) -> BTreeMap<String, Vec<u8>> {
    archive
        .entries()
        .filter(|(name, _)| options.strict || !is_entropy_entry(name))
        .map(|(name, bytes)| {
            let normalized = normalize_fragment(name, bytes).unwrap_or_else(|err| {
                errors.format_error(name, err.to_string());
                bytes.to_vec()
            });
            (name.to_string(), normalized)
        })
        .collect()
}

fn whole_checksum(entries: &BTreeMap<String, Vec<u8>>) -> Fingerprint {
    let mut b = FingerprintBuilder::new(ARCHIVE_TAG);
    b.update_len(entries.len());
    for (name, bytes) in entries {
        b.update_str(name);
        b.update_fingerprint(&fingerprint_bytes(bytes));
    }
    b.finish()
}

/// Whole-archive checksum over normalized entries.
pub fn archive_checksum(archive: &Archive, options: &CompareOptions) -> Fingerprint {
    whole_checksum(&normalized_entries(archive, options, &mut ErrorList::new()))
}

/// Compare two in-memory archives, recording every difference in `errors`.
pub fn compare_archive_contents(
    a: &Archive,
    b: &Archive,
    options: &CompareOptions,
    errors: &mut ErrorList,
) -> bool {
    let left = normalized_entries(a, options, errors);
    let right = normalized_entries(b, options, errors);
    let (ca, cb) = (whole_checksum(&left), whole_checksum(&right));
    if ca == cb {
        tracing::trace!(checksum = %ca, "archives match");
        return true;
    }
    tracing::debug!(left = %ca, right = %cb, "archive checksum mismatch");

    for (name, bytes) in &left {
        let Some(other) = right.get(name) else {
            errors.checksum_mismatch(name, "entry missing from the second archive");
            continue;
        };
        if bytes == other {
            continue;
        }
        let reported = match (
            serde_json::from_slice::<Value>(bytes),
            serde_json::from_slice::<Value>(other),
        ) {
            (Ok(va), Ok(vb)) => report_json_mismatches(name, &va, &vb, errors),
            _ => 0,
        };
        if reported == 0 {
            errors.checksum_mismatch(name, "entry content differs");
        }
    }
    for name in right.keys().filter(|name| !left.contains_key(*name)) {
        errors.checksum_mismatch(name, "entry added in the second archive");
    }
    false
}

/// Compare two archive files.
pub fn compare_archives(
    a: impl AsRef<Path>,
    b: impl AsRef<Path>,
    options: &CompareOptions,
    errors: &mut ErrorList,
) -> bool {
    let a = open_archive(a.as_ref(), errors);
    let b = open_archive(b.as_ref(), errors);
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    compare_archive_contents(&a, &b, options, errors)
}

fn open_archive(path: &Path, errors: &mut ErrorList) -> Option<Archive> {
    match Archive::open(path) {
        Ok(archive) => Some(archive),
        Err(err) => {
            report_archive_error(&path.display().to_string(), err, errors);
            None
        }
    }
}

/// Compare two documents through their archive form.
///
/// Both sides are saved with the same entropy, so strictness has no effect
/// on documents that were never persisted.
pub fn compare_documents(
    a: &Document,
    b: &Document,
    options: &CompareOptions,
    errors: &mut ErrorList,
) -> bool {
    let save = SaveOptions {
        entropy: Some(Entropy::generate(a)),
    };
    let left = to_archive(a, &save, errors);
    let right = to_archive(b, &save, errors);
    let (Some(left), Some(right)) = (left, right) else {
        return false;
    };
    compare_archive_contents(&left, &right, options, errors)
}

// ── Stress tests ──────────────────────────────────────────────────────────

fn load_checked(path: &Path) -> Result<Document, CanvasError> {
    let (doc, errors) = load_archive(path);
    errors.ensure_ok()?;
    doc.ok_or(CanvasError::Errors(errors))
}

fn report(what: &str, errors: &ErrorList) {
    for entry in errors.errors() {
        tracing::warn!(check = what, "{entry}");
    }
}

/// Unpack to sources, delete the entropy directory, and load again.
pub fn remove_entropy(path: impl AsRef<Path>) -> Result<Document, CanvasError> {
    let doc = load_checked(path.as_ref())?;
    let dir = tempfile::tempdir()?;
    save_to_source(&doc, dir.path(), &SaveOptions::default()).ensure_ok()?;
    let entropy_dir = dir.path().join(ENTROPY_DIR);
    if !entropy_dir.is_dir() {
        return Err(CanvasError::Usage(format!(
            "missing entropy directory {}",
            entropy_dir.display()
        )));
    }
    fs::remove_dir_all(&entropy_dir)?;
    let (reloaded, errors) = load_from_source(dir.path());
    errors.ensure_ok()?;
    reloaded.ok_or(CanvasError::Errors(errors))
}

/// No content deltas between `a` and `b`, and equal persisted forms.
///
/// Strict compares the saved archives directly; otherwise both are saved,
/// stripped of entropy, and compared again.
pub fn has_no_deltas(a: &Document, b: &Document, strict: bool) -> Result<bool, CanvasError> {
    let deltas = content_deltas(a, b);
    if !deltas.is_empty() {
        for delta in &deltas {
            tracing::warn!(%delta, "unexpected delta");
        }
        return Ok(false);
    }

    let mut errors = ErrorList::new();
    let same = if strict {
        compare_documents(a, b, &CompareOptions::strict(), &mut errors)
    } else {
        let dir = tempfile::tempdir()?;
        let (path_a, path_b) = (dir.path().join("a.msapp"), dir.path().join("b.msapp"));
        save_archive(a, &path_a, &SaveOptions::default()).ensure_ok()?;
        save_archive(b, &path_b, &SaveOptions::default()).ensure_ok()?;
        let (a, b) = (remove_entropy(&path_a)?, remove_entropy(&path_b)?);
        compare_documents(&a, &b, &CompareOptions::default(), &mut errors)
    };
    report("has_no_deltas", &errors);
    Ok(same)
}

/// A clone of the loaded document is indistinguishable from it.
pub fn test_clone(path: impl AsRef<Path>) -> Result<bool, CanvasError> {
    let doc = load_checked(path.as_ref())?;
    let clone = doc.clone();
    has_no_deltas(&doc, &clone, true)
}

/// A loaded document has no deltas against itself.
pub fn diff_stress_test(path: impl AsRef<Path>) -> Result<bool, CanvasError> {
    let doc = load_checked(path.as_ref())?;
    has_no_deltas(&doc, &doc, false)
}

/// Archive → model → archive must compare equal, model → sources → model
/// must keep the content, and the clone and diff checks must pass.
pub fn stress_test(path: impl AsRef<Path>) -> Result<bool, CanvasError> {
    let path = path.as_ref();
    let _span = tracing::debug_span!("stress_test", path = %path.display()).entered();
    let doc = load_checked(path)?;

    let dir = tempfile::tempdir()?;
    let resaved = dir.path().join("resaved.msapp");
    save_archive(&doc, &resaved, &SaveOptions::default()).ensure_ok()?;
    let mut errors = ErrorList::new();
    if !compare_archives(path, &resaved, &CompareOptions::default(), &mut errors) {
        report("archive round trip", &errors);
        return Ok(false);
    }

    let sources = dir.path().join("src");
    save_to_source(&doc, &sources, &SaveOptions::default()).ensure_ok()?;
    let (reloaded, errors) = load_from_source(&sources);
    errors.ensure_ok()?;
    let Some(reloaded) = reloaded else {
        return Err(CanvasError::Errors(errors));
    };
    if !content_equal(&doc, &reloaded) {
        tracing::warn!("source round trip changed the document");
        return Ok(false);
    }

    Ok(test_clone(path)? && diff_stress_test(path)?)
}

/// `merge(a, b, b)` must equal `b` and `merge(b, a, a)` must equal `a`.
pub fn merge_stress_test(a: impl AsRef<Path>, b: impl AsRef<Path>) -> Result<bool, CanvasError> {
    let a = load_checked(a.as_ref())?;
    let b = load_checked(b.as_ref())?;
    let a_new = merge(&a, &b, &b).document;
    let b_new = merge(&b, &a, &a).document;
    Ok(has_no_deltas(&b, &a_new, false)? && has_no_deltas(&a, &b_new, false)?)
}

/// `merge(d, d', d)`, where `d'` is `d` after a save and reload, is clean
/// and changes nothing.
pub fn self_merge_stress_test(path: impl AsRef<Path>) -> Result<bool, CanvasError> {
    let doc = load_checked(path.as_ref())?;
    let dir = tempfile::tempdir()?;
    let resaved = dir.path().join("resaved.msapp");
    save_archive(&doc, &resaved, &SaveOptions::default()).ensure_ok()?;
    let reloaded = load_checked(&resaved)?;
    let outcome = merge(&doc, &reloaded, &doc);
    if !outcome.is_clean() {
        for conflict in &outcome.conflicts {
            tracing::warn!(%conflict, "conflict in self merge");
        }
        return Ok(false);
    }
    has_no_deltas(&doc, &outcome.document, false)
}
