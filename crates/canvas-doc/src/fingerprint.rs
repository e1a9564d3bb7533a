//! Stable fingerprints of nodes, fragments and whole documents.
//!
//! Every value is fed to SHA-256 as a tagged, length-prefixed stream so
//! that distinct structures cannot collide by concatenation. Property maps
//! are hashed in key order and formulas in normalized form; children are
//! hashed in stored order; screens, data sources and resources in name
//! order. The result depends only on document content, never on map
//! iteration order, process, or serialization incidentals.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::{
    Control, ControlKind, DataSource, Document, PropertyMap, PropertyValue, Resource, Screen,
    Theme,
};
use crate::normalize::{
    canonical_json_string, normalize_formula, normalize_fragment, NormalizeError,
};

// ── Type tags ─────────────────────────────────────────────────────────────

const DOCUMENT_TAG: u8 = b'D';
const SCREEN_TAG: u8 = b'S';
const CONTROL_TAG: u8 = b'C';
const PROPERTIES_TAG: u8 = b'P';
const FORMULA_TAG: u8 = b'F';
const THEME_TAG: u8 = b'T';
const DATA_SOURCE_TAG: u8 = b'Q';
const RESOURCE_TAG: u8 = b'R';
const JSON_TAG: u8 = b'J';
const FRAGMENT_TAG: u8 = b'B';

/// 256-bit content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut out = String::with_capacity(64);
        for b in self.0 {
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0f) as usize] as char);
        }
        out
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

// ── Hash state ────────────────────────────────────────────────────────────

/// Incremental fingerprint builder.
#[derive(Clone, Default)]
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    pub fn new(tag: u8) -> Self {
        let mut builder = Self::default();
        builder.update_tag(tag);
        builder
    }

    pub fn update_tag(&mut self, tag: u8) {
        self.hasher.update([tag]);
    }

    pub fn update_len(&mut self, len: usize) {
        self.hasher.update((len as u64).to_le_bytes());
    }

    pub fn update_str(&mut self, s: &str) {
        self.update_bytes(s.as_bytes());
    }

    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.update_len(bytes.len());
        self.hasher.update(bytes);
    }

    pub fn update_fingerprint(&mut self, fp: &Fingerprint) {
        self.hasher.update(fp.0);
    }

    /// Mix a JSON value in canonical form.
    pub fn update_json(&mut self, value: &Value) {
        self.update_tag(JSON_TAG);
        self.update_str(&canonical_json_string(value));
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(self.hasher.finalize().into())
    }
}

// ── Fragments ─────────────────────────────────────────────────────────────

/// Fingerprint of raw bytes.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    let mut b = FingerprintBuilder::new(FRAGMENT_TAG);
    b.update_bytes(bytes);
    b.finish()
}

/// Fingerprint of a named fragment after normalization.
pub fn fingerprint_fragment(name: &str, bytes: &[u8]) -> Result<Fingerprint, NormalizeError> {
    Ok(fingerprint_bytes(&normalize_fragment(name, bytes)?))
}

// ── Model nodes ───────────────────────────────────────────────────────────

pub fn fingerprint_value(value: &PropertyValue) -> Fingerprint {
    let mut b = FingerprintBuilder::default();
    update_value(&mut b, value);
    b.finish()
}

fn update_value(b: &mut FingerprintBuilder, value: &PropertyValue) {
    match value {
        PropertyValue::Formula(text) => {
            b.update_tag(FORMULA_TAG);
            b.update_str(&normalize_formula(text));
        }
    }
}

pub fn fingerprint_properties(properties: &PropertyMap) -> Fingerprint {
    let mut b = FingerprintBuilder::new(PROPERTIES_TAG);
    let mut keys: Vec<&String> = properties.keys().collect();
    keys.sort();
    b.update_len(keys.len());
    for key in keys {
        b.update_str(key);
        update_value(&mut b, &properties[key]);
    }
    b.finish()
}

/// Fingerprint of a control including its name.
pub fn fingerprint_control(control: &Control) -> Fingerprint {
    let mut b = FingerprintBuilder::new(CONTROL_TAG);
    b.update_str(control.name());
    b.update_fingerprint(&content_fingerprint(control));
    b.finish()
}

/// Fingerprint of everything about a control except its own name.
///
/// Two siblings with equal content fingerprints differ only by name,
/// which is how the diff recognizes renames.
pub fn content_fingerprint(control: &Control) -> Fingerprint {
    let mut b = FingerprintBuilder::new(CONTROL_TAG);
    let kind = control.kind();
    b.update_str(kind.discriminator());
    match kind {
        ControlKind::BuiltIn(template) => {
            b.update_str(&template.name);
            b.update_str(&template.version);
        }
        ControlKind::Custom { uri } => b.update_str(uri),
    }
    b.update_fingerprint(&fingerprint_properties(control.properties()));
    b.update_len(control.children().len());
    for child in control.children() {
        b.update_fingerprint(&fingerprint_control(child));
    }
    b.finish()
}

pub fn fingerprint_screen(screen: &Screen) -> Fingerprint {
    let mut b = FingerprintBuilder::new(SCREEN_TAG);
    b.update_str(screen.name());
    b.update_fingerprint(&fingerprint_properties(screen.properties()));
    b.update_len(screen.controls().len());
    for control in screen.controls() {
        b.update_fingerprint(&fingerprint_control(control));
    }
    b.finish()
}

pub fn fingerprint_theme(theme: &Theme) -> Fingerprint {
    let mut b = FingerprintBuilder::new(THEME_TAG);
    b.update_str(&theme.name);
    b.update_json(&theme.palette);
    b.finish()
}

pub fn fingerprint_data_source(source: &DataSource) -> Fingerprint {
    let mut b = FingerprintBuilder::new(DATA_SOURCE_TAG);
    b.update_str(&source.name);
    b.update_str(&source.kind);
    b.update_json(&source.definition);
    b.finish()
}

pub fn fingerprint_resource(resource: &Resource) -> Fingerprint {
    let mut b = FingerprintBuilder::new(RESOURCE_TAG);
    b.update_str(&resource.name);
    b.update_str(resource.kind.as_str());
    b.update_str(&resource.path);
    b.update_bytes(&resource.content);
    b.finish()
}

/// Whole-document fingerprint.
pub fn fingerprint_document(doc: &Document) -> Fingerprint {
    let mut b = FingerprintBuilder::new(DOCUMENT_TAG);
    b.update_fingerprint(&fingerprint_properties(doc.properties()));
    b.update_fingerprint(&fingerprint_theme(doc.theme()));

    let mut screens: Vec<&Screen> = doc.screens().iter().collect();
    screens.sort_by(|a, b| a.name().cmp(b.name()));
    b.update_len(screens.len());
    for screen in screens {
        b.update_fingerprint(&fingerprint_screen(screen));
    }

    b.update_len(doc.data_sources().len());
    for source in doc.data_sources().values() {
        b.update_fingerprint(&fingerprint_data_source(source));
    }
    b.update_len(doc.resources().len());
    for resource in doc.resources().values() {
        b.update_fingerprint(&fingerprint_resource(resource));
    }
    let fp = b.finish();
    tracing::trace!(fingerprint = %fp, screens = doc.screens().len(), "document fingerprint");
    fp
}

/// True if both documents have the same content.
pub fn content_equal(a: &Document, b: &Document) -> bool {
    fingerprint_document(a) == fingerprint_document(b)
}
