//! Persisted forms of a document.
//!
//! - [`msapp`]: the packaged archive, one JSON entry per screen plus global
//!   entries, inside an [`Archive`] container
//! - [`source`]: the editable text tree, one `.pa.yaml` file per screen plus
//!   JSON side files
//!
//! Both boundaries report recoverable problems through an [`ErrorList`] and
//! return no document only when the input cannot be read as a tree at all.

pub mod archive;
pub mod entropy;
pub mod msapp;
pub mod source;
pub mod wire;
pub mod yaml;

use std::collections::BTreeMap;
use std::fmt;

use canvas_address::Address;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use archive::{Archive, ArchiveError};
pub use entropy::Entropy;
pub use msapp::{
    from_archive, load_archive, load_archive_from, save_archive, save_archive_to, to_archive,
};
pub use source::{load_from_source, save_to_source};

use crate::error::{ErrorKind, ErrorList};
use crate::model::{DataSource, Document, PropertyMap, Resource, Screen, Theme};
use wire::HeaderJson;

/// Document version written by this crate.
pub const CURRENT_DOC_VERSION: DocVersion = DocVersion { major: 1, minor: 3 };
/// Oldest major version that can still be loaded.
pub const MIN_SUPPORTED_MAJOR: u32 = 1;
pub const FORMAT_VERSION: u32 = 1;

/// `major.minor` document version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocVersion {
    pub major: u32,
    pub minor: u32,
}

impl DocVersion {
    pub fn parse(s: &str) -> Option<Self> {
        let (major, minor) = s.trim().split_once('.').unwrap_or((s.trim(), "0"));
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl fmt::Display for DocVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Knobs for saving.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Entropy to write; `None` generates a fresh one.
    pub entropy: Option<Entropy>,
}

impl SaveOptions {
    pub(crate) fn entropy_for(&self, doc: &Document) -> Entropy {
        self.entropy.clone().unwrap_or_else(|| Entropy::generate(doc))
    }
}

/// Validate a persisted version. `false` means the document cannot be loaded.
pub(crate) fn check_version(raw: &str, location: &str, errors: &mut ErrorList) -> bool {
    let Some(version) = DocVersion::parse(raw) else {
        errors.format_error(location, format!("unreadable document version `{raw}`"));
        return false;
    };
    if version.major < MIN_SUPPORTED_MAJOR {
        errors.version_error(format!(
            "document version {version} is older than the oldest supported {MIN_SUPPORTED_MAJOR}.0"
        ));
        return false;
    }
    if version.major > CURRENT_DOC_VERSION.major {
        errors.version_error(format!(
            "document version {version} is newer than the supported {CURRENT_DOC_VERSION}"
        ));
        return false;
    }
    if version.minor > CURRENT_DOC_VERSION.minor {
        errors.warning(
            ErrorKind::Version,
            Some(location.to_string()),
            format!(
                "document version {version} is newer than {CURRENT_DOC_VERSION}; loading anyway"
            ),
        );
    }
    true
}

pub(crate) fn header_for(doc: &Document) -> HeaderJson {
    HeaderJson {
        doc_version: CURRENT_DOC_VERSION.to_string(),
        format_version: FORMAT_VERSION,
        screen_order: doc.screens().iter().map(|s| s.name().to_string()).collect(),
    }
}

/// File-system safe form of a node name: reserved characters and `%`
/// become `%XX`.
pub fn escape_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let reserved = matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%');
        if c.is_control() || reserved {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode a JSON entry the document cannot do without.
pub(crate) fn decode_required<T: DeserializeOwned>(
    location: &str,
    bytes: Option<&[u8]>,
    errors: &mut ErrorList,
) -> Option<T> {
    let Some(bytes) = bytes else {
        errors.format_error(location, "missing required entry");
        return None;
    };
    decode_json(location, bytes, errors)
}

/// Decode an optional JSON entry. Absence is a warning.
pub(crate) fn decode_optional<T: DeserializeOwned>(
    location: &str,
    bytes: Option<&[u8]>,
    errors: &mut ErrorList,
) -> Option<T> {
    let Some(bytes) = bytes else {
        errors.warning(
            ErrorKind::Format,
            Some(location.to_string()),
            "entry missing, using defaults",
        );
        return None;
    };
    decode_json(location, bytes, errors)
}

pub(crate) fn decode_json<T: DeserializeOwned>(
    location: &str,
    bytes: &[u8],
    errors: &mut ErrorList,
) -> Option<T> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            errors.format_error(location, err.to_string());
            None
        }
    }
}

pub(crate) fn encode_json<T: Serialize>(
    location: &str,
    value: &T,
    errors: &mut ErrorList,
) -> Option<Vec<u8>> {
    match serde_json::to_vec_pretty(value) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            errors.format_error(location, err.to_string());
            None
        }
    }
}

/// Decoded pieces of a document, before the structural checks.
#[derive(Debug, Default)]
pub(crate) struct DocumentParts {
    pub properties: PropertyMap,
    pub theme: Theme,
    pub data_sources: Vec<DataSource>,
    pub resources: Vec<Resource>,
    /// Screens with the entry or file they came from.
    pub screens: Vec<(String, Screen)>,
    pub screen_order: Vec<String>,
}

impl DocumentParts {
    pub fn set_globals(
        &mut self,
        theme: Option<wire::ThemesJson>,
        data_sources: Option<wire::DataSourcesJson>,
        resources: Option<(&str, wire::ResourcesJson)>,
        errors: &mut ErrorList,
    ) {
        self.theme = theme.map(wire::ThemesJson::into_theme).unwrap_or_default();
        self.data_sources = data_sources
            .map(wire::DataSourcesJson::into_sources)
            .unwrap_or_default();
        if let Some((location, resources)) = resources {
            match resources.into_resources() {
                Ok(resources) => self.resources = resources,
                Err(err) => errors.format_error(location, err.to_string()),
            }
        }
    }

    /// Build the document through its structural operations, recording
    /// rejected pieces instead of failing.
    pub fn assemble(self, errors: &mut ErrorList) -> Document {
        let mut doc = Document::new();
        for (key, value) in self.properties {
            if let Err(err) = doc.set_property(&Address::root(), &key, value) {
                errors.structural("App", &err);
            }
        }
        doc.set_theme(self.theme);
        for source in self.data_sources {
            if let Err(err) = doc.set_data_source(source) {
                errors.structural("DataSources", &err);
            }
        }
        for resource in self.resources {
            if let Err(err) = doc.set_resource(resource) {
                errors.structural("Resources", &err);
            }
        }

        let rank: BTreeMap<&str, usize> = self
            .screen_order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        let mut screens = self.screens;
        screens.sort_by(|(_, a), (_, b)| {
            let ra = rank.get(a.name()).copied().unwrap_or(usize::MAX);
            let rb = rank.get(b.name()).copied().unwrap_or(usize::MAX);
            ra.cmp(&rb).then_with(|| a.name().cmp(b.name()))
        });
        for name in &self.screen_order {
            if !screens.iter().any(|(_, s)| s.name() == name.as_str()) {
                errors.warning(
                    ErrorKind::Structural,
                    Some("Header".to_string()),
                    format!("screen `{name}` listed in the screen order has no content"),
                );
            }
        }
        for (location, screen) in screens {
            if let Err(err) = doc.add_screen(screen) {
                errors.structural(location, &err);
            }
        }
        tracing::debug!(
            screens = doc.screens().len(),
            controls = doc.control_count(),
            "assembled document"
        );
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_escape_reserved_characters() {
        assert_eq!(escape_file_name("Screen1"), "Screen1");
        assert_eq!(escape_file_name("a/b:c"), "a%2Fb%3Ac");
        assert_eq!(escape_file_name("100%"), "100%25");
        assert_ne!(escape_file_name("a/b"), escape_file_name("a%2Fb"));
    }

    #[test]
    fn optional_entries_warn_required_entries_fail() {
        let mut errors = ErrorList::new();
        let theme: Option<wire::ThemesJson> = decode_optional("Themes.json", None, &mut errors);
        assert!(theme.is_none());
        assert!(errors.has_warnings() && !errors.has_errors());

        let header: Option<HeaderJson> = decode_required("Header.json", None, &mut errors);
        assert!(header.is_none() && errors.has_errors());

        let mut errors = ErrorList::new();
        let broken: Option<HeaderJson> =
            decode_required("Header.json", Some(b"{".as_slice()), &mut errors);
        assert!(broken.is_none() && errors.has_kind(ErrorKind::Format));
    }

    #[test]
    fn version_parsing() {
        assert_eq!(DocVersion::parse("1.2"), Some(DocVersion { major: 1, minor: 2 }));
        assert_eq!(DocVersion::parse("2"), Some(DocVersion { major: 2, minor: 0 }));
        assert_eq!(DocVersion::parse("x.1"), None);
    }

    #[test]
    fn version_checks() {
        let mut errors = ErrorList::new();
        assert!(check_version(&CURRENT_DOC_VERSION.to_string(), "Header.json", &mut errors));
        assert!(errors.is_empty());

        assert!(!check_version("0.9", "Header.json", &mut errors));
        assert!(errors.has_kind(ErrorKind::Version) && errors.has_errors());

        let mut errors = ErrorList::new();
        let DocVersion { major, minor } = CURRENT_DOC_VERSION;
        let newer_minor = format!("{major}.{}", minor + 1);
        assert!(check_version(&newer_minor, "Header.json", &mut errors));
        assert!(errors.has_warnings() && !errors.has_errors());
    }

    #[test]
    fn screens_follow_header_order() {
        let parts = DocumentParts {
            screens: vec![
                ("a".into(), Screen::new("A")),
                ("b".into(), Screen::new("B")),
                ("c".into(), Screen::new("C")),
            ],
            screen_order: vec!["C".into(), "A".into(), "Gone".into()],
            ..Default::default()
        };
        let mut errors = ErrorList::new();
        let doc = parts.assemble(&mut errors);
        let names: Vec<&str> = doc.screens().iter().map(Screen::name).collect();
        assert_eq!(names, ["C", "A", "B"]);
        assert!(errors.has_warnings() && !errors.has_errors());
    }

    #[test]
    fn duplicate_screens_are_structural_errors() {
        let parts = DocumentParts {
            screens: vec![("x".into(), Screen::new("A")), ("y".into(), Screen::new("A"))],
            ..Default::default()
        };
        let mut errors = ErrorList::new();
        let doc = parts.assemble(&mut errors);
        assert_eq!(doc.screens().len(), 1);
        assert!(errors.has_kind(ErrorKind::Structural));
    }
}
