//! Document ↔ packaged archive.
//!
//! Entry layout:
//!
//! ```text
//! Header.json                   document version, screen order
//! Properties.json               app properties
//! References/Themes.json
//! References/DataSources.json
//! References/Resources.json     payloads inline, base64
//! Controls/<screen>.json        one per screen, control tree nested
//! Entropy/Entropy.json          regenerated on every save
//! ```

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{ErrorKind, ErrorList, StructuralError};
use crate::model::{Document, Resource, ResourceKind};

use super::archive::{Archive, ArchiveError};
use super::entropy::{is_entropy_entry, ENTROPY_ENTRY};
use super::wire::{
    properties_from_wire, properties_to_wire, AppPropertiesJson, DataSourcesJson, HeaderJson,
    ResourcesJson, ScreenJson, ThemesJson,
};
use super::{
    check_version, decode_json, decode_optional, encode_json, escape_file_name, header_for,
    DocumentParts, SaveOptions,
};

pub const HEADER_ENTRY: &str = "Header.json";
pub const PROPERTIES_ENTRY: &str = "Properties.json";
pub const THEMES_ENTRY: &str = "References/Themes.json";
pub const DATA_SOURCES_ENTRY: &str = "References/DataSources.json";
pub const RESOURCES_ENTRY: &str = "References/Resources.json";
pub const CONTROLS_DIR: &str = "Controls";
const CONTROLS_PREFIX: &str = "Controls/";

const KNOWN_ENTRIES: [&str; 5] = [
    HEADER_ENTRY,
    PROPERTIES_ENTRY,
    THEMES_ENTRY,
    DATA_SOURCES_ENTRY,
    RESOURCES_ENTRY,
];

pub fn screen_entry_name(screen: &str) -> String {
    format!("{CONTROLS_DIR}/{}.json", escape_file_name(screen))
}

// ── Decoding ──────────────────────────────────────────────────────────────

/// Decode a document from an archive already in memory.
///
/// Returns `None` only when the header is missing, unreadable, or of an
/// unsupported version. Everything else is recorded and skipped.
pub fn from_archive(archive: &Archive, errors: &mut ErrorList) -> Option<Document> {
    let header_bytes = match archive.get_required_entry(HEADER_ENTRY) {
        Ok(bytes) => bytes,
        Err(err) => {
            errors.format_error(HEADER_ENTRY, err.to_string());
            return None;
        }
    };
    let header: HeaderJson = decode_json(HEADER_ENTRY, header_bytes, errors)?;
    if !check_version(&header.doc_version, HEADER_ENTRY, errors) {
        return None;
    }

    let mut parts = DocumentParts {
        screen_order: header.screen_order,
        ..Default::default()
    };
    let app: Option<AppPropertiesJson> =
        decode_optional(PROPERTIES_ENTRY, archive.get_entry(PROPERTIES_ENTRY), errors);
    if let Some(app) = app {
        parts.properties = properties_from_wire(app.properties);
    }
    let theme: Option<ThemesJson> =
        decode_optional(THEMES_ENTRY, archive.get_entry(THEMES_ENTRY), errors);
    let data_sources: Option<DataSourcesJson> =
        decode_optional(DATA_SOURCES_ENTRY, archive.get_entry(DATA_SOURCES_ENTRY), errors);
    let resources: Option<ResourcesJson> =
        decode_optional(RESOURCES_ENTRY, archive.get_entry(RESOURCES_ENTRY), errors);
    let resources = resources.map(|r| (RESOURCES_ENTRY, r));
    parts.set_globals(theme, data_sources, resources, errors);

    for (name, bytes) in archive.directory_entries(CONTROLS_DIR, Some("json")) {
        let Some(wire) = decode_json::<ScreenJson>(name, bytes, errors) else {
            continue;
        };
        match wire.into_screen() {
            Ok(screen) => parts.screens.push((name.to_string(), screen)),
            Err(err) => errors.format_error(name, err.to_string()),
        }
    }
    for name in archive.entry_names() {
        if name.starts_with(CONTROLS_PREFIX) {
            if !name.to_ascii_lowercase().ends_with(".json") {
                errors.warning(
                    ErrorKind::Format,
                    Some(name.to_string()),
                    "ignored non-JSON control entry",
                );
            }
        } else if !KNOWN_ENTRIES.contains(&name) && !is_entropy_entry(name) {
            errors.warning(ErrorKind::Format, Some(name.to_string()), "ignored unknown entry");
        }
    }

    let doc = parts.assemble(errors);
    tracing::debug!(entries = archive.len(), "decoded archive");
    Some(doc)
}

/// Load an archive file.
pub fn load_archive(path: impl AsRef<Path>) -> (Option<Document>, ErrorList) {
    let path = path.as_ref();
    let mut errors = ErrorList::new();
    let location = path.display().to_string();
    let doc = match Archive::open(path) {
        Ok(archive) => from_archive(&archive, &mut errors),
        Err(err) => {
            report_archive_error(&location, err, &mut errors);
            None
        }
    };
    (doc, errors)
}

/// Load an archive from any byte stream.
pub fn load_archive_from<R: Read>(reader: R) -> (Option<Document>, ErrorList) {
    let mut errors = ErrorList::new();
    let doc = match Archive::read_from(reader) {
        Ok(archive) => from_archive(&archive, &mut errors),
        Err(err) => {
            report_archive_error("<stream>", err, &mut errors);
            None
        }
    };
    (doc, errors)
}

pub(crate) fn report_archive_error(location: &str, err: ArchiveError, errors: &mut ErrorList) {
    match err {
        ArchiveError::Io(io) => errors.io(location, &io),
        other => errors.format_error(location, other.to_string()),
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────

/// Encode a document into an archive. `None` if any entry failed.
pub fn to_archive(
    doc: &Document,
    options: &SaveOptions,
    errors: &mut ErrorList,
) -> Option<Archive> {
    let before = errors.errors().count();
    let app = AppPropertiesJson {
        properties: properties_to_wire(doc.properties()),
    };
    let mut entries = vec![
        (HEADER_ENTRY.to_string(), encode_json(HEADER_ENTRY, &header_for(doc), errors)),
        (PROPERTIES_ENTRY.to_string(), encode_json(PROPERTIES_ENTRY, &app, errors)),
        (
            THEMES_ENTRY.to_string(),
            encode_json(THEMES_ENTRY, &ThemesJson::from_theme(doc.theme()), errors),
        ),
        (
            DATA_SOURCES_ENTRY.to_string(),
            encode_json(
                DATA_SOURCES_ENTRY,
                &DataSourcesJson::from_sources(doc.data_sources().values()),
                errors,
            ),
        ),
        (
            RESOURCES_ENTRY.to_string(),
            encode_json(
                RESOURCES_ENTRY,
                &ResourcesJson::from_resources(doc.resources().values()),
                errors,
            ),
        ),
    ];
    for screen in doc.screens() {
        let name = screen_entry_name(screen.name());
        let bytes = encode_json(&name, &ScreenJson::from_screen(screen), errors);
        entries.push((name, bytes));
    }
    let entropy = options.entropy_for(doc);
    entries.push((ENTROPY_ENTRY.to_string(), encode_json(ENTROPY_ENTRY, &entropy, errors)));

    let mut archive = Archive::new();
    for (name, bytes) in entries {
        let Some(bytes) = bytes else { continue };
        if let Err(err) = archive.create_entry(&name, bytes) {
            errors.format_error(name, err.to_string());
        }
    }
    if errors.errors().count() > before {
        return None;
    }
    tracing::debug!(
        entries = archive.len(),
        bytes = archive.decompressed_size(),
        "encoded archive"
    );
    Some(archive)
}

/// Save to an archive file.
pub fn save_archive(doc: &Document, path: impl AsRef<Path>, options: &SaveOptions) -> ErrorList {
    let path = path.as_ref();
    let location = path.display().to_string();
    let mut errors = ErrorList::new();
    let Some(archive) = to_archive(doc, options, &mut errors) else {
        return errors;
    };
    if let Err(err) = archive.save(path) {
        report_archive_error(&location, err, &mut errors);
    }
    errors
}

/// Save to any byte sink.
pub fn save_archive_to<W: Write>(doc: &Document, writer: W, options: &SaveOptions) -> ErrorList {
    let mut errors = ErrorList::new();
    if let Some(archive) = to_archive(doc, options, &mut errors) {
        if let Err(err) = archive.write_to(writer) {
            report_archive_error("<stream>", err, &mut errors);
        }
    }
    errors
}

// ── Assets ────────────────────────────────────────────────────────────────

/// Register an image resource named after the file stem, made unique
/// with a numeric suffix. Returns the resource name.
pub fn add_image(
    doc: &mut Document,
    file_name: &str,
    content: Vec<u8>,
) -> Result<String, StructuralError> {
    let base_name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = match base_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base_name,
    };
    let mut name = stem.to_string();
    let mut suffix = 1;
    while doc.resource(&name).is_some() {
        name = format!("{stem}{suffix}");
        suffix += 1;
    }
    doc.set_resource(Resource::new(name.clone(), ResourceKind::Image, base_name, content))?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::content_equal;
    use crate::model::{Control, DataSource, Screen, TemplateRef, Theme};
    use canvas_address::Address;
    use serde_json::json;

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.set_property(&Address::root(), "OnStart", "Set(x, 1)".into()).unwrap();
        doc.set_theme(Theme {
            name: "Dark".into(),
            palette: json!({"Primary": "#000"}),
        });
        doc.set_data_source(DataSource::new("Accounts", "Table", json!({"Columns": ["Id"]})))
            .unwrap();
        let title = Control::builtin("Title", "Label").with_property("Text", "ThisItem.Name");
        let gallery =
            Control::builtin("Gallery1", TemplateRef::new("Gallery", "1.0")).with_child(title);
        doc.add_screen(Screen::new("Main").with_property("Fill", "White").with_control(gallery))
            .unwrap();
        doc.add_screen(Screen::new("Details")).unwrap();
        add_image(&mut doc, "assets/logo.png", vec![1, 2, 3]).unwrap();
        doc
    }

    #[test]
    fn archive_roundtrip_preserves_content() {
        let doc = sample();
        let mut errors = ErrorList::new();
        let archive = to_archive(&doc, &SaveOptions::default(), &mut errors).unwrap();
        assert!(errors.is_empty(), "{errors}");
        assert!(archive.get_entry("Controls/Main.json").is_some());
        assert!(archive.get_entry(ENTROPY_ENTRY).is_some());

        let back = from_archive(&archive, &mut errors).unwrap();
        assert!(errors.is_empty(), "{errors}");
        assert!(content_equal(&doc, &back));
        let order: Vec<&str> = back.screens().iter().map(|s| s.name()).collect();
        assert_eq!(order, ["Main", "Details"]);
    }

    #[test]
    fn empty_stream_yields_no_document() {
        let (doc, errors) = load_archive_from(std::io::empty());
        assert!(doc.is_none());
        assert!(errors.has_kind(ErrorKind::Format));
    }

    #[test]
    fn missing_file_yields_no_document() {
        let dir = tempfile::tempdir().unwrap();
        let (doc, errors) = load_archive(dir.path().join("missing.msapp"));
        assert!(doc.is_none());
        assert!(errors.has_kind(ErrorKind::Io));
    }

    #[test]
    fn missing_optional_entries_are_warnings() {
        let mut archive = Archive::new();
        let header = serde_json::to_vec(&header_for(&Document::new())).unwrap();
        archive.create_entry(HEADER_ENTRY, header).unwrap();
        let mut errors = ErrorList::new();
        let doc = from_archive(&archive, &mut errors).unwrap();
        assert!(doc.screens().is_empty());
        assert!(errors.has_warnings() && !errors.has_errors());
    }

    #[test]
    fn corrupt_screen_skipped_with_error() {
        let doc = sample();
        let mut errors = ErrorList::new();
        let mut archive = to_archive(&doc, &SaveOptions::default(), &mut errors).unwrap();
        archive.remove_entry("Controls/Details.json").unwrap();
        archive
            .create_entry("Controls/Details.json", b"{ not json".to_vec())
            .unwrap();
        let back = from_archive(&archive, &mut errors).unwrap();
        assert!(errors.has_kind(ErrorKind::Format));
        assert!(back.screen("Main").is_some());
        assert!(back.screen("Details").is_none());
    }

    #[test]
    fn stray_entries_are_warnings() {
        let mut errors = ErrorList::new();
        let mut archive = to_archive(&sample(), &SaveOptions::default(), &mut errors).unwrap();
        archive.create_entry("Controls/notes.txt", b"scratch".to_vec()).unwrap();
        archive.create_entry("Extra/readme.md", b"hi".to_vec()).unwrap();
        let back = from_archive(&archive, &mut errors).unwrap();
        assert!(!errors.has_errors(), "{errors}");
        assert_eq!(back.screens().len(), 2);
        let warned: Vec<&str> = errors.iter().filter_map(|e| e.location.as_deref()).collect();
        assert_eq!(warned, ["Controls/notes.txt", "Extra/readme.md"]);
    }

    #[test]
    fn old_major_version_rejected() {
        let mut archive = Archive::new();
        archive
            .create_entry(HEADER_ENTRY, br#"{"DocVersion":"0.4","FormatVersion":1}"#.to_vec())
            .unwrap();
        let mut errors = ErrorList::new();
        assert!(from_archive(&archive, &mut errors).is_none());
        assert!(errors.has_kind(ErrorKind::Version));
    }

    #[test]
    fn stream_roundtrip() {
        let doc = sample();
        let mut bytes = Vec::new();
        assert!(save_archive_to(&doc, &mut bytes, &SaveOptions::default()).is_empty());
        let (back, errors) = load_archive_from(bytes.as_slice());
        assert!(errors.is_empty(), "{errors}");
        assert!(content_equal(&doc, &back.unwrap()));
    }

    #[test]
    fn images_get_unique_names() {
        let mut doc = Document::new();
        assert_eq!(add_image(&mut doc, "logo.png", vec![1]).unwrap(), "logo");
        assert_eq!(add_image(&mut doc, "C:\\img\\logo.jpg", vec![2]).unwrap(), "logo1");
        assert_eq!(add_image(&mut doc, "banner", vec![3]).unwrap(), "banner");
        let logo1 = doc.resource("logo1").unwrap();
        assert_eq!(logo1.path, "logo.jpg");
        assert_eq!(logo1.kind, ResourceKind::Image);
    }
}
