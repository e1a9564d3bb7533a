//! Document ↔ editable text tree.
//!
//! Directory layout:
//!
//! ```text
//! Src/App.pa.yaml          app properties
//! Src/<screen>.pa.yaml     one per screen, controls nested
//! Other/Header.json
//! Other/Themes.json
//! Other/DataSources.json
//! Other/Resources.json
//! Entropy/Entropy.json
//! ```
//!
//! Saving replaces the three owned subdirectories and leaves anything else
//! in the target directory alone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, ErrorList};
use crate::model::Document;

use super::entropy::{ENTROPY_DIR, ENTROPY_ENTRY};
use super::wire::{DataSourcesJson, HeaderJson, ResourcesJson, ThemesJson};
use super::yaml::{self, SourceFile, YamlError};
use super::{
    check_version, decode_optional, decode_required, encode_json, escape_file_name, header_for,
    DocumentParts, SaveOptions,
};

pub const SRC_DIR: &str = "Src";
pub const OTHER_DIR: &str = "Other";
pub const APP_FILE: &str = "App.pa.yaml";
pub const SOURCE_EXTENSION: &str = ".pa.yaml";

const HEADER_FILE: &str = "Header.json";
const THEMES_FILE: &str = "Themes.json";
const DATA_SOURCES_FILE: &str = "DataSources.json";
const RESOURCES_FILE: &str = "Resources.json";

/// Relative path of a screen's source file. A screen called `App` gets its
/// first letter escaped so it cannot shadow the app file.
pub fn screen_file_name(screen: &str) -> String {
    let mut stem = escape_file_name(screen);
    if stem.eq_ignore_ascii_case("App") {
        stem = format!("%{:02X}{}", stem.as_bytes()[0], &stem[1..]);
    }
    format!("{SRC_DIR}/{stem}{SOURCE_EXTENSION}")
}

// ── Saving ────────────────────────────────────────────────────────────────

/// Write `doc` as a text tree under `dir`, creating it if needed.
pub fn save_to_source(doc: &Document, dir: impl AsRef<Path>, options: &SaveOptions) -> ErrorList {
    let dir = dir.as_ref();
    let mut errors = ErrorList::new();
    if dir.is_file() {
        errors.format_error(dir.display().to_string(), "target is a file, not a directory");
        return errors;
    }

    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    files.push((format!("{SRC_DIR}/{APP_FILE}"), yaml::write_app(doc.properties()).into_bytes()));
    for screen in doc.screens() {
        files.push((screen_file_name(screen.name()), yaml::write_screen(screen).into_bytes()));
    }
    let json_files = [
        (HEADER_FILE, encode_json(HEADER_FILE, &header_for(doc), &mut errors)),
        (
            THEMES_FILE,
            encode_json(THEMES_FILE, &ThemesJson::from_theme(doc.theme()), &mut errors),
        ),
        (
            DATA_SOURCES_FILE,
            encode_json(
                DATA_SOURCES_FILE,
                &DataSourcesJson::from_sources(doc.data_sources().values()),
                &mut errors,
            ),
        ),
        (
            RESOURCES_FILE,
            encode_json(
                RESOURCES_FILE,
                &ResourcesJson::from_resources(doc.resources().values()),
                &mut errors,
            ),
        ),
    ];
    for (name, bytes) in json_files {
        if let Some(bytes) = bytes {
            files.push((format!("{OTHER_DIR}/{name}"), bytes));
        }
    }
    let entropy = options.entropy_for(doc);
    if let Some(bytes) = encode_json(ENTROPY_ENTRY, &entropy, &mut errors) {
        files.push((ENTROPY_ENTRY.to_string(), bytes));
    }
    if errors.has_errors() {
        return errors;
    }

    if let Err(err) = replace_tree(dir, &files) {
        errors.io(dir.display().to_string(), &err);
        return errors;
    }
    tracing::debug!(files = files.len(), dir = %dir.display(), "saved sources");
    errors
}

fn replace_tree(dir: &Path, files: &[(String, Vec<u8>)]) -> io::Result<()> {
    for owned in [SRC_DIR, OTHER_DIR, ENTROPY_DIR] {
        let path = dir.join(owned);
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
    }
    for (relative, bytes) in files {
        fs::write(dir.join(relative), bytes)?;
    }
    Ok(())
}

// ── Loading ───────────────────────────────────────────────────────────────

/// Read a text tree written by [`save_to_source`].
///
/// A missing directory, a file in place of the directory, or an unreadable
/// header yields no document.
pub fn load_from_source(dir: impl AsRef<Path>) -> (Option<Document>, ErrorList) {
    let dir = dir.as_ref();
    let mut errors = ErrorList::new();
    let doc = load(dir, &mut errors);
    (doc, errors)
}

fn load(dir: &Path, errors: &mut ErrorList) -> Option<Document> {
    let location = dir.display().to_string();
    if dir.is_file() {
        errors.format_error(location, "expected a source directory, found a file");
        return None;
    }
    if !dir.is_dir() {
        errors.error(ErrorKind::Io, Some(location), "source directory does not exist");
        return None;
    }

    let other = dir.join(OTHER_DIR);
    let header_location = relative(OTHER_DIR, HEADER_FILE);
    let header_bytes = read_optional_file(&other.join(HEADER_FILE), errors);
    let header: HeaderJson = decode_required(&header_location, header_bytes.as_deref(), errors)?;
    if !check_version(&header.doc_version, &header_location, errors) {
        return None;
    }

    let mut parts = DocumentParts {
        screen_order: header.screen_order,
        ..Default::default()
    };
    let theme = read_side_file::<ThemesJson>(&other, THEMES_FILE, errors);
    let data_sources = read_side_file::<DataSourcesJson>(&other, DATA_SOURCES_FILE, errors);
    let resources_location = relative(OTHER_DIR, RESOURCES_FILE);
    let resources = read_side_file::<ResourcesJson>(&other, RESOURCES_FILE, errors)
        .map(|r| (resources_location.as_str(), r));
    parts.set_globals(theme, data_sources, resources, errors);

    let src = dir.join(SRC_DIR);
    for path in source_files(&src, errors) {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let location = relative(SRC_DIR, &file_name);
        let Some(bytes) = read_optional_file(&path, errors) else {
            continue;
        };
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                errors.format_error(location, "source file is not UTF-8");
                continue;
            }
        };
        match (yaml::parse(&text), file_name == APP_FILE) {
            (Ok(SourceFile::App { properties }), true) => parts.properties = properties,
            (Ok(SourceFile::Screen(screen)), false) => parts.screens.push((location, screen)),
            (Ok(_), true) => errors.error(
                ErrorKind::Validation,
                Some(location),
                "App.pa.yaml must hold the `App` node",
            ),
            (Ok(_), false) => errors.error(
                ErrorKind::Validation,
                Some(location),
                "screen files must hold a `Screen` node",
            ),
            (Err(err @ YamlError::Syntax { .. }), _) => {
                errors.format_error(location, err.to_string())
            }
            (Err(err @ YamlError::Validation { .. }), _) => {
                errors.error(ErrorKind::Validation, Some(location), err.to_string())
            }
        }
    }

    let doc = parts.assemble(errors);
    tracing::debug!(screens = doc.screens().len(), dir = %dir.display(), "loaded sources");
    Some(doc)
}

fn relative(dir: &str, file: &str) -> String {
    format!("{dir}/{file}")
}

/// `.pa.yaml` files under `src`, in name order. A missing directory is a
/// warning: the document simply has no screens.
fn source_files(src: &Path, errors: &mut ErrorList) -> Vec<PathBuf> {
    let entries = match fs::read_dir(src) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            errors.warning(ErrorKind::Format, Some(SRC_DIR.to_string()), "no source files");
            return Vec::new();
        }
        Err(err) => {
            errors.io(SRC_DIR, &err);
            return Vec::new();
        }
    };
    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                let is_source = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(SOURCE_EXTENSION));
                if path.is_file() && is_source {
                    files.push(path);
                } else if path.is_file() {
                    errors.warning(
                        ErrorKind::Format,
                        Some(path.display().to_string()),
                        "ignored file without the .pa.yaml extension",
                    );
                }
            }
            Err(err) => errors.io(SRC_DIR, &err),
        }
    }
    files.sort();
    files
}

/// File contents, or `None` when absent. Other read failures are recorded.
fn read_optional_file(path: &Path, errors: &mut ErrorList) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            errors.io(path.display().to_string(), &err);
            None
        }
    }
}

fn read_side_file<T: serde::de::DeserializeOwned>(
    other: &Path,
    file: &str,
    errors: &mut ErrorList,
) -> Option<T> {
    let bytes = read_optional_file(&other.join(file), errors);
    decode_optional(&relative(OTHER_DIR, file), bytes.as_deref(), errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::msapp::add_image;
    use crate::fingerprint::content_equal;
    use crate::model::{Control, DataSource, Screen, Theme};
    use canvas_address::Address;
    use serde_json::json;

    fn sample() -> Document {
        let mut doc = Document::new();
        doc.set_property(&Address::root(), "OnStart", "Set(x, 1)".into()).unwrap();
        doc.set_theme(Theme {
            name: "Light".into(),
            palette: json!({"Accent": "#0078d4"}),
        });
        doc.set_data_source(DataSource::new("Orders", "Table", json!({})))
            .unwrap();
        doc.add_screen(
            Screen::new("Home").with_control(
                Control::builtin("Header", "Label").with_property("Text", "\"Welcome\""),
            ),
        )
        .unwrap();
        doc.add_screen(Screen::new("Settings/Advanced")).unwrap();
        add_image(&mut doc, "logo.png", vec![9, 8, 7]).unwrap();
        doc
    }

    #[test]
    fn source_roundtrip_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let doc = sample();
        let errors = save_to_source(&doc, dir.path(), &SaveOptions::default());
        assert!(errors.is_empty(), "{errors}");
        assert!(dir.path().join("Src/Home.pa.yaml").is_file());
        assert!(dir.path().join("Src/Settings%2FAdvanced.pa.yaml").is_file());
        assert!(dir.path().join(ENTROPY_ENTRY).is_file());

        let (back, errors) = load_from_source(dir.path());
        assert!(errors.is_empty(), "{errors}");
        let back = back.unwrap();
        assert!(content_equal(&doc, &back));
        let order: Vec<&str> = back.screens().iter().map(|s| s.name()).collect();
        assert_eq!(order, ["Home", "Settings/Advanced"]);
    }

    #[test]
    fn screen_named_app_keeps_its_own_file() {
        assert_eq!(screen_file_name("App"), "Src/%41pp.pa.yaml");
        assert_eq!(screen_file_name("app"), "Src/%61pp.pa.yaml");
        assert_eq!(screen_file_name("Apps"), "Src/Apps.pa.yaml");

        let dir = tempfile::tempdir().unwrap();
        let mut doc = sample();
        doc.add_screen(Screen::new("App")).unwrap();
        assert!(save_to_source(&doc, dir.path(), &SaveOptions::default()).is_empty());
        let (back, errors) = load_from_source(dir.path());
        assert!(errors.is_empty(), "{errors}");
        assert!(content_equal(&doc, &back.unwrap()));
    }

    #[test]
    fn resave_drops_stale_screens() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = sample();
        assert!(save_to_source(&doc, dir.path(), &SaveOptions::default()).is_empty());
        doc.remove_screen("Home").unwrap();
        assert!(save_to_source(&doc, dir.path(), &SaveOptions::default()).is_empty());
        let (back, _) = load_from_source(dir.path());
        assert!(back.unwrap().screen("Home").is_none());
    }

    #[test]
    fn file_path_is_not_a_source_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.msapp");
        fs::write(&file, b"not a directory").unwrap();
        let (doc, errors) = load_from_source(&file);
        assert!(doc.is_none());
        assert!(errors.has_errors());
    }

    #[test]
    fn missing_directory_yields_no_document() {
        let dir = tempfile::tempdir().unwrap();
        let (doc, errors) = load_from_source(dir.path().join("nope"));
        assert!(doc.is_none());
        assert!(errors.has_kind(ErrorKind::Io));
    }

    #[test]
    fn broken_screen_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_to_source(&sample(), dir.path(), &SaveOptions::default()).is_empty());
        fs::write(dir.path().join("Src/Home.pa.yaml"), "Screen: \nName Home\n").unwrap();
        let (doc, errors) = load_from_source(dir.path());
        let doc = doc.unwrap();
        assert!(doc.screen("Home").is_none());
        assert!(doc.screen("Settings/Advanced").is_some());
        assert!(errors.has_kind(ErrorKind::Format));
    }

    #[test]
    fn screen_file_with_control_node_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_to_source(&sample(), dir.path(), &SaveOptions::default()).is_empty());
        fs::write(dir.path().join("Src/Extra.pa.yaml"), "Label: \nName: Stray\n").unwrap();
        let (doc, errors) = load_from_source(dir.path());
        assert!(doc.is_some());
        assert!(errors.has_kind(ErrorKind::Validation));
    }

    #[test]
    fn missing_side_files_are_warnings() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_to_source(&sample(), dir.path(), &SaveOptions::default()).is_empty());
        fs::remove_file(dir.path().join("Other/Themes.json")).unwrap();
        let (doc, errors) = load_from_source(dir.path());
        assert_eq!(doc.unwrap().theme(), &Theme::default());
        assert!(errors.has_warnings() && !errors.has_errors());
    }
}
