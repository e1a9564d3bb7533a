//! Named-entry container for packaged apps.
//!
//! An archive is a flat set of entries keyed by canonical `/`-separated
//! names. On disk it is a single CBOR document:
//!
//! ```text
//! { "magic": "canvas-archive", "version": 1, "entries": [[name, bytes], ...] }
//! ```
//!
//! Entries are written sorted by name, so equal archives encode to equal
//! bytes.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ciborium::value::{Integer, Value as CborValue};
use thiserror::Error;

pub const MAGIC: &str = "canvas-archive";
pub const CONTAINER_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive is empty")]
    Empty,
    #[error("not a canvas archive: {0}")]
    Corrupt(String),
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u64),
    #[error("duplicate entry `{0}`")]
    DuplicateEntry(String),
    #[error("missing required entry `{0}`")]
    MissingEntry(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: BTreeMap<String, Vec<u8>>,
}

/// `\` becomes `/`, leading slashes are dropped.
pub fn canonical_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry; an existing entry with the same canonical name is an error.
    pub fn create_entry(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        let name = canonical_name(name);
        if self.entries.contains_key(&name) {
            return Err(ArchiveError::DuplicateEntry(name));
        }
        self.entries.insert(name, bytes);
        Ok(())
    }

    pub fn get_entry(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(&canonical_name(name)).map(Vec::as_slice)
    }

    pub fn get_required_entry(&self, name: &str) -> Result<&[u8], ArchiveError> {
        self.get_entry(name)
            .ok_or_else(|| ArchiveError::MissingEntry(canonical_name(name)))
    }

    pub fn remove_entry(&mut self, name: &str) -> Option<Vec<u8>> {
        self.entries.remove(&canonical_name(name))
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries directly or transitively under `dir`, optionally filtered by
    /// file extension (without the dot).
    pub fn directory_entries<'a>(
        &'a self,
        dir: &str,
        extension: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a [u8])> + 'a {
        let mut prefix = canonical_name(dir);
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.entries()
            .filter(move |(name, _)| name.starts_with(prefix.as_str()))
            .filter(move |(name, _)| match extension {
                Some(ext) => name
                    .rsplit_once('.')
                    .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext)),
                None => true,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all entry sizes.
    pub fn decompressed_size(&self) -> u64 {
        self.entries.values().map(|v| v.len() as u64).sum()
    }

    // ── Encoding ─────────────────────────────────────────────────────────

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        Self::read_from(bytes)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), ArchiveError> {
        let entries = self
            .entries
            .iter()
            .map(|(name, bytes)| {
                CborValue::Array(vec![
                    CborValue::Text(name.clone()),
                    CborValue::Bytes(bytes.clone()),
                ])
            })
            .collect();
        let container = CborValue::Map(vec![
            (CborValue::Text("magic".into()), CborValue::Text(MAGIC.into())),
            (
                CborValue::Text("version".into()),
                CborValue::Integer(Integer::from(CONTAINER_VERSION)),
            ),
            (CborValue::Text("entries".into()), CborValue::Array(entries)),
        ]);
        ciborium::ser::into_writer(&container, writer).map_err(|e| match e {
            ciborium::ser::Error::Io(io) => ArchiveError::Io(io),
            ciborium::ser::Error::Value(msg) => ArchiveError::Corrupt(msg),
        })
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, ArchiveError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Err(ArchiveError::Empty);
        }
        let value: CborValue = ciborium::de::from_reader(bytes.as_slice())
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;
        let CborValue::Map(fields) = value else {
            return Err(ArchiveError::Corrupt("container is not a map".into()));
        };

        let field = |key: &str| {
            fields
                .iter()
                .find(|(k, _)| matches!(k, CborValue::Text(t) if t == key))
                .map(|(_, v)| v)
        };
        match field("magic") {
            Some(CborValue::Text(magic)) if magic == MAGIC => {}
            _ => return Err(ArchiveError::Corrupt("bad magic".into())),
        }
        let version = match field("version") {
            Some(CborValue::Integer(i)) => u64::try_from(*i).ok(),
            _ => None,
        }
        .ok_or_else(|| ArchiveError::Corrupt("missing container version".into()))?;
        if version != u64::from(CONTAINER_VERSION) {
            return Err(ArchiveError::UnsupportedVersion(version));
        }
        let Some(CborValue::Array(items)) = field("entries") else {
            return Err(ArchiveError::Corrupt("missing entry table".into()));
        };

        let mut archive = Archive::new();
        for item in items {
            match item {
                CborValue::Array(pair) => match pair.as_slice() {
                    [CborValue::Text(name), CborValue::Bytes(data)] => {
                        archive.create_entry(name, data.clone())?;
                    }
                    _ => return Err(ArchiveError::Corrupt("malformed entry".into())),
                },
                _ => return Err(ArchiveError::Corrupt("malformed entry".into())),
            }
        }
        tracing::trace!(entries = archive.len(), "read archive");
        Ok(archive)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        Self::read_from(BufReader::new(File::open(path)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArchiveError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
