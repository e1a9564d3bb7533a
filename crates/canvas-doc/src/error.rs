//! Error taxonomy and the accumulating error sink.
//!
//! Structural mutations fail fast with [`StructuralError`]. Boundary
//! operations (loading, saving, verification) never fail fast for expected
//! problems: they push [`DocumentError`]s into an [`ErrorList`] and hand it
//! back next to a possibly absent document. Callers decide whether to
//! elevate with [`ErrorList::ensure_ok`].

use std::fmt;

use canvas_address::{Address, ValidationError};
use thiserror::Error;

use crate::compare::{MismatchKind, PropertyMismatch};

// ── Structural errors ─────────────────────────────────────────────────────

/// Violation of the document tree invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        name: String,
        reason: ValidationError,
    },
    #[error("duplicate name `{name}` under `{parent}`")]
    DuplicateName { parent: Address, name: String },
    #[error("address not found: `{0}`")]
    NotFound(Address),
    #[error("`{0}` cannot own controls")]
    NotAContainer(Address),
    #[error("`{0}` still has child controls")]
    NotALeaf(Address),
    #[error("property `{key}` not found at `{address}`")]
    PropertyNotFound { address: Address, key: String },
    #[error("the root address does not name a screen or control")]
    RootAddress,
}

// ── Document errors ───────────────────────────────────────────────────────

/// Category of a boundary error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unreadable or corrupt container or text tree.
    Format,
    /// Document version outside the supported range.
    Version,
    /// Invalid tree content (duplicate names, dangling references).
    Structural,
    /// Round-trip fingerprint mismatch.
    ChecksumMismatch,
    /// A changed, added or removed property inside a mismatched fragment.
    PropertyMismatch,
    /// Filesystem failure.
    Io,
    /// Authored content rejected by a validator.
    Validation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Format => "Format",
            ErrorKind::Version => "Version",
            ErrorKind::Structural => "Structural",
            ErrorKind::ChecksumMismatch => "ChecksumMismatch",
            ErrorKind::PropertyMismatch => "PropertyMismatch",
            ErrorKind::Io => "Io",
            ErrorKind::Validation => "Validation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

/// One entry of an [`ErrorList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    /// Archive entry, source file, or node address the error refers to.
    pub location: Option<String>,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level} [{}]", self.kind.as_str())?;
        if let Some(location) = &self.location {
            write!(f, " {location}")?;
        }
        write!(f, ": {}", self.message)
    }
}

// ── ErrorList ─────────────────────────────────────────────────────────────

/// Accumulated errors and warnings of one boundary operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList {
    entries: Vec<DocumentError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: DocumentError) {
        match error.severity {
            Severity::Error => tracing::debug!(kind = error.kind.as_str(), "{}", error.message),
            Severity::Warning => tracing::warn!(kind = error.kind.as_str(), "{}", error.message),
        }
        self.entries.push(error);
    }

    pub fn error(&mut self, kind: ErrorKind, location: Option<String>, message: impl Into<String>) {
        self.push(DocumentError {
            kind,
            severity: Severity::Error,
            message: message.into(),
            location,
        });
    }

    pub fn warning(
        &mut self,
        kind: ErrorKind,
        location: Option<String>,
        message: impl Into<String>,
    ) {
        self.push(DocumentError {
            kind,
            severity: Severity::Warning,
            message: message.into(),
            location,
        });
    }

    pub fn format_error(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.error(ErrorKind::Format, Some(location.into()), message);
    }

    pub fn version_error(&mut self, message: impl Into<String>) {
        self.error(ErrorKind::Version, None, message);
    }

    pub fn structural(&mut self, location: impl Into<String>, err: &StructuralError) {
        self.error(ErrorKind::Structural, Some(location.into()), err.to_string());
    }

    pub fn io(&mut self, location: impl Into<String>, err: &std::io::Error) {
        self.error(ErrorKind::Io, Some(location.into()), err.to_string());
    }

    pub fn checksum_mismatch(&mut self, entry: impl Into<String>, message: impl Into<String>) {
        self.error(ErrorKind::ChecksumMismatch, Some(entry.into()), message);
    }

    pub fn property_mismatch(&mut self, mismatch: &PropertyMismatch) {
        let what = match mismatch.kind {
            MismatchKind::Changed => "Value Changed",
            MismatchKind::Removed => "Property Removed",
            MismatchKind::Added => "Property Added",
        };
        self.error(
            ErrorKind::PropertyMismatch,
            Some(mismatch.entry.clone()),
            format!("{}: {what}", mismatch.path),
        );
    }

    /// True if any entry has [`Severity::Error`].
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.severity == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.entries.iter().any(|e| e.severity == Severity::Warning)
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DocumentError> {
        self.entries.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &DocumentError> {
        self.entries.iter().filter(|e| e.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DocumentError> {
        self.entries.iter().filter(|e| e.severity == Severity::Warning)
    }

    pub fn extend(&mut self, other: ErrorList) {
        self.entries.extend(other.entries);
    }

    /// Elevate accumulated errors into a hard failure.
    ///
    /// Warnings alone never fail.
    pub fn ensure_ok(&self) -> Result<(), CanvasError> {
        if self.has_errors() {
            Err(CanvasError::Errors(self.clone()))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

impl IntoIterator for ErrorList {
    type Item = DocumentError;
    type IntoIter = std::vec::IntoIter<DocumentError>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a DocumentError;
    type IntoIter = std::slice::Iter<'a, DocumentError>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ── Crate error ───────────────────────────────────────────────────────────

/// Hard failure of a crate operation.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("{} error(s):\n{}", .0.errors().count(), .0)]
    Errors(ErrorList),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error("{0}")]
    Usage(String),
}
