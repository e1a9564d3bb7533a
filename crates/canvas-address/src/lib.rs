//! Name-path addresses for canvas app documents.
//!
//! An address is the chain of unique names from the document root down to a
//! screen, a control, or a property: `Screen1/Gallery1/Label1/Text`.
//! Components are joined with `/`; a literal `/` or `~` inside a name is
//! escaped as `~1` / `~0`. The empty string is the root (the app itself).
//!
//! # Example
//!
//! ```
//! use canvas_address::{Address, format_address, parse_address};
//!
//! let addr = parse_address("Screen1/Label1");
//! assert_eq!(addr.segments(), ["Screen1", "Label1"]);
//! assert_eq!(format_address(&addr), "Screen1/Label1");
//!
//! let prop = addr.child("Text");
//! assert_eq!(prop.to_string(), "Screen1/Label1/Text");
//! assert!(addr.is_ancestor_of(&prop));
//! ```

use std::fmt;
use thiserror::Error;

pub mod validate;
pub use validate::{validate_address, validate_name, ValidationError};

/// Errors from address manipulation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("root address has no parent")]
    NoParent,
    #[error("root address has no name")]
    NoName,
}

/// Path from the document root through screen and control names.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    segments: Vec<String>,
}

impl Address {
    /// The root address (the app node).
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments below the root; 1 for a screen.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Address of the child called `name`.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    /// Address of the owning parent.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::NoParent`] for the root.
    pub fn parent(&self) -> Result<Self, AddressError> {
        match self.segments.split_last() {
            Some((_, rest)) => Ok(Self {
                segments: rest.to_vec(),
            }),
            None => Err(AddressError::NoParent),
        }
    }

    /// Last segment (the node's own name).
    pub fn name(&self) -> Result<&str, AddressError> {
        self.segments
            .last()
            .map(String::as_str)
            .ok_or(AddressError::NoName)
    }

    /// Replace the last segment, producing the address of a renamed node.
    pub fn with_name(&self, name: impl Into<String>) -> Result<Self, AddressError> {
        let mut parent = self.parent()?;
        parent.segments.push(name.into());
        Ok(parent)
    }

    /// True if `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &Address) -> bool {
        is_child(&self.segments, &other.segments)
    }

    /// True if `self` equals `other` or is an ancestor of it.
    pub fn contains(&self, other: &Address) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Replace the prefix `from` with `to`; `None` if `from` is not a prefix.
    pub fn rebase(&self, from: &Address, to: &Address) -> Option<Self> {
        if !from.contains(self) {
            return None;
        }
        let mut segments = to.segments.clone();
        segments.extend_from_slice(&self.segments[from.segments.len()..]);
        Some(Self { segments })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_address(self))
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        parse_address(value)
    }
}

impl From<Vec<String>> for Address {
    fn from(segments: Vec<String>) -> Self {
        Self { segments }
    }
}

/// Unescapes one address component: `~1` → `/`, `~0` → `~`.
///
/// ```
/// use canvas_address::unescape_component;
///
/// assert_eq!(unescape_component("a~0b"), "a~b");
/// assert_eq!(unescape_component("c~1d"), "c/d");
/// ```
pub fn unescape_component(component: &str) -> String {
    if !component.contains('~') {
        return component.to_string();
    }
    // ~1 before ~0, otherwise "~01" would decode to "/"
    component.replace("~1", "/").replace("~0", "~")
}

/// Escapes one address component: `~` → `~0`, `/` → `~1`.
///
/// ```
/// use canvas_address::escape_component;
///
/// assert_eq!(escape_component("a~b"), "a~0b");
/// assert_eq!(escape_component("c/d"), "c~1d");
/// ```
pub fn escape_component(component: &str) -> String {
    if !component.contains('/') && !component.contains('~') {
        return component.to_string();
    }
    component.replace('~', "~0").replace('/', "~1")
}

/// Parse an address string.
///
/// The empty string is the root. A single leading `/` is tolerated so that
/// pointer-style strings parse to the same address.
///
/// ```
/// use canvas_address::parse_address;
///
/// assert!(parse_address("").is_root());
/// assert_eq!(parse_address("Screen1/Label1").segments(), ["Screen1", "Label1"]);
/// assert_eq!(parse_address("/Screen1").segments(), ["Screen1"]);
/// assert_eq!(parse_address("a~1b/c").segments(), ["a/b", "c"]);
/// ```
pub fn parse_address(address: &str) -> Address {
    let body = address.strip_prefix('/').unwrap_or(address);
    if body.is_empty() {
        return Address::root();
    }
    Address {
        segments: body.split('/').map(unescape_component).collect(),
    }
}

/// Format an address; the root formats as the empty string.
pub fn format_address(address: &Address) -> String {
    let mut out = String::new();
    for (i, component) in address.segments.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&escape_component(component));
    }
    out
}

/// Check if `parent` is a strict prefix of `child`.
pub fn is_child(parent: &[String], child: &[String]) -> bool {
    parent.len() < child.len() && child[..parent.len()] == *parent
}
