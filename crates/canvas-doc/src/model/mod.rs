//! Typed document tree: app → screens → controls → properties.
//!
//! # Overview
//!
//! A [`Document`] exclusively owns its [`Screen`]s, each screen owns an
//! ordered sequence of [`Control`]s, and every container owns its children.
//! Sibling order is render order and is preserved. Property maps are keyed
//! by name; their insertion order is kept only for serialization.
//!
//! Values are assembled with the `with_*` builders and handed to the
//! document, which validates names before accepting them. Once inside a
//! document, nodes change only through the document's structural
//! operations, which keep the [`ParentIndex`] in step.

mod document;
mod parent_index;
mod walk;

pub use document::{Document, NodeRef};
pub use parent_index::ParentIndex;
pub use walk::Walk;

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

/// Property name → value. Equality ignores insertion order.
pub type PropertyMap = IndexMap<String, PropertyValue>;

// ── Property values ───────────────────────────────────────────────────────

/// Value bound to a control property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PropertyValue {
    /// Formula source text, e.g. `"Hello"` or `If(x > 1, Red, Blue)`.
    Formula(String),
}

impl PropertyValue {
    pub fn formula(text: impl Into<String>) -> Self {
        PropertyValue::Formula(text.into())
    }

    /// Raw source text of the value.
    pub fn text(&self) -> &str {
        match self {
            PropertyValue::Formula(text) => text,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Formula(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Formula(value)
    }
}

// ── Control kinds ─────────────────────────────────────────────────────────

/// Reference to a built-in control template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TemplateRef {
    pub name: String,
    pub version: String,
}

impl TemplateRef {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl From<&str> for TemplateRef {
    fn from(name: &str) -> Self {
        Self::new(name, "")
    }
}

/// Closed set of control variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlKind {
    /// Control backed by a built-in template (`Label`, `Button`, ...).
    BuiltIn(TemplateRef),
    /// Custom component identified by a URI.
    Custom { uri: String },
}

impl ControlKind {
    /// Stable discriminator used in persisted forms and fingerprints.
    pub fn discriminator(&self) -> &'static str {
        match self {
            ControlKind::BuiltIn(_) => "BuiltIn",
            ControlKind::Custom { .. } => "Custom",
        }
    }

    /// Template name for built-ins, URI for custom controls.
    pub fn template_id(&self) -> &str {
        match self {
            ControlKind::BuiltIn(template) => &template.name,
            ControlKind::Custom { uri } => uri,
        }
    }
}

// ── Control ───────────────────────────────────────────────────────────────

/// Polymorphic tree node below a screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    name: String,
    kind: ControlKind,
    properties: PropertyMap,
    children: Vec<Control>,
}

impl Control {
    pub fn new(name: impl Into<String>, kind: ControlKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: PropertyMap::new(),
            children: Vec::new(),
        }
    }

    pub fn builtin(name: impl Into<String>, template: impl Into<TemplateRef>) -> Self {
        Self::new(name, ControlKind::BuiltIn(template.into()))
    }

    pub fn custom(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::new(name, ControlKind::Custom { uri: uri.into() })
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Control) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Control>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ControlKind {
        &self.kind
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn children(&self) -> &[Control] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Control> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertyMap {
        &mut self.properties
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Control> {
        &mut self.children
    }
}

// ── Screen ────────────────────────────────────────────────────────────────

/// Named top-level container owned by the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    name: String,
    properties: PropertyMap,
    controls: Vec<Control>,
}

impl Screen {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: PropertyMap::new(),
            controls: Vec::new(),
        }
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_control(mut self, control: Control) -> Self {
        self.controls.push(control);
        self
    }

    pub fn with_controls(mut self, controls: impl IntoIterator<Item = Control>) -> Self {
        self.controls.extend(controls);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn control(&self, name: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.name == name)
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn properties_mut(&mut self) -> &mut PropertyMap {
        &mut self.properties
    }

    pub(crate) fn controls_mut(&mut self) -> &mut Vec<Control> {
        &mut self.controls
    }
}

// ── Global collections ────────────────────────────────────────────────────

/// App theme: a name plus its palette definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: String,
    pub palette: Value,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            name: "defaultTheme".to_string(),
            palette: Value::Object(Default::default()),
        }
    }
}

/// Connection to external data, keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub name: String,
    pub kind: String,
    pub definition: Value,
}

impl DataSource {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, definition: Value) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            definition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Image,
    Audio,
    Video,
    File,
    Uri,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "Image",
            ResourceKind::Audio => "Audio",
            ResourceKind::Video => "Video",
            ResourceKind::File => "File",
            ResourceKind::Uri => "Uri",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Image" => Some(ResourceKind::Image),
            "Audio" => Some(ResourceKind::Audio),
            "Video" => Some(ResourceKind::Video),
            "File" => Some(ResourceKind::File),
            "Uri" => Some(ResourceKind::Uri),
            _ => None,
        }
    }
}

/// Media or file asset registered with the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
    /// Original file name or URI.
    pub path: String,
    pub content: Vec<u8>,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        path: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            content,
        }
    }
}

pub type DataSources = BTreeMap<String, DataSource>;
pub type Resources = BTreeMap<String, Resource>;
