//! Serde structs for the JSON fragments shared by both persisted forms.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{
    Control, ControlKind, DataSource, PropertyMap, PropertyValue, Resource, ResourceKind, Screen,
    TemplateRef, Theme,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown control kind `{0}`")]
    UnknownControlKind(String),
    #[error("unknown resource kind `{0}`")]
    UnknownResourceKind(String),
    #[error("resource `{name}` has invalid base64 content")]
    InvalidContent { name: String },
}

/// Missing or `null` sequences read as empty.
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn nullable_map<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<IndexMap<String, String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ── Header ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeaderJson {
    pub doc_version: String,
    pub format_version: u32,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub screen_order: Vec<String>,
}

// ── Properties ────────────────────────────────────────────────────────────

pub fn properties_to_wire(properties: &PropertyMap) -> IndexMap<String, String> {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), v.text().to_string()))
        .collect()
}

pub fn properties_from_wire(properties: IndexMap<String, String>) -> PropertyMap {
    properties
        .into_iter()
        .map(|(k, v)| (k, PropertyValue::Formula(v)))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AppPropertiesJson {
    #[serde(default, deserialize_with = "nullable_map")]
    pub properties: IndexMap<String, String>,
}

// ── Controls ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ControlJson {
    pub name: String,
    /// `BuiltIn` or `Custom`.
    pub kind: String,
    /// Template name for built-ins, URI for custom controls.
    pub template: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, deserialize_with = "nullable_map")]
    pub properties: IndexMap<String, String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub children: Vec<ControlJson>,
}

impl ControlJson {
    pub fn from_control(control: &Control) -> Self {
        let (template, version) = match control.kind() {
            ControlKind::BuiltIn(t) => (t.name.clone(), t.version.clone()),
            ControlKind::Custom { uri } => (uri.clone(), String::new()),
        };
        Self {
            name: control.name().to_string(),
            kind: control.kind().discriminator().to_string(),
            template,
            version,
            properties: properties_to_wire(control.properties()),
            children: control.children().iter().map(Self::from_control).collect(),
        }
    }

    pub fn into_control(self) -> Result<Control, WireError> {
        let kind = match self.kind.as_str() {
            "BuiltIn" => ControlKind::BuiltIn(TemplateRef::new(self.template, self.version)),
            "Custom" => ControlKind::Custom { uri: self.template },
            other => return Err(WireError::UnknownControlKind(other.to_string())),
        };
        let children = self
            .children
            .into_iter()
            .map(Self::into_control)
            .collect::<Result<Vec<_>, _>>()?;
        let mut control = Control::new(self.name, kind).with_children(children);
        for (key, value) in self.properties {
            control = control.with_property(key, value);
        }
        Ok(control)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScreenJson {
    pub name: String,
    #[serde(default, deserialize_with = "nullable_map")]
    pub properties: IndexMap<String, String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub children: Vec<ControlJson>,
}

impl ScreenJson {
    pub fn from_screen(screen: &Screen) -> Self {
        Self {
            name: screen.name().to_string(),
            properties: properties_to_wire(screen.properties()),
            children: screen.controls().iter().map(ControlJson::from_control).collect(),
        }
    }

    pub fn into_screen(self) -> Result<Screen, WireError> {
        let controls = self
            .children
            .into_iter()
            .map(ControlJson::into_control)
            .collect::<Result<Vec<_>, _>>()?;
        let mut screen = Screen::new(self.name).with_controls(controls);
        for (key, value) in self.properties {
            screen = screen.with_property(key, value);
        }
        Ok(screen)
    }
}

// ── Global collections ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThemesJson {
    pub current_theme: String,
    #[serde(default)]
    pub palette: Value,
}

impl ThemesJson {
    pub fn from_theme(theme: &Theme) -> Self {
        Self {
            current_theme: theme.name.clone(),
            palette: theme.palette.clone(),
        }
    }

    pub fn into_theme(self) -> Theme {
        Theme {
            name: self.current_theme,
            palette: self.palette,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataSourceJson {
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub definition: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataSourcesJson {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub data_sources: Vec<DataSourceJson>,
}

impl DataSourcesJson {
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a DataSource>) -> Self {
        Self {
            data_sources: sources
                .into_iter()
                .map(|s| DataSourceJson {
                    name: s.name.clone(),
                    kind: s.kind.clone(),
                    definition: s.definition.clone(),
                })
                .collect(),
        }
    }

    pub fn into_sources(self) -> Vec<DataSource> {
        self.data_sources
            .into_iter()
            .map(|s| DataSource::new(s.name, s.kind, s.definition))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceJson {
    pub name: String,
    pub kind: String,
    pub path: String,
    /// Base64 payload.
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourcesJson {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub resources: Vec<ResourceJson>,
}

impl ResourcesJson {
    pub fn from_resources<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        Self {
            resources: resources
                .into_iter()
                .map(|r| ResourceJson {
                    name: r.name.clone(),
                    kind: r.kind.as_str().to_string(),
                    path: r.path.clone(),
                    content: BASE64.encode(&r.content),
                })
                .collect(),
        }
    }

    pub fn into_resources(self) -> Result<Vec<Resource>, WireError> {
        self.resources
            .into_iter()
            .map(|r| -> Result<Resource, WireError> {
                let kind = ResourceKind::parse(&r.kind)
                    .ok_or_else(|| WireError::UnknownResourceKind(r.kind.clone()))?;
                let content = BASE64
                    .decode(r.content.as_bytes())
                    .map_err(|_| WireError::InvalidContent { name: r.name.clone() })?;
                Ok(Resource::new(r.name, kind, r.path, content))
            })
            .collect()
    }
}
