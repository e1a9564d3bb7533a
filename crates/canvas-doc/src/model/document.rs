//! The [`Document`] aggregate and its structural operations.

use std::collections::BTreeSet;

use canvas_address::{validate_name, Address};

use super::{
    Control, DataSource, DataSources, ParentIndex, PropertyMap, PropertyValue, Resource,
    Resources, Screen, Theme, Walk,
};
use crate::error::StructuralError;

/// Borrowed view of one addressable node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    /// The app itself, at the root address.
    App(&'a Document),
    Screen(&'a Screen),
    Control(&'a Control),
}

impl<'a> NodeRef<'a> {
    /// Node name; the app node has the empty name.
    pub fn name(&self) -> &'a str {
        match self {
            NodeRef::App(_) => "",
            NodeRef::Screen(screen) => screen.name(),
            NodeRef::Control(control) => control.name(),
        }
    }

    pub fn properties(&self) -> &'a PropertyMap {
        match self {
            NodeRef::App(doc) => doc.properties(),
            NodeRef::Screen(screen) => screen.properties(),
            NodeRef::Control(control) => control.properties(),
        }
    }

    /// Child controls. The app owns screens, not controls, so it has none.
    pub fn controls(&self) -> &'a [Control] {
        match self {
            NodeRef::App(_) => &[],
            NodeRef::Screen(screen) => screen.controls(),
            NodeRef::Control(control) => control.children(),
        }
    }

    pub fn as_control(&self) -> Option<&'a Control> {
        match self {
            NodeRef::Control(control) => Some(control),
            _ => None,
        }
    }

    pub fn as_screen(&self) -> Option<&'a Screen> {
        match self {
            NodeRef::Screen(screen) => Some(screen),
            _ => None,
        }
    }
}

/// Root aggregate of one canvas app.
///
/// Fields are private: every change goes through a structural operation
/// that validates sibling-name uniqueness and refreshes the parent index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    properties: PropertyMap,
    screens: Vec<Screen>,
    theme: Theme,
    data_sources: DataSources,
    resources: Resources,
    parents: ParentIndex,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Read access ──────────────────────────────────────────────────────

    /// App-level properties.
    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn screens(&self) -> &[Screen] {
        &self.screens
    }

    pub fn screen(&self, name: &str) -> Option<&Screen> {
        self.screens.iter().find(|s| s.name() == name)
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn data_sources(&self) -> &DataSources {
        &self.data_sources
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.get(name)
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    /// Non-owning child → parent lookup.
    pub fn parent_index(&self) -> &ParentIndex {
        &self.parents
    }

    /// Resolve an address to the node it names.
    pub fn resolve(&self, address: &Address) -> Option<NodeRef<'_>> {
        let mut segments = address.segments().iter();
        let Some(first) = segments.next() else {
            return Some(NodeRef::App(self));
        };
        let screen = self.screen(first)?;
        let mut node = NodeRef::Screen(screen);
        for segment in segments {
            let child = node.controls().iter().find(|c| c.name() == segment.as_str())?;
            node = NodeRef::Control(child);
        }
        Some(node)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.resolve(address).is_some()
    }

    /// Lazy pre-order walk over every node, starting with the app.
    pub fn enumerate(&self) -> Walk<'_> {
        Walk::new(Address::root(), NodeRef::App(self))
    }

    /// Lazy pre-order walk over the subtree at `address`.
    pub fn enumerate_from(&self, address: &Address) -> Option<Walk<'_>> {
        self.resolve(address)
            .map(|node| Walk::new(address.clone(), node))
    }

    /// Total number of controls across all screens.
    pub fn control_count(&self) -> usize {
        self.parents.len() - self.screens.len()
    }

    // ── Screens ──────────────────────────────────────────────────────────

    /// Append a screen.
    pub fn add_screen(&mut self, screen: Screen) -> Result<(), StructuralError> {
        let index = self.screens.len();
        self.insert_screen(index, screen)
    }

    /// Insert a screen at `index` (clamped to the screen count).
    pub fn insert_screen(&mut self, index: usize, screen: Screen) -> Result<(), StructuralError> {
        check_name(screen.name())?;
        if self.screen(screen.name()).is_some() {
            return Err(StructuralError::DuplicateName {
                parent: Address::root(),
                name: screen.name().to_string(),
            });
        }
        let address = Address::root().child(screen.name());
        validate_properties(screen.properties())?;
        validate_children(&address, screen.controls())?;
        let index = index.min(self.screens.len());
        self.screens.insert(index, screen);
        self.reindex();
        Ok(())
    }

    pub fn remove_screen(&mut self, name: &str) -> Result<Screen, StructuralError> {
        let pos = self
            .screens
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| StructuralError::NotFound(Address::root().child(name)))?;
        let screen = self.screens.remove(pos);
        self.reindex();
        Ok(screen)
    }

    // ── Controls ─────────────────────────────────────────────────────────

    /// Append `control` (with its subtree) under the screen or control at `parent`.
    pub fn add_control(
        &mut self,
        parent: &Address,
        control: Control,
    ) -> Result<(), StructuralError> {
        self.insert_control(parent, usize::MAX, control)
    }

    /// Insert `control` at sibling position `index` (clamped) under `parent`.
    pub fn insert_control(
        &mut self,
        parent: &Address,
        index: usize,
        control: Control,
    ) -> Result<(), StructuralError> {
        check_name(control.name())?;
        let address = parent.child(control.name());
        validate_properties(control.properties())?;
        validate_children(&address, control.children())?;
        let siblings = self.controls_mut(parent)?;
        if siblings.iter().any(|c| c.name() == control.name()) {
            return Err(StructuralError::DuplicateName {
                parent: parent.clone(),
                name: control.name().to_string(),
            });
        }
        let index = index.min(siblings.len());
        siblings.insert(index, control);
        self.reindex();
        Ok(())
    }

    /// Remove the control at `address` together with its subtree.
    pub fn remove_control(&mut self, address: &Address) -> Result<Control, StructuralError> {
        self.detach_control(address, false)
    }

    /// Remove the control at `address`, refusing if it still has children.
    pub fn remove_leaf_control(&mut self, address: &Address) -> Result<Control, StructuralError> {
        self.detach_control(address, true)
    }

    fn detach_control(
        &mut self,
        address: &Address,
        leaf_only: bool,
    ) -> Result<Control, StructuralError> {
        if address.depth() < 2 {
            return Err(if address.is_root() {
                StructuralError::RootAddress
            } else {
                StructuralError::NotFound(address.clone())
            });
        }
        let (parent, name) = split(address)?;
        let siblings = self.controls_mut(&parent)?;
        let pos = siblings
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| StructuralError::NotFound(address.clone()))?;
        if leaf_only && !siblings[pos].is_leaf() {
            return Err(StructuralError::NotALeaf(address.clone()));
        }
        let control = siblings.remove(pos);
        self.reindex();
        Ok(control)
    }

    /// Rename the screen or control at `address`.
    pub fn rename_control(
        &mut self,
        address: &Address,
        new_name: &str,
    ) -> Result<(), StructuralError> {
        check_name(new_name)?;
        let (parent, name) = split(address)?;
        if name == new_name {
            return if self.contains(address) {
                Ok(())
            } else {
                Err(StructuralError::NotFound(address.clone()))
            };
        }
        if parent.is_root() {
            if self.screen(new_name).is_some() {
                return Err(StructuralError::DuplicateName {
                    parent,
                    name: new_name.to_string(),
                });
            }
            let screen = self
                .screens
                .iter_mut()
                .find(|s| s.name() == name)
                .ok_or_else(|| StructuralError::NotFound(address.clone()))?;
            screen.set_name(new_name.to_string());
        } else {
            let siblings = self.controls_mut(&parent)?;
            if siblings.iter().any(|c| c.name() == new_name) {
                return Err(StructuralError::DuplicateName {
                    parent,
                    name: new_name.to_string(),
                });
            }
            let control = siblings
                .iter_mut()
                .find(|c| c.name() == name)
                .ok_or_else(|| StructuralError::NotFound(address.clone()))?;
            control.set_name(new_name.to_string());
        }
        self.reindex();
        Ok(())
    }

    // ── Properties ───────────────────────────────────────────────────────

    /// Set a property on the node at `address`; the root sets an app property.
    /// Returns the previous value.
    pub fn set_property(
        &mut self,
        address: &Address,
        key: &str,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>, StructuralError> {
        check_name(key)?;
        Ok(self.properties_mut(address)?.insert(key.to_string(), value))
    }

    pub fn remove_property(
        &mut self,
        address: &Address,
        key: &str,
    ) -> Result<PropertyValue, StructuralError> {
        self.properties_mut(address)?
            .shift_remove(key)
            .ok_or_else(|| StructuralError::PropertyNotFound {
                address: address.clone(),
                key: key.to_string(),
            })
    }

    // ── Global collections ───────────────────────────────────────────────

    /// Replace the theme, returning the previous one.
    pub fn set_theme(&mut self, theme: Theme) -> Theme {
        std::mem::replace(&mut self.theme, theme)
    }

    pub fn set_data_source(
        &mut self,
        source: DataSource,
    ) -> Result<Option<DataSource>, StructuralError> {
        check_name(&source.name)?;
        Ok(self.data_sources.insert(source.name.clone(), source))
    }

    pub fn remove_data_source(&mut self, name: &str) -> Option<DataSource> {
        self.data_sources.remove(name)
    }

    pub fn set_resource(
        &mut self,
        resource: Resource,
    ) -> Result<Option<Resource>, StructuralError> {
        check_name(&resource.name)?;
        Ok(self.resources.insert(resource.name.clone(), resource))
    }

    pub fn remove_resource(&mut self, name: &str) -> Option<Resource> {
        self.resources.remove(name)
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn controls_mut(&mut self, parent: &Address) -> Result<&mut Vec<Control>, StructuralError> {
        let mut segments = parent.segments().iter();
        let Some(first) = segments.next() else {
            return Err(StructuralError::NotAContainer(Address::root()));
        };
        let screen = self
            .screens
            .iter_mut()
            .find(|s| s.name() == first.as_str())
            .ok_or_else(|| StructuralError::NotFound(parent.clone()))?;
        let mut controls = screen.controls_mut();
        for segment in segments {
            let child = controls
                .iter_mut()
                .find(|c| c.name() == segment.as_str())
                .ok_or_else(|| StructuralError::NotFound(parent.clone()))?;
            controls = child.children_mut();
        }
        Ok(controls)
    }

    fn properties_mut(&mut self, address: &Address) -> Result<&mut PropertyMap, StructuralError> {
        let Ok((parent, name)) = split(address) else {
            return Ok(&mut self.properties);
        };
        if parent.is_root() {
            return self
                .screens
                .iter_mut()
                .find(|s| s.name() == name)
                .map(Screen::properties_mut)
                .ok_or_else(|| StructuralError::NotFound(address.clone()));
        }
        self.controls_mut(&parent)
            .map_err(|_| StructuralError::NotFound(address.clone()))?
            .iter_mut()
            .find(|c| c.name() == name)
            .map(Control::properties_mut)
            .ok_or_else(|| StructuralError::NotFound(address.clone()))
    }

    fn reindex(&mut self) {
        self.parents = ParentIndex::build(&self.screens);
    }
}

fn split(address: &Address) -> Result<(Address, String), StructuralError> {
    let parent = address.parent().map_err(|_| StructuralError::RootAddress)?;
    let name = address.name().map_err(|_| StructuralError::RootAddress)?;
    Ok((parent, name.to_string()))
}

fn check_name(name: &str) -> Result<(), StructuralError> {
    validate_name(name).map_err(|reason| StructuralError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

fn validate_properties(properties: &PropertyMap) -> Result<(), StructuralError> {
    properties.keys().try_for_each(|key| check_name(key))
}

/// Check an incoming subtree: valid names, unique among siblings.
fn validate_children(parent: &Address, children: &[Control]) -> Result<(), StructuralError> {
    let mut seen = BTreeSet::new();
    for child in children {
        check_name(child.name())?;
        if !seen.insert(child.name()) {
            return Err(StructuralError::DuplicateName {
                parent: parent.clone(),
                name: child.name().to_string(),
            });
        }
        validate_properties(child.properties())?;
        validate_children(&parent.child(child.name()), child.children())?;
    }
    Ok(())
}
