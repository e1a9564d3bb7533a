//! Structural diff between two document snapshots.
//!
//! [`compute_delta`] walks `base` and `compare` in lock-step, matching
//! screens and controls by name under the same parent. The output order is
//! canonical so that two computations over equal inputs are identical:
//!
//! 1. `ThemeChanged`, always, as the first delta
//! 2. app property deltas
//! 3. screens: added (name order), matched (name order, recursively),
//!    removed (name order)
//! 4. data sources, then resources, by name
//!
//! Inside every container the order is: own property deltas (added, changed,
//! removed, each by key), renames, additions, recursion into matched
//! children, removals.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use canvas_address::Address;

use crate::error::StructuralError;
use crate::fingerprint::{
    content_fingerprint, fingerprint_data_source, fingerprint_resource, fingerprint_theme,
};
use crate::model::{
    Control, DataSource, Document, PropertyMap, PropertyValue, Resource, Screen, Theme,
};
use crate::normalize::values_equal;

/// One atomic change between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Always emitted; a marker when `old` and `new` are equal.
    ThemeChanged { old: Theme, new: Theme },
    PropertyAdded {
        address: Address,
        key: String,
        value: PropertyValue,
    },
    PropertyChanged {
        address: Address,
        key: String,
        old: PropertyValue,
        new: PropertyValue,
    },
    PropertyRemoved {
        address: Address,
        key: String,
        old: PropertyValue,
    },
    /// `anchor` is the preceding screen in the compare snapshot.
    ScreenAdded { screen: Screen, anchor: Option<String> },
    ScreenRemoved { screen: Screen },
    /// `anchor` is the preceding sibling in the compare snapshot.
    ControlAdded {
        parent: Address,
        control: Control,
        anchor: Option<String>,
    },
    ControlRemoved { address: Address, control: Control },
    ControlRenamed { address: Address, new_name: String },
    DataSourceChanged {
        name: String,
        old: Option<DataSource>,
        new: Option<DataSource>,
    },
    ResourceChanged {
        name: String,
        old: Option<Resource>,
        new: Option<Resource>,
    },
}

impl Delta {
    /// Address of the node the delta touches. Property deltas name their
    /// owning node; global deltas name the root.
    pub fn address(&self) -> Address {
        match self {
            Delta::PropertyAdded { address, .. }
            | Delta::PropertyChanged { address, .. }
            | Delta::PropertyRemoved { address, .. }
            | Delta::ControlRemoved { address, .. }
            | Delta::ControlRenamed { address, .. } => address.clone(),
            Delta::ScreenAdded { screen, .. } | Delta::ScreenRemoved { screen } => {
                Address::root().child(screen.name())
            }
            Delta::ControlAdded { parent, control, .. } => parent.child(control.name()),
            Delta::ThemeChanged { .. }
            | Delta::DataSourceChanged { .. }
            | Delta::ResourceChanged { .. } => Address::root(),
        }
    }

    /// Property key for property deltas.
    pub fn property_key(&self) -> Option<&str> {
        match self {
            Delta::PropertyAdded { key, .. }
            | Delta::PropertyChanged { key, .. }
            | Delta::PropertyRemoved { key, .. } => Some(key.as_str()),
            _ => None,
        }
    }

    /// True for the always-emitted theme delta that carries no change.
    pub fn is_marker(&self) -> bool {
        match self {
            Delta::ThemeChanged { old, new } => fingerprint_theme(old) == fingerprint_theme(new),
            _ => false,
        }
    }

    /// Apply this delta to `doc` through its structural operations.
    pub fn apply_to(&self, doc: &mut Document) -> Result<(), StructuralError> {
        match self {
            Delta::ThemeChanged { new, .. } => {
                doc.set_theme(new.clone());
            }
            Delta::PropertyAdded { address, key, value: new }
            | Delta::PropertyChanged { address, key, new, .. } => {
                doc.set_property(address, key, new.clone())?;
            }
            Delta::PropertyRemoved { address, key, .. } => {
                doc.remove_property(address, key)?;
            }
            Delta::ScreenAdded { screen, anchor } => {
                let index = anchor_index(
                    doc.screens().iter().map(Screen::name),
                    anchor.as_deref(),
                );
                doc.insert_screen(index, screen.clone())?;
            }
            Delta::ScreenRemoved { screen } => {
                doc.remove_screen(screen.name())?;
            }
            Delta::ControlAdded { parent, control, anchor } => {
                let siblings = doc
                    .resolve(parent)
                    .ok_or_else(|| StructuralError::NotFound(parent.clone()))?
                    .controls();
                let index = anchor_index(siblings.iter().map(Control::name), anchor.as_deref());
                doc.insert_control(parent, index, control.clone())?;
            }
            Delta::ControlRemoved { address, .. } => {
                doc.remove_control(address)?;
            }
            Delta::ControlRenamed { address, new_name } => {
                doc.rename_control(address, new_name)?;
            }
            Delta::DataSourceChanged { name, new, .. } => match new {
                Some(source) => {
                    doc.set_data_source(source.clone())?;
                }
                None => {
                    doc.remove_data_source(name);
                }
            },
            Delta::ResourceChanged { name, new, .. } => match new {
                Some(resource) => {
                    doc.set_resource(resource.clone())?;
                }
                None => {
                    doc.remove_resource(name);
                }
            },
        }
        Ok(())
    }
}

/// Insertion index after `anchor`; the start when there is no anchor, the
/// end when the anchor is gone.
pub(crate) fn anchor_index<'a>(
    names: impl Iterator<Item = &'a str>,
    anchor: Option<&str>,
) -> usize {
    let names: Vec<&str> = names.collect();
    match anchor {
        None => 0,
        Some(anchor) => names
            .iter()
            .position(|n| *n == anchor)
            .map_or(names.len(), |i| i + 1),
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delta::ThemeChanged { old, new } => write!(f, "theme {} -> {}", old.name, new.name),
            Delta::PropertyAdded { address, key, value } => {
                write!(f, "+ {} = {value}", address.child(key))
            }
            Delta::PropertyChanged { address, key, old, new } => {
                write!(f, "~ {}: {old} -> {new}", address.child(key))
            }
            Delta::PropertyRemoved { address, key, .. } => write!(f, "- {}", address.child(key)),
            Delta::ScreenAdded { screen, .. } => write!(f, "+ screen {}", screen.name()),
            Delta::ScreenRemoved { screen } => write!(f, "- screen {}", screen.name()),
            Delta::ControlAdded { parent, control, .. } => {
                write!(f, "+ control {}", parent.child(control.name()))
            }
            Delta::ControlRemoved { address, .. } => write!(f, "- control {address}"),
            Delta::ControlRenamed { address, new_name } => {
                write!(f, "rename {address} -> {new_name}")
            }
            Delta::DataSourceChanged { name, .. } => write!(f, "~ data source {name}"),
            Delta::ResourceChanged { name, .. } => write!(f, "~ resource {name}"),
        }
    }
}

// ── Diff ──────────────────────────────────────────────────────────────────

/// Ordered deltas turning `base` into `compare`.
pub fn compute_delta(base: &Document, compare: &Document) -> Vec<Delta> {
    let _span = tracing::debug_span!("compute_delta").entered();
    let mut out = vec![Delta::ThemeChanged {
        old: base.theme().clone(),
        new: compare.theme().clone(),
    }];

    diff_properties(&Address::root(), base.properties(), compare.properties(), &mut out);
    diff_screens(base, compare, &mut out);
    diff_data_sources(base, compare, &mut out);
    diff_resources(base, compare, &mut out);

    tracing::debug!(deltas = out.len(), "computed delta");
    out
}

/// Deltas other than the always-emitted marker.
pub fn content_deltas(base: &Document, compare: &Document) -> Vec<Delta> {
    compute_delta(base, compare)
        .into_iter()
        .filter(|d| !d.is_marker())
        .collect()
}

fn diff_properties(
    address: &Address,
    base: &PropertyMap,
    compare: &PropertyMap,
    out: &mut Vec<Delta>,
) {
    let mut added: Vec<&String> = compare.keys().filter(|k| !base.contains_key(*k)).collect();
    added.sort();
    for key in added {
        out.push(Delta::PropertyAdded {
            address: address.clone(),
            key: key.clone(),
            value: compare[key].clone(),
        });
    }

    let mut changed: Vec<(&String, &PropertyValue, &PropertyValue)> = base
        .iter()
        .filter_map(|(k, old)| compare.get(k).map(|new| (k, old, new)))
        .filter(|(_, old, new)| !values_equal(old, new))
        .collect();
    changed.sort_by(|a, b| a.0.cmp(b.0));
    for (key, old, new) in changed {
        out.push(Delta::PropertyChanged {
            address: address.clone(),
            key: key.clone(),
            old: old.clone(),
            new: new.clone(),
        });
    }

    let mut removed: Vec<&String> = base.keys().filter(|k| !compare.contains_key(*k)).collect();
    removed.sort();
    for key in removed {
        out.push(Delta::PropertyRemoved {
            address: address.clone(),
            key: key.clone(),
            old: base[key].clone(),
        });
    }
}

fn diff_screens(base: &Document, compare: &Document, out: &mut Vec<Delta>) {
    let base_names: BTreeSet<&str> = base.screens().iter().map(Screen::name).collect();
    let compare_names: BTreeSet<&str> = compare.screens().iter().map(Screen::name).collect();

    let anchors: BTreeMap<&str, Option<String>> = compare
        .screens()
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let anchor = i.checked_sub(1).map(|p| compare.screens()[p].name().to_string());
            (s.name(), anchor)
        })
        .collect();

    for name in compare_names.difference(&base_names) {
        if let Some(screen) = compare.screen(name) {
            out.push(Delta::ScreenAdded {
                screen: screen.clone(),
                anchor: anchors.get(name).cloned().flatten(),
            });
        }
    }

    for name in base_names.intersection(&compare_names) {
        if let (Some(b), Some(c)) = (base.screen(name), compare.screen(name)) {
            let address = Address::root().child(*name);
            diff_properties(&address, b.properties(), c.properties(), out);
            diff_children(&address, b.controls(), c.controls(), out);
        }
    }

    for name in base_names.difference(&compare_names) {
        if let Some(screen) = base.screen(name) {
            out.push(Delta::ScreenRemoved { screen: screen.clone() });
        }
    }
}

fn diff_children(parent: &Address, base: &[Control], compare: &[Control], out: &mut Vec<Delta>) {
    let in_base = |name: &str| base.iter().any(|c| c.name() == name);
    let in_compare = |name: &str| compare.iter().any(|c| c.name() == name);

    // Pair unmatched children with identical content into renames.
    let mut unmatched_base: Vec<&Control> = base.iter().filter(|c| !in_compare(c.name())).collect();
    let mut renamed_to: BTreeSet<&str> = BTreeSet::new();
    let mut renamed_from: BTreeSet<&str> = BTreeSet::new();
    for control in compare.iter().filter(|c| !in_base(c.name())) {
        let fp = content_fingerprint(control);
        if let Some(pos) = unmatched_base.iter().position(|b| content_fingerprint(b) == fp) {
            let old = unmatched_base.remove(pos);
            out.push(Delta::ControlRenamed {
                address: parent.child(old.name()),
                new_name: control.name().to_string(),
            });
            renamed_to.insert(control.name());
            renamed_from.insert(old.name());
        }
    }

    for (i, control) in compare.iter().enumerate() {
        if in_base(control.name()) || renamed_to.contains(control.name()) {
            continue;
        }
        out.push(Delta::ControlAdded {
            parent: parent.clone(),
            control: control.clone(),
            anchor: preceding(compare, i),
        });
    }

    for (i, control) in compare.iter().enumerate() {
        let Some(old) = base.iter().find(|b| b.name() == control.name()) else {
            continue;
        };
        let address = parent.child(control.name());
        if old.kind() != control.kind() {
            tracing::trace!(%address, "control kind changed, replacing");
            out.push(Delta::ControlRemoved {
                address,
                control: old.clone(),
            });
            out.push(Delta::ControlAdded {
                parent: parent.clone(),
                control: control.clone(),
                anchor: preceding(compare, i),
            });
            continue;
        }
        diff_properties(&address, old.properties(), control.properties(), out);
        diff_children(&address, old.children(), control.children(), out);
    }

    for control in base {
        if in_compare(control.name()) || renamed_from.contains(control.name()) {
            continue;
        }
        out.push(Delta::ControlRemoved {
            address: parent.child(control.name()),
            control: control.clone(),
        });
    }
}

fn preceding(siblings: &[Control], index: usize) -> Option<String> {
    index
        .checked_sub(1)
        .map(|p| siblings[p].name().to_string())
}

fn diff_data_sources(base: &Document, compare: &Document, out: &mut Vec<Delta>) {
    let names: BTreeSet<&String> = base
        .data_sources()
        .keys()
        .chain(compare.data_sources().keys())
        .collect();
    for name in names {
        let old = base.data_source(name);
        let new = compare.data_source(name);
        let same = match (old, new) {
            (Some(a), Some(b)) => fingerprint_data_source(a) == fingerprint_data_source(b),
            _ => false,
        };
        if !same {
            out.push(Delta::DataSourceChanged {
                name: name.clone(),
                old: old.cloned(),
                new: new.cloned(),
            });
        }
    }
}

fn diff_resources(base: &Document, compare: &Document, out: &mut Vec<Delta>) {
    let names: BTreeSet<&String> = base
        .resources()
        .keys()
        .chain(compare.resources().keys())
        .collect();
    for name in names {
        let old = base.resource(name);
        let new = compare.resource(name);
        let same = match (old, new) {
            (Some(a), Some(b)) => fingerprint_resource(a) == fingerprint_resource(b),
            _ => false,
        };
        if !same {
            out.push(Delta::ResourceChanged {
                name: name.clone(),
                old: old.cloned(),
                new: new.cloned(),
            });
        }
    }
}
