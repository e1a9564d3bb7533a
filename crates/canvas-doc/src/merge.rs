//! Three-way merge of document snapshots.
//!
//! Both sides are diffed against the common ancestor. The merged document
//! starts as a copy of `local`; every remote delta is then reconciled
//! against what `local` did at the same place. Edits at different
//! addresses merge cleanly. Overlapping edits produce a [`Conflict`] and
//! are resolved by the configured [`ConflictPolicy`], except for
//! remove-versus-modify which always keeps the node.
//!
//! Conflicts are data. The merge itself never fails.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use canvas_address::Address;

use crate::diff::{anchor_index, compute_delta, Delta};
use crate::error::StructuralError;
use crate::fingerprint::{
    fingerprint_control, fingerprint_data_source, fingerprint_resource, fingerprint_screen,
    fingerprint_theme, Fingerprint,
};
use crate::model::{Control, DataSource, Document, NodeRef, PropertyValue, Resource, Screen, Theme};
use crate::normalize::values_equal;

/// Which side wins an overlapping edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConflictPolicy {
    /// Keep the local value and report the conflict.
    #[default]
    PreferLocal,
    /// Take the remote value and report the conflict.
    PreferRemote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub policy: ConflictPolicy,
}

impl MergeOptions {
    pub fn prefer_remote() -> Self {
        Self {
            policy: ConflictPolicy::PreferRemote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Both sides set the same property to different values.
    PropertyEdit,
    /// One side removed a node the other modified. The node is kept.
    RemoveModify,
    /// Both sides added a sibling with the same name and different content.
    AddAdd,
    /// Both sides renamed the same control differently.
    Rename,
    Theme,
    DataSource,
    Resource,
    /// A remote change could not be applied to the merged tree.
    Structural,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::PropertyEdit => "property",
            ConflictKind::RemoveModify => "remove/modify",
            ConflictKind::AddAdd => "add/add",
            ConflictKind::Rename => "rename",
            ConflictKind::Theme => "theme",
            ConflictKind::DataSource => "data source",
            ConflictKind::Resource => "resource",
            ConflictKind::Structural => "structural",
        }
    }
}

/// One overlapping edit.
///
/// `address` is the property address for property conflicts, the node
/// address for node conflicts, and the root-level name for theme, data
/// source and resource conflicts. The three values are formula text, names,
/// or content fingerprints depending on `kind`; `None` means absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub address: Address,
    pub ancestor: Option<String>,
    pub local: Option<String>,
    pub remote: Option<String>,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "<absent>".to_string());
        write!(
            f,
            "{} conflict at `{}`: ancestor {}, local {}, remote {}",
            self.kind.as_str(),
            self.address,
            show(&self.ancestor),
            show(&self.local),
            show(&self.remote)
        )
    }
}

/// Merged document plus the conflicts found on the way.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document: Document,
    pub conflicts: Vec<Conflict>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn into_parts(self) -> (Document, Vec<Conflict>) {
        (self.document, self.conflicts)
    }
}

/// Merge with the default policy (prefer local).
pub fn merge(ancestor: &Document, local: &Document, remote: &Document) -> MergeOutcome {
    merge_with(ancestor, local, remote, &MergeOptions::default())
}

pub fn merge_with(
    ancestor: &Document,
    local: &Document,
    remote: &Document,
    options: &MergeOptions,
) -> MergeOutcome {
    let _span = tracing::debug_span!("merge", policy = ?options.policy).entered();
    let local_deltas = compute_delta(ancestor, local);
    let remote_deltas = compute_delta(ancestor, remote);
    tracing::debug!(
        local = local_deltas.len(),
        remote = remote_deltas.len(),
        "diffed both sides"
    );

    let mut merger = Merger {
        remote,
        local: LocalChanges::from_deltas(&local_deltas),
        policy: options.policy,
        merged: local.clone(),
        conflicts: Vec::new(),
        restored: Vec::new(),
        replacements_reported: Vec::new(),
        remote_renames: Vec::new(),
    };
    for delta in remote_deltas.iter().filter(|d| !d.is_marker()) {
        merger.reconcile(delta);
    }

    tracing::debug!(conflicts = merger.conflicts.len(), "merge finished");
    MergeOutcome {
        document: merger.merged,
        conflicts: merger.conflicts,
    }
}

// ── Local side summary ────────────────────────────────────────────────────

/// What the local side did, indexed by ancestor address.
#[derive(Default)]
struct LocalChanges {
    /// Resulting value per (node, key); `None` when removed.
    properties: BTreeMap<(Address, String), Option<PropertyValue>>,
    /// Removed nodes that were not re-added under the same name.
    removed: Vec<Address>,
    removed_all: BTreeSet<Address>,
    added: BTreeMap<Address, Fingerprint>,
    /// Controls removed and re-added with a different kind.
    replaced: Vec<Address>,
    /// Old address → new address.
    renames: Vec<(Address, Address)>,
    /// Addresses of every non-removal node change.
    modified: Vec<Address>,
    theme: Option<Theme>,
    data_sources: BTreeMap<String, Option<DataSource>>,
    resources: BTreeMap<String, Option<Resource>>,
}

impl LocalChanges {
    fn from_deltas(deltas: &[Delta]) -> Self {
        let mut changes = Self::default();
        for delta in deltas {
            match delta {
                Delta::ThemeChanged { new, .. } => {
                    if !delta.is_marker() {
                        changes.theme = Some(new.clone());
                    }
                }
                Delta::PropertyAdded { address, key, value: new }
                | Delta::PropertyChanged { address, key, new, .. } => {
                    changes
                        .properties
                        .insert((address.clone(), key.clone()), Some(new.clone()));
                    changes.modified.push(address.clone());
                }
                Delta::PropertyRemoved { address, key, .. } => {
                    changes.properties.insert((address.clone(), key.clone()), None);
                    changes.modified.push(address.clone());
                }
                Delta::ScreenAdded { screen, .. } => {
                    changes.added.insert(delta.address(), fingerprint_screen(screen));
                    changes.modified.push(delta.address());
                }
                Delta::ControlAdded { control, .. } => {
                    changes.added.insert(delta.address(), fingerprint_control(control));
                    changes.modified.push(delta.address());
                }
                Delta::ScreenRemoved { .. } | Delta::ControlRemoved { .. } => {
                    changes.removed_all.insert(delta.address());
                }
                Delta::ControlRenamed { address, new_name } => {
                    if let Ok(to) = address.with_name(new_name.as_str()) {
                        changes.renames.push((address.clone(), to));
                    }
                    changes.modified.push(address.clone());
                }
                Delta::DataSourceChanged { name, new, .. } => {
                    changes.data_sources.insert(name.clone(), new.clone());
                }
                Delta::ResourceChanged { name, new, .. } => {
                    changes.resources.insert(name.clone(), new.clone());
                }
            }
        }
        changes.removed = changes
            .removed_all
            .iter()
            .filter(|a| !changes.added.contains_key(*a))
            .cloned()
            .collect();
        changes.replaced = changes
            .removed_all
            .iter()
            .filter(|a| changes.added.contains_key(*a))
            .cloned()
            .collect();
        changes
    }
}

// ── Reconciliation ────────────────────────────────────────────────────────

struct Merger<'a> {
    remote: &'a Document,
    local: LocalChanges,
    policy: ConflictPolicy,
    merged: Document,
    conflicts: Vec<Conflict>,
    /// Locally removed nodes already restored from the remote side.
    restored: Vec<Address>,
    /// Locally replaced nodes already reported as conflicts.
    replacements_reported: Vec<Address>,
    remote_renames: Vec<(Address, Address)>,
}

impl Merger<'_> {
    fn reconcile(&mut self, delta: &Delta) {
        match delta {
            Delta::ThemeChanged { old, new } => self.reconcile_theme(old, new),
            Delta::PropertyAdded { address, key, value } => {
                self.reconcile_property(delta, address, key, Some(value))
            }
            Delta::PropertyChanged { address, key, new, .. } => {
                self.reconcile_property(delta, address, key, Some(new))
            }
            Delta::PropertyRemoved { address, key, .. } => {
                self.reconcile_property(delta, address, key, None)
            }
            Delta::ScreenAdded { screen, .. } => self.reconcile_screen_added(delta, screen),
            Delta::ScreenRemoved { .. } | Delta::ControlRemoved { .. } => {
                self.reconcile_removed(delta)
            }
            Delta::ControlAdded { parent, control, .. } => {
                self.reconcile_control_added(delta, parent, control)
            }
            Delta::ControlRenamed { address, new_name } => {
                self.reconcile_renamed(delta, address, new_name)
            }
            Delta::DataSourceChanged { name, old, new } => {
                let local = self.local.data_sources.get(name).cloned();
                self.reconcile_global(
                    delta,
                    ConflictKind::DataSource,
                    name,
                    [old.as_ref(), new.as_ref()],
                    local.as_ref().map(Option::as_ref),
                    fingerprint_data_source,
                )
            }
            Delta::ResourceChanged { name, old, new } => {
                let local = self.local.resources.get(name).cloned();
                self.reconcile_global(
                    delta,
                    ConflictKind::Resource,
                    name,
                    [old.as_ref(), new.as_ref()],
                    local.as_ref().map(Option::as_ref),
                    fingerprint_resource,
                )
            }
        }
    }

    fn reconcile_theme(&mut self, old: &Theme, new: &Theme) {
        if let Some(local) = self.local.theme.clone() {
            if fingerprint_theme(&local) == fingerprint_theme(new) {
                return;
            }
            self.conflict(
                ConflictKind::Theme,
                Address::root(),
                Some(old.name.clone()),
                Some(local.name.clone()),
                Some(new.name.clone()),
            );
            if self.policy == ConflictPolicy::PreferLocal {
                return;
            }
        }
        self.merged.set_theme(new.clone());
    }

    fn reconcile_property(
        &mut self,
        delta: &Delta,
        address: &Address,
        key: &str,
        remote: Option<&PropertyValue>,
    ) {
        if self.is_restored(address) {
            return;
        }
        if let Some(removed) = self.local_removal(address) {
            self.restore(removed);
            return;
        }
        if self.inside_replacement(delta, address) {
            return;
        }
        let slot = (address.clone(), key.to_string());
        if let Some(local) = self.local.properties.get(&slot).cloned() {
            let same = match (&local, remote) {
                (Some(a), Some(b)) => values_equal(a, b),
                (None, None) => true,
                _ => false,
            };
            if same {
                return;
            }
            let ancestor = match delta {
                Delta::PropertyChanged { old, .. } | Delta::PropertyRemoved { old, .. } => {
                    Some(old.text().to_string())
                }
                _ => None,
            };
            self.conflict(
                ConflictKind::PropertyEdit,
                address.child(key),
                ancestor,
                local.map(|v| v.text().to_string()),
                remote.map(|v| v.text().to_string()),
            );
            if self.policy == ConflictPolicy::PreferLocal {
                return;
            }
        }
        self.apply(delta);
    }

    fn reconcile_screen_added(&mut self, delta: &Delta, screen: &Screen) {
        let address = delta.address();
        let Some(pos) = self
            .merged
            .screens()
            .iter()
            .position(|s| s.name() == screen.name())
        else {
            self.apply(delta);
            return;
        };
        let remote_fp = fingerprint_screen(screen);
        if self.local.added.get(&address) == Some(&remote_fp) {
            return;
        }
        let local_fp = fingerprint_screen(&self.merged.screens()[pos]);
        self.conflict(
            ConflictKind::AddAdd,
            address,
            None,
            Some(local_fp.to_hex()),
            Some(remote_fp.to_hex()),
        );
        if self.policy == ConflictPolicy::PreferRemote {
            let replaced = self
                .merged
                .remove_screen(screen.name())
                .and_then(|_| self.merged.insert_screen(pos, screen.clone()));
            if let Err(err) = replaced {
                self.unapplied(delta, &err.to_string());
            }
        }
    }

    fn reconcile_control_added(&mut self, delta: &Delta, parent: &Address, control: &Control) {
        let address = parent.child(control.name());
        if self.is_restored(&address) {
            return;
        }
        if let Some(removed) = self.local_removal(&address) {
            self.restore(removed);
            return;
        }
        if self.inside_replacement(delta, parent) {
            return;
        }
        let merged_parent = self.to_local(parent);
        let existing = self.merged.resolve(&merged_parent).and_then(|node| {
            node.controls()
                .iter()
                .position(|c| c.name() == control.name())
                .map(|pos| (pos, fingerprint_control(&node.controls()[pos])))
        });
        let Some((pos, local_fp)) = existing else {
            self.apply(delta);
            return;
        };
        let remote_fp = fingerprint_control(control);
        if self.local.added.get(&address) == Some(&remote_fp) {
            return;
        }
        self.conflict(
            ConflictKind::AddAdd,
            address,
            None,
            Some(local_fp.to_hex()),
            Some(remote_fp.to_hex()),
        );
        if self.policy == ConflictPolicy::PreferRemote {
            let target = merged_parent.child(control.name());
            let replaced = self
                .merged
                .remove_control(&target)
                .and_then(|_| self.merged.insert_control(&merged_parent, pos, control.clone()));
            if let Err(err) = replaced {
                self.unapplied(delta, &err.to_string());
            }
        }
    }

    fn reconcile_removed(&mut self, delta: &Delta) {
        let address = delta.address();
        if self.is_restored(&address)
            || self.local.removed_all.contains(&address)
            || self.local_removal(&address).is_some()
            || self.inside_replacement(delta, &address)
        {
            return;
        }
        if self.is_locally_modified(&address) {
            let local = self.merged.resolve(&self.to_local(&address)).map(node_summary);
            self.conflict(ConflictKind::RemoveModify, address, None, local, None);
            return;
        }
        self.apply(delta);
    }

    fn reconcile_renamed(&mut self, delta: &Delta, address: &Address, new_name: &str) {
        if let Ok(to) = address.with_name(new_name) {
            self.remote_renames.push((address.clone(), to));
        }
        if self.is_restored(address) {
            return;
        }
        if let Some(removed) = self.local_removal(address) {
            self.restore(removed);
            return;
        }
        if self.inside_replacement(delta, address) {
            return;
        }
        let local_rename = self
            .local
            .renames
            .iter()
            .find(|(from, _)| from == address)
            .map(|(_, to)| to.clone());
        let Some(local_to) = local_rename else {
            self.apply(delta);
            return;
        };
        let local_name = local_to.name().map(str::to_string).unwrap_or_default();
        if local_name == new_name {
            return;
        }
        self.conflict(
            ConflictKind::Rename,
            address.clone(),
            address.name().ok().map(str::to_string),
            Some(local_name),
            Some(new_name.to_string()),
        );
        if self.policy == ConflictPolicy::PreferRemote {
            if let Err(err) = self.merged.rename_control(&local_to, new_name) {
                self.unapplied(delta, &err.to_string());
            }
        }
    }

    fn reconcile_global<T>(
        &mut self,
        delta: &Delta,
        kind: ConflictKind,
        name: &str,
        [old, new]: [Option<&T>; 2],
        local: Option<Option<&T>>,
        fingerprint: fn(&T) -> Fingerprint,
    ) {
        if let Some(local) = local {
            let same = match (local, new) {
                (Some(a), Some(b)) => fingerprint(a) == fingerprint(b),
                (None, None) => true,
                _ => false,
            };
            if same {
                return;
            }
            let hex = |v: Option<&T>| v.map(|v| fingerprint(v).to_hex());
            self.conflict(kind, Address::root().child(name), hex(old), hex(local), hex(new));
            if self.policy == ConflictPolicy::PreferLocal {
                return;
            }
        }
        self.apply(delta);
    }

    /// Bring back a locally removed node because the remote side changed
    /// something inside it. Recorded once per node.
    fn restore(&mut self, removed: Address) {
        self.restored.push(removed.clone());
        let remote = self.remote;
        let remote_address = self.to_remote(&removed);
        let Ok(parent) = removed.parent() else {
            return;
        };
        let result = match remote.resolve(&remote_address) {
            Some(NodeRef::Screen(screen)) => {
                let anchor = preceding(remote.screens().iter().map(Screen::name), screen.name());
                let index = anchor_index(self.merged.screens().iter().map(Screen::name), anchor);
                self.merged
                    .insert_screen(index, screen.clone())
                    .map(|_| fingerprint_screen(screen))
            }
            Some(NodeRef::Control(control)) => {
                let siblings = remote_address
                    .parent()
                    .ok()
                    .and_then(|p| remote.resolve(&p))
                    .map_or(&[][..], |node| node.controls());
                let anchor = preceding(siblings.iter().map(Control::name), control.name());
                let merged_parent = self.to_local(&parent);
                let index = self.merged.resolve(&merged_parent).map_or(usize::MAX, |node| {
                    anchor_index(node.controls().iter().map(Control::name), anchor)
                });
                self.merged
                    .insert_control(&merged_parent, index, control.clone())
                    .map(|_| fingerprint_control(control))
            }
            _ => Err(StructuralError::NotFound(remote_address.clone())),
        };
        match result {
            Ok(fp) => {
                tracing::debug!(address = %removed, "restored locally removed node");
                self.conflict(ConflictKind::RemoveModify, removed, None, None, Some(fp.to_hex()));
            }
            Err(err) => {
                self.conflict(
                    ConflictKind::Structural,
                    removed,
                    None,
                    Some(err.to_string()),
                    None,
                );
            }
        }
    }

    /// A remote change at or below a control the local side replaced with
    /// a different kind. The local node is kept and the first such change
    /// per node is recorded as a conflict.
    fn inside_replacement(&mut self, delta: &Delta, address: &Address) -> bool {
        let Some(replaced) = self.local.replaced.iter().find(|r| r.contains(address)).cloned()
        else {
            return false;
        };
        if !self.replacements_reported.contains(&replaced) {
            let local = self.merged.resolve(&self.to_local(&replaced)).map(node_summary);
            self.conflict(
                ConflictKind::RemoveModify,
                replaced.clone(),
                None,
                local,
                Some(delta.to_string()),
            );
            self.replacements_reported.push(replaced);
        }
        true
    }

    /// Apply a remote delta after moving its addresses into local space.
    fn apply(&mut self, delta: &Delta) {
        let delta = self.translate(delta);
        if let Err(err) = delta.apply_to(&mut self.merged) {
            self.unapplied(&delta, &err.to_string());
        }
    }

    fn unapplied(&mut self, delta: &Delta, reason: &str) {
        tracing::warn!(delta = %delta, reason, "remote change not applied");
        self.conflict(
            ConflictKind::Structural,
            delta.address(),
            None,
            Some(reason.to_string()),
            Some(delta.to_string()),
        );
    }

    fn translate(&self, delta: &Delta) -> Delta {
        let mut delta = delta.clone();
        match &mut delta {
            Delta::PropertyAdded { address, .. }
            | Delta::PropertyChanged { address, .. }
            | Delta::PropertyRemoved { address, .. }
            | Delta::ControlRemoved { address, .. }
            | Delta::ControlRenamed { address, .. } => *address = self.to_local(address),
            Delta::ControlAdded { parent, anchor, .. } => {
                if let Some(name) = anchor {
                    let moved = self.to_local(&parent.child(name.as_str()));
                    if let Ok(moved) = moved.name() {
                        *name = moved.to_string();
                    }
                }
                *parent = self.to_local(parent);
            }
            _ => {}
        }
        delta
    }

    fn to_local(&self, address: &Address) -> Address {
        rebase_first(&self.local.renames, address)
    }

    fn to_remote(&self, address: &Address) -> Address {
        rebase_first(&self.remote_renames, address)
    }

    fn is_restored(&self, address: &Address) -> bool {
        self.restored.iter().any(|r| r.contains(address))
    }

    fn local_removal(&self, address: &Address) -> Option<Address> {
        self.local.removed.iter().find(|r| r.contains(address)).cloned()
    }

    fn is_locally_modified(&self, address: &Address) -> bool {
        self.local.modified.iter().any(|m| address.contains(m))
    }

    fn conflict(
        &mut self,
        kind: ConflictKind,
        address: Address,
        ancestor: Option<String>,
        local: Option<String>,
        remote: Option<String>,
    ) {
        let conflict = Conflict {
            kind,
            address,
            ancestor,
            local,
            remote,
        };
        tracing::debug!(%conflict, "conflict");
        self.conflicts.push(conflict);
    }
}

/// Renames never nest within one diff, so at most one applies.
fn rebase_first(renames: &[(Address, Address)], address: &Address) -> Address {
    renames
        .iter()
        .find_map(|(from, to)| address.rebase(from, to))
        .unwrap_or_else(|| address.clone())
}

fn preceding<'a>(names: impl Iterator<Item = &'a str>, name: &str) -> Option<&'a str> {
    let mut previous = None;
    for current in names {
        if current == name {
            return previous;
        }
        previous = Some(current);
    }
    None
}

fn node_summary(node: NodeRef<'_>) -> String {
    match node {
        NodeRef::Screen(screen) => fingerprint_screen(screen).to_hex(),
        NodeRef::Control(control) => fingerprint_control(control).to_hex(),
        NodeRef::App(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::content_equal;
    use canvas_address::parse_address;
    use serde_json::json;

    fn label(name: &str, text: &str) -> Control {
        Control::builtin(name, "Label").with_property("Text", text)
    }

    fn ancestor() -> Document {
        let mut doc = Document::new();
        doc.add_screen(
            Screen::new("Screen1")
                .with_control(label("Label1", "A"))
                .with_control(Control::builtin("Group1", "Group").with_child(label("Inner", "I"))),
        )
        .unwrap();
        doc
    }

    fn set(doc: &mut Document, address: &str, key: &str, value: &str) {
        doc.set_property(&parse_address(address), key, value.into())
            .unwrap();
    }

    #[test]
    fn identity_law() {
        let d = ancestor();
        let outcome = merge(&d, &d, &d);
        assert!(outcome.is_clean());
        assert_eq!(outcome.document, d);
    }

    #[test]
    fn no_op_law() {
        let a = ancestor();
        let mut l = ancestor();
        set(&mut l, "Screen1/Label1", "Text", "B");
        l.add_screen(Screen::new("Another")).unwrap();
        let outcome = merge(&a, &l, &a);
        assert!(outcome.is_clean());
        assert_eq!(outcome.document, l);
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let a = ancestor();
        let mut l = ancestor();
        set(&mut l, "Screen1/Label1", "Text", "B");
        let mut r = ancestor();
        r.insert_control(&parse_address("Screen1"), 1, label("Label2", "C"))
            .unwrap();

        let outcome = merge(&a, &l, &r);
        assert!(outcome.is_clean(), "{:?}", outcome.conflicts);
        let screen = outcome.document.screen("Screen1").unwrap();
        let names: Vec<&str> = screen.controls().iter().map(Control::name).collect();
        assert_eq!(names, ["Label1", "Label2", "Group1"]);
        assert_eq!(screen.control("Label1").unwrap().property("Text").unwrap().text(), "B");
        assert_eq!(screen.control("Label2").unwrap().property("Text").unwrap().text(), "C");
    }

    #[test]
    fn same_property_different_values_conflicts() {
        let a = ancestor();
        let mut l = ancestor();
        set(&mut l, "Screen1/Label1", "Text", "B");
        let mut r = ancestor();
        set(&mut r, "Screen1/Label1", "Text", "C");

        let outcome = merge(&a, &l, &r);
        assert_eq!(
            outcome.conflicts,
            [Conflict {
                kind: ConflictKind::PropertyEdit,
                address: parse_address("Screen1/Label1/Text"),
                ancestor: Some("A".into()),
                local: Some("B".into()),
                remote: Some("C".into()),
            }]
        );
        let text = outcome
            .document
            .resolve(&parse_address("Screen1/Label1"))
            .unwrap()
            .properties()["Text"]
            .text()
            .to_string();
        assert_eq!(text, "B");

        let outcome = merge_with(&a, &l, &r, &MergeOptions::prefer_remote());
        assert_eq!(outcome.conflicts.len(), 1);
        let node = outcome.document.resolve(&parse_address("Screen1/Label1")).unwrap();
        assert_eq!(node.properties()["Text"].text(), "C");
    }

    #[test]
    fn same_edit_on_both_sides_is_clean() {
        let a = ancestor();
        let mut l = ancestor();
        set(&mut l, "Screen1/Label1", "Text", "If(x,1,2)");
        let mut r = ancestor();
        set(&mut r, "Screen1/Label1", "Text", "If( x, 1, 2 )");
        assert!(merge(&a, &l, &r).is_clean());
    }

    #[test]
    fn remote_removes_locally_modified_node() {
        let a = ancestor();
        let mut l = ancestor();
        set(&mut l, "Screen1/Group1/Inner", "Text", "changed");
        let mut r = ancestor();
        r.remove_control(&parse_address("Screen1/Group1")).unwrap();

        let outcome = merge(&a, &l, &r);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::RemoveModify);
        assert!(outcome.document.contains(&parse_address("Screen1/Group1/Inner")));
    }

    #[test]
    fn local_removal_restored_when_remote_modifies_inside() {
        let a = ancestor();
        let mut l = ancestor();
        l.remove_control(&parse_address("Screen1/Group1")).unwrap();
        let mut r = ancestor();
        set(&mut r, "Screen1/Group1/Inner", "Text", "remote");
        set(&mut r, "Screen1/Group1", "Visible", "true");

        let outcome = merge(&a, &l, &r);
        assert_eq!(outcome.conflicts.len(), 1, "{:?}", outcome.conflicts);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::RemoveModify);
        assert_eq!(outcome.conflicts[0].address, parse_address("Screen1/Group1"));
        let inner = outcome
            .document
            .resolve(&parse_address("Screen1/Group1/Inner"))
            .unwrap();
        assert_eq!(inner.properties()["Text"].text(), "remote");
        let screen = outcome.document.screen("Screen1").unwrap();
        let names: Vec<&str> = screen.controls().iter().map(Control::name).collect();
        assert_eq!(names, ["Label1", "Group1"]);
    }

    #[test]
    fn both_removed_is_clean() {
        let a = ancestor();
        let mut l = ancestor();
        l.remove_control(&parse_address("Screen1/Group1/Inner")).unwrap();
        let mut r = ancestor();
        r.remove_control(&parse_address("Screen1/Group1")).unwrap();
        let outcome = merge(&a, &l, &r);
        assert!(outcome.is_clean());
        assert!(!outcome.document.contains(&parse_address("Screen1/Group1")));
    }

    #[test]
    fn add_add_keeps_local_by_default() {
        let a = ancestor();
        let mut l = ancestor();
        l.add_control(&parse_address("Screen1"), label("New", "local")).unwrap();
        let mut r = ancestor();
        r.add_control(&parse_address("Screen1"), label("New", "remote")).unwrap();

        let outcome = merge(&a, &l, &r);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::AddAdd);
        let node = outcome.document.resolve(&parse_address("Screen1/New")).unwrap();
        assert_eq!(node.properties()["Text"].text(), "local");

        let outcome = merge_with(&a, &l, &r, &MergeOptions::prefer_remote());
        let node = outcome.document.resolve(&parse_address("Screen1/New")).unwrap();
        assert_eq!(node.properties()["Text"].text(), "remote");
    }

    #[test]
    fn identical_additions_are_clean() {
        let a = ancestor();
        let mut l = ancestor();
        l.add_screen(Screen::new("S2").with_control(label("X", "1"))).unwrap();
        let r = l.clone();
        let outcome = merge(&a, &l, &r);
        assert!(outcome.is_clean());
        assert_eq!(outcome.document, l);
    }

    #[test]
    fn remote_edit_follows_local_rename() {
        let a = ancestor();
        let mut l = ancestor();
        l.rename_control(&parse_address("Screen1/Group1"), "Renamed").unwrap();
        let mut r = ancestor();
        set(&mut r, "Screen1/Group1/Inner", "Text", "remote");

        let outcome = merge(&a, &l, &r);
        assert!(outcome.is_clean(), "{:?}", outcome.conflicts);
        let inner = outcome
            .document
            .resolve(&parse_address("Screen1/Renamed/Inner"))
            .unwrap();
        assert_eq!(inner.properties()["Text"].text(), "remote");
    }

    #[test]
    fn divergent_renames_conflict() {
        let a = ancestor();
        let mut l = ancestor();
        l.rename_control(&parse_address("Screen1/Label1"), "Left").unwrap();
        let mut r = ancestor();
        r.rename_control(&parse_address("Screen1/Label1"), "Right").unwrap();
        let outcome = merge(&a, &l, &r);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::Rename);
        assert!(outcome.document.contains(&parse_address("Screen1/Left")));
    }

    #[test]
    fn theme_and_data_source_conflicts() {
        let a = ancestor();
        let mut l = ancestor();
        l.set_theme(Theme { name: "light".into(), palette: json!({}) });
        l.set_data_source(DataSource::new("Db", "Sql", json!({"v": 1}))).unwrap();
        let mut r = ancestor();
        r.set_theme(Theme { name: "dark".into(), palette: json!({}) });
        r.set_data_source(DataSource::new("Db", "Sql", json!({"v": 2}))).unwrap();

        let outcome = merge(&a, &l, &r);
        let kinds: Vec<ConflictKind> = outcome.conflicts.iter().map(|c| c.kind).collect();
        assert_eq!(kinds, [ConflictKind::Theme, ConflictKind::DataSource]);
        assert_eq!(outcome.document.theme().name, "light");

        let outcome = merge_with(&a, &l, &r, &MergeOptions::prefer_remote());
        assert_eq!(outcome.document.theme().name, "dark");
        assert_eq!(outcome.document.data_source("Db").unwrap().definition, json!({"v": 2}));
    }

    #[test]
    fn remote_edit_inside_local_kind_change_conflicts() {
        let a = ancestor();
        let mut l = ancestor();
        l.remove_control(&parse_address("Screen1/Group1")).unwrap();
        l.add_control(
            &parse_address("Screen1"),
            Control::builtin("Group1", "Gallery").with_property("Items", "Accounts"),
        )
        .unwrap();
        let mut r = ancestor();
        set(&mut r, "Screen1/Group1", "Visible", "false");
        set(&mut r, "Screen1/Group1/Inner", "Text", "remote");
        r.add_control(&parse_address("Screen1/Group1"), label("Extra", "E")).unwrap();

        let outcome = merge(&a, &l, &r);
        assert_eq!(outcome.conflicts.len(), 1, "{:?}", outcome.conflicts);
        assert_eq!(outcome.conflicts[0].kind, ConflictKind::RemoveModify);
        assert_eq!(outcome.conflicts[0].address, parse_address("Screen1/Group1"));
        let group = outcome.document.screen("Screen1").unwrap().control("Group1").unwrap();
        assert_eq!(group.kind().template_id(), "Gallery");
        assert!(group.property("Visible").is_none());
        assert!(group.children().is_empty());

        let outcome = merge(&a, &l, &l);
        assert!(outcome.is_clean(), "{:?}", outcome.conflicts);
    }

    #[test]
    fn merging_a_side_into_itself_yields_that_side() {
        let a = ancestor();
        let mut b = ancestor();
        set(&mut b, "Screen1/Label1", "Text", "B");
        b.remove_control(&parse_address("Screen1/Group1")).unwrap();
        b.add_screen(Screen::new("S2")).unwrap();
        b.rename_control(&parse_address("Screen1/Label1"), "Label9").unwrap();
        let outcome = merge(&a, &b, &b);
        assert!(outcome.is_clean(), "{:?}", outcome.conflicts);
        assert!(content_equal(&outcome.document, &b));
    }
}
