//! Non-owning child → parent lookup.
//!
//! Ownership always flows downward through `Vec<Control>`; this index is a
//! derived lookup aid rebuilt after each structural mutation and is never
//! used to traverse or own nodes.

use std::collections::BTreeMap;

use canvas_address::Address;

use super::{Control, Screen};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentIndex {
    parents: BTreeMap<Address, Address>,
}

impl ParentIndex {
    pub(crate) fn build(screens: &[Screen]) -> Self {
        let mut parents = BTreeMap::new();
        for screen in screens {
            let address = Address::root().child(screen.name());
            index_children(&address, screen.controls(), &mut parents);
            parents.insert(address, Address::root());
        }
        Self { parents }
    }

    /// Parent of the screen or control at `address`.
    pub fn parent_of(&self, address: &Address) -> Option<&Address> {
        self.parents.get(address)
    }

    /// Number of indexed nodes (screens and controls).
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

fn index_children(parent: &Address, children: &[Control], out: &mut BTreeMap<Address, Address>) {
    for child in children {
        let address = parent.child(child.name());
        index_children(&address, child.children(), out);
        out.insert(address, parent.clone());
    }
}
