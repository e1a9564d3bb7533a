//! Lazy depth-first enumeration of a document subtree.

use canvas_address::Address;

use super::NodeRef;

/// Pre-order iterator over `(address, node)` pairs.
///
/// Children are visited in stored order; screens follow the document's
/// screen order. The walk is finite and can be restarted by cloning it
/// before use or by asking the document for a new one.
#[derive(Debug, Clone)]
pub struct Walk<'a> {
    stack: Vec<(Address, NodeRef<'a>)>,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(address: Address, node: NodeRef<'a>) -> Self {
        Self {
            stack: vec![(address, node)],
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = (Address, NodeRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let (address, node) = self.stack.pop()?;
        match node {
            NodeRef::App(doc) => {
                for screen in doc.screens().iter().rev() {
                    self.stack
                        .push((address.child(screen.name()), NodeRef::Screen(screen)));
                }
            }
            NodeRef::Screen(_) | NodeRef::Control(_) => {
                for control in node.controls().iter().rev() {
                    self.stack
                        .push((address.child(control.name()), NodeRef::Control(control)));
                }
            }
        }
        Some((address, node))
    }
}
