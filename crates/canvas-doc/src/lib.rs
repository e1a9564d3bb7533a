//! Canvas app documents with structural diff, three-way merge
//! and verifiable round trips.
//!
//! A [`Document`] is loaded from a packaged archive ([`codec::msapp`]) or an
//! editable text tree ([`codec::source`]), compared with [`compute_delta`],
//! reconciled with [`merge`], and checked for drift with [`fingerprint`] and
//! the [`verify`] stress tests.
//!
//! ```
//! use canvas_address::Address;
//! use canvas_doc::{compute_delta, merge, Control, Document, Screen};
//!
//! let mut ancestor = Document::new();
//! ancestor
//!     .add_screen(Screen::new("Main").with_control(Control::builtin("Title", "Label")))
//!     .unwrap();
//!
//! let title = Address::from_segments(["Main", "Title"]);
//! let mut local = ancestor.clone();
//! local.set_property(&title, "Text", "\"Hello\"".into()).unwrap();
//! let mut remote = ancestor.clone();
//! remote.set_property(&title, "Color", "Red".into()).unwrap();
//!
//! assert_eq!(compute_delta(&ancestor, &local).len(), 2); // theme marker + one property
//! let outcome = merge(&ancestor, &local, &remote);
//! assert!(outcome.is_clean());
//! assert_eq!(outcome.document.resolve(&title).unwrap().properties().len(), 2);
//! ```

pub mod cli;
pub mod codec;
pub mod compare;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod verify;

pub use diff::{compute_delta, content_deltas, Delta};
pub use error::{CanvasError, DocumentError, ErrorKind, ErrorList, Severity, StructuralError};
pub use fingerprint::{content_equal, fingerprint_document, Fingerprint};
pub use merge::{
    merge, merge_with, Conflict, ConflictKind, ConflictPolicy, MergeOptions, MergeOutcome,
};
pub use model::{
    Control, ControlKind, DataSource, Document, NodeRef, PropertyMap, PropertyValue, Resource,
    ResourceKind, Screen, TemplateRef, Theme,
};
