#![allow(dead_code)]

use canvas_address::{parse_address, Address};
use canvas_doc::{Control, DataSource, Document, Resource, ResourceKind, Screen, Theme};
use proptest::prelude::*;
use serde_json::json;

pub fn addr(text: &str) -> Address {
    parse_address(text)
}

pub fn label(name: &str, text: &str) -> Control {
    Control::builtin(name, "Label").with_property("Text", text)
}

pub fn set(doc: &mut Document, address: &str, key: &str, value: &str) {
    doc.set_property(&addr(address), key, value.into()).unwrap();
}

pub fn child_names(doc: &Document, parent: &str) -> Vec<String> {
    doc.resolve(&addr(parent))
        .unwrap()
        .controls()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

/// Two screens, a gallery with nested children, a custom control, and
/// every global collection populated.
pub fn sample_app() -> Document {
    let mut doc = Document::new();
    doc.set_property(&Address::root(), "OnStart", "Set(counter, 0)".into())
        .unwrap();
    doc.set_theme(Theme {
        name: "Contoso".into(),
        palette: json!({"Primary": "#0078d4", "Background": "#ffffff"}),
    });
    doc.set_data_source(DataSource::new("Accounts", "Table", json!({"Columns": ["Id", "Name"]})))
        .unwrap();
    doc.add_screen(
        Screen::new("Home")
            .with_property("Fill", "RGBA(255, 255, 255, 1)")
            .with_control(label("Title", "\"Accounts\""))
            .with_control(
                Control::builtin("Gallery1", "Gallery")
                    .with_property("Items", "Accounts")
                    .with_child(label("Name", "ThisItem.Name"))
                    .with_child(label("Id", "ThisItem.Id")),
            )
            .with_control(
                Control::custom("Rating1", "http://localhost/#rating").with_property("Value", "3"),
            ),
    )
    .unwrap();
    doc.add_screen(
        Screen::new("Details")
            .with_control(Control::builtin("Back", "Button").with_property("OnSelect", "Back()")),
    )
    .unwrap();
    doc
}

// ── Generated documents ─────────────────────────────────────────────────

type ControlShape = (Vec<(String, String)>, Vec<Vec<(String, String)>>);
type ScreenShape = (Vec<(String, String)>, Vec<ControlShape>);

/// Scalars a line-oriented text form could misread.
const AWKWARD: &[&str] = &[
    "",
    ": ",
    "a: b",
    "-1",
    "- item",
    "line1\nline2",
    "\"quoted\"",
    "If(x, \"a: b\", 'c')",
    "x #not a comment",
    "#",
    " padded ",
    "ends:",
    "{}",
    "tab\there",
];

fn plain_values() -> BoxedStrategy<String> {
    "[a-z0-9]{0,4}".boxed()
}

fn awkward_values() -> BoxedStrategy<String> {
    prop_oneof![
        "[a-z0-9]{0,4}",
        prop::sample::select(AWKWARD).prop_map(String::from),
    ]
    .boxed()
}

fn properties(values: BoxedStrategy<String>) -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[A-D]", values), 0..3)
}

fn control_shape(values: BoxedStrategy<String>) -> impl Strategy<Value = ControlShape> {
    (properties(values.clone()), prop::collection::vec(properties(values), 0..3))
}

fn shapes(values: BoxedStrategy<String>) -> impl Strategy<Value = Vec<ScreenShape>> {
    prop::collection::vec(
        (properties(values.clone()), prop::collection::vec(control_shape(values), 0..4)),
        1..3,
    )
}

fn build(shape: Vec<ScreenShape>) -> Document {
    let mut doc = Document::new();
    for (s, (screen_props, controls)) in shape.into_iter().enumerate() {
        let mut screen = Screen::new(format!("Screen{s}"));
        for (k, v) in screen_props {
            screen = screen.with_property(k, v);
        }
        for (c, (props, children)) in controls.into_iter().enumerate() {
            let mut control = Control::builtin(format!("C{s}_{c}"), "Group");
            for (k, v) in props {
                control = control.with_property(k, v);
            }
            for (g, child_props) in children.into_iter().enumerate() {
                let mut child = Control::builtin(format!("C{s}_{c}_{g}"), "Label");
                for (k, v) in child_props {
                    child = child.with_property(k, v);
                }
                control = control.with_child(child);
            }
            screen = screen.with_control(control);
        }
        doc.add_screen(screen).unwrap();
    }
    doc
}

/// Small documents with unique names at every level.
pub fn arb_document() -> impl Strategy<Value = Document> {
    shapes(plain_values()).prop_map(build)
}

fn arb_theme() -> impl Strategy<Value = Theme> {
    let palette = prop_oneof![
        Just(serde_json::Value::Null),
        prop::collection::btree_map("[A-Z][a-z]{0,4}", awkward_values(), 0..3)
            .prop_map(|colors| json!(colors)),
    ];
    ("[A-Za-z]{1,8}", palette).prop_map(|(name, palette)| Theme { name, palette })
}

fn arb_data_sources() -> impl Strategy<Value = Vec<DataSource>> {
    prop::collection::vec(("[A-Z][a-z]{0,5}", awkward_values(), any::<i32>()), 0..3).prop_map(
        |sources| {
            sources
                .into_iter()
                .enumerate()
                .map(|(i, (kind, column, rows))| {
                    DataSource::new(
                        format!("Source{i}"),
                        kind,
                        json!({"Columns": [column], "Rows": rows}),
                    )
                })
                .collect()
        },
    )
}

fn arb_resources() -> impl Strategy<Value = Vec<Resource>> {
    let kinds = [
        ResourceKind::Image,
        ResourceKind::Audio,
        ResourceKind::Video,
        ResourceKind::File,
        ResourceKind::Uri,
    ];
    let resource = (
        prop::sample::select(kinds.to_vec()),
        prop::collection::vec(any::<u8>(), 0..16),
    );
    prop::collection::vec(resource, 0..3).prop_map(|resources| {
        resources
            .into_iter()
            .enumerate()
            .map(|(i, (kind, content))| {
                Resource::new(format!("Asset{i}"), kind, format!("asset{i}.bin"), content)
            })
            .collect()
    })
}

/// Documents with every global collection populated and property values
/// that need quoting in text form.
pub fn arb_full_document() -> impl Strategy<Value = Document> {
    (shapes(awkward_values()), arb_theme(), arb_data_sources(), arb_resources()).prop_map(
        |(shape, theme, sources, resources)| {
            let mut doc = build(shape);
            doc.set_theme(theme);
            for source in sources {
                doc.set_data_source(source).unwrap();
            }
            for resource in resources {
                doc.set_resource(resource).unwrap();
            }
            doc
        },
    )
}

/// Edit that keeps sibling order: no moves, no renames.
#[derive(Debug, Clone)]
pub enum Edit {
    SetProperty { node: usize, key: String, value: String },
    RemoveProperty { node: usize, key: String },
    RemoveControl { node: usize },
    AddControl { parent: usize, index: usize },
}

pub fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (any::<usize>(), "[A-D]", "[a-z0-9]{1,4}")
            .prop_map(|(node, key, value)| Edit::SetProperty { node, key, value }),
        (any::<usize>(), "[A-D]").prop_map(|(node, key)| Edit::RemoveProperty { node, key }),
        any::<usize>().prop_map(|node| Edit::RemoveControl { node }),
        (any::<usize>(), any::<usize>())
            .prop_map(|(parent, index)| Edit::AddControl { parent, index }),
    ]
}

pub fn arb_edits() -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(arb_edit(), 0..6)
}

/// Apply `edits` to a copy of `doc`. Added controls carry an `Id` no
/// generated control has, so they never look like a rename.
pub fn edited(doc: &Document, edits: &[Edit]) -> Document {
    let mut doc = doc.clone();
    for (n, edit) in edits.iter().enumerate() {
        let nodes: Vec<Address> = doc.enumerate().map(|(a, _)| a).collect();
        let controls: Vec<&Address> = nodes.iter().filter(|a| a.depth() >= 2).collect();
        let containers: Vec<&Address> = nodes.iter().filter(|a| !a.is_root()).collect();
        match edit {
            Edit::SetProperty { node, key, value } => {
                let target = &nodes[node % nodes.len()];
                doc.set_property(target, key, value.as_str().into()).unwrap();
            }
            Edit::RemoveProperty { node, key } => {
                let target = &nodes[node % nodes.len()];
                let _ = doc.remove_property(target, key);
            }
            Edit::RemoveControl { node } => {
                if !controls.is_empty() {
                    let target = controls[node % controls.len()].clone();
                    doc.remove_control(&target).unwrap();
                }
            }
            Edit::AddControl { parent, index } => {
                if !containers.is_empty() {
                    let target = containers[parent % containers.len()].clone();
                    let len = doc.resolve(&target).unwrap().controls().len();
                    let control = Control::builtin(format!("Added{n}"), "Label")
                        .with_property("Id", n.to_string());
                    doc.insert_control(&target, index % (len + 1), control).unwrap();
                }
            }
        }
    }
    doc
}
