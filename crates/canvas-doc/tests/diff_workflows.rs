mod common;

use canvas_address::Address;
use canvas_doc::{compute_delta, content_deltas, content_equal, Control, Delta, Screen};
use common::{addr, label, sample_app, set};
use pretty_assertions::assert_eq;

fn listing(deltas: &[Delta]) -> Vec<String> {
    deltas.iter().map(ToString::to_string).collect()
}

#[test]
fn delta_listing_follows_document_order() {
    let base = sample_app();
    let mut compare = base.clone();
    compare
        .set_property(&Address::root(), "OnStart", "Set(counter, 1)".into())
        .unwrap();
    compare.add_screen(Screen::new("About")).unwrap();
    compare.add_control(&addr("Details"), label("Hint", "\"Tap\"")).unwrap();
    set(&mut compare, "Home", "Fill", "Blue");
    compare.rename_control(&addr("Home/Gallery1"), "Gallery2").unwrap();
    compare.remove_control(&addr("Home/Rating1")).unwrap();
    compare.remove_data_source("Accounts");

    let deltas = compute_delta(&base, &compare);
    assert!(deltas[0].is_marker());
    assert_eq!(
        listing(&deltas[1..]),
        [
            "~ OnStart: Set(counter, 0) -> Set(counter, 1)",
            "+ screen About",
            "+ control Details/Hint",
            "~ Home/Fill: RGBA(255, 255, 255, 1) -> Blue",
            "rename Home/Gallery1 -> Gallery2",
            "- control Home/Rating1",
            "~ data source Accounts",
        ]
    );
}

#[test]
fn edited_and_renamed_control_is_replaced() {
    let base = sample_app();
    let mut compare = base.clone();
    compare.rename_control(&addr("Home/Title"), "Heading").unwrap();
    set(&mut compare, "Home/Heading", "Text", "\"Clients\"");

    let deltas = content_deltas(&base, &compare);
    assert_eq!(listing(&deltas), ["+ control Home/Heading", "- control Home/Title"]);
    match &deltas[0] {
        Delta::ControlAdded { anchor, .. } => assert_eq!(anchor, &None),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn custom_to_builtin_is_a_kind_change() {
    let base = sample_app();
    let mut compare = base.clone();
    compare.remove_control(&addr("Home/Rating1")).unwrap();
    compare
        .add_control(
            &addr("Home"),
            Control::builtin("Rating1", "Rating").with_property("Value", "3"),
        )
        .unwrap();

    let deltas = content_deltas(&base, &compare);
    assert_eq!(listing(&deltas), ["- control Home/Rating1", "+ control Home/Rating1"]);
    match &deltas[1] {
        Delta::ControlAdded { anchor, .. } => assert_eq!(anchor.as_deref(), Some("Gallery1")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn nested_changes_are_addressed_by_path() {
    let base = sample_app();
    let mut compare = base.clone();
    set(&mut compare, "Home/Gallery1/Id", "Visible", "false");
    compare
        .insert_control(&addr("Home/Gallery1"), 0, label("Avatar", "ThisItem.Photo"))
        .unwrap();

    let deltas = content_deltas(&base, &compare);
    assert_eq!(
        listing(&deltas),
        ["+ control Home/Gallery1/Avatar", "+ Home/Gallery1/Id/Visible = false"]
    );
    assert_eq!(deltas[1].property_key(), Some("Visible"));
    assert_eq!(deltas[1].address(), addr("Home/Gallery1/Id"));
}

#[test]
fn reversed_diff_undoes_the_change() {
    let base = sample_app();
    let mut compare = base.clone();
    set(&mut compare, "Details/Back", "OnSelect", "Navigate(Home)");
    compare.remove_screen("Home").unwrap();

    let mut restored = compare.clone();
    for delta in content_deltas(&compare, &base) {
        delta.apply_to(&mut restored).unwrap();
    }
    assert!(content_equal(&restored, &base));
    assert_eq!(
        common::child_names(&restored, "Home"),
        ["Title", "Gallery1", "Rating1"]
    );
}
