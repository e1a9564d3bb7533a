use canvas_address::{
    escape_component, format_address, parse_address, unescape_component, validate_address,
    Address, AddressError,
};

#[test]
fn address_parse_format_roundtrip_matrix() {
    let cases = [
        "",
        "Screen1",
        "Screen1/Label1",
        "Screen1/Gallery1/Label1/Text",
        "a~0b/c~1d",
        "~0/~1",
    ];

    for text in cases {
        let addr = parse_address(text);
        assert_eq!(format_address(&addr), text, "case {text:?}");
    }
}

#[test]
fn escape_unescape_matrix() {
    let cases = [
        ("plain", "plain"),
        ("a/b", "a~1b"),
        ("a~b", "a~0b"),
        ("~/", "~0~1"),
        ("~1", "~01"),
    ];
    for (raw, escaped) in cases {
        assert_eq!(escape_component(raw), escaped);
        assert_eq!(unescape_component(escaped), raw);
    }
}

#[test]
fn parent_chain_walks_to_root() {
    let mut addr = parse_address("S/G/L");
    let mut seen = vec![addr.to_string()];
    while let Ok(parent) = addr.parent() {
        seen.push(parent.to_string());
        addr = parent;
    }
    assert_eq!(seen, ["S/G/L", "S/G", "S", ""]);
    assert_eq!(addr.parent(), Err(AddressError::NoParent));
}

#[test]
fn from_conversions_agree() {
    let a: Address = "Screen1/Label1".into();
    let b: Address = vec!["Screen1".to_string(), "Label1".to_string()].into();
    let c = Address::from_segments(["Screen1", "Label1"]);
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[test]
fn validation_rejects_control_characters() {
    assert!(validate_address(&Address::from_segments(["Screen1", "bad\tname"])).is_err());
    assert!(validate_address(&parse_address("Screen1/Label1")).is_ok());
}
