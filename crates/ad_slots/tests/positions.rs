mod common;

use ad_slots::{Breakpoint, DEFAULT_POSITION, PositionTable, SizeMapping, resolve};
use common::size;

#[test]
fn stock_table_has_reference_positions() {
    let table = PositionTable::with_defaults();
    assert_eq!(
        table.positions(),
        vec!["default", "footer", "inread", "sidebar", "top"]
    );
    assert_eq!(resolve(table.get("top"), 1200), vec![size(970, 90), size(970, 250)]);
    assert!(resolve(table.get("sidebar"), 800).is_empty());
    assert_eq!(resolve(table.get("inread"), 800), vec![size(640, 360)]);
}

#[test]
fn unknown_position_uses_default() {
    let table = PositionTable::with_defaults();
    assert!(!table.contains("skyscraper"));
    assert_eq!(table.get("skyscraper"), table.get(DEFAULT_POSITION));
}

#[test]
fn empty_mapping_leaves_entry_untouched() {
    let mut table = PositionTable::with_defaults();
    let before = table.get("top").clone();
    assert!(!table.set("top", SizeMapping::new(Vec::new())));
    assert_eq!(table.get("top"), &before);
}

#[test]
fn malformed_json_is_ignored() {
    let mut table = PositionTable::with_defaults();
    let before = table.get("footer").clone();
    assert!(!table.set_from_json("footer", "[{\"minWidth\": \"wide\"}]"));
    assert!(!table.set_from_json("footer", "[]"));
    assert!(!table.set_from_json("footer", "not json"));
    assert_eq!(table.get("footer"), &before);
}

#[test]
fn new_positions_can_be_added_and_replaced() {
    let mut table = PositionTable::with_defaults();
    assert!(table.add_position(
        "skyscraper",
        SizeMapping::new(vec![Breakpoint::new(0, [size(160, 600)])]),
    ));
    assert_eq!(resolve(table.get("skyscraper"), 10), vec![size(160, 600)]);

    assert!(table.set_from_json(
        "skyscraper",
        r#"[{"viewport":[0,0],"sizes":[[120,600]]}]"#
    ));
    assert_eq!(resolve(table.get("skyscraper"), 10), vec![size(120, 600)]);
    assert!(table.remove("skyscraper"));
    assert!(!table.contains("skyscraper"));
}

#[test]
fn default_is_replaceable_but_never_removed() {
    let mut table = PositionTable::with_defaults();
    assert!(!table.remove(DEFAULT_POSITION));
    assert!(table.set(
        DEFAULT_POSITION,
        SizeMapping::new(vec![Breakpoint::new(0, [size(250, 250)])]),
    ));
    assert_eq!(resolve(table.get("anything"), 900), vec![size(250, 250)]);
}

#[test]
fn legacy_position_names_resolve_to_stock_entries() {
    let mut table = PositionTable::with_defaults();
    for (legacy, current) in [("topo", "top"), ("lateral", "sidebar"), ("rodape", "footer")] {
        assert!(table.contains(legacy), "{legacy} should be known");
        assert_eq!(table.get(legacy), table.get(current));
    }
    assert_eq!(resolve(table.get("topo"), 800), vec![size(728, 90)]);

    // Overriding through the old name updates the shared entry.
    assert!(table.set("rodape", SizeMapping::new(vec![Breakpoint::new(0, [size(468, 60)])])));
    assert_eq!(resolve(table.get("footer"), 800), vec![size(468, 60)]);
    assert!(!table.positions().contains(&"rodape"));
}

#[test]
fn alias_cannot_shadow_an_entry_or_default() {
    let mut table = PositionTable::with_defaults();
    assert!(!table.add_alias("top", "footer"));
    assert!(!table.add_alias(DEFAULT_POSITION, "top"));
    assert!(!table.add_alias("masthead", "masthead"));
    assert!(table.add_alias("masthead", "top"));
    assert_eq!(table.get("masthead"), table.get("top"));
}
