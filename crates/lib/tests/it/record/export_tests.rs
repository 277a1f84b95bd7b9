//! Exporting records: leaf names, SQL column lists, dicts and JSON.

use sysdata::record::{
    Atom, DictOpts, Direction, KeyType, LeafNameOpts, LeafNameType, Record, Scope,
};

use super::helpers::{declared_record, from_zx, set_backend, zx};

#[test]
fn test_leaf_names_of_declared_backend() {
    let rec = declared_record(Direction::From);
    let from = from_zx();
    let names = rec.leaf_names(
        &from,
        &LeafNameOpts {
            name_type: LeafNameType::System,
            ..LeafNameOpts::default()
        },
    );
    // Only the first element of the sequence is listed.
    assert_eq!(names, vec!["zA", "zX", "zY"]);

    let only_a = rec.leaf_names(
        &from,
        &LeafNameOpts {
            col_names: &["zA"],
            name_type: LeafNameType::Field,
            ..LeafNameOpts::default()
        },
    );
    assert_eq!(only_a, vec!["A"]);
}

#[test]
fn test_sql_columns_cover_top_level_fields() {
    let mut rec = declared_record(Direction::From);
    rec.field_mut("A")
        .unwrap()
        .set_sql_expression("CAST(zA AS INTEGER)", &from_zx(), false);
    assert_eq!(rec.sql_columns(&zx(), &[]), vec!["zA"]);
    assert_eq!(rec.sql_select(&zx(), &[]), vec!["CAST(zA AS INTEGER) AS zA"]);
}

#[test]
fn test_to_dict_of_pulled_record() {
    let from = from_zx();
    let mut rec = declared_record(Direction::From);
    set_backend(&mut rec, "A", "4", &from);
    set_backend(&mut rec, "B/0/X", "a", &from);
    rec.pull(&zx());

    let canonical = rec.to_dict(&DictOpts {
        scope: Some(&Scope::canonical()),
        put_system_val: false,
        push_onto: false,
        use_system_key: false,
        ..DictOpts::default()
    });
    assert_eq!(
        canonical,
        vec![
            ("A".to_string(), Atom::Int(4)),
            ("B0X".to_string(), Atom::from("a")),
        ]
    );

    let backend = rec.to_dict(&DictOpts {
        scope: Some(&from),
        key_type: KeyType::Name,
        push_onto: false,
        ..DictOpts::default()
    });
    assert_eq!(
        backend,
        vec![
            ("zA".to_string(), Atom::from("4")),
            ("zX".to_string(), Atom::from("a")),
        ]
    );
}

#[test]
fn test_json_export_and_import() {
    let mut rec = Record::new();
    rec.set_val("A", 1).set_val("B/0/X", "a").set_val("B/1/X", "b");
    let json = rec.to_json();
    assert_eq!(json["B/1/X"], serde_json::json!("b"));

    let text = serde_json::to_string(&json).unwrap();
    let back = Record::from_json(&serde_json::from_str(&text).unwrap()).unwrap();
    assert_eq!(back, rec);

    let err = Record::from_json(&serde_json::json!("flat")).unwrap_err();
    assert!(err.is_type_error());
}

#[test]
fn test_json_import_rejects_unaddressable_keys() {
    for json in [
        serde_json::json!({"": 1}),
        serde_json::json!({"A/0": 1, "A/X": 2}),
        serde_json::json!({"Rooms": [{"Size": 1}], "Rooms/0": 2}),
    ] {
        let err = Record::from_json(&json).unwrap_err();
        assert!(err.is_parse_error() || err.is_type_error(), "{json}: {err}");
    }
}
