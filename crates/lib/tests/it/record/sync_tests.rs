//! Pull and push between canonical values and backend views.

use sysdata::{
    record::{
        Atom, Calculator, Cell, Converter, Direction, Field, NodeRef, Record, Scope, SystemSchema,
        Validator,
    },
    schema_row,
};

use super::helpers::{declared_record, from_zx, onto_zx, set_backend, shaped_record, zx};

// ===== PULL =====

#[test]
fn test_pull_declared_backend_values() {
    let from = from_zx();
    let mut rec = declared_record(Direction::From);
    set_backend(&mut rec, "A", "1", &from);
    set_backend(&mut rec, "B/0/X", "a", &from);
    set_backend(&mut rec, "B/0/Y", "b", &from);

    rec.pull(&zx());

    let canonical = Scope::canonical();
    assert_eq!(rec.val_in("A", &canonical, false), Some(Atom::Int(1)));
    assert_eq!(rec.val_in("B/0/X", &canonical, false), Some(Atom::from("a")));
    assert_eq!(rec.val_in("B/0/Y", &canonical, false), Some(Atom::from("b")));
    assert_eq!(rec.leaf_indexes(&canonical, true).count(), 5);
}

#[test]
fn test_pull_by_backend_names() {
    let mut rec = declared_record(Direction::From);
    // Backend names resolve to their own scope.
    rec.set_val("zA", "42");
    rec.pull(&zx());
    assert_eq!(rec.get("A").unwrap(), Atom::Int(42));
}

#[test]
fn test_pull_moves_sequence_cursor() {
    let from = from_zx();
    let mut rec = declared_record(Direction::From);
    set_backend(&mut rec, "B/1/X", "c", &from);
    rec.pull(&zx());

    let Some(NodeRef::Records(recs)) = rec.value("B", &Scope::canonical(), false) else {
        panic!("B holds records");
    };
    assert_eq!(recs.current_idx(), Some(1));
    assert_eq!(rec.get("B/1/X").unwrap(), Atom::from("c"));
}

#[test]
fn test_pull_rejected_value_keeps_canonical() {
    let from = from_zx();
    let mut rec = declared_record(Direction::From);
    rec.set_val_in("A", 5, &Scope::canonical(), Default::default());
    rec.field_mut("A")
        .unwrap()
        .set_validator(Validator::named("numeric").unwrap(), &from, false);

    set_backend(&mut rec, "A", "abc", &from);
    rec.pull(&zx());
    assert_eq!(rec.get("A").unwrap(), Atom::Int(5));

    set_backend(&mut rec, "A", "12", &from);
    rec.pull(&zx());
    assert_eq!(rec.get("A").unwrap(), Atom::Int(12));
}

#[test]
fn test_pull_ignores_undeclared_fields() {
    let mut rec = declared_record(Direction::From);
    rec.set_val_in("Other", "keep", &Scope::canonical(), Default::default());
    rec.pull(&zx());
    assert_eq!(rec.get("Other").unwrap(), Atom::from("keep"));
}

// ===== PUSH =====

#[test]
fn test_push_converts_onto_backend() {
    let onto = onto_zx();
    let mut rec = shaped_record();
    rec.set_system(Some(zx())).set_direction(Some(Direction::Onto));
    let rows = vec![schema_row![
        "zA",
        "A",
        Cell::Empty,
        Cell::Empty,
        Cell::Empty,
        Converter::named("str").unwrap()
    ]];
    rec.add_system_fields(&rows, None, true).unwrap();
    rec.set_val_in("A", 7, &Scope::canonical(), Default::default());

    rec.push(&zx());

    assert_eq!(rec.val_in("A", &onto, false), Some(Atom::from("7")));
    assert_eq!(rec.val_in("zA", &Scope::canonical(), false), Some(Atom::from("7")));
    assert_eq!(rec.get("A").unwrap(), Atom::Int(7));
}

#[test]
fn test_push_calculated_value() {
    let onto = onto_zx();
    let mut rec = Record::new();
    rec.set_val("Qty", 3);
    let mut total = Field::new("Total");
    total
        .set_calculator(
            Calculator::new(|ctx| {
                let qty = ctx.rfv("Qty").and_then(|qty| qty.as_int()).unwrap_or_default();
                Atom::Int(qty * 2)
            }),
            &Scope::canonical(),
            false,
        )
        .set_name("zTotal", &onto, false);
    rec.set_node_child("Total", total, true);

    rec.push(&zx());
    assert_eq!(rec.val_in("Total", &onto, false), Some(Atom::Int(6)));
}

#[test]
fn test_push_validator_blocks_value() {
    let onto = onto_zx();
    let mut rec = Record::new();
    rec.set_val("Email", "a@b.c");
    rec.field_mut("Email")
        .unwrap()
        .set_name("zEmail", &onto, false)
        .set_validator(Validator::named("non_empty").unwrap(), &onto, false);
    rec.push(&zx());
    assert_eq!(rec.val_in("Email", &onto, false), Some(Atom::from("a@b.c")));

    rec.set_val("Email", "");
    rec.push(&zx());
    assert_eq!(rec.val_in("Email", &onto, false), Some(Atom::from("a@b.c")));
    assert_eq!(rec.get("Email").unwrap(), Atom::from(""));
}

// ===== DECLARATIVE SCHEMAS =====

#[test]
fn test_schema_file_round_trip() {
    let schema: SystemSchema = serde_json::from_str(
        r#"{
            "system": "Zx",
            "fields": [
                {"name": "zA", "path": "A", "from_converter": "int", "onto_converter": "str"},
                {"name": "zX", "path": "B/0/X", "from_converter": "upper"},
                {"name": "zY", "path": "B/0/Y", "sql_expr": "TRIM(zY)"},
                {"name": "zSize", "path": "Rooms0Size", "value": 0}
            ]
        }"#,
    )
    .unwrap();
    let mut rec = shaped_record();
    schema.apply(&mut rec).unwrap();
    assert!(rec.system().is_none());
    assert!(rec.contains("Rooms/0/Size"));

    let from = from_zx();
    set_backend(&mut rec, "A", "3", &from);
    set_backend(&mut rec, "B/1/X", "low", &from);
    rec.pull(&zx());
    assert_eq!(rec.get("A").unwrap(), Atom::Int(3));
    assert_eq!(rec.get("B/1/X").unwrap(), Atom::from("LOW"));

    rec.push(&zx());
    assert_eq!(rec.val_in("A", &onto_zx(), false), Some(Atom::from("3")));
}

#[test]
fn test_schema_default_with_converters() {
    let schema: SystemSchema = serde_json::from_str(
        r#"{
            "system": "Zx",
            "fields": [
                {"name": "zQty", "path": "Qty", "value": "5", "from_converter": "int", "onto_converter": "str"}
            ]
        }"#,
    )
    .unwrap();
    let mut rec = Record::new();
    schema.apply(&mut rec).unwrap();

    let from = from_zx();
    assert_eq!(rec.val_in("Qty", &from, false), Some(Atom::from("5")));
    assert!(rec.field("Qty").unwrap().converter(&from).is_some());
    rec.pull(&zx());
    assert_eq!(rec.get("Qty").unwrap(), Atom::Int(5));

    rec.set_val("Qty", 7);
    rec.push(&zx());
    assert_eq!(rec.val_in("Qty", &onto_zx(), false), Some(Atom::from("7")));
}
