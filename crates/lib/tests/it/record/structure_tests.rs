//! Record shape: addressing, flat names, cursors and field management.

use sysdata::{
    idx_path,
    record::{
        Action, AddressingContext, Atom, Calculator, Child, Direction, Field, NodeRef, Record,
        Scope, string_to_records,
    },
};

use super::helpers::{from_zx, zx};

// ===== ADDRESSING =====

#[test]
fn test_flat_and_separated_paths_agree() {
    let mut rec = Record::new();
    rec.add_fields([("Name", Child::from("Ann")), ("Rooms0Size", Child::from(12))]);
    rec.set_val(idx_path!["Rooms", 1, "Size"], 14);

    assert_eq!(rec.val("Rooms/0/Size"), Some(Atom::Int(12)));
    assert_eq!(rec.val("Rooms1Size"), Some(Atom::Int(14)));
    assert_eq!(
        rec.leaf_indexes(&Scope::canonical(), true)
            .map(|path| path.to_string())
            .collect::<Vec<_>>(),
        vec!["Name", "Rooms/0/Size", "Rooms/1/Size"]
    );
}

#[test]
fn test_current_index_addressing() {
    let mut rec = Record::new();
    rec.set_val("B/0/X", "a").set_val("B/1/X", "b");
    rec.field_mut("B")
        .unwrap()
        .append_record(None, true)
        .set_val("X", "c");

    let canonical = Scope::canonical();
    assert_eq!(rec.val_in("B/0/X", &canonical, true), Some(Atom::from("a")));
    let mut ctx = AddressingContext::at_levels([1]);
    assert_eq!(
        rec.val_with("B/0/X", &canonical, true, &mut ctx),
        Some(Atom::from("c"))
    );
}

#[test]
fn test_appended_record_is_cleared_copy() {
    let mut rec = Record::new();
    rec.set_val("B/0/X", "a").set_val("B/0/Y", "b");
    rec.field_mut("B").unwrap().append_record(None, true);

    assert_eq!(rec.get("B/1/X").unwrap(), Atom::from(""));
    assert_eq!(
        rec.field("B/1/Y").unwrap().root_idx(&Scope::canonical()),
        Some(&idx_path!["B", 1, "Y"])
    );
}

#[test]
fn test_strict_get_reports_missing_path() {
    let rec = Record::new();
    let err = rec.get("Nope/0/X").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.module(), "record");
}

// ===== FIELD MANAGEMENT =====

#[test]
fn test_pop_nested_field() {
    let mut rec = Record::new();
    rec.set_val("B/0/X", "a").set_val("B/0/Y", "b");
    let popped = rec.pop("B/0/Y").unwrap();
    assert_eq!(popped.name(), "Y");
    assert!(!rec.contains("B/0/Y"));
    assert!(rec.contains("B/0/X"));
}

#[test]
fn test_update_replaces_and_adds() {
    let mut rec = Record::new();
    rec.set_val("A", 1).set_val("B", 2);
    let mut other = Record::new();
    other.set_val("B", 20).set_val("C", 30);

    rec.update(&other);

    assert_eq!(rec.names().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    assert_eq!(rec.get("B").unwrap(), Atom::Int(20));
    assert_eq!(
        rec.field("C").unwrap().root_idx(&Scope::canonical()),
        Some(&idx_path!["C"])
    );
}

#[test]
fn test_set_env_anchors_backend_scope() {
    let mut rec = Record::new();
    rec.set_val("A", 1).set_val("B/0/X", "a");
    rec.set_env(Some(zx()), Some(Direction::From), Some(Action::Update));

    assert_eq!(rec.scope(), from_zx());
    assert_eq!(rec.action(), Some(Action::Update));
    let field = rec.field("B/0/X").unwrap();
    assert_eq!(field.root_rec(&from_zx()), Some(rec.id()));
}

#[test]
fn test_calculator_sees_action() {
    let mut rec = Record::new();
    let mut state = Field::new("State");
    state.set_calculator(
        Calculator::new(|ctx| {
            if ctx.in_actions(&[Action::Insert, Action::Upsert]) {
                Atom::from("new")
            } else {
                Atom::from("known")
            }
        }),
        &Scope::canonical(),
        false,
    );
    rec.set_node_child("State", state, true);

    assert_eq!(rec.get("State").unwrap(), Atom::from("known"));
    rec.set_action(Some(Action::Insert));
    assert_eq!(rec.get("State").unwrap(), Atom::from("new"));
}

#[test]
fn test_string_to_records_builds_sequence() {
    let recs = string_to_records("Ann=3,Bob=5", &["Name", "Qty"], ",", "=");
    assert_eq!(recs.len(), 2);
    assert_eq!(recs.current_idx(), Some(1));
    let bob = recs.get(1).unwrap();
    assert_eq!(bob.get("Name").unwrap(), Atom::from("Bob"));
    assert_eq!(bob.get("Qty").unwrap(), Atom::from("5"));

    let mut rec = Record::new();
    rec.set_node_child("People", recs, true);
    assert!(matches!(
        rec.value("People", &Scope::canonical(), false),
        Some(NodeRef::Records(people)) if people.len() == 2
    ));
    assert_eq!(rec.get("People/0/Name").unwrap(), Atom::from("Ann"));
}
