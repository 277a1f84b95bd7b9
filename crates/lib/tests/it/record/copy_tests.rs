//! Copy depths, copy-on-write isolation, patches and clearing.

use sysdata::record::{
    ALL_FIELDS, Aspect, AspectKey, AspectType, Atom, CopyOpts, Depth, Field, FieldPatches, NodeRef,
    PatchValue, Record, Scope,
};

use super::helpers::{declared_record, from_zx, set_backend};

fn sample() -> Record {
    let mut rec = Record::new();
    rec.set_val("A", 1)
        .set_val("B/0/X", "a")
        .set_val("B/0/Y", "b")
        .set_val("B/1/X", "c");
    rec
}

fn records<'a>(rec: &'a Record, name: &str) -> &'a sysdata::record::Records {
    match rec.value(name, &Scope::canonical(), false) {
        Some(NodeRef::Records(recs)) => recs,
        _ => panic!("{name} holds no records"),
    }
}

// ===== DEPTH AND SHARING =====

#[test]
fn test_shallow_copy_writes_stay_local() {
    let rec = sample();
    let mut copy = rec.copy(Depth::SHALLOW);
    assert!(copy.shares_field_with(&rec, "A"));
    assert!(copy.shares_field_with(&rec, "B"));

    copy.set_val("A", 2).set_val("B/1/X", "changed");
    assert_eq!(rec.get("A").unwrap(), Atom::Int(1));
    assert_eq!(rec.get("B/1/X").unwrap(), Atom::from("c"));
    assert_eq!(copy.get("B/1/X").unwrap(), Atom::from("changed"));
    assert!(!copy.shares_field_with(&rec, "B"));
}

#[test]
fn test_full_copy_shares_nothing() {
    let rec = sample();
    let copy = rec.copy(Depth::All);
    assert_eq!(copy, rec);
    assert!(!copy.shares_field_with(&rec, "A"));
    assert!(!records(&copy, "B").shares_item_with(records(&rec, "B"), 0));
}

#[test]
fn test_copy_until_field_shares_scalar_fields() {
    let rec = sample();
    let copy = rec.copy(Depth::UntilField);
    assert!(copy.shares_field_with(&rec, "A"));
    assert!(!copy.shares_field_with(&rec, "B"));
}

#[test]
fn test_one_level_copy_shares_sequence_items() {
    let rec = sample();
    let copy = rec.copy(Depth::Levels(2));
    assert!(!copy.shares_field_with(&rec, "B"));
    assert!(records(&copy, "B").shares_item_with(records(&rec, "B"), 1));
}

#[test]
fn test_copy_reanchors_fields() {
    let rec = sample();
    let copy = rec.copy(Depth::All);
    let field = copy.field("B/1/X").unwrap();
    assert_eq!(field.root_rec(&Scope::canonical()), Some(copy.id()));
    assert_eq!(field.root_idx(&Scope::canonical()).unwrap().to_string(), "B/1/X");
}

// ===== FILTERS AND PATCHES =====

#[test]
fn test_copy_filter_skips_fields() {
    let rec = sample();
    let skip_b = |field: &Field| field.name() == "B";
    let copy = rec.copy_with(Depth::All, &CopyOpts::filtered(&skip_b));
    assert_eq!(copy.names().collect::<Vec<_>>(), vec!["A"]);
}

#[test]
fn test_copy_patches_add_backend_names() {
    let from = from_zx();
    let rec = sample();
    let patches = FieldPatches::new()
        .with(
            ALL_FIELDS,
            AspectKey::new(AspectType::Name, from.clone()),
            PatchValue::computed(|field| Some(Aspect::Name(format!("z{}", field.name())))),
        )
        .with(
            "A",
            AspectKey::new(AspectType::SqlExpr, from.clone()),
            PatchValue::Set(Aspect::SqlExpr("CAST(zA AS INT)".to_string())),
        );
    let copy = rec.copy_with(Depth::All, &CopyOpts::patched(&patches));

    let a = copy.field("A").unwrap();
    assert_eq!(a.system_name(&from, false), Some("zA"));
    assert_eq!(a.sql_expression(&from), Some("CAST(zA AS INT)"));
    assert_eq!(copy.field("B").unwrap().system_name(&from, false), Some("zB"));
    assert_eq!(rec.field("A").unwrap().system_name(&from, false), None);
}

#[test]
fn test_copy_patch_removes_aspect() {
    let from = from_zx();
    let rec = declared_record(sysdata::record::Direction::From);
    let patches = FieldPatches::new().with(
        "A",
        AspectKey::new(AspectType::Converter, from.clone()),
        PatchValue::Remove,
    );
    let copy = rec.copy_with(Depth::All, &CopyOpts::patched(&patches));
    assert!(rec.field("A").unwrap().converter(&from).is_some());
    assert!(copy.field("A").unwrap().converter(&from).is_none());
}

// ===== CLEARING =====

#[test]
fn test_reset_leafs_applies_clear_values() {
    let mut rec = sample();
    rec.field_mut("A")
        .unwrap()
        .set_clear_val(Some(Atom::from("dflt")), &Scope::canonical());

    rec.reset_leafs();

    assert_eq!(rec.get("A").unwrap(), Atom::from("dflt"));
    assert_eq!(rec.get("B/0/X").unwrap(), Atom::from(""));
    assert_eq!(records(&rec, "B").len(), 1);
}

#[test]
fn test_clear_all_scopes_keeps_lists() {
    let from = from_zx();
    let mut rec = declared_record(sysdata::record::Direction::From);
    set_backend(&mut rec, "A", "9", &from);
    rec.set_val_in("B/1/X", "keep shape", &Scope::canonical(), Default::default());

    rec.clear_leafs(None, false, false);

    assert_eq!(rec.val_in("A", &from, false), Some(Atom::from("")));
    assert_eq!(rec.get("B/1/X").unwrap(), Atom::from(""));
    assert_eq!(records(&rec, "B").len(), 2);
}
