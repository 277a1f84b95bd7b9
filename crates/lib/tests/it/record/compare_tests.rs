//! Comparing and merging records and record sequences.

use sysdata::record::{Atom, Record, Records, Scope, string_to_records};

fn person(name: &str, email: &str) -> Record {
    let mut rec = Record::new();
    rec.set_val("Surname", name).set_val("Email", email);
    rec
}

#[test]
fn test_compare_normalises_before_reporting() {
    let this = person("mcdonald", "A@B.C");
    let other = person("McDonald ", "a@b.c");
    assert!(this.compare_leafs(&other, &[], &[]).is_empty());

    let other = person("Miller", "a@b.c");
    let dif = this.compare_leafs(&other, &[], &[]);
    assert_eq!(dif, vec![r#"Different values in Field Surname: :"Mcdonald" != :"Miller""#]);
}

#[test]
fn test_missing_required_alternatives() {
    let rec = person("", "x@y.z");
    let missing = rec.missing_fields(&[&["Surname"], &["Email", "Phone"]]);
    assert_eq!(missing, vec![vec!["Surname".to_string()]]);
}

#[test]
fn test_compare_records_pairs_by_match_fields() {
    let mut these = Records::new();
    these.push(person("Ann", "ann@x.y")).push(person("Bob", "bob@x.y"));
    let mut others = Records::new();
    others.push(person("Bob", "bob@z.y")).push(person("Cid", "cid@x.y"));

    let dif = these.compare_records(&others, &["Surname"], &[], &[], None);
    assert_eq!(dif.len(), 3);
    assert!(dif[0].starts_with("Record 0 of this Records instance not found via (Ann)"));
    assert!(dif[1].starts_with("Different values in Field Email"));
    assert!(dif[2].starts_with("Pulled Record not found in this Records instance via (Cid)"));
}

#[test]
fn test_compare_records_custom_comparator() {
    let mut these = Records::new();
    these.push(person("Ann", "ann@x.y"));
    let others = these.clone();
    let comparator = |a: &Record, _: &Record| vec![format!("checked {}", a.get("Surname").unwrap())];
    let dif = these.compare_records(&others, &["Surname"], &[], &[], Some(&comparator));
    assert_eq!(dif, vec!["checked Ann".to_string()]);
}

#[test]
fn test_merge_records_updates_and_appends() {
    let mut these = string_to_records("Ann=1,Bob=2", &["Name", "Qty"], ",", "=");
    let others = string_to_records("Bob=5,Cid=7", &["Name", "Qty"], ",", "=");
    these.merge_records(&others, &["Name"]);

    assert_eq!(these.len(), 3);
    assert_eq!(these.get(1).unwrap().get("Qty").unwrap(), Atom::from("5"));
    assert_eq!(these.get(2).unwrap().get("Name").unwrap(), Atom::from("Cid"));
}

#[test]
fn test_merge_vals_between_records() {
    let mut live = Record::new();
    live.set_val("A", 1).set_val("B/0/X", "old");
    let mut incoming = Record::new();
    incoming.set_val("B/0/X", "new").set_val("C", 3);

    live.merge_vals(&incoming, &Scope::canonical(), true, false);
    assert_eq!(live.get("B/0/X").unwrap(), Atom::from("new"));
    assert!(!live.contains("C"));
    assert_eq!(live.match_key(&["A", "B/0/X"]), vec![Atom::Int(1), Atom::from("new")]);
}
