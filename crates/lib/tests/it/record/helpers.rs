use sysdata::{
    record::{Cell, Converter, Direction, Record, Scope, SchemaRow, SystemId, WriteOpts},
    schema_row,
};

pub fn zx() -> SystemId {
    SystemId::new("Zx").expect("valid system id")
}

pub fn from_zx() -> Scope {
    Scope::new(zx(), Direction::From)
}

pub fn onto_zx() -> Scope {
    Scope::new(zx(), Direction::Onto)
}

/// Canonical shape `A` plus a two element record sequence `B` of `{X, Y}`.
pub fn shaped_record() -> Record {
    let mut rec = Record::new();
    rec.set_val("A", "")
        .set_val("B/0/X", "")
        .set_val("B/0/Y", "")
        .set_val("B/1/X", "")
        .set_val("B/1/Y", "");
    rec
}

/// Schema rows for `Zx`: `zA` with an int converter and template rows for
/// the sequence fields.
pub fn zx_rows() -> Vec<SchemaRow> {
    vec![
        schema_row!["zA", "A", Cell::Empty, Cell::Empty, Converter::named("int").unwrap()],
        schema_row!["zX", "B/0/X"],
        schema_row!["zY", "B/0/Y"],
    ]
}

/// [`shaped_record`] with the `Zx` view declared for `direction`.
pub fn declared_record(direction: Direction) -> Record {
    let mut rec = shaped_record();
    rec.set_system(Some(zx())).set_direction(Some(direction));
    rec.add_system_fields(&zx_rows(), None, true)
        .expect("schema applies");
    rec
}

/// Writes a backend value exactly at `scope`.
pub fn set_backend(rec: &mut Record, path: &str, val: &str, scope: &Scope) {
    rec.set_val_in(path, val, scope, WriteOpts::exact());
}
