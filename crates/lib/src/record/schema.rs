//! Bulk declaration of a backend view over a record.
//!
//! A backend is declared with a table of rows. Each row names a backend
//! field, the canonical path it maps to and optional aspects; which position
//! of a row holds which aspect is configured with a [`FieldIndexMap`].
//! [`SystemSchema`] is the serializable form of such a table, with callables
//! referenced by name.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    AspectKey, AspectType, Calculator, Converter, Direction, Field, Filter, IdxPath, IdxSeg,
    NodeRef, Record, Scope, SystemId, Validator,
    errors::RecordError,
    field::Aspect,
    value::Atom,
};

/// One position of a schema row.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    #[default]
    Empty,
    /// A name, or a flat field name standing for a path.
    Text(String),
    Path(IdxPath),
    Atom(Atom),
    Calculator(Calculator),
    Validator(Validator),
    Converter(Converter),
    Filter(Filter),
}

impl Cell {
    fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    fn to_path(&self) -> Option<IdxPath> {
        match self {
            Cell::Text(text) => Some(IdxPath::parse(text)),
            Cell::Path(path) => Some(path.clone()),
            _ => None,
        }
    }

    /// The aspect of type `ty` this cell stands for.
    fn to_aspect(&self, ty: AspectType) -> Option<Aspect> {
        let aspect = match (ty, self) {
            (AspectType::Name, Cell::Text(name)) => Aspect::Name(name.clone()),
            (AspectType::ClearValue, Cell::Atom(val)) => Aspect::ClearValue(val.clone()),
            (AspectType::ClearValue, Cell::Text(text)) => Aspect::ClearValue(Atom::from(text)),
            (AspectType::Calculator, Cell::Calculator(calc)) => Aspect::Calculator(calc.clone()),
            (AspectType::Validator, Cell::Validator(check)) => Aspect::Validator(check.clone()),
            (AspectType::Filter, Cell::Filter(filter)) => Aspect::Filter(filter.clone()),
            (AspectType::SqlExpr, Cell::Text(expr)) => Aspect::SqlExpr(expr.clone()),
            _ => return None,
        };
        Some(aspect)
    }
}

impl From<&str> for Cell {
    fn from(text: &str) -> Self {
        Cell::Text(text.to_string())
    }
}

impl From<String> for Cell {
    fn from(text: String) -> Self {
        Cell::Text(text)
    }
}

impl From<IdxPath> for Cell {
    fn from(path: IdxPath) -> Self {
        Cell::Path(path)
    }
}

impl From<Atom> for Cell {
    fn from(val: Atom) -> Self {
        Cell::Atom(val)
    }
}

impl From<i64> for Cell {
    fn from(val: i64) -> Self {
        Cell::Atom(Atom::Int(val))
    }
}

impl From<Calculator> for Cell {
    fn from(calc: Calculator) -> Self {
        Cell::Calculator(calc)
    }
}

impl From<Validator> for Cell {
    fn from(check: Validator) -> Self {
        Cell::Validator(check)
    }
}

impl From<Converter> for Cell {
    fn from(converter: Converter) -> Self {
        Cell::Converter(converter)
    }
}

impl From<Filter> for Cell {
    fn from(filter: Filter) -> Self {
        Cell::Filter(filter)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(cell: Option<T>) -> Self {
        cell.map_or(Cell::Empty, Into::into)
    }
}

/// A row of a backend declaration table.
pub type SchemaRow = Vec<Cell>;

/// Builds a [`SchemaRow`] from anything convertible into a [`Cell`].
///
/// ```rust
/// use sysdata::record::{Cell, Converter};
/// use sysdata::schema_row;
///
/// let row = schema_row!["zA", "A", Cell::Empty, Cell::Empty, Converter::named("int").unwrap()];
/// assert_eq!(row.len(), 5);
/// ```
#[macro_export]
macro_rules! schema_row {
    ($($cell:expr),* $(,)?) => {
        vec![$($crate::record::Cell::from($cell)),*]
    };
}

/// Which row position holds which aspect.
///
/// Keys are aspect keys; a key without system or direction applies to every
/// backend and direction, otherwise it only applies when they match the
/// record environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIndexMap {
    entries: Vec<(AspectKey, usize)>,
}

impl FieldIndexMap {
    pub fn new() -> Self {
        FieldIndexMap {
            entries: Vec::new(),
        }
    }

    /// The default layout for the record environment `scope`: backend name,
    /// canonical path, value or calculator, outbound filter, inbound and
    /// outbound converter.
    pub fn default_for(scope: &Scope) -> Self {
        FieldIndexMap::new()
            .with(AspectKey::new(AspectType::Name, scope.clone()), 0)
            .with(AspectKey::canonical(AspectType::Name), 1)
            .with(AspectKey::canonical(AspectType::Value), 2)
            .with(AspectKey::directed(AspectType::Filter, Direction::Onto), 3)
            .with(AspectKey::directed(AspectType::Converter, Direction::From), 4)
            .with(AspectKey::directed(AspectType::Converter, Direction::Onto), 5)
    }

    pub fn with(mut self, key: AspectKey, position: usize) -> Self {
        self.entries.retain(|(existing, _)| *existing != key);
        self.entries.push((key, position));
        self
    }

    pub fn position(&self, key: &AspectKey) -> Option<usize> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, position)| *position)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AspectKey, usize)> {
        self.entries.iter().map(|(key, position)| (key, *position))
    }
}

impl Default for FieldIndexMap {
    fn default() -> Self {
        FieldIndexMap::new()
    }
}

/// Whether an aspect key of an index map applies in `env`.
fn applies_to(key: &AspectKey, env: &Scope) -> bool {
    key.scope.system_id().is_none_or(|system| Some(system) == env.system_id())
        && key.scope.direction().is_none_or(|direction| Some(direction) == env.direction())
}

fn schema_error(env: &Scope, reason: impl Into<String>) -> RecordError {
    RecordError::InvalidSchema {
        system: env.system_id().map(ToString::to_string).unwrap_or_default(),
        reason: reason.into(),
    }
}

impl Record {
    /// Declares the view of the record's backend (system and direction of
    /// the record) from `rows`.
    ///
    /// Every row maps a backend field name onto a canonical path. Missing
    /// fields are created when `extend` is set and skipped otherwise. A row
    /// addressing the first element of an existing record sequence (a
    /// template row) is applied to every element of that sequence.
    ///
    /// A calculator in the value position is installed as calculator; a
    /// plain value becomes the backend value of the first element and the
    /// clear value of every element. A backend name declared for two fields
    /// keeps mapping to the first one.
    ///
    /// Fails when the record has no system or direction, or when a row
    /// lacks the backend name or holds a malformed path.
    pub fn add_system_fields(
        &mut self,
        rows: &[SchemaRow],
        indexes: Option<&FieldIndexMap>,
        extend: bool,
    ) -> crate::Result<&mut Self> {
        let env = self.scope();
        if env.system_id().is_none() || env.direction().is_none() {
            return Err(schema_error(&env, "the record needs a system and a direction").into());
        }
        let default_map;
        let map = match indexes {
            Some(map) => map,
            None => {
                default_map = FieldIndexMap::default_for(&env);
                &default_map
            }
        };
        let mut name_key = AspectKey::new(AspectType::Name, env.clone());
        if map.position(&name_key).is_none() {
            name_key = AspectKey::new(AspectType::Name, Scope::from_parts(None, env.direction()));
        }
        let path_key = AspectKey::canonical(AspectType::Name);
        let (Some(name_i), Some(path_i)) = (map.position(&name_key), map.position(&path_key)) else {
            return Err(schema_error(&env, "index map lacks the field or backend name position").into());
        };

        for (row_i, row) in rows.iter().enumerate() {
            let Some(path) = row.get(path_i).and_then(Cell::to_path) else {
                continue;
            };
            let Some(field_name) = path.leaf_name().map(str::to_string) else {
                return Err(schema_error(&env, format!("row {row_i}: path {path} ends in an index")).into());
            };
            let Some(sys_name) = row.get(name_i).and_then(Cell::as_text) else {
                return Err(schema_error(&env, format!("row {row_i}: missing backend name")).into());
            };
            let sys_name = sys_name.trim_matches('/');

            for (path_idx, path) in self.template_paths(&path).into_iter().enumerate() {
                let created = !self.contains(&path);
                if created {
                    if !extend {
                        continue;
                    }
                    self.set_node_child(&path, Field::new(field_name.as_str()), false);
                }
                let Some(field) = self.field_mut(&path) else {
                    continue;
                };
                apply_row(field, row, map, &env, &[&name_key, &path_key], path_idx == 0);
                if field.system_name(&env, false).is_none() {
                    field.set_name(sys_name, &env, true);
                }
                let anchor = field.own_anchor();
                field.attach(&env, &anchor);
                debug!(%path, sys_name, scope = %env, created, "declared backend field");
                self.map_system_name(sys_name, &path, path_idx == 0);
            }
        }
        Ok(self)
    }

    /// Paths a schema row applies to: every element of the addressed record
    /// sequence for template paths, else just `path`.
    fn template_paths(&self, path: &IdxPath) -> Vec<IdxPath> {
        if path.is_template(true)
            && let Some(NodeRef::Records(recs)) = self.value(&path[..1], &Scope::canonical(), false)
            && !recs.is_empty()
        {
            return (0..recs.len())
                .map(|idx| {
                    let mut segments = vec![path[0].clone(), IdxSeg::Index(idx)];
                    segments.extend_from_slice(&path[2..]);
                    IdxPath::from(segments)
                })
                .collect();
        }
        vec![path.clone()]
    }

    fn map_system_name(&mut self, sys_name: &str, path: &IdxPath, first_element: bool) {
        match self.sys_name_field_map.iter().find(|(name, _)| name == sys_name) {
            Some((_, mapped)) if first_element && mapped != path => {
                warn!(sys_name, %mapped, ignored = %path, "backend name declared twice, keeping the first field");
            }
            Some(_) => {}
            None => self.sys_name_field_map.push((sys_name.to_string(), path.clone())),
        }
    }

    /// Canonical path mapped to a backend field name.
    pub fn system_field_path(&self, sys_name: &str) -> Option<&IdxPath> {
        self.sys_name_field_map
            .iter()
            .find(|(name, _)| name == sys_name)
            .map(|(_, path)| path)
    }

    /// Collects the paths of fields mapped to the backend field named by the
    /// last element of `sys_name_path` (or by the whole path, joined with
    /// `sep`).
    pub fn collect_system_fields(&mut self, sys_name_path: &[&str], sep: &str) -> &[IdxPath] {
        self.collected_system_fields.clear();
        let Some(deep_name) = sys_name_path.last() else {
            return &self.collected_system_fields;
        };
        let full_path = sys_name_path.join(sep);
        for (sys_name, path) in &self.sys_name_field_map {
            let matches = sys_name == deep_name
                || *sys_name == full_path
                || full_path.ends_with(&format!("{sep}{sys_name}"));
            if matches && !self.collected_system_fields.contains(path) {
                self.collected_system_fields.push(path.clone());
            }
        }
        &self.collected_system_fields
    }

    /// Moves the cursor of the record sequence holding the backend fields
    /// whose names start with `prefix` followed by `sep`.
    ///
    /// With `idx` the cursor is set, otherwise moved by `add`. Returns the
    /// new cursor position.
    pub fn set_current_system_index(
        &mut self,
        prefix: &str,
        sep: &str,
        idx: Option<usize>,
        add: isize,
    ) -> Option<usize> {
        let prefix = format!("{prefix}{sep}");
        let records_path = self.sys_name_field_map.iter().find_map(|(sys_name, path)| {
            if !sys_name.starts_with(&prefix) {
                return None;
            }
            let offset = path.iter().position(IdxSeg::is_index)?;
            Some(IdxPath::from(&path[..offset]))
        })?;
        let recs = self.records_mut(&records_path)?;
        match idx {
            Some(idx) => Some(recs.set_current_index(idx)),
            None => recs.add_current_index(add),
        }
    }
}

/// Writes a declared default into the backend value of `env`; a converter
/// declared on the same row may have created that value already.
fn put_default(field: &mut Field, val: Atom, env: &Scope) {
    field.ensure_system_value(env);
    field.put_val(val, env, false);
}

/// Applies the aspects of `row` to `field` for the backend scope `env`.
fn apply_row(
    field: &mut Field,
    row: &SchemaRow,
    map: &FieldIndexMap,
    env: &Scope,
    skip: &[&AspectKey],
    first_element: bool,
) {
    let cell = |position: usize| row.get(position).filter(|cell| !cell.is_empty());

    let converter = map
        .position(&AspectKey::new(AspectType::Converter, Scope::from_parts(None, env.direction())))
        .and_then(cell)
        .or_else(|| map.position(&AspectKey::canonical(AspectType::Converter)).and_then(cell));
    if let Some(Cell::Converter(converter)) = converter {
        field.set_converter(converter.clone(), env, true);
    }

    for (key, position) in map.iter() {
        if key.ty == AspectType::Converter || skip.contains(&key) || !applies_to(key, env) {
            continue;
        }
        let Some(cell) = cell(position) else {
            continue;
        };
        match (key.ty, cell) {
            (AspectType::Value, Cell::Calculator(calc)) => {
                field.set_calculator(calc.clone(), env, true);
            }
            (AspectType::Value, Cell::Atom(val)) => {
                if first_element {
                    put_default(field, val.clone(), env);
                }
                field.set_clear_val(Some(val.clone()), env);
            }
            (AspectType::Value, Cell::Text(text)) => {
                let val = Atom::from(text.as_str());
                if first_element {
                    put_default(field, val.clone(), env);
                }
                field.set_clear_val(Some(val), env);
            }
            (ty, cell) => match cell.to_aspect(ty) {
                Some(aspect) => {
                    field.set_aspect(aspect, env, true);
                }
                None => debug!(field = field.name(), %key, "schema cell does not fit its aspect"),
            },
        }
    }
}

/// One backend field of a [`SystemSchema`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Backend field name.
    pub name: String,
    /// Canonical path (`B/0/X` or `B0X`).
    pub path: String,
    /// Initial backend value and clear value.
    #[serde(default)]
    pub value: Option<Atom>,
    /// Builtin validator checking pulled values.
    #[serde(default)]
    pub validator: Option<String>,
    /// Builtin converter for pulled values.
    #[serde(default)]
    pub from_converter: Option<String>,
    /// Builtin converter for pushed values.
    #[serde(default)]
    pub onto_converter: Option<String>,
    /// Query expression selecting the backend value.
    #[serde(default)]
    pub sql_expr: Option<String>,
}

/// Declarative backend view, as loaded from a JSON file.
///
/// ```rust
/// use sysdata::record::{Atom, Record, SystemSchema};
///
/// let schema: SystemSchema = serde_json::from_str(
///     r#"{"system": "Zx", "fields": [{"name": "zA", "path": "A", "from_converter": "int"}]}"#,
/// ).unwrap();
/// let mut rec = Record::new();
/// rec.set_val("A", "");
/// schema.apply(&mut rec).unwrap();
/// rec.set_val("zA", "7");
/// rec.pull(&schema.system_id().unwrap());
/// assert_eq!(rec.val("A"), Some(Atom::Int(7)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSchema {
    pub system: String,
    pub fields: Vec<SchemaField>,
}

impl SystemSchema {
    pub fn system_id(&self) -> crate::Result<SystemId> {
        Ok(SystemId::new(self.system.as_str())?)
    }

    fn index_map(scope: &Scope) -> FieldIndexMap {
        let direction = scope.direction().unwrap_or(Direction::From);
        FieldIndexMap::new()
            .with(AspectKey::new(AspectType::Name, scope.clone()), 0)
            .with(AspectKey::canonical(AspectType::Name), 1)
            .with(AspectKey::canonical(AspectType::Value), 2)
            .with(AspectKey::directed(AspectType::Validator, Direction::From), 3)
            .with(AspectKey::directed(AspectType::Converter, direction), 4)
            .with(AspectKey::directed(AspectType::SqlExpr, Direction::From), 5)
    }

    /// Rows of the schema for one direction, with named callables resolved.
    pub fn rows(&self, direction: Direction) -> crate::Result<Vec<SchemaRow>> {
        self.fields
            .iter()
            .map(|field| -> crate::Result<SchemaRow> {
                let converter = match direction {
                    Direction::From => field.from_converter.as_deref(),
                    Direction::Onto => field.onto_converter.as_deref(),
                };
                let validator = match direction {
                    Direction::From => field.validator.as_deref(),
                    Direction::Onto => None,
                };
                Ok(vec![
                    Cell::from(field.name.as_str()),
                    Cell::from(field.path.as_str()),
                    Cell::from(field.value.clone()),
                    Cell::from(validator.map(Validator::named).transpose()?),
                    Cell::from(converter.map(Converter::named).transpose()?),
                    Cell::from(field.sql_expr.clone()),
                ])
            })
            .collect()
    }

    /// Declares this backend on `rec` for both directions.
    ///
    /// The environment of `rec` is restored afterwards.
    pub fn apply(&self, rec: &mut Record) -> crate::Result<()> {
        let system = self.system_id()?;
        let (old_system, old_direction) = (rec.system().cloned(), rec.direction());
        let mut result = Ok(());
        for direction in [Direction::From, Direction::Onto] {
            let scope = Scope::new(system.clone(), direction);
            rec.set_system(Some(system.clone())).set_direction(Some(direction));
            result = self
                .rows(direction)
                .and_then(|rows| rec.add_system_fields(&rows, Some(&Self::index_map(&scope)), true).map(|_| ()));
            if result.is_err() {
                break;
            }
        }
        rec.set_system(old_system).set_direction(old_direction);
        result
    }
}
