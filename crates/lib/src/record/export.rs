//! Listing leaf names and exporting record values.

use serde_json::{Map, Value as JsonValue};

use super::{
    AspectType, Direction, Field, IdxPath, Record, Scope, SystemId, errors::RecordError,
    value::Atom,
};

/// Naming style of [`Record::leaf_names`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeafNameType {
    /// Flat root path for nested leaves, otherwise the backend name when a
    /// system was asked for and the canonical name if not.
    #[default]
    Default,
    /// Backend name.
    System,
    /// Canonical field name.
    Field,
    /// Flat root path (`B0X`).
    Root,
    /// Root path with the backend name as last segment.
    SystemPath,
    /// Root path.
    Path,
}

/// Selection and naming options of [`Record::leaf_names`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LeafNameOpts<'a> {
    /// Only leaves with one of these backend names.
    pub col_names: &'a [&'a str],
    /// Only leaves with one of these canonical or flat root names.
    pub field_names: &'a [&'a str],
    pub exclude_fields: &'a [&'a str],
    pub name_type: LeafNameType,
}

/// Key style of [`Record::to_dict`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyType {
    /// Backend name of the leaf (canonical name for the canonical scope).
    Name,
    /// Separated index path (`B/0/X`).
    Path,
    /// Flat index path (`B0X`), ending in the backend name with
    /// `use_system_key`.
    #[default]
    PathString,
}

/// Options of [`Record::to_dict`].
#[derive(Clone, Copy)]
pub struct DictOpts<'a> {
    /// Scope of the exported leaves; the canonical scope falls back to the
    /// record's own.
    pub scope: Option<&'a Scope>,
    /// Returns `true` for fields to leave out.
    pub filter: Option<&'a dyn Fn(&Field) -> bool>,
    pub key_type: KeyType,
    /// Push canonical values onto the system before exporting.
    pub push_onto: bool,
    pub use_system_key: bool,
    /// Export the system value instead of the canonical one.
    pub put_system_val: bool,
    /// Also export null and empty text values.
    pub put_empty_val: bool,
}

impl Default for DictOpts<'_> {
    fn default() -> Self {
        DictOpts {
            scope: None,
            filter: None,
            key_type: KeyType::default(),
            push_onto: true,
            use_system_key: true,
            put_system_val: true,
            put_empty_val: false,
        }
    }
}

/// Backend name of `field` for `scope`; the canonical name does not count.
fn backend_name<'a>(field: &'a Field, scope: &Scope) -> Option<&'a str> {
    if scope.is_canonical() {
        return Some(field.name());
    }
    let found = field
        .aspect_exists(AspectType::Name, scope, true)
        .filter(|found| !found.is_canonical())?;
    field.system_name(&found, false)
}

impl Record {
    fn effective_scope(&self, scope: &Scope) -> Scope {
        if scope.is_canonical() {
            self.scope()
        } else {
            scope.clone()
        }
    }

    /// Names of the leaves of `scope`, in the style of `opts.name_type`.
    ///
    /// Leaves without a backend name for the scope (and leaves outside the
    /// first element of a record sequence) are left out.
    pub fn leaf_names(&self, scope: &Scope, opts: &LeafNameOpts<'_>) -> Vec<String> {
        let sys_scope = self.effective_scope(scope);
        let mut names = Vec::new();
        for field in self.leafs(scope, false) {
            let Some(idx_path) = field.root_idx(scope) else {
                continue;
            };
            if !idx_path.is_template(false) {
                continue;
            }
            let Some(sys_name) = backend_name(field, &sys_scope) else {
                continue;
            };
            if !opts.col_names.is_empty() && !opts.col_names.contains(&sys_name) {
                continue;
            }
            let fld_name = field.name();
            let root_name = idx_path.to_field_name(false);
            let listed = |names: &[&str]| names.contains(&fld_name) || names.contains(&root_name.as_str());
            if (!opts.field_names.is_empty() && !listed(opts.field_names)) || listed(opts.exclude_fields) {
                continue;
            }

            let name = match opts.name_type {
                LeafNameType::System => sys_name.to_string(),
                LeafNameType::Field => fld_name.to_string(),
                LeafNameType::Root => root_name,
                LeafNameType::SystemPath => idx_path.with_last(sys_name).to_string(),
                LeafNameType::Path => idx_path.to_string(),
                LeafNameType::Default => {
                    if idx_path.len() > 1 && idx_path[0].as_name() == Some(fld_name) {
                        root_name
                    } else if scope.system_id().is_some() {
                        sys_name.to_string()
                    } else {
                        fld_name.to_string()
                    }
                }
            };
            if !name.is_empty() {
                names.push(name);
            }
        }
        names
    }

    /// Top-level fields a backend selects from, with their column name.
    fn sql_fields<'a>(
        &'a self,
        scope: &'a Scope,
        col_names: &'a [&'a str],
    ) -> impl Iterator<Item = (&'a Field, &'a str)> + 'a {
        self.fields().filter_map(move |field| {
            if field.root_idx(scope).is_none_or(|path| path.len() != 1) {
                return None;
            }
            let name = backend_name(field, scope)?;
            (col_names.is_empty() || col_names.contains(&name)).then_some((field, name))
        })
    }

    /// Column names to select from `system`.
    pub fn sql_columns(&self, system: &SystemId, col_names: &[&str]) -> Vec<String> {
        let scope = Scope::new(system.clone(), Direction::From);
        self.sql_fields(&scope, col_names)
            .map(|(_, name)| name.to_string())
            .collect()
    }

    /// Column expressions to select from `system`: `expr AS name` for fields
    /// with a SQL expression, the bare column name otherwise.
    pub fn sql_select(&self, system: &SystemId, col_names: &[&str]) -> Vec<String> {
        let scope = Scope::new(system.clone(), Direction::From);
        self.sql_fields(&scope, col_names)
            .map(|(field, name)| match field.sql_expression(&scope) {
                Some(expr) if !expr.is_empty() => format!("{expr} AS {name}"),
                _ => name.to_string(),
            })
            .collect()
    }

    /// Leaf values keyed as `opts.key_type` asks for.
    ///
    /// With a system scope, fields whose `Onto` filter for that system
    /// rejects them are left out.
    pub fn to_dict(&mut self, opts: &DictOpts<'_>) -> Vec<(String, Atom)> {
        let scope = self.effective_scope(opts.scope.unwrap_or(&Scope::canonical()));
        if opts.push_onto
            && let Some(system) = scope.system_id()
        {
            self.push(system);
        }
        let outbound = scope
            .system_id()
            .map(|system| Scope::new(system.clone(), Direction::Onto));
        let value_scope = if opts.put_system_val {
            scope.clone()
        } else {
            Scope::canonical()
        };

        let mut dict = Vec::new();
        for idx_path in self.leaf_indexes(&scope, true) {
            let Some(field) = self.field(&idx_path) else {
                continue;
            };
            let Some(key) = backend_name(field, &scope) else {
                continue;
            };
            if opts.filter.is_some_and(|filter| filter(field))
                || outbound
                    .as_ref()
                    .is_some_and(|onto| field.is_filtered(onto, Some(self)))
            {
                continue;
            }
            let key = match opts.key_type {
                KeyType::Name => key.to_string(),
                KeyType::Path => idx_path.to_string(),
                KeyType::PathString if scope.system_id().is_some() && opts.use_system_key => {
                    idx_path.with_last(key).to_field_name(false)
                }
                KeyType::PathString => idx_path.to_field_name(false),
            };
            let val = self
                .val_in(&idx_path, &value_scope, true)
                .unwrap_or_default();
            if opts.put_empty_val || !val.is_empty() {
                dict.push((key, val));
            }
        }
        dict
    }

    /// Canonical leaf values as a flat JSON object keyed by index path.
    ///
    /// ```rust
    /// use sysdata::record::Record;
    ///
    /// let mut rec = Record::new();
    /// rec.set_val("A", 1).set_val("B/0/X", "a");
    /// assert_eq!(rec.to_json().to_string(), r#"{"A":1,"B/0/X":"a"}"#);
    /// ```
    pub fn to_json(&self) -> JsonValue {
        let canonical = Scope::canonical();
        let map: Map<String, JsonValue> = self
            .leaf_indexes(&canonical, true)
            .map(|path| {
                let val = self.val_in(&path, &canonical, true).unwrap_or_default();
                let json = serde_json::to_value(&val).unwrap_or(JsonValue::Null);
                (path.to_string(), json)
            })
            .collect();
        JsonValue::Object(map)
    }

    /// Record built from a JSON object.
    ///
    /// Keys are index paths in either the separated or the flat form; nested
    /// objects and arrays extend the path of their key.
    pub fn from_json(json: &JsonValue) -> crate::Result<Record> {
        let JsonValue::Object(map) = json else {
            return Err(RecordError::TypeMismatch {
                path: String::new(),
                expected: "object".to_string(),
                actual: json_kind(json).to_string(),
            }
            .into());
        };
        let mut rec = Record::new();
        for (key, val) in map {
            rec.put_json(IdxPath::parse(key), val)?;
        }
        Ok(rec)
    }

    fn put_json(&mut self, path: IdxPath, json: &JsonValue) -> crate::Result<()> {
        match json {
            JsonValue::Object(map) => {
                for (key, val) in map {
                    self.put_json(path.concat(&IdxPath::parse(key)), val)?;
                }
            }
            JsonValue::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    self.put_json(path.join(idx), item)?;
                }
            }
            scalar => {
                let val: Atom = serde_json::from_value(scalar.clone())?;
                self.check_write_path(&path)?;
                self.set_val(path, val);
            }
        }
        Ok(())
    }
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
