//! Calculators, validators, converters and filters attached to fields.
//!
//! Each kind wraps a reference-counted closure over a [`FieldCtx`], so schema
//! tables stay plain data that can be cloned onto many fields. Equality of two
//! callables is identity of the shared closure.

use std::{fmt, str::FromStr, sync::Arc};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{
    AddressingContext, Field, IdxPath, IdxSeg, NodeRef, Record, Scope, errors::RecordError,
    value::Atom,
};

/// Caller-set tag describing what the current operation on a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Insert,
    Update,
    Upsert,
    Delete,
    Search,
    Parse,
    Build,
    Pull,
    Push,
    Compare,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Insert => "INSERT",
            Action::Update => "UPDATE",
            Action::Upsert => "UPSERT",
            Action::Delete => "DELETE",
            Action::Search => "SEARCH",
            Action::Parse => "PARSE",
            Action::Build => "BUILD",
            Action::Pull => "PULL",
            Action::Push => "PUSH",
            Action::Compare => "COMPARE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s.to_ascii_uppercase().as_str() {
            "INSERT" => Action::Insert,
            "UPDATE" => Action::Update,
            "UPSERT" => Action::Upsert,
            "DELETE" => Action::Delete,
            "SEARCH" => Action::Search,
            "PARSE" => Action::Parse,
            "BUILD" => Action::Build,
            "PULL" => Action::Pull,
            "PUSH" => Action::Push,
            "COMPARE" => Action::Compare,
            _ => {
                return Err(RecordError::InvalidAction {
                    action: s.to_string(),
                });
            }
        };
        Ok(action)
    }
}

/// What a callable sees of the field it runs for.
///
/// `root` is the record the current operation was started on. It is only a
/// read handle: callables never mutate the tree.
#[derive(Clone, Copy)]
pub struct FieldCtx<'a> {
    pub field: &'a Field,
    pub scope: &'a Scope,
    pub root: Option<&'a Record>,
}

impl<'a> FieldCtx<'a> {
    pub fn new(field: &'a Field, scope: &'a Scope, root: Option<&'a Record>) -> Self {
        FieldCtx { field, scope, root }
    }

    /// Action tag of the root record.
    pub fn action(&self) -> Option<Action> {
        self.root.and_then(Record::action)
    }

    pub fn in_actions(&self, actions: &[Action]) -> bool {
        self.action().is_some_and(|action| actions.contains(&action))
    }

    /// Value of another field of the root record, in the scope of this call.
    pub fn record_field_val(&self, path: impl Into<IdxPath>) -> Option<Atom> {
        let root = self.root?;
        root.val_in(path, self.scope, true)
    }

    /// Shorthand for [`FieldCtx::record_field_val`].
    pub fn rfv(&self, path: impl Into<IdxPath>) -> Option<Atom> {
        self.record_field_val(path)
    }

    /// Value of a field (or of this field when `path` is `None`) in the root
    /// record's own system and direction.
    pub fn system_record_val(&self, path: Option<IdxPath>) -> Option<Atom> {
        let root = self.root?;
        let scope = root.scope();
        match path {
            Some(path) => {
                let field = root.node_child(&path, &mut AddressingContext::new(), false)?;
                field.val(&scope, true, Some(root))
            }
            None => self.field.val(&scope, true, Some(root)),
        }
    }

    /// Shorthand for [`FieldCtx::system_record_val`].
    pub fn srv(&self, path: Option<IdxPath>) -> Option<Atom> {
        self.system_record_val(path)
    }

    /// Path of the nearest ancestor container of this field.
    pub fn parent_path(&self) -> Option<IdxPath> {
        let root_idx = self.field.root_idx(self.scope)?;
        if root_idx.len() < 2 {
            return None;
        }
        Some(root_idx.parent())
    }

    /// Current index of the nearest enclosing record sequence.
    pub fn current_records_idx(&self) -> Option<usize> {
        let root = self.root?;
        let mut path = self.field.root_idx(self.scope)?.clone();
        while path.len() > 1 {
            path = path.parent();
            if let Some(IdxSeg::Index(_)) = path.last() {
                continue;
            }
            if let Some(NodeRef::Records(records)) = root.value(&path, &Scope::canonical(), true) {
                return records.current_idx();
            }
        }
        None
    }
}

type CalcFn = dyn Fn(&FieldCtx<'_>) -> Atom + Send + Sync;
type CheckFn = dyn Fn(&FieldCtx<'_>, &Atom) -> bool + Send + Sync;
type ConvertFn = dyn Fn(&FieldCtx<'_>, Atom) -> Atom + Send + Sync;
type FilterFn = dyn Fn(&FieldCtx<'_>) -> bool + Send + Sync;

macro_rules! shared_callable {
    ($(#[$meta:meta])* $name:ident, $fn_ty:ty) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(Arc<$fn_ty>);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:p})", stringify!($name), Arc::as_ptr(&self.0))
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0)
            }
        }
    };
}

shared_callable!(
    /// Computes a field value on read instead of storing one.
    Calculator,
    CalcFn
);
shared_callable!(
    /// Accepts or rejects a value before it is stored.
    Validator,
    CheckFn
);
shared_callable!(
    /// Maps a value between its backend and canonical representation.
    ///
    /// Returning [`Atom::Null`] means "no value": pull and push then leave the
    /// target untouched.
    Converter,
    ConvertFn
);
shared_callable!(
    /// Returns `true` for fields to leave out of an outbound operation.
    Filter,
    FilterFn
);

impl Calculator {
    pub fn new(f: impl Fn(&FieldCtx<'_>) -> Atom + Send + Sync + 'static) -> Self {
        Calculator(Arc::new(f))
    }

    pub fn call(&self, ctx: &FieldCtx<'_>) -> Atom {
        (self.0)(ctx)
    }
}

impl Validator {
    pub fn new(f: impl Fn(&FieldCtx<'_>, &Atom) -> bool + Send + Sync + 'static) -> Self {
        Validator(Arc::new(f))
    }

    pub fn call(&self, ctx: &FieldCtx<'_>, val: &Atom) -> bool {
        (self.0)(ctx, val)
    }

    /// Looks up a builtin validator by name.
    ///
    /// `non_empty` rejects null and empty text, `numeric` accepts numbers and
    /// text that parses as one.
    pub fn named(name: &str) -> Result<Self, RecordError> {
        let validator = match name {
            "non_empty" => Validator::new(|_, val| !val.is_empty()),
            "numeric" => Validator::new(|_, val| match val {
                Atom::Int(_) | Atom::Float(_) => true,
                Atom::Text(text) => text.trim().parse::<f64>().is_ok(),
                _ => false,
            }),
            _ => {
                return Err(RecordError::UnknownCallable {
                    kind: "validator".to_string(),
                    name: name.to_string(),
                });
            }
        };
        Ok(validator)
    }
}

impl Converter {
    pub fn new(f: impl Fn(&FieldCtx<'_>, Atom) -> Atom + Send + Sync + 'static) -> Self {
        Converter(Arc::new(f))
    }

    pub fn call(&self, ctx: &FieldCtx<'_>, val: Atom) -> Atom {
        (self.0)(ctx, val)
    }

    /// Looks up a builtin converter by name.
    ///
    /// Available: `int`, `float`, `str`, `upper`, `lower`, `trim`, `bool` and
    /// `date` (`%Y-%m-%d`, or the date part of `%Y-%m-%d %H:%M:%S`).
    pub fn named(name: &str) -> Result<Self, RecordError> {
        let converter = match name {
            "int" => Converter::new(|_, val| to_int(val)),
            "float" => Converter::new(|_, val| to_float(val)),
            "str" => Converter::new(|_, val| match val {
                Atom::Null => Atom::Null,
                other => Atom::Text(other.to_string()),
            }),
            "upper" => Converter::new(|_, val| map_text(val, |s| s.to_uppercase())),
            "lower" => Converter::new(|_, val| map_text(val, |s| s.to_lowercase())),
            "trim" => Converter::new(|_, val| map_text(val, |s| s.trim().to_string())),
            "bool" => Converter::new(|_, val| to_bool(val)),
            "date" => Converter::new(|_, val| to_date(val)),
            _ => {
                return Err(RecordError::UnknownCallable {
                    kind: "converter".to_string(),
                    name: name.to_string(),
                });
            }
        };
        Ok(converter)
    }
}

impl Filter {
    pub fn new(f: impl Fn(&FieldCtx<'_>) -> bool + Send + Sync + 'static) -> Self {
        Filter(Arc::new(f))
    }

    pub fn call(&self, ctx: &FieldCtx<'_>) -> bool {
        (self.0)(ctx)
    }
}

fn map_text(val: Atom, f: impl Fn(&str) -> String) -> Atom {
    match val {
        Atom::Text(text) => Atom::Text(f(&text)),
        other => other,
    }
}

fn to_int(val: Atom) -> Atom {
    match val {
        Atom::Int(i) => Atom::Int(i),
        Atom::Float(x) => Atom::Int(x as i64),
        Atom::Bool(b) => Atom::Int(i64::from(b)),
        Atom::Text(text) => text.trim().parse().map(Atom::Int).unwrap_or(Atom::Null),
        _ => Atom::Null,
    }
}

fn to_float(val: Atom) -> Atom {
    match val {
        Atom::Float(x) => Atom::Float(x),
        Atom::Int(i) => Atom::Float(i as f64),
        Atom::Text(text) => text.trim().parse().map(Atom::Float).unwrap_or(Atom::Null),
        _ => Atom::Null,
    }
}

fn to_bool(val: Atom) -> Atom {
    match val {
        Atom::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" => Atom::Bool(true),
            "0" | "false" | "no" | "n" => Atom::Bool(false),
            _ => Atom::Null,
        },
        Atom::Null => Atom::Null,
        other => Atom::Bool(other.is_truthy()),
    }
}

fn to_date(val: Atom) -> Atom {
    match val {
        Atom::Date(date) => Atom::Date(date),
        Atom::DateTime(dt) => Atom::Date(dt.date()),
        Atom::Text(text) => {
            let text = text.trim();
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .or_else(|_| {
                    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date())
                })
                .map(Atom::Date)
                .unwrap_or(Atom::Null)
        }
        _ => Atom::Null,
    }
}
