//! Atomic values and the scalar container.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single atomic value.
///
/// `Null` stands for "no value". JSON strings always deserialize as `Text`;
/// dates only appear through converters or explicit construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Atom {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Sentinel returned for reads of unset scalar positions.
pub static EMPTY: Atom = Atom::Text(String::new());

impl Atom {
    pub fn is_null(&self) -> bool {
        matches!(self, Atom::Null)
    }

    /// Null or empty text.
    pub fn is_empty(&self) -> bool {
        match self {
            Atom::Null => true,
            Atom::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    /// Whether the value counts as set: non-empty text, non-zero numbers,
    /// `true`, and any date.
    pub fn is_truthy(&self) -> bool {
        match self {
            Atom::Null => false,
            Atom::Bool(b) => *b,
            Atom::Int(i) => *i != 0,
            Atom::Float(f) => *f != 0.0,
            Atom::Text(text) => !text.is_empty(),
            Atom::Date(_) | Atom::DateTime(_) => true,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Atom::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Atom::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Atom::Float(f) => Some(*f),
            Atom::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Atom::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Atom::Date(date) => Some(*date),
            Atom::DateTime(dt) => Some(dt.date()),
            _ => None,
        }
    }

    /// Day number counted from 0001-01-01 (day 1), for date comparisons.
    pub fn day_ordinal(&self) -> Option<i64> {
        self.as_date().map(|date| i64::from(date.num_days_from_ce()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Atom::Null => "null",
            Atom::Bool(_) => "bool",
            Atom::Int(_) => "int",
            Atom::Float(_) => "float",
            Atom::Text(_) => "text",
            Atom::Date(_) => "date",
            Atom::DateTime(_) => "datetime",
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Null => Ok(()),
            Atom::Bool(b) => write!(f, "{b}"),
            Atom::Int(i) => write!(f, "{i}"),
            Atom::Float(x) => write!(f, "{x}"),
            Atom::Text(text) => f.write_str(text),
            Atom::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Atom::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Atom {
    fn from(s: &str) -> Self {
        Atom::Text(s.to_string())
    }
}

impl From<String> for Atom {
    fn from(s: String) -> Self {
        Atom::Text(s)
    }
}

impl From<&String> for Atom {
    fn from(s: &String) -> Self {
        Atom::Text(s.clone())
    }
}

impl From<i64> for Atom {
    fn from(i: i64) -> Self {
        Atom::Int(i)
    }
}

impl From<i32> for Atom {
    fn from(i: i32) -> Self {
        Atom::Int(i64::from(i))
    }
}

impl From<f64> for Atom {
    fn from(x: f64) -> Self {
        Atom::Float(x)
    }
}

impl From<bool> for Atom {
    fn from(b: bool) -> Self {
        Atom::Bool(b)
    }
}

impl From<NaiveDate> for Atom {
    fn from(date: NaiveDate) -> Self {
        Atom::Date(date)
    }
}

impl From<NaiveDateTime> for Atom {
    fn from(dt: NaiveDateTime) -> Self {
        Atom::DateTime(dt)
    }
}

impl<T: Into<Atom>> From<Option<T>> for Atom {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Atom::Null)
    }
}

/// Scalar container: the value of one leaf, possibly multi-occurrence.
///
/// Reads never fail. [`Value::val`] returns the newest (last) atom, or the
/// [`EMPTY`] sentinel when nothing was set yet. Writes past the end extend the
/// container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(Vec<Atom>);

impl Value {
    pub fn new() -> Self {
        Value(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Atom at `index`.
    ///
    /// An unset position 0 reads as [`EMPTY`]; other unset positions are
    /// `None`.
    pub fn get(&self, index: usize) -> Option<&Atom> {
        match self.0.get(index) {
            Some(atom) => Some(atom),
            None if index == 0 => Some(&EMPTY),
            None => None,
        }
    }

    /// The current (last) atom.
    pub fn val(&self) -> &Atom {
        self.0.last().unwrap_or(&EMPTY)
    }

    /// Sets the atom at `index`, or replaces the last atom when `index` is
    /// `None`.
    ///
    /// Positions between the current end and `index` are filled with copies of
    /// `val`.
    pub fn set(&mut self, val: impl Into<Atom>, index: Option<usize>) -> &mut Self {
        let val = val.into();
        match index {
            Some(index) => {
                while self.0.len() <= index {
                    self.0.push(val.clone());
                }
                self.0[index] = val;
            }
            None => match self.0.last_mut() {
                Some(last) => *last = val,
                None => self.0.push(val),
            },
        }
        self
    }

    pub fn append(&mut self, val: impl Into<Atom>) -> &mut Self {
        self.0.push(val.into());
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.0.clear();
        self
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Atom> {
        self.0.iter()
    }
}

impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Value(vec![atom])
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(vec![Atom::from(s)])
    }
}

impl FromIterator<Atom> for Value {
    fn from_iter<I: IntoIterator<Item = Atom>>(iter: I) -> Self {
        Value(iter.into_iter().collect())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let atoms: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", atoms.join(","))
    }
}
