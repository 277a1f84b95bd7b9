//! Comparing, completeness checks and merging of records.

use super::{IdxPath, Record, Scope, node::WriteOpts, value::Atom};

/// Maximum number of characters of text taking part in a comparison.
const COMPARE_TEXT_LEN: usize = 39;
/// Significant length of record ids of the `SfId` field.
const SF_ID_LEN: usize = 15;

impl Record {
    /// Lists the differences between the canonical leaves of this record and
    /// `other`.
    ///
    /// Values are compared after [`compare_val`](Record::compare_val)
    /// normalisation. A leaf with a value here but missing in `other` is a
    /// difference; leaves only `other` has are ignored. With `field_names`
    /// only leaves whose first or last path segment is listed are compared;
    /// leaves whose first or last segment is in `exclude_fields` are skipped.
    pub fn compare_leafs(&self, other: &Record, field_names: &[&str], exclude_fields: &[&str]) -> Vec<String> {
        let canonical = Scope::canonical();
        let mut dif = Vec::new();
        for path in self.leaf_indexes(&canonical, true) {
            if is_excluded(&path, field_names, exclude_fields) {
                continue;
            }
            let this_val = self.compare_val(&path);
            if other.contains(&path) {
                let that_val = other.compare_val(&path);
                if this_val != that_val {
                    dif.push(format!(
                        "Different values in Field {path}: {}:{} != {}:{}",
                        system_label(self),
                        repr(&this_val),
                        system_label(other),
                        repr(&that_val)
                    ));
                }
            } else if this_val.is_truthy() {
                let val = self.val_in(&path, &canonical, true).unwrap_or_default();
                dif.push(format!(
                    "Field {}:{path}={val} does not exist in the other Record",
                    system_label(self)
                ));
            }
        }
        dif
    }

    /// Canonical value at `path`, normalised for comparisons.
    ///
    /// Text is trimmed and cut to 39 characters, with field specific rules
    /// applied first: `SfId` keeps its first 15 characters, names are
    /// capitalised, emails lowercased and phone numbers reduced to digits.
    /// Empty text compares as null, dates as their day number.
    pub fn compare_val(&self, path: impl Into<IdxPath>) -> Atom {
        let path = path.into();
        let Some(field) = self.field(&path) else {
            return Atom::Null;
        };
        let name = field.name();
        let val = self
            .val_in(&path, &Scope::canonical(), true)
            .unwrap_or_default();
        match val {
            Atom::Text(text) => {
                let text = if name == "SfId" {
                    text.chars().take(SF_ID_LEN).collect()
                } else if name.to_lowercase().contains("name") {
                    capitalize(&text)
                } else if name.contains("Email") {
                    text.to_lowercase()
                } else if name.contains("Phone") {
                    correct_phone(&text)
                } else {
                    text
                };
                let mut text = text.trim().to_string();
                if text.chars().count() > COMPARE_TEXT_LEN {
                    text = text
                        .chars()
                        .take(COMPARE_TEXT_LEN)
                        .collect::<String>()
                        .trim()
                        .to_string();
                }
                if text.is_empty() {
                    Atom::Null
                } else {
                    Atom::Text(text)
                }
            }
            date @ (Atom::Date(_) | Atom::DateTime(_)) => {
                date.day_ordinal().map_or(Atom::Null, Atom::Int)
            }
            other => other,
        }
    }

    /// Returns the alternatives of `required` none of whose fields has a
    /// canonical value.
    ///
    /// Each entry is a list of alternative field names; a single name is a
    /// one-element list.
    ///
    /// ```rust
    /// use sysdata::record::Record;
    ///
    /// let mut rec = Record::new();
    /// rec.set_val("Email", "a@b.c").set_val("Phone", "");
    /// let missing = rec.missing_fields(&[&["Surname"], &["Email", "Phone"], &["Phone"]]);
    /// assert_eq!(missing, vec![vec!["Surname".to_string()], vec!["Phone".to_string()]]);
    /// ```
    pub fn missing_fields(&self, required: &[&[&str]]) -> Vec<Vec<String>> {
        let canonical = Scope::canonical();
        required
            .iter()
            .filter(|alternatives| {
                !alternatives.iter().any(|name| {
                    self.val_in(*name, &canonical, true)
                        .is_some_and(|val| val.is_truthy())
                })
            })
            .map(|alternatives| alternatives.iter().map(ToString::to_string).collect())
            .collect()
    }

    /// Merges the aspects of the leaves of `other` into the fields of this
    /// record; with `extend` missing fields are added.
    pub fn merge_leafs(&mut self, other: &Record, scope: &Scope, flex: bool, extend: bool) -> &mut Self {
        for path in other.leaf_indexes(scope, flex) {
            let Some(theirs) = other.field(&path) else {
                continue;
            };
            match self.field_mut(&path) {
                Some(ours) => ours.merge_aspects(theirs),
                None if extend => {
                    self.set_node_child(&path, theirs.clone(), false);
                }
                None => {}
            }
        }
        self
    }

    /// Copies the leaf values of `other` for `scope` into this record.
    ///
    /// Without `extend` leaves below top-level fields this record lacks are
    /// skipped.
    pub fn merge_vals(&mut self, other: &Record, scope: &Scope, flex: bool, extend: bool) -> &mut Self {
        let opts = WriteOpts {
            flex,
            ..WriteOpts::default()
        };
        for path in other.leaf_indexes(scope, flex) {
            if !extend && !self.contains(&path[..1]) {
                continue;
            }
            if let Some(val) = other.val_in(&path, scope, flex) {
                self.set_val_in(&path, val, scope, opts);
            }
        }
        self
    }
}

fn is_excluded(path: &IdxPath, field_names: &[&str], exclude_fields: &[&str]) -> bool {
    let first = path.first().map(ToString::to_string).unwrap_or_default();
    let last = path.last().map(ToString::to_string).unwrap_or_default();
    let listed = |names: &[&str]| names.contains(&first.as_str()) || names.contains(&last.as_str());
    (!field_names.is_empty() && !listed(field_names)) || listed(exclude_fields)
}

fn system_label(rec: &Record) -> String {
    rec.system().map(ToString::to_string).unwrap_or_default()
}

fn repr(val: &Atom) -> String {
    match val {
        Atom::Null => "None".to_string(),
        Atom::Text(text) => format!("{text:?}"),
        other => other.to_string(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Keeps the digits of a phone number; a leading `+` becomes the `00`
/// international prefix.
fn correct_phone(phone: &str) -> String {
    let mut corrected = String::new();
    for (idx, ch) in phone.char_indices() {
        if ch.is_ascii_digit() {
            corrected.push(ch);
        } else if ch == '+' && corrected.is_empty() && !phone[idx + 1..].starts_with("00") {
            corrected.push_str("00");
        }
    }
    corrected
}
