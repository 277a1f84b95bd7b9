//! Copy depth and per-field patches applied while copying records.

use std::{fmt, sync::Arc};

use super::{AspectKey, Field, field::Aspect};

/// Key of [`FieldPatches`] entries that apply to every field.
pub const ALL_FIELDS: &str = "**";

/// How far a copy duplicates nodes instead of sharing them with the source.
///
/// A shared node is the same allocation in source and copy until one side
/// writes to it; writes never show up on the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Duplicate this many levels; `Levels(0)` shares everything below the
    /// copied record.
    Levels(u32),
    /// Duplicate every level.
    All,
    /// Duplicate down to (not including) the scalar containers.
    UntilValue,
    /// Duplicate down to (not including) fields holding a scalar container.
    UntilField,
}

/// Kind of node a copy is about to descend into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DepthTarget {
    Value,
    Container,
    Field { holds_value: bool },
}

impl Depth {
    pub const SHALLOW: Depth = Depth::Levels(0);

    /// Depth from the signed encoding: `n >= 0` levels, `-1` all, `-2` until
    /// values, `-3` until fields.
    pub fn from_deepness(deepness: i32) -> Option<Depth> {
        match deepness {
            -1 => Some(Depth::All),
            -2 => Some(Depth::UntilValue),
            -3 => Some(Depth::UntilField),
            n if n >= 0 => Some(Depth::Levels(n.unsigned_abs())),
            _ => None,
        }
    }

    /// Depth to use for `target`, one level below.
    pub(crate) fn deeper(self, target: DepthTarget) -> Depth {
        match (self, target) {
            (Depth::Levels(n), _) if n > 0 => Depth::Levels(n - 1),
            (Depth::UntilValue, DepthTarget::Value) => Depth::SHALLOW,
            (Depth::UntilField, DepthTarget::Field { holds_value: true }) => Depth::SHALLOW,
            (depth, _) => depth,
        }
    }

    /// Whether a node copied at this depth gets duplicated.
    pub(crate) fn copies(self) -> bool {
        self != Depth::SHALLOW
    }
}

/// New value for an aspect of a copied field.
#[derive(Clone)]
pub enum PatchValue {
    Set(Aspect),
    Remove,
    /// Computed from the copied field; `None` removes the aspect.
    Computed(Arc<dyn Fn(&Field) -> Option<Aspect> + Send + Sync>),
}

impl fmt::Debug for PatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchValue::Set(aspect) => f.debug_tuple("Set").field(aspect).finish(),
            PatchValue::Remove => f.write_str("Remove"),
            PatchValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl PatchValue {
    pub fn computed(f: impl Fn(&Field) -> Option<Aspect> + Send + Sync + 'static) -> Self {
        PatchValue::Computed(Arc::new(f))
    }
}

/// Aspect changes applied to fields while they are copied.
///
/// Patches registered for [`ALL_FIELDS`] run first, then those registered for
/// the field's name.
#[derive(Debug, Clone, Default)]
pub struct FieldPatches {
    entries: Vec<(String, Vec<(AspectKey, PatchValue)>)>,
}

impl FieldPatches {
    pub fn new() -> Self {
        FieldPatches::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a patch for the field named `field` (or [`ALL_FIELDS`]).
    pub fn with(mut self, field: impl Into<String>, key: AspectKey, value: PatchValue) -> Self {
        let field = field.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, patches)) => patches.push((key, value)),
            None => self.entries.push((field, vec![(key, value)])),
        }
        self
    }

    fn patches_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a (AspectKey, PatchValue)> {
        [ALL_FIELDS, field].into_iter().flat_map(move |name| {
            self.entries
                .iter()
                .filter(move |(entry, _)| entry == name)
                .flat_map(|(_, patches)| patches.iter())
        })
    }

    /// Applies the patches registered for `field` (by its canonical name).
    pub(crate) fn apply(&self, field: &mut Field) {
        let name = field.name().to_string();
        for (key, value) in self.patches_for(&name) {
            let aspect = match value {
                PatchValue::Set(aspect) => Some(aspect.clone()),
                PatchValue::Remove => None,
                PatchValue::Computed(f) => f(field),
            };
            match aspect {
                Some(aspect) => {
                    field.set_aspect(aspect, &key.scope, false);
                }
                None => {
                    field.del_aspect(key.ty, &key.scope);
                }
            }
        }
    }
}

/// Optional parts of a record copy.
#[derive(Clone, Copy, Default)]
pub struct CopyOpts<'a> {
    /// Returns `true` for fields to leave out of the copy.
    pub filter: Option<&'a dyn Fn(&Field) -> bool>,
    pub patches: Option<&'a FieldPatches>,
}

impl<'a> CopyOpts<'a> {
    pub fn filtered(filter: &'a dyn Fn(&Field) -> bool) -> Self {
        CopyOpts {
            filter: Some(filter),
            patches: None,
        }
    }

    pub fn patched(patches: &'a FieldPatches) -> Self {
        CopyOpts {
            filter: None,
            patches: Some(patches),
        }
    }

    pub(crate) fn skips(&self, field: &Field) -> bool {
        self.filter.is_some_and(|filter| filter(field))
    }
}
