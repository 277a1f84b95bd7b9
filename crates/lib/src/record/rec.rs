//! The composite record: an ordered map of fields.

use std::{collections::HashMap, fmt, sync::Arc};

use tracing::{debug, trace};

use super::{
    Action, AddressingContext, Child, Direction, Field, IdxPath, IdxSeg, Node, NodeRef, RecordId,
    Records, Scope, SystemId,
    addressing::Anchor,
    copy::{CopyOpts, Depth},
    errors::RecordError,
    node::WriteOpts,
    value::Atom,
};

/// One entity: an insertion-ordered map from canonical field name to
/// [`Field`].
///
/// The record carries default `system` and `direction` (its [`scope`]) used
/// by the convenience accessors, and an [`Action`] tag consulted by
/// calculators and validators.
///
/// Fields are kept behind [`Arc`]; a copy shares fields with its source until
/// either side writes to them.
///
/// ```rust
/// use sysdata::record::{Atom, Record, Scope};
///
/// let mut rec = Record::new();
/// rec.set_val("A", 1).set_val("B/0/X", "a").set_val("B/0/Y", "b");
/// assert_eq!(rec.val("B/0/X"), Some(Atom::from("a")));
/// assert_eq!(rec.leaf_indexes(&Scope::canonical(), true).count(), 3);
/// ```
///
/// [`scope`]: Record::scope
#[derive(Debug)]
pub struct Record {
    id: RecordId,
    fields: Vec<Arc<Field>>,
    names: HashMap<String, usize>,
    system: Option<SystemId>,
    direction: Option<Direction>,
    action: Option<Action>,
    /// Backend field names in declaration order, mapped to canonical paths.
    pub(super) sys_name_field_map: Vec<(String, IdxPath)>,
    pub(super) collected_system_fields: Vec<IdxPath>,
}

impl Default for Record {
    fn default() -> Self {
        Record {
            id: RecordId::next(),
            fields: Vec::new(),
            names: HashMap::new(),
            system: None,
            direction: None,
            action: None,
            sys_name_field_map: Vec::new(),
            collected_system_fields: Vec::new(),
        }
    }
}

/// A clone is a new record: it gets an id of its own and shares its fields
/// with the source until either side writes to them.
impl Clone for Record {
    fn clone(&self) -> Self {
        Record {
            id: RecordId::next(),
            fields: self.fields.clone(),
            names: self.names.clone(),
            system: self.system.clone(),
            direction: self.direction,
            action: self.action,
            sys_name_field_map: self.sys_name_field_map.clone(),
            collected_system_fields: self.collected_system_fields.clone(),
        }
    }
}

/// Records compare by their fields; identity and environment are ignored.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let canonical = Scope::canonical();
        f.write_str("Record(")?;
        for (i, path) in self.leaf_indexes(&canonical, true).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match self.val_in(&path, &canonical, true) {
                Some(val) => write!(f, "{path}={val}")?,
                None => write!(f, "{path}=")?,
            }
        }
        f.write_str(")")
    }
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Empty record with a default system and direction.
    pub fn with_env(system: Option<SystemId>, direction: Option<Direction>) -> Self {
        Record {
            system,
            direction,
            ..Record::default()
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn system(&self) -> Option<&SystemId> {
        self.system.as_ref()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn action(&self) -> Option<Action> {
        self.action
    }

    /// Scope of the record defaults.
    pub fn scope(&self) -> Scope {
        Scope::from_parts(self.system.clone(), self.direction)
    }

    pub fn set_system(&mut self, system: Option<SystemId>) -> &mut Self {
        self.system = system;
        self
    }

    pub fn set_direction(&mut self, direction: Option<Direction>) -> &mut Self {
        self.direction = direction;
        self
    }

    pub fn set_action(&mut self, action: Option<Action>) -> &mut Self {
        self.action = action;
        self
    }

    /// Sets the environment and records this record as root of every field
    /// in the new scope.
    ///
    /// `None` arguments keep the current setting.
    pub fn set_env(
        &mut self,
        system: Option<SystemId>,
        direction: Option<Direction>,
        action: Option<Action>,
    ) -> &mut Self {
        if system.is_some() {
            self.system = system;
        }
        if direction.is_some() {
            self.direction = direction;
        }
        if action.is_some() {
            self.action = action;
        }
        let scope = self.scope();
        let anchor = Anchor::root(self.id);
        self.attach(&scope, &anchor);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical names of the top-level fields, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name())
    }

    /// Top-level fields, in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().map(Arc::as_ref)
    }

    /// Top-level `(name, field)` pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields().map(|field| (field.name(), field))
    }

    /// Whether `path` resolves to a field.
    pub fn contains(&self, path: impl Into<IdxPath>) -> bool {
        self.field(path).is_some()
    }

    /// Position of the field answering to `name`.
    ///
    /// Canonical names are looked up first. A match on a backend name also
    /// returns the scope that name belongs to, which then takes precedence
    /// for the value access.
    fn resolve_name(&self, name: &str) -> Option<(usize, Option<Scope>)> {
        if let Some(&idx) = self.names.get(name) {
            return Some((idx, None));
        }
        self.fields
            .iter()
            .enumerate()
            .find_map(|(idx, field)| field.has_name(name).map(|scope| (idx, Some(scope))))
    }

    fn push_field(&mut self, field: Arc<Field>) -> usize {
        let name = field.name().to_string();
        assert!(!self.names.contains_key(&name), "field {name} exists already");
        self.names.insert(name, self.fields.len());
        self.fields.push(field);
        self.fields.len() - 1
    }

    /// Adds a new field and anchors it below `anchor`.
    fn add_field_at(&mut self, mut field: Field, anchor: &Anchor) -> usize {
        let field_anchor = anchor.child(field.name());
        field.attach(&Scope::canonical(), &field_anchor);
        self.push_field(Arc::new(field))
    }

    fn reindex(&mut self) {
        self.names = self
            .fields
            .iter()
            .enumerate()
            .map(|(idx, field)| (field.name().to_string(), idx))
            .collect();
    }

    /// Where this record sits, as far as its fields know.
    pub(crate) fn anchor_hint(&self) -> Option<Anchor> {
        let field = self.fields.first()?;
        let canonical = Scope::canonical();
        Some(Anchor {
            root: field.root_rec(&canonical),
            path: field.root_idx(&canonical)?.parent(),
        })
    }

    fn own_anchor(&self) -> Anchor {
        self.anchor_hint().unwrap_or_else(|| Anchor::root(self.id))
    }

    /// Resolves `path` to a field.
    ///
    /// With `moan` an unresolvable path panics instead of returning `None`.
    pub fn node_child(
        &self,
        path: &[IdxSeg],
        ctx: &mut AddressingContext,
        moan: bool,
    ) -> Option<&Field> {
        let Some((first, rest)) = path.split_first() else {
            assert!(!moan, "an empty path addresses no field");
            return None;
        };
        ctx.pass();
        let Some((idx, _)) = first.as_name().and_then(|name| self.resolve_name(name)) else {
            assert!(!moan, "no field {first} in {self}");
            return None;
        };
        let field = &self.fields[idx];
        if rest.is_empty() {
            Some(field)
        } else {
            field.node_child(rest, ctx, moan)
        }
    }

    pub(crate) fn node_child_mut(
        &mut self,
        path: &[IdxSeg],
        ctx: &mut AddressingContext,
        moan: bool,
    ) -> Option<&mut Field> {
        let Some((first, rest)) = path.split_first() else {
            assert!(!moan, "an empty path addresses no field");
            return None;
        };
        ctx.pass();
        let Some((idx, _)) = first.as_name().and_then(|name| self.resolve_name(name)) else {
            assert!(!moan, "no field {first} in record");
            return None;
        };
        let field = Arc::make_mut(&mut self.fields[idx]);
        if rest.is_empty() {
            Some(field)
        } else {
            field.node_child_mut(rest, ctx, moan)
        }
    }

    /// Field at `path`, using literal indexes.
    pub fn field(&self, path: impl Into<IdxPath>) -> Option<&Field> {
        let path = path.into();
        self.node_child(&path, &mut AddressingContext::new(), false)
    }

    /// Mutable field at `path`; the field is unshared from any copy first.
    pub fn field_mut(&mut self, path: impl Into<IdxPath>) -> Option<&mut Field> {
        let path = path.into();
        self.node_child_mut(&path, &mut AddressingContext::new(), false)
    }

    /// Container held by the field at `path`.
    fn node_mut(&mut self, path: &[IdxSeg]) -> Option<&mut Node> {
        self.node_child_mut(path, &mut AddressingContext::new(), false)?
            .canonical_container_mut()
    }

    /// Record sequence held by the field at `path`.
    pub(crate) fn records_mut(&mut self, path: &[IdxSeg]) -> Option<&mut Records> {
        self.node_mut(path)?.as_records_mut()
    }

    /// Record at `path`: this record for an empty path, a nested record, or
    /// an element of a record sequence.
    pub(crate) fn record_mut(&mut self, path: &[IdxSeg]) -> Option<&mut Record> {
        match path.split_last() {
            None => Some(self),
            Some((IdxSeg::Index(idx), parent)) => self.records_mut(parent)?.get_mut(*idx),
            Some((IdxSeg::Name(_), _)) => match self.node_mut(path)? {
                Node::Record(rec) => Some(rec),
                _ => None,
            },
        }
    }

    /// Value at `path` for `scope`.
    pub fn value(
        &self,
        path: impl Into<IdxPath>,
        scope: &Scope,
        flex: bool,
    ) -> Option<NodeRef<'_>> {
        let path = path.into();
        self.value_at(&path, scope, flex, &mut AddressingContext::new(), Some(self))
    }

    pub(crate) fn value_at<'a>(
        &'a self,
        path: &[IdxSeg],
        scope: &Scope,
        flex: bool,
        ctx: &mut AddressingContext,
        root: Option<&Record>,
    ) -> Option<NodeRef<'a>> {
        let Some((first, rest)) = path.split_first() else {
            return Some(NodeRef::Record(self));
        };
        ctx.pass();
        let (idx, selected) = self.resolve_name(first.as_name()?)?;
        let scope = selected.as_ref().unwrap_or(scope);
        self.fields[idx].value_at(rest, scope, flex, ctx, root)
    }

    /// Scalar value at `path` in the record's own scope, falling back to the
    /// canonical value.
    pub fn val(&self, path: impl Into<IdxPath>) -> Option<Atom> {
        self.val_in(path, &self.scope(), true)
    }

    /// Scalar value at `path` for `scope`.
    pub fn val_in(&self, path: impl Into<IdxPath>, scope: &Scope, flex: bool) -> Option<Atom> {
        self.val_with(path, scope, flex, &mut AddressingContext::new())
    }

    /// Scalar value at `path`, resolving indexes through `ctx`.
    pub fn val_with(
        &self,
        path: impl Into<IdxPath>,
        scope: &Scope,
        flex: bool,
        ctx: &mut AddressingContext,
    ) -> Option<Atom> {
        let path = path.into();
        self.val_at(&path, scope, flex, ctx, Some(self))
    }

    pub(crate) fn val_at(
        &self,
        path: &[IdxSeg],
        scope: &Scope,
        flex: bool,
        ctx: &mut AddressingContext,
        root: Option<&Record>,
    ) -> Option<Atom> {
        let (first, rest) = path.split_first()?;
        ctx.pass();
        let (idx, selected) = self.resolve_name(first.as_name()?)?;
        let scope = selected.as_ref().unwrap_or(scope);
        self.fields[idx].val_at(rest, scope, flex, ctx, root)
    }

    /// Strict scalar lookup in the canonical scope.
    pub fn get(&self, path: impl Into<IdxPath>) -> crate::Result<Atom> {
        let path = path.into();
        self.val_in(&path, &Scope::canonical(), true)
            .ok_or_else(|| {
                RecordError::FieldNotFound {
                    path: path.to_string(),
                }
                .into()
            })
    }

    /// Sets the scalar value at `path` in the record's own scope, creating
    /// missing fields and containers.
    pub fn set_val(&mut self, path: impl Into<IdxPath>, val: impl Into<Atom>) -> &mut Self {
        let scope = self.scope();
        self.set_val_in(path, val, &scope, WriteOpts::default())
    }

    /// Sets the scalar value at `path` for `scope`.
    ///
    /// # Panics
    ///
    /// Without `opts.extend` when the path does not exist yet.
    pub fn set_val_in(
        &mut self,
        path: impl Into<IdxPath>,
        val: impl Into<Atom>,
        scope: &Scope,
        opts: WriteOpts,
    ) -> &mut Self {
        self.set_val_with(path, val, scope, opts, &mut AddressingContext::new())
    }

    /// Sets the scalar value at `path`, resolving indexes through `ctx`.
    pub fn set_val_with(
        &mut self,
        path: impl Into<IdxPath>,
        val: impl Into<Atom>,
        scope: &Scope,
        opts: WriteOpts,
        ctx: &mut AddressingContext,
    ) -> &mut Self {
        let path = path.into();
        let anchor = self.own_anchor();
        self.set_val_at(val.into(), &path, scope, opts, ctx, &anchor);
        self
    }

    /// Field position for a write to `name`, creating the field if allowed.
    fn field_for_write(
        &mut self,
        name: &str,
        extend: bool,
        anchor: &Anchor,
    ) -> (usize, Option<Scope>, bool) {
        match self.resolve_name(name) {
            Some((idx, selected)) => (idx, selected, false),
            None => {
                assert!(extend, "no field {name} - pass extend=true to add it");
                (self.add_field_at(Field::new(name), anchor), None, true)
            }
        }
    }

    /// Checks that a scalar write to `path` fits the shape of this record.
    ///
    /// A path starts with a field name, never holds two indexes in a row and
    /// agrees with the containers it passes through: records continue with a
    /// name, record sequences with an index and a field, value sequences end
    /// in a single index.
    pub(crate) fn check_write_path(&self, path: &IdxPath) -> Result<(), RecordError> {
        let invalid = |reason: &str| RecordError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if path
            .windows(2)
            .any(|pair| pair[0].as_index().is_some() && pair[1].as_index().is_some())
        {
            return Err(invalid("two indexes in a row"));
        }
        self.check_record_path(&path[..], path)
    }

    fn check_record_path(&self, path: &[IdxSeg], full: &IdxPath) -> Result<(), RecordError> {
        let Some((IdxSeg::Name(name), rest)) = path.split_first() else {
            return Err(RecordError::InvalidPath {
                path: full.to_string(),
                reason: "expected a field name".to_string(),
            });
        };
        let Some((idx, _)) = self.resolve_name(name) else {
            return Ok(());
        };
        match self.fields[idx].stored_value(&Scope::canonical(), false) {
            Some(node) if !rest.is_empty() => check_node_path(node, rest, full),
            _ => Ok(()),
        }
    }

    fn split_record_path(path: &[IdxSeg]) -> (&str, &[IdxSeg]) {
        match path.split_first() {
            Some((IdxSeg::Name(name), rest)) => (name, rest),
            _ => panic!("record paths start with a field name, got {path:?}"),
        }
    }

    pub(crate) fn set_val_at(
        &mut self,
        val: Atom,
        path: &[IdxSeg],
        scope: &Scope,
        mut opts: WriteOpts,
        ctx: &mut AddressingContext,
        anchor: &Anchor,
    ) {
        let (name, rest) = Self::split_record_path(path);
        ctx.pass();
        let (idx, selected, created) = self.field_for_write(name, opts.extend, anchor);
        if created {
            opts.protect = false;
        }
        let scope = selected.unwrap_or_else(|| scope.clone());
        let field = Arc::make_mut(&mut self.fields[idx]);
        let field_anchor = anchor.child(field.name());
        field.set_val_at(val, rest, &scope, opts, ctx, &field_anchor);
    }

    /// Stores `node` at `path`.
    pub fn set_value(
        &mut self,
        path: impl Into<IdxPath>,
        node: Node,
        scope: &Scope,
        protect: bool,
    ) -> &mut Self {
        let path = path.into();
        let anchor = self.own_anchor();
        self.set_value_at(node, &path, scope, protect, &mut AddressingContext::new(), &anchor);
        self
    }

    pub(crate) fn set_value_at(
        &mut self,
        node: Node,
        path: &[IdxSeg],
        scope: &Scope,
        protect: bool,
        ctx: &mut AddressingContext,
        anchor: &Anchor,
    ) {
        let (name, rest) = Self::split_record_path(path);
        ctx.pass();
        let (idx, selected, created) = self.field_for_write(name, true, anchor);
        let scope = selected.unwrap_or_else(|| scope.clone());
        let field = Arc::make_mut(&mut self.fields[idx]);
        let field_anchor = anchor.child(field.name());
        field.set_value_at(node, rest, &scope, protect && !created, ctx, &field_anchor);
    }

    /// Places a field, a node or a scalar at `path`.
    ///
    /// A field placed at a top-level position takes the name of that
    /// position. With `protect` an existing field is not replaced.
    pub fn set_node_child(
        &mut self,
        path: impl Into<IdxPath>,
        child: impl Into<Child>,
        protect: bool,
    ) -> &mut Self {
        let path = path.into();
        let anchor = self.own_anchor();
        let scope = Scope::canonical();
        self.set_node_child_at(
            child.into(),
            &path,
            &scope,
            protect,
            &mut AddressingContext::new(),
            &anchor,
        );
        self
    }

    pub(crate) fn set_node_child_at(
        &mut self,
        child: Child,
        path: &[IdxSeg],
        scope: &Scope,
        protect: bool,
        ctx: &mut AddressingContext,
        anchor: &Anchor,
    ) {
        let mut field = match child {
            Child::Val(val) => {
                let opts = WriteOpts {
                    protect,
                    ..WriteOpts::default()
                };
                return self.set_val_at(val, path, scope, opts, ctx, anchor);
            }
            Child::Node(node) => return self.set_value_at(node, path, scope, protect, ctx, anchor),
            Child::Field(field) => field,
        };

        let (name, rest) = Self::split_record_path(path);
        ctx.pass();
        if rest.is_empty() {
            if field.name() != name {
                field.set_name(name, &Scope::canonical(), false);
            }
            field.attach(scope, &anchor.child(name));
            match self.names.get(name) {
                Some(&idx) => {
                    assert!(!protect, "field {name} exists - pass protect=false to replace it");
                    self.fields[idx] = Arc::new(field);
                }
                None => {
                    self.push_field(Arc::new(field));
                }
            }
            return;
        }

        let (idx, _, created) = self.field_for_write(name, true, anchor);
        let protect = protect && !created;
        let holder = Arc::make_mut(&mut self.fields[idx]);
        let container = holder.ensure_container(|| Node::container_for(&rest[0], true));
        container.set_node_child_at(Child::Field(field), rest, scope, protect, ctx, &anchor.child(name));
    }

    /// Declares canonical fields.
    ///
    /// Names encoding nested segments (`Rooms0Name`, `B/0/X`) are expanded.
    ///
    /// # Panics
    ///
    /// If a field exists already.
    pub fn add_fields<P, C>(&mut self, items: impl IntoIterator<Item = (P, C)>) -> &mut Self
    where
        P: Into<IdxPath>,
        C: Into<Child>,
    {
        for (path, child) in items {
            self.set_node_child(path, child, true);
        }
        self
    }

    /// Removes the field at `path` and returns it.
    pub fn pop(&mut self, path: impl Into<IdxPath>) -> Option<Field> {
        let path = path.into();
        let (last, parent) = path.split_last()?;
        let rec = self.record_mut(parent)?;
        let (idx, _) = rec.resolve_name(last.as_name()?)?;
        let field = rec.fields.remove(idx);
        rec.reindex();
        Some(Arc::unwrap_or_clone(field))
    }

    /// Replaces or adds the top-level fields of `other`.
    pub fn update(&mut self, other: &Record) -> &mut Self {
        let anchor = self.own_anchor();
        for field in &other.fields {
            let mut field = Arc::clone(field);
            let name = field.name().to_string();
            Arc::make_mut(&mut field).attach(&Scope::canonical(), &anchor.child(name.as_str()));
            match self.names.get(&name) {
                Some(&idx) => self.fields[idx] = field,
                None => {
                    self.push_field(field);
                }
            }
        }
        self
    }

    /// Leaf fields for `scope`, depth first.
    pub fn leafs<'a>(
        &'a self,
        scope: &'a Scope,
        flex: bool,
    ) -> Box<dyn Iterator<Item = &'a Field> + 'a> {
        Box::new(self.fields.iter().flat_map(move |field| field.leafs(scope, flex)))
    }

    /// Index paths of the leaf fields for `scope`, depth first.
    pub fn leaf_indexes<'a>(
        &'a self,
        scope: &'a Scope,
        flex: bool,
    ) -> Box<dyn Iterator<Item = IdxPath> + 'a> {
        self.leaf_indexes_from(IdxPath::new(), scope, flex)
    }

    pub(crate) fn leaf_indexes_from<'a>(
        &'a self,
        prefix: IdxPath,
        scope: &'a Scope,
        flex: bool,
    ) -> Box<dyn Iterator<Item = IdxPath> + 'a> {
        Box::new(
            self.fields
                .iter()
                .flat_map(move |field| field.leaf_indexes_from(prefix.join(field.name()), scope, flex)),
        )
    }

    /// Clears the leaves of every field, see [`Field::clear_leafs`].
    pub fn clear_leafs(&mut self, scope: Option<&Scope>, flex: bool, reset_lists: bool) -> &mut Self {
        for field in &mut self.fields {
            Arc::make_mut(field).clear_leafs(scope, flex, reset_lists);
        }
        self
    }

    /// Clears canonical values and shrinks every sequence to one element.
    pub fn reset_leafs(&mut self) -> &mut Self {
        self.clear_leafs(Some(&Scope::canonical()), true, true)
    }

    /// Copy of this record.
    ///
    /// With [`Depth::SHALLOW`] the copy shares every field with this record;
    /// deeper copies duplicate as many levels as `depth` asks for.
    pub fn copy(&self, depth: Depth) -> Record {
        self.copy_with(depth, &CopyOpts::default())
    }

    /// Copy of this record, leaving out filtered fields and patching the
    /// aspects of the others.
    pub fn copy_with(&self, depth: Depth, opts: &CopyOpts<'_>) -> Record {
        let mut rec = Record::with_env(self.system.clone(), self.direction);
        rec.action = self.action;
        let anchor = Anchor::root(rec.id);
        self.copy_fields_into(&mut rec, true, depth, &anchor, opts);
        rec
    }

    /// Copies the fields of this record onto `onto`, replacing fields of the
    /// same name and adding the others.
    pub fn copy_onto(&self, onto: &mut Record, depth: Depth, opts: &CopyOpts<'_>) {
        let anchor = onto.own_anchor();
        self.copy_fields_into(onto, false, depth, &anchor, opts);
    }

    pub(crate) fn copy_at(&self, depth: Depth, anchor: &Anchor, opts: &CopyOpts<'_>) -> Record {
        let mut rec = Record::with_env(self.system.clone(), self.direction);
        rec.action = self.action;
        self.copy_fields_into(&mut rec, true, depth, anchor, opts);
        rec
    }

    fn copy_fields_into(
        &self,
        onto: &mut Record,
        is_new: bool,
        depth: Depth,
        anchor: &Anchor,
        opts: &CopyOpts<'_>,
    ) {
        for field in &self.fields {
            if opts.skips(field) {
                continue;
            }
            let name = field.name();
            let deeper = depth.deeper(field.depth_target());
            let mut copied = if deeper.copies() {
                Arc::new(field.copy_at(deeper, &anchor.child(name), opts))
            } else {
                match onto.names.get(name) {
                    Some(&idx) if !is_new => Arc::clone(&onto.fields[idx]),
                    _ => Arc::clone(field),
                }
            };
            if let Some(patches) = opts.patches
                && !patches.is_empty()
            {
                let patched = Arc::make_mut(&mut copied);
                patches.apply(patched);
                let patched_anchor = anchor.child(patched.name());
                patched.attach(&Scope::canonical(), &patched_anchor);
            }
            let name = copied.name().to_string();
            match onto.names.get(&name) {
                Some(&idx) => onto.fields[idx] = copied,
                None => {
                    onto.push_field(copied);
                }
            }
        }
        trace!(fields = onto.len(), ?depth, "copied record");
    }

    /// Re-anchors every field at `anchor` for `scope`.
    pub(crate) fn attach(&mut self, scope: &Scope, anchor: &Anchor) {
        for field in &mut self.fields {
            let field = Arc::make_mut(field);
            let field_anchor = anchor.child(field.name());
            field.attach(scope, &field_anchor);
        }
    }

    /// Whether the top-level field `name` is the same allocation in both
    /// records.
    pub fn shares_field_with(&self, other: &Record, name: &str) -> bool {
        match (self.names.get(name), other.names.get(name)) {
            (Some(&a), Some(&b)) => Arc::ptr_eq(&self.fields[a], &other.fields[b]),
            _ => false,
        }
    }

    /// Pulls every leaf with a `From` aspect for `system` into the canonical
    /// values.
    ///
    /// Each backend value is validated and converted; rejected values leave
    /// the canonical value alone. Sequence cursors follow the element being
    /// pulled, so calculators see the current element.
    pub fn pull(&mut self, system: &SystemId) -> &mut Self {
        let scope = Scope::new(system.clone(), Direction::From);
        let canonical = Scope::canonical();
        let paths: Vec<IdxPath> = self.leaf_indexes(&scope, false).collect();
        debug!(%system, leafs = paths.len(), "pulling record");
        for path in paths {
            if path.len() >= 3
                && let Some(idx) = path[1].as_index()
                && let Some(recs) = self.records_mut(&path[..1])
            {
                recs.set_current_index(idx);
            }
            let pulled = self
                .field(&path)
                .map(|field| field.pulled_val(system, Some(self)));
            match pulled {
                Some(Some(val)) => {
                    if let Some(field) = self.field_mut(&path) {
                        field.put_val(val, &canonical, true);
                    }
                }
                Some(None) => debug!(%path, %system, "nothing pulled"),
                None => {}
            }
        }
        self
    }

    /// Pushes the canonical values of every leaf with an `Onto` aspect for
    /// `system` into that aspect.
    pub fn push(&mut self, system: &SystemId) -> &mut Self {
        let scope = Scope::new(system.clone(), Direction::Onto);
        let paths: Vec<IdxPath> = self.leaf_indexes(&scope, false).collect();
        debug!(%system, leafs = paths.len(), "pushing record");
        for path in paths {
            let pushed = self
                .field(&path)
                .map(|field| field.pushed_val(system, Some(self)));
            match pushed {
                Some(Some(val)) => {
                    if let Some(field) = self.field_mut(&path) {
                        field.put_val(val, &scope, true);
                    }
                }
                Some(None) => debug!(%path, %system, "nothing pushed"),
                None => {}
            }
        }
        self
    }

    /// Values of `match_fields`, for pairing records.
    pub fn match_key(&self, match_fields: &[&str]) -> Vec<Atom> {
        match_fields
            .iter()
            .map(|name| self.val_in(*name, &Scope::canonical(), true).unwrap_or_default())
            .collect()
    }
}

fn check_node_path(node: &Node, path: &[IdxSeg], full: &IdxPath) -> Result<(), RecordError> {
    let mismatch = |expected: &str| RecordError::TypeMismatch {
        path: full.to_string(),
        expected: expected.to_string(),
        actual: node.kind().to_string(),
    };
    match node {
        Node::Value(_) => Ok(()),
        Node::Values(_) => match path {
            [IdxSeg::Index(_)] => Ok(()),
            _ => Err(mismatch("a single index")),
        },
        Node::Record(rec) => rec.check_record_path(path, full),
        Node::Records(recs) => match path {
            [IdxSeg::Index(idx), rest @ ..] if !rest.is_empty() => match recs.get(*idx) {
                Some(rec) => rec.check_record_path(rest, full),
                None => Ok(()),
            },
            _ => Err(mismatch("an index followed by a field")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Calculator, Values, value::Value};

    fn zx(direction: Direction) -> Scope {
        Scope::new(SystemId::new("Zx").unwrap(), direction)
    }

    #[test]
    fn test_set_val_creates_shape() {
        let mut rec = Record::new();
        rec.set_val("A", 1).set_val("B/0/X", "a").set_val("B/1/X", "b");
        assert_eq!(rec.names().collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(matches!(rec.value("B", &Scope::canonical(), true), Some(NodeRef::Records(recs)) if recs.len() == 2));
        assert_eq!(rec.val("B/1/X"), Some(Atom::from("b")));
        assert_eq!(rec.val("B1X"), None);
        let (name, field) = rec.iter().next().unwrap();
        assert_eq!((name, field.val(&Scope::canonical(), true, None)), ("A", Some(Atom::Int(1))));
    }

    #[test]
    fn test_index_only_path_creates_values() {
        let mut rec = Record::new();
        rec.set_val("Tags/1", "t");
        let tags = rec.value("Tags", &Scope::canonical(), true);
        assert!(matches!(tags, Some(NodeRef::Values(values)) if values.len() == 2));
    }

    #[test]
    #[should_panic(expected = "pass extend=true")]
    fn test_set_val_without_extend() {
        let mut rec = Record::new();
        rec.set_val_in("A", 1, &Scope::canonical(), WriteOpts::existing());
    }

    #[test]
    fn test_root_handles() {
        let mut rec = Record::new();
        rec.set_val("B/0/X", "a");
        let field = rec.field("B/0/X").unwrap();
        assert_eq!(field.root_rec(&Scope::canonical()), Some(rec.id()));
        assert_eq!(field.root_idx(&Scope::canonical()), Some(&IdxPath::from("B/0/X")));
    }

    #[test]
    fn test_system_name_lookup_selects_scope() {
        let mut rec = Record::new();
        rec.set_val("A", "canonical");
        rec.field_mut("A").unwrap().set_name("zA", &zx(Direction::From), false);
        rec.set_val("zA", "backend");
        assert_eq!(rec.val_in("zA", &Scope::canonical(), false), Some(Atom::from("backend")));
        assert_eq!(rec.val("A"), Some(Atom::from("canonical")));
    }

    #[test]
    fn test_clone_gets_own_id() {
        let mut rec = Record::new();
        rec.set_val("A", 1);
        let clone = rec.clone();
        assert_ne!(clone.id(), rec.id());
        assert_eq!(clone, rec);
        assert!(clone.shares_field_with(&rec, "A"));
    }

    #[test]
    fn test_calculated_leaf() {
        let mut rec = Record::new();
        rec.set_val("Qty", 2);
        rec.set_node_child("Double", Field::new("Double"), true);
        rec.field_mut("Double").unwrap().set_calculator(
            Calculator::new(|ctx| {
                let qty = ctx.rfv("Qty").and_then(|qty| qty.as_int()).unwrap_or_default();
                Atom::Int(qty * 2)
            }),
            &Scope::canonical(),
            false,
        );
        assert_eq!(rec.val("Double"), Some(Atom::Int(4)));
        assert_eq!(rec.leaf_indexes(&Scope::canonical(), true).count(), 2);
    }

    #[test]
    fn test_add_fields_with_nested_names() {
        let mut rec = Record::new();
        rec.add_fields([("Name", Child::from("x")), ("Rooms0Size", Child::from(12))]);
        assert_eq!(rec.val("Rooms/0/Size"), Some(Atom::Int(12)));
    }

    #[test]
    #[should_panic(expected = "exists")]
    fn test_add_fields_protects() {
        let mut rec = Record::new();
        rec.add_fields([("Name", "x")]);
        rec.add_fields([("Name", "y")]);
    }

    #[test]
    fn test_pop_and_get() {
        let mut rec = Record::new();
        rec.set_val("A", 1).set_val("B", 2);
        let popped = rec.pop("A").unwrap();
        assert_eq!(popped.name(), "A");
        assert!(rec.get("A").is_err_and(|err| err.is_not_found()));
        assert_eq!(rec.get("B").unwrap(), Atom::Int(2));
        assert_eq!(rec.names().collect::<Vec<_>>(), vec!["B"]);
    }

    #[test]
    fn test_shallow_copy_shares_fields() {
        let mut rec = Record::new();
        rec.set_val("A", 1).set_val("B/0/X", "a");
        let mut copy = rec.copy(Depth::SHALLOW);
        assert_eq!(copy, rec);
        assert!(copy.shares_field_with(&rec, "B"));

        copy.set_val("B/0/X", "changed");
        assert!(!copy.shares_field_with(&rec, "B"));
        assert_eq!(rec.val("B/0/X"), Some(Atom::from("a")));
    }

    #[test]
    fn test_copy_onto_replaces_and_adds() {
        let mut live = Record::new();
        live.set_val("A", 1).set_val("B", 2);
        let mut patch = Record::new();
        patch.set_val("B", 3).set_val("C", 4);
        patch.copy_onto(&mut live, Depth::All, &CopyOpts::default());
        assert_eq!(live.names().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(live.val("B"), Some(Atom::Int(3)));
        assert_eq!(live.field("C").unwrap().root_rec(&Scope::canonical()), Some(live.id()));
    }

    #[test]
    fn test_set_value_places_nodes() {
        let mut rec = Record::new();
        let values: Values = ["a", "b"].into_iter().map(Value::from).collect();
        rec.set_value("Tags", Node::Values(values), &Scope::canonical(), true);
        assert_eq!(rec.val("Tags/1"), Some(Atom::from("b")));
    }

    #[test]
    fn test_display() {
        let mut rec = Record::new();
        rec.set_val("A", 1).set_val("B/0/X", "a");
        assert_eq!(rec.to_string(), "Record(A=1, B/0/X=a)");
    }
}
