//! Fields and their per-scope aspects.
//!
//! A [`Field`] keeps one [`AspectSlots`] per [`Scope`]. Reads resolve a scope
//! through [`Scope::candidates`], so with `flex` a backend-specific aspect
//! falls back to the direction-less backend aspect and then to the canonical
//! one. Within a scope a stored value is preferred over a calculator, and the
//! two never coexist for the same scope.

use std::{fmt, sync::Arc};

use tracing::trace;

use super::{
    AddressingContext, AspectType, Calculator, Converter, FieldCtx, Filter, IDX_PATH_SEP, IdxPath,
    IdxSeg, Node, NodeRef, Record, RecordId, Records, Scope, SystemId, Validator,
    addressing::Anchor,
    copy::{CopyOpts, Depth, DepthTarget},
    node::WriteOpts,
    sequence::string_to_records,
    value::{Atom, Value},
};

/// One aspect of a field, as passed to [`Field::set_aspect`].
#[derive(Debug, Clone, PartialEq)]
pub enum Aspect {
    Name(String),
    Value(Node),
    ClearValue(Atom),
    RootRec(RecordId),
    RootIdx(IdxPath),
    Calculator(Calculator),
    Validator(Validator),
    Converter(Converter),
    Filter(Filter),
    SqlExpr(String),
}

impl Aspect {
    pub fn ty(&self) -> AspectType {
        match self {
            Aspect::Name(_) => AspectType::Name,
            Aspect::Value(_) => AspectType::Value,
            Aspect::ClearValue(_) => AspectType::ClearValue,
            Aspect::RootRec(_) => AspectType::RootRec,
            Aspect::RootIdx(_) => AspectType::RootIdx,
            Aspect::Calculator(_) => AspectType::Calculator,
            Aspect::Validator(_) => AspectType::Validator,
            Aspect::Converter(_) => AspectType::Converter,
            Aspect::Filter(_) => AspectType::Filter,
            Aspect::SqlExpr(_) => AspectType::SqlExpr,
        }
    }
}

/// Aspects of a field for one scope.
#[derive(Debug, Clone, Default)]
pub(crate) struct AspectSlots {
    name: Option<String>,
    value: Option<Arc<Node>>,
    clear_value: Option<Atom>,
    root_rec: Option<RecordId>,
    root_idx: Option<IdxPath>,
    calculator: Option<Calculator>,
    validator: Option<Validator>,
    converter: Option<Converter>,
    filter: Option<Filter>,
    sql_expr: Option<String>,
}

/// Root handles are positional data and do not take part in comparisons.
impl PartialEq for AspectSlots {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.clear_value == other.clear_value
            && self.calculator == other.calculator
            && self.validator == other.validator
            && self.converter == other.converter
            && self.filter == other.filter
            && self.sql_expr == other.sql_expr
    }
}

impl AspectSlots {
    /// Whether the slots hold anything besides root handles.
    fn is_blank(&self) -> bool {
        self.name.is_none()
            && self.value.is_none()
            && self.clear_value.is_none()
            && self.calculator.is_none()
            && self.validator.is_none()
            && self.converter.is_none()
            && self.filter.is_none()
            && self.sql_expr.is_none()
    }

    fn has(&self, ty: AspectType) -> bool {
        match ty {
            AspectType::Name => self.name.is_some(),
            AspectType::Value => self.value.is_some(),
            AspectType::ClearValue => self.clear_value.is_some(),
            AspectType::RootRec => self.root_rec.is_some(),
            AspectType::RootIdx => self.root_idx.is_some(),
            AspectType::Calculator => self.calculator.is_some(),
            AspectType::Validator => self.validator.is_some(),
            AspectType::Converter => self.converter.is_some(),
            AspectType::Filter => self.filter.is_some(),
            AspectType::SqlExpr => self.sql_expr.is_some(),
        }
    }

    fn get(&self, ty: AspectType) -> Option<Aspect> {
        match ty {
            AspectType::Name => self.name.clone().map(Aspect::Name),
            AspectType::Value => self.value.as_deref().cloned().map(Aspect::Value),
            AspectType::ClearValue => self.clear_value.clone().map(Aspect::ClearValue),
            AspectType::RootRec => self.root_rec.map(Aspect::RootRec),
            AspectType::RootIdx => self.root_idx.clone().map(Aspect::RootIdx),
            AspectType::Calculator => self.calculator.clone().map(Aspect::Calculator),
            AspectType::Validator => self.validator.clone().map(Aspect::Validator),
            AspectType::Converter => self.converter.clone().map(Aspect::Converter),
            AspectType::Filter => self.filter.clone().map(Aspect::Filter),
            AspectType::SqlExpr => self.sql_expr.clone().map(Aspect::SqlExpr),
        }
    }

    fn take(&mut self, ty: AspectType) -> Option<Aspect> {
        match ty {
            AspectType::Name => self.name.take().map(Aspect::Name),
            AspectType::Value => self
                .value
                .take()
                .map(|node| Aspect::Value(Arc::unwrap_or_clone(node))),
            AspectType::ClearValue => self.clear_value.take().map(Aspect::ClearValue),
            AspectType::RootRec => self.root_rec.take().map(Aspect::RootRec),
            AspectType::RootIdx => self.root_idx.take().map(Aspect::RootIdx),
            AspectType::Calculator => self.calculator.take().map(Aspect::Calculator),
            AspectType::Validator => self.validator.take().map(Aspect::Validator),
            AspectType::Converter => self.converter.take().map(Aspect::Converter),
            AspectType::Filter => self.filter.take().map(Aspect::Filter),
            AspectType::SqlExpr => self.sql_expr.take().map(Aspect::SqlExpr),
        }
    }
}

/// What a lookup for a field value found.
enum Found<'a> {
    Stored(&'a Node),
    Calculated(&'a Calculator),
}

/// How a field takes part in leaf enumeration.
pub(crate) enum LeafKind<'a> {
    Scalar,
    Container(&'a Node),
}

/// A named node of a record.
///
/// The canonical name and value always exist; backend-specific names,
/// values, converters and the other aspects are added per scope.
#[derive(Debug, Clone)]
pub struct Field {
    aspects: Vec<(Scope, AspectSlots)>,
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        let relevant = |field: &Field| -> Vec<(Scope, AspectSlots)> {
            let mut slots: Vec<_> = field
                .aspects
                .iter()
                .filter(|(_, slots)| !slots.is_blank())
                .cloned()
                .collect();
            slots.sort_by(|(a, _), (b, _)| a.cmp(b));
            slots
        };
        relevant(self) == relevant(other)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}==", self.name())?;
        match self.stored_value(&Scope::canonical(), false) {
            Some(Node::Value(value)) => write!(f, "{value}"),
            Some(node) => write!(f, "{}", node.kind()),
            None => Ok(()),
        }
    }
}

impl Field {
    /// Field with canonical name `name` and an empty value.
    ///
    /// # Panics
    ///
    /// If `name` would be split into several index path segments.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        assert_canonical_name(&name);
        let slots = AspectSlots {
            root_idx: Some(IdxPath::from(vec![IdxSeg::Name(name.clone())])),
            name: Some(name),
            value: Some(Arc::new(Node::Value(Value::new()))),
            ..AspectSlots::default()
        };
        Field {
            aspects: vec![(Scope::canonical(), slots)],
        }
    }

    /// Field holding `node` as its canonical value.
    pub fn with_value(name: impl Into<String>, node: Node) -> Self {
        let mut field = Field::new(name);
        field.set_value(node, &Scope::canonical(), false);
        field
    }

    fn slots(&self, scope: &Scope) -> Option<&AspectSlots> {
        self.aspects
            .iter()
            .find(|(candidate, _)| candidate == scope)
            .map(|(_, slots)| slots)
    }

    fn slots_mut(&mut self, scope: &Scope) -> &mut AspectSlots {
        let pos = match self.aspects.iter().position(|(candidate, _)| candidate == scope) {
            Some(pos) => pos,
            None => {
                self.aspects.push((scope.clone(), AspectSlots::default()));
                self.aspects.len() - 1
            }
        };
        &mut self.aspects[pos].1
    }

    /// First scope (in lookup order) for which `get` returns something.
    fn lookup<'a, T>(
        &'a self,
        scope: &Scope,
        flex: bool,
        mut get: impl FnMut(&'a AspectSlots) -> Option<T>,
    ) -> Option<(Scope, T)> {
        scope.candidates(flex).into_iter().find_map(|candidate| {
            let found = self.slots(&candidate).and_then(&mut get)?;
            Some((candidate, found))
        })
    }

    fn find_value(&self, scope: &Scope, flex: bool) -> Option<(Scope, Found<'_>)> {
        self.lookup(scope, flex, |slots| {
            slots
                .value
                .as_deref()
                .map(Found::Stored)
                .or_else(|| slots.calculator.as_ref().map(Found::Calculated))
        })
    }

    /// Scopes the field has aspects for.
    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.aspects
            .iter()
            .filter(|(_, slots)| !slots.is_blank())
            .map(|(scope, _)| scope)
    }

    /// Scope holding an aspect of type `ty`, if any.
    pub fn aspect_exists(&self, ty: AspectType, scope: &Scope, flex: bool) -> Option<Scope> {
        self.lookup(scope, flex, |slots| slots.has(ty).then_some(()))
            .map(|(found, ())| found)
    }

    pub fn aspect(&self, ty: AspectType, scope: &Scope, flex: bool) -> Option<Aspect> {
        self.lookup(scope, flex, |slots| slots.get(ty))
            .map(|(_, aspect)| aspect)
    }

    /// Sets any aspect.
    ///
    /// # Panics
    ///
    /// With `protect` if the aspect exists for `scope` already.
    pub fn set_aspect(&mut self, aspect: Aspect, scope: &Scope, protect: bool) -> &mut Self {
        let ty = aspect.ty();
        assert!(
            !protect || !self.slots(scope).is_some_and(|slots| slots.has(ty)),
            "field {}: aspect {ty}{scope} exists already",
            self.name()
        );
        match aspect {
            Aspect::Name(name) => self.set_name(name, scope, false),
            Aspect::Value(node) => self.set_value(node, scope, false),
            Aspect::ClearValue(val) => self.set_clear_val(Some(val), scope),
            Aspect::RootRec(root) => self.set_root_rec(root, scope),
            Aspect::RootIdx(path) => self.set_root_idx(path, scope),
            Aspect::Calculator(calc) => self.set_calculator(calc, scope, false),
            Aspect::Validator(validator) => {
                self.slots_mut(scope).validator = Some(validator);
                self
            }
            Aspect::Converter(converter) => {
                self.slots_mut(scope).converter = Some(converter);
                self
            }
            Aspect::Filter(filter) => self.set_filter(filter, scope, false),
            Aspect::SqlExpr(expr) => self.set_sql_expression(expr, scope, false),
        }
    }

    /// Removes an aspect and returns it.
    ///
    /// # Panics
    ///
    /// For the canonical name, value and root handles, which every field
    /// keeps.
    pub fn del_aspect(&mut self, ty: AspectType, scope: &Scope) -> Option<Aspect> {
        assert!(
            !scope.is_canonical()
                || !matches!(
                    ty,
                    AspectType::Name | AspectType::Value | AspectType::RootRec | AspectType::RootIdx
                ),
            "field {}: canonical {ty} cannot be removed",
            self.name()
        );
        let pos = self.aspects.iter().position(|(candidate, _)| candidate == scope)?;
        self.aspects[pos].1.take(ty)
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        self.slots(&Scope::canonical())
            .and_then(|slots| slots.name.as_deref())
            .unwrap_or_default()
    }

    /// Name used by a backend.
    pub fn system_name(&self, scope: &Scope, flex: bool) -> Option<&str> {
        self.lookup(scope, flex, |slots| slots.name.as_deref())
            .map(|(_, name)| name)
    }

    /// Sets a name; backend names also rename the last segment of the
    /// backend root path.
    pub fn set_name(&mut self, name: impl Into<String>, scope: &Scope, protect: bool) -> &mut Self {
        let name = name.into();
        if scope.is_canonical() {
            assert_canonical_name(&name);
        }
        let slots = self.slots_mut(scope);
        assert!(
            !protect || slots.name.is_none(),
            "field name for {scope} exists already"
        );
        slots.name = Some(name.clone());
        if !scope.is_canonical()
            && let Some(root_idx) = self.root_idx(scope)
            && root_idx.last().and_then(IdxSeg::as_name) != Some(name.as_str())
            && !root_idx.is_empty()
        {
            let renamed = root_idx.with_last(name);
            self.slots_mut(scope).root_idx = Some(renamed);
        }
        self
    }

    /// Removes a backend name.
    pub fn del_name(&mut self, scope: &Scope) -> &mut Self {
        assert!(!scope.is_canonical(), "canonical field name cannot be removed");
        self.del_aspect(AspectType::Name, scope);
        self
    }

    /// Scope of the first name (canonical first) equal to `name`.
    pub fn has_name(&self, name: &str) -> Option<Scope> {
        self.aspects
            .iter()
            .find(|(_, slots)| slots.name.as_deref() == Some(name))
            .map(|(scope, _)| scope.clone())
    }

    pub fn root_rec(&self, scope: &Scope) -> Option<RecordId> {
        self.lookup(scope, true, |slots| slots.root_rec)
            .map(|(_, root)| root)
    }

    pub fn set_root_rec(&mut self, root: RecordId, scope: &Scope) -> &mut Self {
        self.slots_mut(scope).root_rec = Some(root);
        self
    }

    /// Path of this field from its root record.
    pub fn root_idx(&self, scope: &Scope) -> Option<&IdxPath> {
        self.lookup(scope, true, |slots| slots.root_idx.as_ref())
            .map(|(_, path)| path)
    }

    pub fn set_root_idx(&mut self, path: IdxPath, scope: &Scope) -> &mut Self {
        self.slots_mut(scope).root_idx = Some(path);
        self
    }

    pub fn calculator(&self, scope: &Scope) -> Option<&Calculator> {
        self.slots(scope)?.calculator.as_ref()
    }

    /// Sets a calculator; a value stored for the same scope is dropped.
    pub fn set_calculator(&mut self, calc: Calculator, scope: &Scope, protect: bool) -> &mut Self {
        let slots = self.slots_mut(scope);
        assert!(
            !protect || slots.calculator.is_none(),
            "calculator for {scope} exists already"
        );
        slots.calculator = Some(calc);
        slots.value = None;
        self
    }

    pub fn clear_val(&self, scope: &Scope) -> Option<&Atom> {
        self.slots(scope)?.clear_value.as_ref()
    }

    /// Sets (or with `None` removes) the value restored by
    /// [`clear_leafs`](Field::clear_leafs).
    pub fn set_clear_val(&mut self, val: Option<Atom>, scope: &Scope) -> &mut Self {
        self.slots_mut(scope).clear_value = val;
        self
    }

    pub fn converter(&self, scope: &Scope) -> Option<&Converter> {
        self.slots(scope)?.converter.as_ref()
    }

    /// Sets a backend converter and makes sure the backend has its own value.
    ///
    /// # Panics
    ///
    /// For scopes without a system, and without `extend` if a converter
    /// exists already.
    pub fn set_converter(&mut self, converter: Converter, scope: &Scope, extend: bool) -> &mut Self {
        assert!(
            scope.system_id().is_some(),
            "field {}: converters need a system",
            self.name()
        );
        self.ensure_system_value(scope);
        let slots = self.slots_mut(scope);
        assert!(
            extend || slots.converter.is_none(),
            "converter for {scope} exists already"
        );
        slots.converter = Some(converter);
        self
    }

    /// Runs the converter of `scope` (if any) over `val`.
    pub fn convert(&self, val: Atom, scope: &Scope, root: Option<&Record>) -> Atom {
        match self.converter(scope) {
            Some(converter) => converter.call(&FieldCtx::new(self, scope, root), val),
            None => val,
        }
    }

    pub fn validator(&self, scope: &Scope) -> Option<&Validator> {
        self.slots(scope)?.validator.as_ref()
    }

    /// Sets a backend validator and makes sure the backend has its own value.
    pub fn set_validator(&mut self, validator: Validator, scope: &Scope, protect: bool) -> &mut Self {
        assert!(
            scope.system_id().is_some(),
            "field {}: validators need a system",
            self.name()
        );
        self.ensure_system_value(scope);
        let slots = self.slots_mut(scope);
        assert!(
            !protect || slots.validator.is_none(),
            "validator for {scope} exists already"
        );
        slots.validator = Some(validator);
        self
    }

    /// Whether `val` passes the validator of `scope`; fields without one
    /// accept everything.
    pub fn validate(&self, val: &Atom, scope: &Scope, root: Option<&Record>) -> bool {
        match self.validator(scope) {
            Some(validator) => validator.call(&FieldCtx::new(self, scope, root), val),
            None => true,
        }
    }

    pub fn filter(&self, scope: &Scope) -> Option<&Filter> {
        self.slots(scope)?.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Filter, scope: &Scope, protect: bool) -> &mut Self {
        let slots = self.slots_mut(scope);
        assert!(!protect || slots.filter.is_none(), "filter for {scope} exists already");
        slots.filter = Some(filter);
        self
    }

    /// Whether the filter of `scope` excludes this field.
    pub fn is_filtered(&self, scope: &Scope, root: Option<&Record>) -> bool {
        self.filter(scope)
            .is_some_and(|filter| filter.call(&FieldCtx::new(self, scope, root)))
    }

    pub fn sql_expression(&self, scope: &Scope) -> Option<&str> {
        self.slots(scope)?.sql_expr.as_deref()
    }

    pub fn set_sql_expression(
        &mut self,
        expr: impl Into<String>,
        scope: &Scope,
        protect: bool,
    ) -> &mut Self {
        let slots = self.slots_mut(scope);
        assert!(
            !protect || slots.sql_expr.is_none(),
            "sql expression for {scope} exists already"
        );
        slots.sql_expr = Some(expr.into());
        self
    }

    pub(crate) fn ensure_system_value(&mut self, scope: &Scope) {
        let slots = self.slots_mut(scope);
        if slots.value.is_none() && slots.calculator.is_none() {
            slots.value = Some(Arc::new(Node::Value(Value::new())));
            let anchor = self.own_anchor();
            self.set_system_root(scope, &anchor);
        }
    }

    /// Where this field sits, according to its canonical root handles.
    pub(crate) fn own_anchor(&self) -> Anchor {
        let canonical = Scope::canonical();
        Anchor {
            root: self.root_rec(&canonical),
            path: self.root_idx(&canonical).cloned().unwrap_or_default(),
        }
    }

    /// Stored (never calculated) value.
    pub fn stored_value(&self, scope: &Scope, flex: bool) -> Option<&Node> {
        self.lookup(scope, flex, |slots| slots.value.as_deref())
            .map(|(_, node)| node)
    }

    /// Value for `scope`, running a calculator if one is found first.
    pub fn value(&self, scope: &Scope, flex: bool, root: Option<&Record>) -> Option<NodeRef<'_>> {
        match self.find_value(scope, flex)?.1 {
            Found::Stored(node) => Some(NodeRef::from(node)),
            Found::Calculated(calc) => {
                let atom = calc.call(&FieldCtx::new(self, scope, root));
                trace!(field = self.name(), %scope, "calculated value");
                Some(NodeRef::Computed(if atom.is_null() {
                    Value::new()
                } else {
                    Value::from(atom)
                }))
            }
        }
    }

    /// Current scalar value for `scope`; `None` for container fields.
    pub fn val(&self, scope: &Scope, flex: bool, root: Option<&Record>) -> Option<Atom> {
        match self.value(scope, flex, root)? {
            NodeRef::Value(value) => Some(value.val().clone()),
            NodeRef::Computed(value) => Some(value.val().clone()),
            _ => None,
        }
    }

    /// Stores `node` as value.
    ///
    /// Records and record sequences are always stored as canonical value.
    /// A calculator of the same scope is dropped.
    pub fn set_value(&mut self, node: Node, scope: &Scope, protect: bool) -> &mut Self {
        let anchor = self.own_anchor();
        self.store_value(node, scope, protect, &anchor);
        self
    }

    /// Sets the current scalar value, creating a scalar container for
    /// `scope` when the lookup finds none.
    pub fn set_val(&mut self, val: impl Into<Atom>, scope: &Scope) -> &mut Self {
        let anchor = self.own_anchor();
        self.set_val_at(
            val.into(),
            &[],
            scope,
            WriteOpts::default(),
            &mut AddressingContext::new(),
            &anchor,
        );
        self
    }

    fn store_value(&mut self, node: Node, scope: &Scope, protect: bool, anchor: &Anchor) {
        let target = if node.is_container() {
            Scope::canonical()
        } else {
            scope.clone()
        };
        let slots = self.slots_mut(&target);
        assert!(
            !protect || slots.value.is_none(),
            "value for {target} exists already; pass protect=false to overwrite it"
        );
        slots.value = Some(Arc::new(node));
        slots.calculator = None;
        self.attach(scope, anchor);
    }

    /// Writes `val` into the scalar container found for `scope`, or into a
    /// new one at `scope`.
    pub(crate) fn put_val(&mut self, val: Atom, scope: &Scope, flex: bool) {
        let found = self.lookup(scope, flex, |slots| {
            slots
                .value
                .as_ref()
                .map(|node| matches!(**node, Node::Value(_)))
        });
        match found {
            Some((found_scope, true)) => {
                let slots = self.slots_mut(&found_scope);
                if let Some(Node::Value(value)) = slots.value.as_mut().map(Arc::make_mut) {
                    value.set(val, None);
                }
            }
            _ => {
                let slots = self.slots_mut(scope);
                slots.value = Some(Arc::new(Node::Value(Value::from(val))));
                slots.calculator = None;
            }
        }
    }

    pub(crate) fn canonical_container_mut(&mut self) -> Option<&mut Node> {
        let slots = self.slots_mut(&Scope::canonical());
        match slots.value.as_mut() {
            Some(node) if !matches!(**node, Node::Value(_)) => Some(Arc::make_mut(node)),
            _ => None,
        }
    }

    /// Canonical container, created when missing.
    pub(crate) fn ensure_container(&mut self, make: impl FnOnce() -> Node) -> &mut Node {
        let slots = self.slots_mut(&Scope::canonical());
        let has_container = slots
            .value
            .as_deref()
            .is_some_and(|node| !matches!(node, Node::Value(_)));
        if !has_container {
            slots.value = Some(Arc::new(make()));
            slots.calculator = None;
        }
        let node = slots.value.as_mut().map(Arc::make_mut);
        match node {
            Some(node) => node,
            None => unreachable!("canonical container was just stored"),
        }
    }

    pub(crate) fn node_child(
        &self,
        path: &[IdxSeg],
        ctx: &mut AddressingContext,
        moan: bool,
    ) -> Option<&Field> {
        match self.stored_value(&Scope::canonical(), false) {
            Some(node) => node.node_child(path, ctx, moan),
            None => {
                assert!(!moan, "field {} has no value to descend into", self.name());
                None
            }
        }
    }

    pub(crate) fn node_child_mut(
        &mut self,
        path: &[IdxSeg],
        ctx: &mut AddressingContext,
        moan: bool,
    ) -> Option<&mut Field> {
        let name = self.name().to_string();
        match self.canonical_container_mut() {
            Some(node) => node.node_child_mut(path, ctx, moan),
            None => {
                assert!(!moan, "field {name} has no container to descend into");
                None
            }
        }
    }

    pub(crate) fn value_at<'a>(
        &'a self,
        path: &[IdxSeg],
        scope: &Scope,
        flex: bool,
        ctx: &mut AddressingContext,
        root: Option<&Record>,
    ) -> Option<NodeRef<'a>> {
        if path.is_empty() {
            return self.value(scope, flex, root);
        }
        self.stored_value(scope, true)?
            .value_at(path, scope, flex, ctx, root)
    }

    pub(crate) fn val_at(
        &self,
        path: &[IdxSeg],
        scope: &Scope,
        flex: bool,
        ctx: &mut AddressingContext,
        root: Option<&Record>,
    ) -> Option<Atom> {
        if path.is_empty() {
            return self.val(scope, flex, root);
        }
        self.stored_value(scope, true)?
            .val_at(path, scope, flex, ctx, root)
    }

    pub(crate) fn set_val_at(
        &mut self,
        val: Atom,
        path: &[IdxSeg],
        scope: &Scope,
        opts: WriteOpts,
        ctx: &mut AddressingContext,
        anchor: &Anchor,
    ) {
        if path.is_empty() {
            let has_scalar = self
                .lookup(scope, opts.flex, |slots| {
                    slots
                        .value
                        .as_deref()
                        .filter(|node| matches!(node, Node::Value(_)))
                })
                .is_some();
            assert!(
                has_scalar || (opts.extend && !opts.protect),
                "field {}: no value for {scope} - pass extend=true/protect=false to create one",
                self.name()
            );
            self.put_val(val, scope, opts.flex);
            self.set_system_root(scope, anchor);
            return;
        }

        let has_container = self.canonical_container_mut().is_some();
        assert!(
            has_container || (opts.extend && !opts.protect),
            "field {}: no container for {path:?} - pass extend=true/protect=false to create one",
            self.name()
        );
        let node = self.ensure_container(|| Node::container_for(&path[0], path.len() > 1));
        node.set_val_at(val, path, scope, opts, ctx, anchor);
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
        if path.is_empty() {
            self.store_value(node, scope, protect, anchor);
            return;
        }
        let holds_record = matches!(node, Node::Record(_));
        let container = self.ensure_container(|| {
            Node::container_for(&path[0], path.len() > 1 || holds_record)
        });
        container.set_value_at(node, path, scope, protect, ctx, anchor);
    }

    /// How this field shows up when enumerating leaves of `scope`.
    ///
    /// Containers are descended into; everything else with a value or a
    /// calculator is a leaf. Without `flex` a scalar field only counts when it
    /// has a backend name for `scope`.
    pub(crate) fn leaf_kind(&self, scope: &Scope, flex: bool) -> Option<LeafKind<'_>> {
        match self.find_value(scope, true)?.1 {
            Found::Stored(node) if node.is_container() => Some(LeafKind::Container(node)),
            _ if !flex && !self.is_named_for(scope) => None,
            _ => Some(LeafKind::Scalar),
        }
    }

    /// Whether the field has a name of its own for exactly `scope`.
    fn is_named_for(&self, scope: &Scope) -> bool {
        scope.is_canonical()
            || self
                .lookup(scope, false, |slots| slots.name.as_ref())
                .is_some()
    }

    /// Leaf fields of this field (itself for scalar fields).
    pub fn leafs<'a>(&'a self, scope: &'a Scope, flex: bool) -> Box<dyn Iterator<Item = &'a Field> + 'a> {
        match self.leaf_kind(scope, flex) {
            Some(LeafKind::Scalar) => Box::new(std::iter::once(self)),
            Some(LeafKind::Container(Node::Record(rec))) => rec.leafs(scope, flex),
            Some(LeafKind::Container(Node::Records(recs))) => {
                Box::new(recs.iter().flat_map(move |rec| rec.leafs(scope, flex)))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    pub(crate) fn leaf_indexes_from<'a>(
        &'a self,
        path: IdxPath,
        scope: &'a Scope,
        flex: bool,
    ) -> Box<dyn Iterator<Item = IdxPath> + 'a> {
        match self.leaf_kind(scope, flex) {
            Some(LeafKind::Scalar) => Box::new(std::iter::once(path)),
            Some(LeafKind::Container(Node::Record(rec))) => rec.leaf_indexes_from(path, scope, flex),
            Some(LeafKind::Container(Node::Records(recs))) => Box::new(
                recs.iter()
                    .enumerate()
                    .flat_map(move |(idx, rec)| rec.leaf_indexes_from(path.join(idx), scope, flex)),
            ),
            _ => Box::new(std::iter::empty()),
        }
    }

    /// Clears values and applies clear values.
    ///
    /// With `scope` set to `None` every stored value is cleared, otherwise
    /// only the one found for `scope`. A clear value of the cleared scope is
    /// written back there; clear values of other scopes end up in the
    /// canonical value.
    pub fn clear_leafs(&mut self, scope: Option<&Scope>, flex: bool, reset_lists: bool) -> &mut Self {
        let mut initialized: Vec<Scope> = Vec::new();
        match scope {
            None => {
                let scopes: Vec<Scope> = self
                    .aspects
                    .iter()
                    .filter(|(_, slots)| slots.value.is_some())
                    .map(|(scope, _)| scope.clone())
                    .collect();
                for value_scope in scopes {
                    self.clear_scope(&value_scope, &value_scope, false, reset_lists, &mut initialized);
                }
            }
            Some(scope) => {
                if let Some((value_scope, ())) =
                    self.lookup(scope, flex, |slots| slots.value.as_ref().map(|_| ()))
                {
                    self.clear_scope(&value_scope, scope, flex, reset_lists, &mut initialized);
                }
            }
        }

        let pending: Vec<Atom> = self
            .aspects
            .iter()
            .filter(|(scope, _)| !initialized.contains(scope))
            .filter_map(|(_, slots)| slots.clear_value.clone())
            .collect();
        for val in pending {
            self.put_val(val, &Scope::canonical(), false);
        }
        self
    }

    fn clear_scope(
        &mut self,
        value_scope: &Scope,
        scope: &Scope,
        flex: bool,
        reset_lists: bool,
        initialized: &mut Vec<Scope>,
    ) {
        if let Some(node) = self.slots_mut(value_scope).value.as_mut() {
            Arc::make_mut(node).clear_leafs(Some(scope), flex, reset_lists);
        }
        if let Some(val) = self.clear_val(scope).cloned() {
            self.put_val(val, scope, false);
            initialized.push(scope.clone());
        }
    }

    /// Copy of this field, at its current position.
    pub fn copy(&self, depth: Depth) -> Field {
        self.copy_at(depth, &self.own_anchor(), &CopyOpts::default())
    }

    pub(crate) fn depth_target(&self) -> DepthTarget {
        DepthTarget::Field {
            holds_value: matches!(
                self.stored_value(&Scope::canonical(), false),
                Some(Node::Value(_))
            ),
        }
    }

    /// Copy of this field placed at `anchor`; `depth` applies to its values.
    pub(crate) fn copy_at(&self, depth: Depth, anchor: &Anchor, opts: &CopyOpts<'_>) -> Field {
        let mut aspects = Vec::with_capacity(self.aspects.len());
        for (scope, slots) in &self.aspects {
            let mut slots = slots.clone();
            if depth.copies()
                && let Some(node) = &slots.value
            {
                let target = match **node {
                    Node::Value(_) => DepthTarget::Value,
                    _ => DepthTarget::Container,
                };
                let deeper = depth.deeper(target);
                if deeper.copies() {
                    slots.value = Some(Arc::new(node.copy_node(deeper, anchor, opts)));
                }
            }
            if slots.root_rec.is_some() || scope.is_canonical() {
                slots.root_rec = anchor.root;
            }
            if !anchor.path.is_empty() {
                slots.root_idx = match (&slots.root_idx, scope.is_canonical()) {
                    (_, true) => Some(anchor.path.clone()),
                    (Some(old), false) => Some(match old.last() {
                        Some(last) => anchor.path.with_last(last.clone()),
                        None => anchor.path.clone(),
                    }),
                    (None, false) => None,
                };
            }
            aspects.push((scope.clone(), slots));
        }
        Field { aspects }
    }

    /// Re-anchors this field (and everything below it) at `anchor`.
    pub(crate) fn attach(&mut self, scope: &Scope, anchor: &Anchor) {
        self.set_system_root(scope, anchor);
        let container = self
            .lookup(scope, true, |slots| {
                slots.value.as_deref().filter(|node| node.is_container()).map(|_| ())
            })
            .map(|(found, ())| found);
        if let Some(found) = container
            && let Some(node) = self.slots_mut(&found).value.as_mut()
        {
            Arc::make_mut(node).attach(scope, anchor);
        }
    }

    /// Overwrites aspects with the ones `other` has; root handles stay.
    pub(crate) fn merge_aspects(&mut self, other: &Field) {
        for (scope, theirs) in &other.aspects {
            let ours = self.slots_mut(scope);
            if theirs.name.is_some() {
                ours.name = theirs.name.clone();
            }
            if theirs.value.is_some() {
                ours.value = theirs.value.clone();
                ours.calculator = None;
            }
            if theirs.calculator.is_some() {
                ours.calculator = theirs.calculator.clone();
                ours.value = None;
            }
            if theirs.clear_value.is_some() {
                ours.clear_value = theirs.clear_value.clone();
            }
            if theirs.validator.is_some() {
                ours.validator = theirs.validator.clone();
            }
            if theirs.converter.is_some() {
                ours.converter = theirs.converter.clone();
            }
            if theirs.filter.is_some() {
                ours.filter = theirs.filter.clone();
            }
            if theirs.sql_expr.is_some() {
                ours.sql_expr = theirs.sql_expr.clone();
            }
        }
    }

    /// Sets root handles for `scope`, keeping the canonical ones in step.
    fn set_system_root(&mut self, scope: &Scope, anchor: &Anchor) {
        let canonical = Scope::canonical();
        if let Some(root) = anchor.root {
            self.set_root_rec(root, scope);
            if !scope.is_canonical() {
                self.set_root_rec(root, &canonical);
            }
        }
        if anchor.path.is_empty() {
            return;
        }
        let path = match self.slots(scope).and_then(|slots| slots.name.clone()) {
            Some(name) if !scope.is_canonical() => anchor.path.with_last(name),
            _ => anchor.path.clone(),
        };
        self.set_root_idx(path, scope);
        if !scope.is_canonical() {
            self.set_root_idx(anchor.path.clone(), &canonical);
        }
    }

    /// Whether both fields share the allocation of their value for `scope`.
    pub fn shares_value_with(&self, other: &Field, scope: &Scope) -> bool {
        let arc = |field: &Field| field.slots(scope).and_then(|slots| slots.value.clone());
        match (arc(self), arc(other)) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    /// Appends a record to the record sequence held by this field.
    ///
    /// # Panics
    ///
    /// If the field holds no record sequence.
    pub fn append_record(&mut self, from: Option<&Record>, clear: bool) -> &mut Record {
        let name = self.name().to_string();
        match self.canonical_container_mut() {
            Some(Node::Records(recs)) => recs.append_record(from, clear),
            _ => panic!("field {name} holds no record sequence"),
        }
    }

    /// Splits `text` into records positioned below this field.
    pub fn string_to_records(
        &self,
        text: &str,
        field_names: &[&str],
        rec_sep: &str,
        fld_sep: &str,
    ) -> Records {
        let mut recs = string_to_records(text, field_names, rec_sep, fld_sep);
        recs.attach(&Scope::canonical(), &self.own_anchor());
        recs
    }

    /// Value pulled from `system`: the backend value, validated and converted.
    ///
    /// `None` when the validator rejects it or the converter yields no value.
    pub(crate) fn pulled_val(&self, system: &SystemId, root: Option<&Record>) -> Option<Atom> {
        let scope = Scope::new(system.clone(), super::Direction::From);
        let val = self
            .val(&scope, true, root)
            .unwrap_or_else(|| super::value::EMPTY.clone());
        if !self.validate(&val, &scope, root) {
            return None;
        }
        let val = self.convert(val, &scope, root);
        (!val.is_null()).then_some(val)
    }

    /// Value pushed onto `system`: the canonical value, converted and
    /// validated.
    pub(crate) fn pushed_val(&self, system: &SystemId, root: Option<&Record>) -> Option<Atom> {
        let scope = Scope::new(system.clone(), super::Direction::Onto);
        let val = self
            .val(&Scope::canonical(), true, root)
            .unwrap_or_else(|| super::value::EMPTY.clone());
        let val = self.convert(val, &scope, root);
        (!val.is_null() && self.validate(&val, &scope, root)).then_some(val)
    }

    /// Pulls the value of a standalone field from `system`.
    pub fn pull(&mut self, system: &SystemId) -> &mut Self {
        if let Some(val) = self.pulled_val(system, None) {
            self.put_val(val, &Scope::canonical(), true);
        }
        self
    }

    /// Pushes the value of a standalone field onto `system`.
    pub fn push(&mut self, system: &SystemId) -> &mut Self {
        if let Some(val) = self.pushed_val(system, None) {
            self.put_val(val, &Scope::new(system.clone(), super::Direction::Onto), true);
        }
        self
    }
}

fn assert_canonical_name(name: &str) {
    assert!(
        !name.contains(IDX_PATH_SEP) && IdxPath::parse_field_name(name).is_empty(),
        "digits cannot be used in canonical field name {name:?}"
    );
}
