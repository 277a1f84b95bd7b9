//! The value kinds a field can hold, and dispatch over them.

use std::fmt;

use super::{
    AddressingContext, Field, IdxSeg, Record, Records, Scope, Values,
    addressing::Anchor,
    copy::{CopyOpts, Depth},
    value::{Atom, Value},
};

/// A field value: a scalar container or one of the container kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Value(Value),
    Values(Values),
    Record(Record),
    Records(Records),
}

/// Kind of a [`Node`], for diagnostics and type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Value,
    Values,
    Record,
    Records,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Value => "Value",
            NodeKind::Values => "Values",
            NodeKind::Record => "Record",
            NodeKind::Records => "Records",
        };
        f.write_str(name)
    }
}

/// A borrowed field value, or a value produced by a calculator.
#[derive(Debug, Clone)]
pub enum NodeRef<'a> {
    Value(&'a Value),
    Values(&'a Values),
    Record(&'a Record),
    Records(&'a Records),
    Computed(Value),
}

impl<'a> NodeRef<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRef::Value(_) | NodeRef::Computed(_) => NodeKind::Value,
            NodeRef::Values(_) => NodeKind::Values,
            NodeRef::Record(_) => NodeKind::Record,
            NodeRef::Records(_) => NodeKind::Records,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            NodeRef::Value(value) => Some(value),
            NodeRef::Computed(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_values(&self) -> Option<&'a Values> {
        match self {
            NodeRef::Values(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&'a Record> {
        match self {
            NodeRef::Record(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&'a Records> {
        match self {
            NodeRef::Records(recs) => Some(recs),
            _ => None,
        }
    }

    pub fn to_node(&self) -> Node {
        match self {
            NodeRef::Value(value) => Node::Value((*value).clone()),
            NodeRef::Computed(value) => Node::Value(value.clone()),
            NodeRef::Values(values) => Node::Values((*values).clone()),
            NodeRef::Record(rec) => Node::Record((*rec).clone()),
            NodeRef::Records(recs) => Node::Records((*recs).clone()),
        }
    }
}

impl<'a> From<&'a Node> for NodeRef<'a> {
    fn from(node: &'a Node) -> Self {
        match node {
            Node::Value(value) => NodeRef::Value(value),
            Node::Values(values) => NodeRef::Values(values),
            Node::Record(rec) => NodeRef::Record(rec),
            Node::Records(recs) => NodeRef::Records(recs),
        }
    }
}

/// Anything that can be placed at a path of a record.
#[derive(Debug, Clone)]
pub enum Child {
    Field(Field),
    Node(Node),
    Val(Atom),
}

impl From<Field> for Child {
    fn from(field: Field) -> Self {
        Child::Field(field)
    }
}

impl From<Node> for Child {
    fn from(node: Node) -> Self {
        Child::Node(node)
    }
}

impl From<Record> for Child {
    fn from(rec: Record) -> Self {
        Child::Node(Node::Record(rec))
    }
}

impl From<Records> for Child {
    fn from(recs: Records) -> Self {
        Child::Node(Node::Records(recs))
    }
}

impl From<Values> for Child {
    fn from(values: Values) -> Self {
        Child::Node(Node::Values(values))
    }
}

impl From<Value> for Child {
    fn from(value: Value) -> Self {
        Child::Node(Node::Value(value))
    }
}

macro_rules! child_from_atom {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for Child {
                fn from(val: $ty) -> Self {
                    Child::Val(Atom::from(val))
                }
            }
        )+
    };
}

child_from_atom!(Atom, &str, String, i64, i32, f64, bool, chrono::NaiveDate);

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Value(_) => NodeKind::Value,
            Node::Values(_) => NodeKind::Values,
            Node::Record(_) => NodeKind::Record,
            Node::Records(_) => NodeKind::Records,
        }
    }

    /// Whether the node holds fields (a record or record sequence).
    pub fn is_container(&self) -> bool {
        matches!(self, Node::Record(_) | Node::Records(_))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_values(&self) -> Option<&Values> {
        match self {
            Node::Values(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Node::Record(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&Records> {
        match self {
            Node::Records(recs) => Some(recs),
            _ => None,
        }
    }

    pub fn as_records_mut(&mut self) -> Option<&mut Records> {
        match self {
            Node::Records(recs) => Some(recs),
            _ => None,
        }
    }

    /// Empty container suited to hold `next` as its first path segment.
    ///
    /// A name needs a record; an index needs a record sequence when more
    /// segments follow, else a plain sequence.
    pub(crate) fn container_for(next: &IdxSeg, more_follow: bool) -> Node {
        match next {
            IdxSeg::Name(_) => Node::Record(Record::new()),
            IdxSeg::Index(_) if more_follow => Node::Records(Records::new()),
            IdxSeg::Index(_) => Node::Values(Values::new()),
        }
    }

    pub(crate) fn node_child(
        &self,
        path: &[IdxSeg],
        ctx: &mut AddressingContext,
        moan: bool,
    ) -> Option<&Field> {
        match self {
            Node::Record(rec) => rec.node_child(path, ctx, moan),
            Node::Records(recs) => recs.node_child(path, ctx, moan),
            _ => {
                assert!(!moan, "{} has no deeper node at {:?}", self.kind(), path);
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
        match self {
            Node::Record(rec) => rec.node_child_mut(path, ctx, moan),
            Node::Records(recs) => recs.node_child_mut(path, ctx, moan),
            _ => {
                assert!(!moan, "{} has no deeper node at {:?}", self.kind(), path);
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
            return Some(NodeRef::from(self));
        }
        match self {
            Node::Value(_) => None,
            Node::Values(values) => {
                let idx = values.resolve_index(path, ctx)?;
                if path.len() > 1 {
                    return None;
                }
                values.get(idx).map(NodeRef::Value)
            }
            Node::Record(rec) => rec.value_at(path, scope, flex, ctx, root),
            Node::Records(recs) => recs.value_at(path, scope, flex, ctx, root),
        }
    }

    pub(crate) fn val_at(
        &self,
        path: &[IdxSeg],
        scope: &Scope,
        flex: bool,
        ctx: &mut AddressingContext,
        root: Option<&Record>,
    ) -> Option<Atom> {
        match self {
            Node::Value(value) => match path {
                [] => Some(value.val().clone()),
                [IdxSeg::Index(idx)] => value.get(*idx).cloned(),
                _ => None,
            },
            Node::Values(values) => {
                let idx = values.resolve_index(path, ctx)?;
                let value = values.get(idx)?;
                Node::value_val(value, &path[1..])
            }
            Node::Record(rec) => rec.val_at(path, scope, flex, ctx, root),
            Node::Records(recs) => {
                let idx = recs.resolve_index(path, ctx)?;
                if path.len() == 1 {
                    return None;
                }
                recs.get(idx)?.val_at(&path[1..], scope, flex, ctx, root)
            }
        }
    }

    fn value_val(value: &Value, path: &[IdxSeg]) -> Option<Atom> {
        match path {
            [] => Some(value.val().clone()),
            [IdxSeg::Index(idx)] => value.get(*idx).cloned(),
            _ => None,
        }
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
        match self {
            Node::Value(value) => {
                let index = match path {
                    [] => None,
                    [IdxSeg::Index(idx)] => Some(*idx),
                    _ => panic!("Value expects at most one index segment, got {path:?}"),
                };
                value.set(val, index);
            }
            Node::Values(values) => values.set_val_at(val, path, opts, ctx),
            Node::Record(rec) => rec.set_val_at(val, path, scope, opts, ctx, anchor),
            Node::Records(recs) => recs.set_val_at(val, path, scope, opts, ctx, anchor),
        }
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
        match self {
            Node::Record(rec) => rec.set_value_at(node, path, scope, protect, ctx, anchor),
            Node::Records(recs) => recs.set_value_at(node, path, scope, protect, ctx, anchor),
            Node::Values(values) => {
                let Node::Value(value) = node else {
                    panic!("Values can only hold Value nodes, got {}", node.kind());
                };
                values.set_value_at(value, path, ctx);
            }
            Node::Value(_) => panic!("Value has no deeper node at {path:?}"),
        }
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
        match self {
            Node::Record(rec) => rec.set_node_child_at(child, path, scope, protect, ctx, anchor),
            Node::Records(recs) => recs.set_node_child_at(child, path, scope, protect, ctx, anchor),
            _ => match child {
                Child::Val(val) => self.set_val_at(
                    val,
                    path,
                    scope,
                    WriteOpts {
                        protect,
                        ..WriteOpts::default()
                    },
                    ctx,
                    anchor,
                ),
                Child::Node(node) => self.set_value_at(node, path, scope, protect, ctx, anchor),
                Child::Field(_) => panic!("{} cannot hold a field at {path:?}", self.kind()),
            },
        }
    }

    pub(crate) fn clear_leafs(&mut self, scope: Option<&Scope>, flex: bool, reset_lists: bool) {
        match self {
            Node::Value(value) => {
                value.clear();
            }
            Node::Values(values) => values.clear_leafs(scope, flex, reset_lists),
            Node::Record(rec) => {
                rec.clear_leafs(scope, flex, reset_lists);
            }
            Node::Records(recs) => recs.clear_leafs(scope, flex, reset_lists),
        }
    }

    pub(crate) fn copy_node(&self, depth: Depth, anchor: &Anchor, opts: &CopyOpts<'_>) -> Node {
        match self {
            Node::Value(value) => Node::Value(value.clone()),
            Node::Values(values) => Node::Values(values.copy_seq(depth, anchor, opts)),
            Node::Record(rec) => Node::Record(rec.copy_at(depth, anchor, opts)),
            Node::Records(recs) => Node::Records(recs.copy_seq(depth, anchor, opts)),
        }
    }

    pub(crate) fn attach(&mut self, scope: &Scope, anchor: &Anchor) {
        match self {
            Node::Record(rec) => rec.attach(scope, anchor),
            Node::Records(recs) => recs.attach(scope, anchor),
            Node::Value(_) | Node::Values(_) => {}
        }
    }
}

/// Options for value writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOpts {
    /// Fall back from a backend value to the canonical one when the backend
    /// has none.
    pub flex: bool,
    /// Abort instead of overwriting an existing node.
    pub protect: bool,
    /// Create missing fields and containers.
    pub extend: bool,
}

impl Default for WriteOpts {
    fn default() -> Self {
        WriteOpts {
            flex: true,
            protect: false,
            extend: true,
        }
    }
}

impl WriteOpts {
    /// Writes exactly at the given scope.
    pub fn exact() -> Self {
        WriteOpts {
            flex: false,
            ..WriteOpts::default()
        }
    }

    /// Never creates fields or containers.
    pub fn existing() -> Self {
        WriteOpts {
            extend: false,
            ..WriteOpts::default()
        }
    }
}
