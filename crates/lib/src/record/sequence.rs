//! Ordered sequences of scalar containers and of records.
//!
//! Both kinds share [`Sequence`], which keeps its items behind [`Arc`] so a
//! shallow copy of a sequence shares its elements with the original. Writes
//! go through [`Arc::make_mut`] and never leak into a copy.

use std::sync::Arc;

use tracing::trace;

use super::{
    AddressingContext, Child, Field, IdxSeg, Node, NodeRef, Record, Scope,
    addressing::Anchor,
    copy::{CopyOpts, Depth, DepthTarget},
    node::WriteOpts,
    value::{Atom, Value},
};

/// An ordered list with a current-index cursor.
///
/// The cursor is `None` until a write or an explicit
/// [`set_current_index`](Sequence::set_current_index) sets it. `idx_min` and
/// `idx_max` track the lowest and highest cursor position set so far.
#[derive(Debug, Clone)]
pub struct Sequence<T> {
    items: Vec<Arc<T>>,
    current_idx: Option<usize>,
    idx_min: Option<usize>,
    idx_max: Option<usize>,
}

/// A sequence of scalar containers.
pub type Values = Sequence<Value>;

/// A sequence of records, usually of the same shape.
pub type Records = Sequence<Record>;

impl<T> Default for Sequence<T> {
    fn default() -> Self {
        Sequence {
            items: Vec::new(),
            current_idx: None,
            idx_min: None,
            idx_max: None,
        }
    }
}

/// Sequences compare by their items; cursors are ignored.
impl<T: PartialEq> PartialEq for Sequence<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Clone> Sequence<T> {
    pub fn new() -> Self {
        Sequence::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.items.get(idx).map(Arc::as_ref)
    }

    /// Mutable access to an item, unsharing it from any copy first.
    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.items.get_mut(idx).map(Arc::make_mut)
    }

    pub fn push(&mut self, item: T) -> &mut Self {
        self.items.push(Arc::new(item));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(Arc::as_ref)
    }

    pub fn current_idx(&self) -> Option<usize> {
        self.current_idx
    }

    pub fn idx_min(&self) -> Option<usize> {
        self.idx_min
    }

    pub fn idx_max(&self) -> Option<usize> {
        self.idx_max
    }

    /// Item at the cursor.
    pub fn current(&self) -> Option<&T> {
        self.current_idx.and_then(|idx| self.get(idx))
    }

    /// Moves the cursor to `idx`, widening the min/max range as needed.
    pub fn set_current_index(&mut self, idx: usize) -> usize {
        self.current_idx = Some(idx);
        self.idx_min = Some(self.idx_min.map_or(idx, |min| min.min(idx)));
        self.idx_max = Some(self.idx_max.map_or(idx, |max| max.max(idx)));
        idx
    }

    /// Moves the cursor by `delta` relative to its current position.
    ///
    /// Returns `None` (and leaves the cursor alone) when the cursor is unset
    /// or would move below zero.
    pub fn add_current_index(&mut self, delta: isize) -> Option<usize> {
        let idx = self.current_idx?.checked_add_signed(delta)?;
        Some(self.set_current_index(idx))
    }

    /// Whether item `idx` is the same allocation in both sequences.
    pub fn shares_item_with(&self, other: &Self, idx: usize) -> bool {
        match (self.items.get(idx), other.items.get(idx)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Sets the cursor unless it is set already.
    fn init_current_index(&mut self, idx: usize) {
        if self.current_idx.is_none() {
            self.set_current_index(idx);
        }
    }

    pub(crate) fn resolve_index(&self, path: &[IdxSeg], ctx: &mut AddressingContext) -> Option<usize> {
        let literal = path.first()?.as_index()?;
        Some(ctx.resolve(literal, self.current_idx))
    }

    fn reset_cursor(&mut self) {
        if self.items.is_empty() {
            self.current_idx = None;
            self.idx_min = None;
            self.idx_max = None;
        } else {
            self.current_idx = Some(0);
            self.idx_min = Some(0);
            self.idx_max = Some(self.items.len() - 1);
        }
    }

    fn clear_items(&mut self, reset_lists: bool, mut clear: impl FnMut(&mut T)) {
        if reset_lists {
            self.items.truncate(1);
        }
        for item in &mut self.items {
            clear(Arc::make_mut(item));
        }
        self.reset_cursor();
    }

    fn copy_items(
        &self,
        depth: Depth,
        target: DepthTarget,
        mut copy: impl FnMut(&T, Depth, usize) -> T,
    ) -> Self {
        let deeper = depth.deeper(target);
        let items = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                if deeper.copies() {
                    Arc::new(copy(item, deeper, idx))
                } else {
                    Arc::clone(item)
                }
            })
            .collect();
        Sequence {
            items,
            current_idx: self.current_idx,
            idx_min: self.idx_min,
            idx_max: self.idx_max,
        }
    }
}

impl<T: Clone> FromIterator<T> for Sequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Sequence {
            items: iter.into_iter().map(Arc::new).collect(),
            ..Sequence::default()
        }
    }
}

impl Values {
    /// Empties every element; with `reset_lists` only the first one is kept.
    pub fn clear_leafs(&mut self, _scope: Option<&Scope>, _flex: bool, reset_lists: bool) {
        self.clear_items(reset_lists, |value| {
            value.clear();
        });
    }

    /// Current value of element `idx`.
    pub fn val(&self, idx: usize) -> Option<&Atom> {
        self.get(idx).map(Value::val)
    }

    pub(crate) fn copy_seq(&self, depth: Depth, _anchor: &Anchor, _opts: &CopyOpts<'_>) -> Values {
        self.copy_items(depth, DepthTarget::Value, |value, _, _| value.clone())
    }

    pub(crate) fn set_val_at(
        &mut self,
        val: Atom,
        path: &[IdxSeg],
        opts: WriteOpts,
        ctx: &mut AddressingContext,
    ) {
        let Some(idx) = self.resolve_index(path, ctx) else {
            panic!("Values expects an index, got {path:?}");
        };
        assert!(path.len() == 1, "Values expects exactly one index, got {path:?}");
        self.set_value_slot(Value::from(val), idx, opts.extend);
    }

    pub(crate) fn set_value_at(&mut self, value: Value, path: &[IdxSeg], ctx: &mut AddressingContext) {
        let Some(idx) = self.resolve_index(path, ctx) else {
            panic!("Values expects an index, got {path:?}");
        };
        assert!(path.len() == 1, "Values expects exactly one index, got {path:?}");
        self.set_value_slot(value, idx, true);
    }

    fn set_value_slot(&mut self, value: Value, idx: usize, extend: bool) {
        self.init_current_index(idx);
        if idx >= self.len() {
            assert!(extend, "Values index {idx} is out of range and extending is disabled");
            while self.len() < idx {
                self.push(Value::new());
            }
            self.push(value);
        } else {
            self.items[idx] = Arc::new(value);
        }
    }
}

impl Records {
    /// Empties the leaves of every record; with `reset_lists` only the first
    /// record is kept.
    pub fn clear_leafs(&mut self, scope: Option<&Scope>, flex: bool, reset_lists: bool) {
        self.clear_items(reset_lists, |rec| {
            rec.clear_leafs(scope, flex, reset_lists);
        });
    }

    /// Empty record shaped like the first element.
    ///
    /// The first record is copied completely and its leaves are cleared, so
    /// clear values of the template fields apply.
    pub fn template_record(&self) -> Record {
        let anchor = self.element_anchor(self.len());
        self.new_element(&anchor)
    }

    /// Appends a copy of `from` (or of the first record when `None`) and moves
    /// the cursor onto it.
    pub fn append_record(&mut self, from: Option<&Record>, clear: bool) -> &mut Record {
        let idx = self.len();
        let anchor = self.element_anchor(idx);
        let mut rec = match from.or_else(|| self.get(0)) {
            Some(src) => src.copy_at(Depth::All, &anchor, &CopyOpts::default()),
            None => Record::new(),
        };
        if clear {
            rec.reset_leafs();
        }
        self.push(rec);
        self.set_current_index(idx);
        trace!(idx, "appended record");
        let last = self.items.len() - 1;
        Arc::make_mut(&mut self.items[last])
    }

    /// Anchor of element `idx`, derived from where the existing records sit.
    fn element_anchor(&self, idx: usize) -> Anchor {
        match self.get(0).and_then(Record::anchor_hint) {
            Some(hint) => {
                let base = match hint.path.last() {
                    Some(IdxSeg::Index(_)) => hint.path.parent(),
                    _ => hint.path.clone(),
                };
                hint.at(base.join(idx))
            }
            None => Anchor::detached().child(idx),
        }
    }

    pub(crate) fn new_element(&self, anchor: &Anchor) -> Record {
        match self.get(0) {
            Some(first) => {
                let mut rec = first.copy_at(Depth::All, anchor, &CopyOpts::default());
                rec.reset_leafs();
                rec
            }
            None => Record::new(),
        }
    }

    fn extend_to(&mut self, idx: usize, extend: bool, anchor: &Anchor) -> bool {
        let mut extended = false;
        while self.len() <= idx {
            assert!(extend, "Records index {idx} is out of range and extending is disabled");
            let rec = self.new_element(&anchor.child(self.len()));
            self.push(rec);
            extended = true;
        }
        extended
    }

    pub(crate) fn copy_seq(&self, depth: Depth, anchor: &Anchor, opts: &CopyOpts<'_>) -> Records {
        self.copy_items(depth, DepthTarget::Container, |rec, deeper, idx| {
            rec.copy_at(deeper, &anchor.child(idx), opts)
        })
    }

    pub(crate) fn node_child(
        &self,
        path: &[IdxSeg],
        ctx: &mut AddressingContext,
        moan: bool,
    ) -> Option<&Field> {
        let Some(idx) = self.resolve_index(path, ctx) else {
            assert!(!moan, "Records expects an index as first segment of {path:?}");
            return None;
        };
        let Some(rec) = self.get(idx) else {
            assert!(!moan, "Records index {idx} is not less than the length {}", self.len());
            return None;
        };
        if path.len() == 1 {
            assert!(!moan, "{path:?} addresses a record, not a field");
            return None;
        }
        rec.node_child(&path[1..], ctx, moan)
    }

    pub(crate) fn node_child_mut(
        &mut self,
        path: &[IdxSeg],
        ctx: &mut AddressingContext,
        moan: bool,
    ) -> Option<&mut Field> {
        let Some(idx) = self.resolve_index(path, ctx) else {
            assert!(!moan, "Records expects an index as first segment of {path:?}");
            return None;
        };
        if idx >= self.len() || path.len() == 1 {
            assert!(!moan, "{path:?} does not address a field of these records");
            return None;
        }
        self.get_mut(idx)?.node_child_mut(&path[1..], ctx, moan)
    }

    pub(crate) fn value_at<'a>(
        &'a self,
        path: &[IdxSeg],
        scope: &Scope,
        flex: bool,
        ctx: &mut AddressingContext,
        root: Option<&Record>,
    ) -> Option<NodeRef<'a>> {
        let idx = self.resolve_index(path, ctx)?;
        let rec = self.get(idx)?;
        if path.len() == 1 {
            return Some(NodeRef::Record(rec));
        }
        rec.value_at(&path[1..], scope, flex, ctx, root)
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
        let Some(idx) = self.resolve_index(path, ctx) else {
            panic!("Records expects an index as first segment of {path:?}");
        };
        assert!(path.len() > 1, "cannot store a scalar as record {idx} of {path:?}");
        self.init_current_index(idx);
        if self.extend_to(idx, opts.extend, anchor) {
            opts.protect = false;
        }
        let rec = Arc::make_mut(&mut self.items[idx]);
        rec.set_val_at(val, &path[1..], scope, opts, ctx, &anchor.child(idx));
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
        let Some(idx) = self.resolve_index(path, ctx) else {
            panic!("Records expects an index as first segment of {path:?}");
        };
        self.init_current_index(idx);
        let protect = protect && !self.extend_to(idx, true, anchor);
        let anchor = anchor.child(idx);
        if path.len() == 1 {
            let Node::Record(mut rec) = node else {
                panic!("Records can only hold records, got {}", node.kind());
            };
            assert!(!protect, "record {idx} exists; pass protect=false to overwrite it");
            rec.attach(scope, &anchor);
            self.items[idx] = Arc::new(rec);
        } else {
            let rec = Arc::make_mut(&mut self.items[idx]);
            rec.set_value_at(node, &path[1..], scope, protect, ctx, &anchor);
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
        match child {
            Child::Node(node) if path.len() == 1 => {
                self.set_value_at(node, path, scope, protect, ctx, anchor);
            }
            child => {
                let Some(idx) = self.resolve_index(path, ctx) else {
                    panic!("Records expects an index as first segment of {path:?}");
                };
                assert!(path.len() > 1, "only a record can be placed at {path:?}");
                self.init_current_index(idx);
                let protect = protect && !self.extend_to(idx, true, anchor);
                let rec = Arc::make_mut(&mut self.items[idx]);
                rec.set_node_child_at(child, &path[1..], scope, protect, ctx, &anchor.child(idx));
            }
        }
    }

    pub(crate) fn attach(&mut self, scope: &Scope, anchor: &Anchor) {
        for (idx, item) in self.items.iter_mut().enumerate() {
            Arc::make_mut(item).attach(scope, &anchor.child(idx));
        }
    }

    /// Sets the environment of every record.
    pub fn set_env(&mut self, scope: &Scope) -> &mut Self {
        for item in &mut self.items {
            let rec = Arc::make_mut(item);
            rec.set_system(scope.system_id().cloned());
            rec.set_direction(scope.direction());
            let anchor = Anchor::root(rec.id());
            rec.attach(scope, &anchor);
        }
        self
    }

    /// Groups record positions by the values of `match_fields`.
    pub fn index_match_fields(&self, match_fields: &[&str]) -> Vec<(Vec<Atom>, Vec<usize>)> {
        let mut index: Vec<(Vec<Atom>, Vec<usize>)> = Vec::new();
        for (idx, rec) in self.iter().enumerate() {
            let key = rec.match_key(match_fields);
            match index.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, positions)) => positions.push(idx),
                None => index.push((key, vec![idx])),
            }
        }
        index
    }

    /// Compares these records with `other`, pairing records by
    /// `match_fields`.
    ///
    /// Every pair is compared with [`Record::compare_leafs`] and, if given,
    /// `comparator`. Records without a partner are reported too.
    pub fn compare_records(
        &self,
        other: &Records,
        match_fields: &[&str],
        field_names: &[&str],
        exclude_fields: &[&str],
        comparator: Option<&dyn Fn(&Record, &Record) -> Vec<String>>,
    ) -> Vec<String> {
        let index = other.index_match_fields(match_fields);
        let mut processed: Vec<&Vec<Atom>> = Vec::new();
        let mut dif = Vec::new();

        for (idx, rec) in self.iter().enumerate() {
            let key = rec.match_key(match_fields);
            match index.iter().find(|(existing, _)| *existing == key) {
                Some((matched, positions)) => {
                    for other_rec in positions.iter().filter_map(|&pos| other.get(pos)) {
                        dif.extend(rec.compare_leafs(other_rec, field_names, exclude_fields));
                        if let Some(comparator) = comparator {
                            dif.extend(comparator(rec, other_rec));
                        }
                    }
                    processed.push(matched);
                }
                None => dif.push(format!(
                    "Record {idx} of this Records instance not found via {}; rec={rec}",
                    match_key_repr(&key)
                )),
            }
        }

        for (key, positions) in &index {
            if processed.contains(&key) {
                continue;
            }
            for other_rec in positions.iter().filter_map(|&pos| other.get(pos)) {
                dif.push(format!(
                    "Pulled Record not found in this Records instance via {}; rec={other_rec}",
                    match_key_repr(key)
                ));
            }
        }
        dif
    }

    /// Merges `others` into these records.
    ///
    /// Records matching an existing one by `match_fields` update it field by
    /// field; the rest are appended. Without match fields (or when this
    /// sequence is empty) everything is appended.
    pub fn merge_records(&mut self, others: &Records, match_fields: &[&str]) -> &mut Self {
        if self.is_empty() || match_fields.is_empty() {
            for rec in others.iter() {
                self.push(rec.clone());
            }
            return self;
        }
        let index = self.index_match_fields(match_fields);
        for rec in others.iter() {
            let key = rec.match_key(match_fields);
            match index.iter().find(|(existing, _)| *existing == key) {
                Some((_, positions)) => {
                    for &pos in positions {
                        if let Some(this_rec) = self.get_mut(pos) {
                            this_rec.update(rec);
                        }
                    }
                }
                None => {
                    self.push(rec.clone());
                }
            }
        }
        self
    }
}

fn match_key_repr(key: &[Atom]) -> String {
    let parts: Vec<String> = key.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

/// Splits `text` into records of the named fields.
///
/// Records are separated by `rec_sep`, field values within a record by
/// `fld_sep`, and assigned to `field_names` in order. The cursor ends on the
/// last record.
///
/// ```rust
/// use sysdata::record::string_to_records;
///
/// let recs = string_to_records("a=1,b=2", &["Name", "Qty"], ",", "=");
/// assert_eq!(recs.len(), 2);
/// assert_eq!(recs.current_idx(), Some(1));
/// ```
pub fn string_to_records(text: &str, field_names: &[&str], rec_sep: &str, fld_sep: &str) -> Records {
    let mut recs = Records::new();
    if text.is_empty() {
        return recs;
    }
    for (rec_idx, rec_text) in text.split(rec_sep).enumerate() {
        let mut rec = Record::new();
        for (fld_idx, fld_val) in rec_text.split(fld_sep).enumerate() {
            let Some(name) = field_names.get(fld_idx) else {
                panic!("no field name for value {fld_idx} of record {rec_idx}: {rec_text:?}");
            };
            rec.set_val(*name, fld_val);
        }
        recs.push(rec);
        recs.set_current_index(rec_idx);
    }
    recs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_tracks_range() {
        let mut values: Values = ["a", "b", "c"].into_iter().map(Value::from).collect();
        assert_eq!(values.current_idx(), None);
        values.set_current_index(2);
        values.set_current_index(1);
        assert_eq!(values.current_idx(), Some(1));
        assert_eq!(values.idx_min(), Some(1));
        assert_eq!(values.idx_max(), Some(2));
        assert_eq!(values.add_current_index(-1), Some(0));
        assert_eq!(values.idx_min(), Some(0));
        assert_eq!(values.add_current_index(-1), None);
    }

    #[test]
    fn test_values_set_extends() {
        let mut values = Values::new();
        values.set_val_at(
            Atom::from("x"),
            &[IdxSeg::Index(2)],
            WriteOpts::default(),
            &mut AddressingContext::new(),
        );
        assert_eq!(values.len(), 3);
        assert_eq!(values.val(0), Some(&Atom::from("")));
        assert_eq!(values.val(2), Some(&Atom::from("x")));
        assert_eq!(values.current_idx(), Some(2));
    }

    #[test]
    #[should_panic(expected = "extending is disabled")]
    fn test_values_set_without_extend() {
        let mut values = Values::new();
        values.set_val_at(
            Atom::from("x"),
            &[IdxSeg::Index(0)],
            WriteOpts::existing(),
            &mut AddressingContext::new(),
        );
    }

    #[test]
    fn test_clear_resets_lists() {
        let mut values: Values = ["a", "b"].into_iter().map(Value::from).collect();
        values.clear_leafs(None, true, true);
        assert_eq!(values.len(), 1);
        assert!(values.get(0).is_some_and(Value::is_empty));
        assert_eq!(values.current_idx(), Some(0));
        assert_eq!(values.idx_max(), Some(0));

        let mut empty = Values::new();
        empty.clear_leafs(None, true, true);
        assert_eq!(empty.current_idx(), None);
    }

    #[test]
    fn test_string_to_records() {
        let recs = string_to_records("x=1,y=2,z=3", &["Key", "Val"], ",", "=");
        assert_eq!(recs.len(), 3);
        assert_eq!(recs.get(1).and_then(|rec| rec.val("Val")), Some(Atom::from("2")));
        assert_eq!(recs.current_idx(), Some(2));
        assert!(string_to_records("", &["Key"], ",", "=").is_empty());
    }

    #[test]
    fn test_template_record_is_cleared() {
        let mut recs = Records::new();
        let mut rec = Record::new();
        rec.set_val("Name", "x");
        recs.push(rec);
        let template = recs.template_record();
        assert!(template.contains("Name"));
        assert_eq!(template.val("Name"), Some(Atom::from("")));
    }

    #[test]
    fn test_append_record_moves_cursor() {
        let mut recs = Records::new();
        let mut rec = Record::new();
        rec.set_val("Name", "x");
        recs.push(rec);
        recs.append_record(None, false).set_val("Name", "y");
        assert_eq!(recs.len(), 2);
        assert_eq!(recs.current_idx(), Some(1));
        assert_eq!(recs.get(0).and_then(|rec| rec.val("Name")), Some(Atom::from("x")));
        assert_eq!(recs.get(1).and_then(|rec| rec.val("Name")), Some(Atom::from("y")));
    }

    #[test]
    fn test_merge_records_by_key() {
        let mut this: Records = string_to_records("1=a,2=b", &["Id", "Name"], ",", "=");
        let others = string_to_records("2=B,3=c", &["Id", "Name"], ",", "=");
        this.merge_records(&others, &["Id"]);
        assert_eq!(this.len(), 3);
        assert_eq!(this.get(1).and_then(|rec| rec.val("Name")), Some(Atom::from("B")));
        assert_eq!(this.get(2).and_then(|rec| rec.val("Id")), Some(Atom::from("3")));
        assert_ne!(this.get(2).map(Record::id), others.get(1).map(Record::id));
    }

    #[test]
    fn test_compare_records_reports_unmatched() {
        let this = string_to_records("1=a,2=b", &["Id", "Name"], ",", "=");
        let other = string_to_records("1=a,3=c", &["Id", "Name"], ",", "=");
        let dif = this.compare_records(&other, &["Id"], &[], &[], None);
        assert_eq!(dif.len(), 2);
        assert!(dif[0].starts_with("Record 1 of this Records instance not found via (2)"));
        assert!(dif[1].starts_with("Pulled Record not found in this Records instance via (3)"));
    }
}
