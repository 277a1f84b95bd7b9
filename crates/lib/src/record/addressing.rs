//! Cursor-relative addressing and root handles.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::IdxPath;

/// Marks which container levels of a path resolution use the current index.
///
/// Each entry is a countdown of container levels. Whenever resolution passes
/// a container, every countdown is decremented; a sequence visited while one
/// of them is at zero replaces the literal index from the path with its stored
/// current index (if it has one).
///
/// ```rust
/// use sysdata::record::AddressingContext;
///
/// // Level 0 is the record the lookup starts on, level 1 the sequence below it.
/// let ctx = AddressingContext::at_levels([1]);
/// assert!(ctx.is_active());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressingContext {
    countdowns: Vec<isize>,
}

impl AddressingContext {
    /// Context that always uses literal indexes.
    pub fn new() -> Self {
        AddressingContext::default()
    }

    /// Context substituting the current index at the given container levels.
    pub fn at_levels(levels: impl IntoIterator<Item = usize>) -> Self {
        AddressingContext {
            countdowns: levels.into_iter().map(|level| level as isize).collect(),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.countdowns.is_empty()
    }

    /// Passes one container level.
    ///
    /// Returns `current` if a countdown is due at this level and the container
    /// has a current index, otherwise `literal`.
    pub(crate) fn resolve(&mut self, literal: usize, current: Option<usize>) -> usize {
        let mut idx = literal;
        for countdown in &mut self.countdowns {
            if *countdown == 0
                && let Some(current) = current
            {
                trace!(literal, current, "using current index");
                idx = current;
            }
            *countdown -= 1;
        }
        idx
    }

    /// Passes a record level; records have no index to substitute.
    pub(crate) fn pass(&mut self) {
        self.rewind(-1);
    }

    /// Moves every countdown back by `levels` (forward for negative values).
    pub(crate) fn rewind(&mut self, levels: isize) {
        for countdown in &mut self.countdowns {
            *countdown += levels;
        }
    }
}

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity handle of a record.
///
/// Fields keep the id of their root record as a non-owning back reference;
/// resolving it to the record is up to the caller, which passes the root in
/// explicitly wherever it is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    pub(crate) fn next() -> Self {
        RecordId(NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Where a node sits: its root record (if attached to one) and its path from
/// that root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Anchor {
    pub root: Option<RecordId>,
    pub path: IdxPath,
}

impl Anchor {
    pub fn root(root: RecordId) -> Self {
        Anchor {
            root: Some(root),
            path: IdxPath::new(),
        }
    }

    pub fn detached() -> Self {
        Anchor {
            root: None,
            path: IdxPath::new(),
        }
    }

    pub fn child(&self, seg: impl Into<super::IdxSeg>) -> Self {
        Anchor {
            root: self.root,
            path: self.path.join(seg),
        }
    }

    pub fn at(&self, path: IdxPath) -> Self {
        Anchor {
            root: self.root,
            path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_context_keeps_literal() {
        let mut ctx = AddressingContext::new();
        assert_eq!(ctx.resolve(3, Some(1)), 3);
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_countdown_substitutes_at_level() {
        let mut ctx = AddressingContext::at_levels([1]);
        ctx.pass();
        assert_eq!(ctx.resolve(0, Some(4)), 4);
        // Past the level, literals are used again.
        assert_eq!(ctx.resolve(2, Some(4)), 2);
    }

    #[test]
    fn test_missing_current_index_keeps_literal() {
        let mut ctx = AddressingContext::at_levels([0]);
        assert_eq!(ctx.resolve(2, None), 2);
    }

    #[test]
    fn test_rewind() {
        let mut ctx = AddressingContext::at_levels([0]);
        ctx.pass();
        ctx.rewind(1);
        assert_eq!(ctx.resolve(0, Some(9)), 9);
    }

    #[test]
    fn test_record_ids_are_unique() {
        assert_ne!(RecordId::next(), RecordId::next());
    }
}
