//! Hierarchical records shared between a canonical form and any number of
//! backend systems.
//!
//! A [`Record`] is an ordered map of [`Field`]s. Every field keeps its data as
//! aspects keyed by [`Scope`]: the canonical scope holds the application's
//! view, `(system, direction)` scopes hold what a backend calls the field,
//! the value it sent or will receive, and how to convert or validate on the
//! way.
//!
//! # Core Types
//!
//! - [`Record`] - one entity, with [`pull`](Record::pull) and
//!   [`push`](Record::push) to move values between canonical and backend form
//! - [`Field`] - a named leaf or container holding per-scope aspects
//! - [`Values`] / [`Records`] - index addressed sequences with a current-index
//!   cursor
//! - [`IdxPath`] - the addressing scheme (`B/0/X`, or the flat `B0X`)
//! - [`SystemSchema`] - declarative backend field mappings
//!
//! # Sharing
//!
//! Copies share nodes with their source until either side writes; see
//! [`Depth`] for how far a copy duplicates eagerly.

pub mod addressing;
pub mod aspect;
pub mod callable;
pub mod compare;
pub mod copy;
pub mod errors;
pub mod export;
pub mod field;
pub mod node;
pub mod path;
pub mod rec;
pub mod schema;
pub mod sequence;
pub mod value;

pub use addressing::{AddressingContext, RecordId};
pub use aspect::{
    AspectKey, AspectType, Direction, Scope, SystemId, aspect_key, direction_of, system_of,
};
pub use callable::{Action, Calculator, Converter, FieldCtx, Filter, Validator};
pub use copy::{ALL_FIELDS, CopyOpts, Depth, FieldPatches, PatchValue};
pub use errors::RecordError;
pub use export::{DictOpts, KeyType, LeafNameOpts, LeafNameType};
pub use field::{Aspect, Field};
pub use node::{Child, Node, NodeKind, NodeRef, WriteOpts};
pub use path::{IDX_PATH_SEP, IdxPath, IdxSeg};
pub use rec::Record;
pub use schema::{Cell, FieldIndexMap, SchemaField, SchemaRow, SystemSchema};
pub use sequence::{Records, Sequence, Values, string_to_records};
pub use value::{Atom, EMPTY, Value};
