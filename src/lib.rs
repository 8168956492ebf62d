//! # Firebase Realtime Database synchronization core
//!
//! This crate ports the write-reconciliation and view-cache core of the
//! Realtime Database client to Rust: the pending-write ledger, the compound
//! patch structure it is built on, the dual local/server cache model, and the
//! operation-application engine that turns server and user events into
//! ordered change notifications.
//!
//! Transport, listener dispatch, persistence and the other products of the
//! SDK are out of scope here; this is the pure, single-threaded sync engine
//! they plug into.
//!
//! ## Features
//!
//! - [`CompoundWrite`]: immutable path-indexed patches with merge, slice and
//!   apply operations
//! - [`WriteTree`] / [`WriteTreeRef`]: the ordered pending-write ledger with
//!   event-cache reconciliation queries
//! - [`CacheNode`] / [`ViewCache`]: completeness-tagged local and server
//!   snapshots
//! - [`ViewProcessor`]: applies overwrites, merges, acknowledgements, reverts
//!   and listen-complete markers, emitting [`Change`] lists for listeners
//! - Query-aware filtering ([`IndexedFilter`], [`RangedFilter`],
//!   [`LimitedFilter`]) driven by [`QueryParams`]
//!
//! ## Quick Start Example
//!
//! ```
//! use firebase_rtdb_sync::core::{Operation, OperationSource, OverwriteVisibility, WriteTree};
//! use firebase_rtdb_sync::path::Path;
//! use firebase_rtdb_sync::query::QueryParams;
//! use firebase_rtdb_sync::view::{
//!     variant_filter_from_query_params, CacheNode, IndexedVariant, ViewCache, ViewProcessor,
//! };
//! use serde_json::json;
//!
//! // A pending local write layered over server state.
//! let mut writes = WriteTree::new();
//! writes.add_overwrite(
//!     Path::new("messages/greeting"),
//!     json!("hello"),
//!     1,
//!     OverwriteVisibility::Visible,
//! );
//!
//! // A view over the root, fed a server overwrite.
//! let processor = ViewProcessor::new(variant_filter_from_query_params(&QueryParams::default()));
//! let old_cache = ViewCache::new(
//!     CacheNode::new(IndexedVariant::new(json!({})), false, false),
//!     CacheNode::new(IndexedVariant::new(json!({})), false, false),
//! );
//! let operation = Operation::overwrite(
//!     OperationSource::server(),
//!     Path::root(),
//!     json!({ "messages": { "greeting": "hi" } }),
//! );
//!
//! let writes_ref = writes.child_writes(Path::root());
//! let (new_cache, changes) = processor.apply_operation(&old_cache, &operation, &writes_ref, None);
//!
//! // The local write shadows the server value in the event cache.
//! assert_eq!(
//!     new_cache.local_snap().variant(),
//!     &json!({ "messages": { "greeting": "hello" } })
//! );
//! assert!(!changes.is_empty());
//! ```

pub mod core;
pub mod error;
pub mod logger;
pub mod path;
pub mod query;
pub mod util;
pub mod variant;
pub mod view;

#[doc(inline)]
pub use crate::core::{
    CompoundWrite, HiddenWriteInclusion, IterationDirection, Operation, OperationKind,
    OperationSource, OverwriteVisibility, UserWrite, UserWriteRecord, WriteId, WriteTree,
    WriteTreeRef,
};

#[doc(inline)]
pub use error::{DatabaseError, DatabaseErrorCode, DatabaseResult};

#[doc(inline)]
pub use path::Path;

#[doc(inline)]
pub use query::{QueryBound, QueryIndex, QueryLimit, QueryParams};

#[doc(inline)]
pub use view::{
    variant_filter_from_query_params, CacheNode, Change, ChildChangeAccumulator,
    CompleteChildSource, EventType, IndexedFilter, IndexedVariant, LimitedFilter, RangedFilter,
    VariantFilter, ViewCache, ViewProcessor,
};
