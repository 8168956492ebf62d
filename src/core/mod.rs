//! The pending-write ledger and the value types it is built from.

pub mod compound_write;
pub mod operation;
pub mod tree;
pub mod write_tree;

#[doc(inline)]
pub use compound_write::CompoundWrite;

#[doc(inline)]
pub use operation::{AckStatus, Operation, OperationKind, OperationSource, SourceKind};

#[doc(inline)]
pub use tree::Tree;

#[doc(inline)]
pub use write_tree::{
    HiddenWriteInclusion, IterationDirection, OverwriteVisibility, UserWrite, UserWriteRecord,
    WriteId, WriteTree, WriteTreeRef,
};
