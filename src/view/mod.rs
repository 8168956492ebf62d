//! The view layer: cached snapshots, query filters, and the processor that
//! reconciles operations against them.

pub mod change;
pub mod indexed_filter;
pub mod indexed_variant;
pub mod limited_filter;
pub mod ranged_filter;
pub mod variant_filter;
pub mod view_cache;
pub mod view_processor;

#[doc(inline)]
pub use change::{Change, ChildChangeAccumulator, EventType};

#[doc(inline)]
pub use indexed_filter::IndexedFilter;

#[doc(inline)]
pub use indexed_variant::IndexedVariant;

#[doc(inline)]
pub use limited_filter::LimitedFilter;

#[doc(inline)]
pub use ranged_filter::RangedFilter;

#[doc(inline)]
pub use variant_filter::{
    variant_filter_from_query_params, CompleteChildSource, NoCompleteSource, VariantFilter,
};

#[doc(inline)]
pub use view_cache::{CacheNode, ViewCache};

#[doc(inline)]
pub use view_processor::ViewProcessor;
