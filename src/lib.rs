//! Virtualized, random-access byte streams over sparse data.
//!
//! Disk-image and file-system code deals in large address spaces that are
//! mostly logically zero. This crate provides the shared core those layers
//! build on:
//!
//! - [`Extent`]: a contiguous byte range plus the pure set algebra
//!   (`union` / `intersect` / `subtract`) over sorted, disjoint extent sets
//! - [`SparseStream`]: random-access streams that expose their stored extents;
//!   uncovered offsets read as zero ([`SparseMemStream`] is the in-memory one)
//! - [`ByteStore`]: the minimal byte-range contract a physical backing
//!   resource must satisfy ([`MemStore`], [`FileStore`])
//! - [`StreamBuilder`] / [`BuilderExtent`]: compose heterogeneous on-demand
//!   content sources into one logical sparse stream, later registration
//!   winning in overlaps
//! - [`SharedStream`] / [`StreamView`]: many independently-positioned cursors
//!   over one physical stream behind a single mutual-exclusion gate
//!
//! What bytes *mean* (disk-format headers, file-system semantics) is out of
//! scope; this crate only decides where bytes live and how access to them is
//! composed and serialized.

mod builder;
mod error;
mod extent;
mod record;
mod shared;
mod sparse;
mod store;
mod util;

pub use builder::{
    BufferExtent, BuilderExtent, BuiltStream, FileExtent, RecordExtent, StoreExtent, StreamBuilder,
};
pub use error::{Result, StreamError};
pub use extent::{intersect, is_normalized, subtract, union, Extent};
pub use record::ByteRecord;
pub use shared::{SharedStream, StreamView};
pub use sparse::{PumpStats, SparseMemStream, SparseStream, StreamPump, DEFAULT_PUMP_CHUNK};
pub use store::{ByteStore, FileStore, MemStore};

#[cfg(test)]
mod proptests;
