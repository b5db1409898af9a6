#![deny(unsafe_code)]

//! # Overview
//!
//! The streaming pipeline that every byte moving through pgvault passes
//! through. An [`IoRead`] pulls from a [`ReadDriver`] (file, object-store
//! body, remote peer), pushes the bytes through an ordered [`FilterGroup`],
//! and hands the transformed stream to the caller's buffer; [`IoWrite`]
//! mirrors this toward a [`WriteDriver`]. Filters have non-uniform input and
//! output appetites - a compressor may consume a buffer and emit nothing, a
//! cipher may emit more than it consumed on the final block - so the group
//! drives them with small intermediate buffers and the `input_same`
//! re-presentation protocol rather than assuming size symmetry.
//!
//! # Design
//!
//! Two filter shapes exist: [`StreamFilter`] transforms bytes and owns the
//! `done`/`input_same` state machine; [`SinkFilter`] observes the stream
//! without altering it and holds a computed result (digest, byte count) for
//! retrieval after close. The [`Filter`] enum tags the two capabilities so a
//! group is an ordered, heterogeneous chain.
//!
//! The handles enforce the open / read-or-write / close lifecycle and close
//! the driver exactly once; write drivers discard or abort their partial
//! state on drop when close never ran.

pub mod buffer_filter;
pub mod buffer_io;
pub mod filter;
pub mod group;
pub mod read;
pub mod size;
pub mod write;

pub use buffer_filter::{BufferFilter, BUFFER_FILTER_TYPE};
pub use buffer_io::{shared_buffer, BufferRead, BufferWrite, SharedBuffer};
pub use filter::{Filter, SinkFilter, StreamFilter};
pub use group::FilterGroup;
pub use read::{IoRead, ReadDriver};
pub use size::{SizeFilter, SIZE_FILTER_TYPE};
pub use write::{IoWrite, WriteDriver};

/// Default size for the scratch and intermediate buffers that carry data
/// between the driver and the filter chain.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
