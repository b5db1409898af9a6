//! Filter capability traits.

use types::{Buffer, Result, StringId, Variant};

/// Transforming filter: consumes input buffers, produces output bytes.
///
/// The processing contract mirrors a restartable generator:
///
/// - `process(Some(input), out)` loads new input unless the filter still
///   holds unconsumed bytes from the previous call (`input_same`), in which
///   case the caller must re-present the identical buffer and the filter
///   continues from its internal position.
/// - `process(None, out)` signals end of stream; the filter flushes. After a
///   flush call `done` may become true; it never becomes true before one.
/// - The filter never writes more than `out.remains()` bytes per call.
pub trait StreamFilter {
    /// Filter type id, the key under which a result (if any) is published.
    fn kind(&self) -> StringId;

    /// Processes one step. `input` of `None` means flush.
    fn process(&mut self, input: Option<&Buffer>, out: &mut Buffer) -> Result<()>;

    /// True when the filter has emitted everything it will ever emit.
    fn done(&self) -> bool;

    /// True when the last input buffer was not fully consumed and must be
    /// re-presented unchanged on the next call.
    fn input_same(&self) -> bool;

    /// Terminal computed value, readable once `done` is true.
    fn result(&self) -> Option<Variant> {
        None
    }
}

/// Observing filter: sees every byte at its position in the chain without
/// altering the stream, and publishes a computed result.
pub trait SinkFilter {
    /// Filter type id, the key under which the result is published.
    fn kind(&self) -> StringId;

    /// Observes a run of bytes. Each byte of the stream is presented exactly
    /// once, in order.
    fn process(&mut self, input: &[u8]) -> Result<()>;

    /// Terminal computed value.
    fn result(&self) -> Option<Variant>;
}

/// A filter tagged with its capability.
pub enum Filter {
    /// Transforming filter.
    Stream(Box<dyn StreamFilter>),
    /// Observing filter.
    Sink(Box<dyn SinkFilter>),
}

impl Filter {
    /// Wraps a transforming filter.
    #[must_use]
    pub fn stream(filter: impl StreamFilter + 'static) -> Self {
        Self::Stream(Box::new(filter))
    }

    /// Wraps an observing filter.
    #[must_use]
    pub fn sink(filter: impl SinkFilter + 'static) -> Self {
        Self::Sink(Box::new(filter))
    }

    /// Filter type id.
    #[must_use]
    pub fn kind(&self) -> StringId {
        match self {
            Self::Stream(filter) => filter.kind(),
            Self::Sink(filter) => filter.kind(),
        }
    }
}
