//! Pass-through rate-matching filter.

use types::{Buffer, Result, StringId, StringIdBits};

use crate::filter::StreamFilter;

/// Filter type id for [`BufferFilter`].
pub const BUFFER_FILTER_TYPE: StringId = StringId::pack(StringIdBits::Bit5, "buffer");

/// Copies input to output unchanged.
///
/// Useful when two neighbouring filters have mismatched buffer appetites and
/// an explicit staging buffer between them smooths the flow; it is also the
/// simplest possible transforming filter, which makes it the reference for
/// the `input_same` protocol.
#[derive(Default)]
pub struct BufferFilter {
    pos: usize,
    pending: usize,
    flushing: bool,
    done: bool,
    input_same: bool,
}

impl BufferFilter {
    /// Creates a new pass-through filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamFilter for BufferFilter {
    fn kind(&self) -> StringId {
        BUFFER_FILTER_TYPE
    }

    fn process(&mut self, input: Option<&Buffer>, out: &mut Buffer) -> Result<()> {
        match input {
            Some(input) => {
                if !self.input_same {
                    self.pos = 0;
                    self.pending = input.used();
                }

                let taken = out.append_limited(&input.bytes()[self.pos..]);
                self.pos += taken;
                self.input_same = self.pos < self.pending;
            }
            None => {
                self.flushing = true;
            }
        }

        if self.flushing && !self.input_same {
            self.done = true;
        }

        Ok(())
    }

    fn done(&self) -> bool {
        self.done
    }

    fn input_same(&self) -> bool {
        self.input_same
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_and_reports_input_same() {
        let mut filter = BufferFilter::new();
        let input = Buffer::from_slice(b"abcdef");
        let mut out = Buffer::new(4);

        filter.process(Some(&input), &mut out).expect("process");
        assert_eq!(out.bytes(), b"abcd");
        assert!(filter.input_same());
        assert!(!filter.done());

        out.clear_used();
        filter.process(Some(&input), &mut out).expect("same input");
        assert_eq!(out.bytes(), b"ef");
        assert!(!filter.input_same());

        filter.process(None, &mut out).expect("flush");
        assert!(filter.done());
    }
}
