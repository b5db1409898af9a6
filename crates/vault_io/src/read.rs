//! Read handle driving a source through the filter chain.

use types::{Buffer, Error, Result, StringId, Variant};

use crate::group::FilterGroup;
use crate::DEFAULT_BUFFER_SIZE;

/// Source of raw bytes for an [`IoRead`].
pub trait ReadDriver {
    /// Opens the source. Returns `false` when the source is missing and the
    /// handle was configured to treat that as an empty stream.
    fn open(&mut self) -> Result<bool>;

    /// Fills up to `out.remains()` bytes and returns the count; zero means
    /// end of stream.
    fn read(&mut self, out: &mut Buffer) -> Result<usize>;

    /// Closes the source. The handle guarantees a single call.
    fn close(&mut self) -> Result<()>;
}

/// Stream read handle: a driver plus a filter group.
///
/// Valid call sequence is `open`, any number of `read`s, `close`. A read
/// returns zero only once the driver hit end of stream and the filter group
/// has drained its flush output.
pub struct IoRead {
    driver: Box<dyn ReadDriver>,
    group: FilterGroup,
    scratch: Buffer,
    buffer_size: usize,
    opened: bool,
    closed: bool,
    driver_eof: bool,
    eof_all: bool,
}

impl IoRead {
    /// Creates a handle with the default scratch buffer size.
    #[must_use]
    pub fn new(driver: Box<dyn ReadDriver>) -> Self {
        Self::with_buffer_size(driver, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a handle with an explicit scratch buffer size, which also
    /// sizes the filter group's intermediate buffers.
    #[must_use]
    pub fn with_buffer_size(driver: Box<dyn ReadDriver>, buffer_size: usize) -> Self {
        Self {
            driver,
            group: FilterGroup::new(),
            scratch: Buffer::new(0),
            buffer_size,
            opened: false,
            closed: false,
            driver_eof: false,
            eof_all: false,
        }
    }

    /// Filter chain, composable until `open`.
    pub fn filter_group_mut(&mut self) -> &mut FilterGroup {
        &mut self.group
    }

    /// Opens the driver and locks the filter chain.
    ///
    /// Returns `false` when the driver reported a missing source; the handle
    /// then serves an empty stream and reads hit EOF immediately.
    pub fn open(&mut self) -> Result<bool> {
        if self.opened {
            return Err(Error::assert("read handle is already open"));
        }

        let found = self.driver.open()?;
        self.group.open(self.buffer_size)?;
        self.scratch = Buffer::new(self.buffer_size);
        self.opened = true;

        if !found {
            self.driver_eof = true;
        }

        tracing::trace!(found, "read open");
        Ok(found)
    }

    /// True once the driver and the filter group are both exhausted.
    #[must_use]
    pub const fn eof(&self) -> bool {
        self.eof_all
    }

    /// Reads into `out` until it is full or the stream ends; returns the
    /// number of bytes appended.
    pub fn read(&mut self, out: &mut Buffer) -> Result<usize> {
        if !self.opened || self.closed {
            return Err(Error::assert("read handle is not open"));
        }

        let start = out.used();

        while !out.full() && !self.eof_all {
            // Pull fresh driver bytes only once the group consumed the last
            // batch
            if !self.group.input_same() && !self.driver_eof {
                self.scratch.clear_used();

                if self.driver.read(&mut self.scratch)? == 0 {
                    self.driver_eof = true;
                }
            }

            let input = if self.driver_eof && !self.group.input_same() {
                None
            } else {
                Some(&self.scratch)
            };

            self.group.process(input, out)?;

            if self.group.done() {
                self.eof_all = true;
            }
        }

        Ok(out.used() - start)
    }

    /// Closes the driver and publishes filter results.
    pub fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Err(Error::assert("read handle is not open"));
        }

        if !self.closed {
            self.closed = true;
            self.driver.close()?;
            self.group.close();
        }

        Ok(())
    }

    /// Terminal filter result, available after close.
    #[must_use]
    pub fn result(&self, kind: StringId) -> Option<&Variant> {
        self.group.result(kind)
    }

    /// The filter chain, for result inspection.
    #[must_use]
    pub const fn filter_group(&self) -> &FilterGroup {
        &self.group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_io::BufferRead;
    use crate::filter::Filter;
    use crate::size::{SizeFilter, SIZE_FILTER_TYPE};

    fn read_all(io: &mut IoRead, chunk: usize) -> Vec<u8> {
        let mut collected = Vec::new();
        let mut out = Buffer::new(chunk);

        while !io.eof() {
            out.clear_used();
            io.read(&mut out).expect("read");
            collected.extend_from_slice(out.bytes());
        }

        collected
    }

    #[test]
    fn plain_read_round_trip() {
        let driver = BufferRead::new(Buffer::from_slice(b"a sample stream"));
        let mut io = IoRead::with_buffer_size(Box::new(driver), 4);

        assert!(io.open().expect("open"));
        assert!(!io.eof());
        assert_eq!(read_all(&mut io, 3), b"a sample stream");

        // Reads at EOF return zero
        let mut out = Buffer::new(4);
        assert_eq!(io.read(&mut out).expect("read at eof"), 0);
        io.close().expect("close");
    }

    #[test]
    fn size_filter_counts_stream() {
        let driver = BufferRead::new(Buffer::from_slice(b"0123456789"));
        let mut io = IoRead::with_buffer_size(Box::new(driver), 4);
        io.filter_group_mut().push(Filter::sink(SizeFilter::new())).expect("push");

        io.open().expect("open");
        assert_eq!(read_all(&mut io, 7), b"0123456789");
        io.close().expect("close");

        assert_eq!(
            io.result(SIZE_FILTER_TYPE).expect("size").as_uint().expect("uint"),
            10
        );
    }

    #[test]
    fn read_before_open_is_rejected() {
        let driver = BufferRead::new(Buffer::from_slice(b"x"));
        let mut io = IoRead::new(Box::new(driver));

        let mut out = Buffer::new(4);
        let error = io.read(&mut out).expect_err("read before open");
        assert_eq!(error.kind(), types::ErrorKind::Assert);
    }

    #[test]
    fn empty_source_hits_eof_immediately() {
        let driver = BufferRead::new(Buffer::new(0));
        let mut io = IoRead::with_buffer_size(Box::new(driver), 4);

        io.open().expect("open");
        let mut out = Buffer::new(4);
        assert_eq!(io.read(&mut out).expect("read"), 0);
        assert!(io.eof());
        io.close().expect("close");
    }
}
