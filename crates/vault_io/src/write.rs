//! Write handle driving caller data through the filter chain to a sink.

use types::{Buffer, Error, Result, StringId, Variant};

use crate::group::FilterGroup;
use crate::DEFAULT_BUFFER_SIZE;

/// Destination for the bytes leaving an [`IoWrite`].
///
/// A driver that buffers partial state (temp file, multipart upload) must
/// discard or abort it in its `Drop` impl when `close` never ran; the handle
/// guarantees `close` is called at most once.
pub trait WriteDriver {
    /// Opens the sink.
    fn open(&mut self) -> Result<()>;

    /// Accepts a batch of transformed bytes.
    fn write(&mut self, input: &Buffer) -> Result<()>;

    /// Flushes and commits the sink.
    fn close(&mut self) -> Result<()>;
}

/// Stream write handle: a filter group plus a sink driver.
///
/// `close` sends the end-of-stream flush through the chain, hands the final
/// bytes to the driver, and commits it; terminal filter results become
/// readable afterwards.
pub struct IoWrite {
    driver: Box<dyn WriteDriver>,
    group: FilterGroup,
    out: Buffer,
    buffer_size: usize,
    opened: bool,
    closed: bool,
}

impl IoWrite {
    /// Creates a handle with the default staging buffer size.
    #[must_use]
    pub fn new(driver: Box<dyn WriteDriver>) -> Self {
        Self::with_buffer_size(driver, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a handle with an explicit staging buffer size.
    #[must_use]
    pub fn with_buffer_size(driver: Box<dyn WriteDriver>, buffer_size: usize) -> Self {
        Self {
            driver,
            group: FilterGroup::new(),
            out: Buffer::new(0),
            buffer_size,
            opened: false,
            closed: false,
        }
    }

    /// Filter chain, composable until `open`.
    pub fn filter_group_mut(&mut self) -> &mut FilterGroup {
        &mut self.group
    }

    /// Opens the driver and locks the filter chain.
    pub fn open(&mut self) -> Result<()> {
        if self.opened {
            return Err(Error::assert("write handle is already open"));
        }

        self.driver.open()?;
        self.group.open(self.buffer_size)?;
        self.out = Buffer::new(self.buffer_size);
        self.opened = true;

        tracing::trace!("write open");
        Ok(())
    }

    /// Pushes `input` through the chain, handing full staging buffers to the
    /// driver as they fill.
    pub fn write(&mut self, input: &Buffer) -> Result<()> {
        if !self.opened || self.closed {
            return Err(Error::assert("write handle is not open"));
        }

        if input.empty() {
            return Ok(());
        }

        loop {
            self.group.process(Some(input), &mut self.out)?;

            if self.out.full() {
                self.driver.write(&self.out)?;
                self.out.clear_used();
            }

            if !self.group.input_same() {
                break;
            }
        }

        Ok(())
    }

    /// Flushes the chain, writes the remaining bytes, and commits the driver.
    pub fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Err(Error::assert("write handle is not open"));
        }

        if self.closed {
            return Ok(());
        }

        while !self.group.done() {
            self.group.process(None, &mut self.out)?;

            if self.out.full() {
                self.driver.write(&self.out)?;
                self.out.clear_used();
            }
        }

        if !self.out.empty() {
            self.driver.write(&self.out)?;
            self.out.clear_used();
        }

        self.closed = true;
        self.driver.close()?;
        self.group.close();

        tracing::trace!("write close");
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
