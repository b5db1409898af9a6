//! Ordered filter chain with intermediate buffering.

use std::collections::BTreeMap;

use types::{Buffer, Error, Result, StringId, Variant};

use crate::filter::{Filter, SinkFilter, StreamFilter};

struct Stage {
    filter: Box<dyn StreamFilter>,
    output: Buffer,
    observers: Vec<Box<dyn SinkFilter>>,
}

/// Ordered chain of filters plus the intermediate buffers between them.
///
/// Transforming filters form the data path; observing filters attach to the
/// stream at their position in push order and see every byte that passes
/// there. The group makes no assumption that a filter's input and output
/// sizes match: each stage is driven until its upstream drains, and a stage
/// that cannot finish its input in one step reports `input_same` and is
/// re-presented the identical buffer.
pub struct FilterGroup {
    leading: Vec<Box<dyn SinkFilter>>,
    stages: Vec<Stage>,
    opened: bool,
    closed: bool,
    flushing: bool,
    // Passthrough consumption cursor, used only when there are no stages
    input_pos: usize,
    input_held: bool,
    results: BTreeMap<StringId, Variant>,
}

impl Default for FilterGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterGroup {
    /// Creates an empty group. An empty group passes data through unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self {
            leading: Vec::new(),
            stages: Vec::new(),
            opened: false,
            closed: false,
            flushing: false,
            input_pos: 0,
            input_held: false,
            results: BTreeMap::new(),
        }
    }

    /// Appends a filter to the chain.
    pub fn push(&mut self, filter: Filter) -> Result<()> {
        if self.opened {
            return Err(Error::assert("cannot add filter after open"));
        }

        match filter {
            Filter::Stream(filter) => self.stages.push(Stage {
                filter,
                output: Buffer::new(0),
                observers: Vec::new(),
            }),
            Filter::Sink(filter) => match self.stages.last_mut() {
                Some(stage) => stage.observers.push(filter),
                None => self.leading.push(filter),
            },
        }

        Ok(())
    }

    /// Number of filters in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leading.len()
            + self.stages.len()
            + self.stages.iter().map(|stage| stage.observers.len()).sum::<usize>()
    }

    /// True when no filters have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leading.is_empty() && self.stages.is_empty()
    }

    /// Allocates intermediate buffers and locks the chain.
    pub fn open(&mut self, buffer_size: usize) -> Result<()> {
        if self.opened {
            return Err(Error::assert("filter group is already open"));
        }

        // Every stage but the last gets an intermediate output buffer; the
        // last stage writes into the caller's buffer directly.
        let count = self.stages.len();
        for stage in self.stages.iter_mut().take(count.saturating_sub(1)) {
            stage.output = Buffer::new(buffer_size);
        }

        self.opened = true;
        Ok(())
    }

    /// True when the caller must re-present the same input buffer before
    /// supplying new data.
    #[must_use]
    pub fn input_same(&self) -> bool {
        match self.stages.first() {
            Some(stage) => stage.filter.input_same(),
            None => self.input_held,
        }
    }

    /// True when, after a flush, every filter is done and all intermediate
    /// buffers are drained.
    #[must_use]
    pub fn done(&self) -> bool {
        if !self.flushing {
            return false;
        }

        if self.stages.is_empty() {
            return !self.input_held;
        }

        self.stages
            .iter()
            .all(|stage| stage.filter.done() && stage.output.empty())
    }

    /// Runs one processing step: feeds `input` (or a flush when `None`) into
    /// the chain and appends whatever reaches the end to `output`.
    pub fn process(&mut self, input: Option<&Buffer>, output: &mut Buffer) -> Result<()> {
        if !self.opened || self.closed {
            return Err(Error::assert("filter group is not open"));
        }

        if self.done() {
            return Err(Error::assert("cannot process after filter group is done"));
        }

        match input {
            None => self.flushing = true,
            Some(_) if self.flushing => {
                return Err(Error::assert("cannot supply input after flush has begun"));
            }
            Some(_) => {}
        }

        // Fresh input is observed by the leading sinks exactly once
        let fresh = match input {
            Some(buffer) => !self.input_same() && !buffer.empty(),
            None => false,
        };

        if fresh {
            self.input_pos = 0;

            if let Some(buffer) = input {
                for observer in &mut self.leading {
                    observer.process(buffer.bytes())?;
                }
            }
        }

        if self.stages.is_empty() {
            if let Some(buffer) = input {
                let taken = output.append_limited(&buffer.bytes()[self.input_pos..]);
                self.input_pos += taken;
                self.input_held = self.input_pos < buffer.used();
            }

            return Ok(());
        }

        self.drive(input, output)
    }

    fn drive(&mut self, input: Option<&Buffer>, output: &mut Buffer) -> Result<()> {
        let stage_count = self.stages.len();
        let mut first_fed = false;

        loop {
            let mut progress = false;

            for index in 0..stage_count {
                let last = index + 1 == stage_count;
                let filter_done = self.stages[index].filter.done();
                let filter_same = self.stages[index].filter.input_same();

                // A done filter never runs again; whatever arrives after its
                // stream ended is discarded so upstream stages stay drained
                if filter_done {
                    if index > 0 && !self.stages[index - 1].output.empty() {
                        self.stages[index - 1].output.clear_used();
                        progress = true;
                    }

                    continue;
                }

                // Upstream data availability
                let upstream_ready = if index == 0 {
                    match input {
                        Some(buffer) => !buffer.empty() && (filter_same || !first_fed),
                        None => false,
                    }
                } else {
                    !self.stages[index - 1].output.empty()
                };

                // A stage flushes once everything above it has finished
                let flush_ready = self.flushing
                    && !filter_done
                    && if index == 0 {
                        true
                    } else {
                        self.stages[index - 1].filter.done()
                            && self.stages[index - 1].output.empty()
                    };

                if !(upstream_ready || flush_ready) {
                    continue;
                }

                // Downstream space: intermediates are written only when fully
                // drained so observers see each byte exactly once
                let sink_ready = if last {
                    !output.full()
                } else {
                    self.stages[index].output.empty()
                };

                if !sink_ready {
                    continue;
                }

                let (upstream, stage) = {
                    let (left, right) = self.stages.split_at_mut(index);
                    (left.last().map(|stage| &stage.output), &mut right[0])
                };

                let stage_input = if upstream_ready {
                    if index == 0 {
                        input
                    } else {
                        upstream
                    }
                } else {
                    None
                };

                if last {
                    let pre_used = output.used();
                    stage.filter.process(stage_input, output)?;

                    if output.used() > pre_used {
                        progress = true;

                        for observer in &mut stage.observers {
                            observer.process(&output.bytes()[pre_used..])?;
                        }
                    }
                } else {
                    // Intermediate buffers are drained before refill, so the
                    // whole content is the fresh delta
                    let mut sink = std::mem::replace(&mut stage.output, Buffer::new(0));
                    let result = stage.filter.process(stage_input, &mut sink);

                    if !sink.empty() {
                        progress = true;

                        for observer in &mut stage.observers {
                            observer.process(sink.bytes())?;
                        }
                    }

                    stage.output = sink;
                    result?;
                }

                let same_after = stage.filter.input_same();
                let done_after = stage.filter.done();

                if index == 0 && upstream_ready {
                    first_fed = true;
                }

                // Full consumption releases the upstream buffer for refill
                if upstream_ready && !same_after {
                    progress = true;

                    if index > 0 {
                        self.stages[index - 1].output.clear_used();
                    }
                }

                if done_after != filter_done || same_after != filter_same {
                    progress = true;
                }
            }

            if !progress || output.full() {
                break;
            }
        }

        Ok(())
    }

    /// Closes the group and publishes terminal filter results.
    ///
    /// Results are keyed by filter type id; when a type occurs more than
    /// once, the last filter wins.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        for observer in &self.leading {
            if let Some(result) = observer.result() {
                self.results.insert(observer.kind(), result);
            }
        }

        for stage in &self.stages {
            if let Some(result) = stage.filter.result() {
                self.results.insert(stage.filter.kind(), result);
            }

            for observer in &stage.observers {
                if let Some(result) = observer.result() {
                    self.results.insert(observer.kind(), result);
                }
            }
        }

        self.closed = true;
    }

    /// Returns a terminal filter result after close.
    #[must_use]
    pub fn result(&self, kind: StringId) -> Option<&Variant> {
        self.results.get(&kind)
    }

    /// All published results, available after close.
    #[must_use]
    pub const fn results(&self) -> &BTreeMap<StringId, Variant> {
        &self.results
    }
}
