//! Compress and decompress filter state machines.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use types::{Buffer, Error, Result, StringId, StringIdBits};
use vault_io::StreamFilter;

/// Filter type id for [`GzipCompress`].
pub const COMPRESS_FILTER_TYPE: StringId = StringId::pack(StringIdBits::Bit5, "gz-cmp");

/// Filter type id for [`GzipDecompress`].
pub const DECOMPRESS_FILTER_TYPE: StringId = StringId::pack(StringIdBits::Bit5, "gz-dcmp");

fn compression(level: i32) -> Result<Compression> {
    match level {
        -1 => Ok(Compression::default()),
        0..=9 => Ok(Compression::new(level as u32)),
        _ => Err(Error::assert(format!(
            "compression level {level} must be between -1 and 9"
        ))),
    }
}

/// DEFLATE compressor.
#[derive(Debug)]
pub struct GzipCompress {
    stream: Compress,
    in_pos: usize,
    input_same: bool,
    flushing: bool,
    done: bool,
}

impl GzipCompress {
    /// Creates a compressor.
    ///
    /// `level` is `-1` for the zlib default or an explicit `0..=9`. With
    /// `raw` set the output is a bare DEFLATE stream without gzip framing.
    pub fn new(level: i32, raw: bool) -> Result<Self> {
        let level = compression(level)?;

        let stream = if raw {
            Compress::new(level, false)
        } else {
            Compress::new_gzip(level, 15)
        };

        Ok(Self {
            stream,
            in_pos: 0,
            input_same: false,
            flushing: false,
            done: false,
        })
    }
}

impl StreamFilter for GzipCompress {
    fn kind(&self) -> StringId {
        COMPRESS_FILTER_TYPE
    }

    fn process(&mut self, input: Option<&Buffer>, out: &mut Buffer) -> Result<()> {
        if self.done {
            return Err(Error::assert("compress filter is done"));
        }

        match input {
            Some(input) => {
                if !self.input_same {
                    self.in_pos = 0;
                }

                let data = &input.bytes()[self.in_pos..];
                let in_before = self.stream.total_in();
                let out_before = self.stream.total_out();

                let status = self
                    .stream
                    .compress(data, out.tail_mut(), FlushCompress::None)
                    .map_err(|error| Error::format(format!("unable to compress: {error}")))?;

                // BufError is a no-progress signal, not a failure
                debug_assert!(!matches!(status, Status::StreamEnd));

                self.in_pos += (self.stream.total_in() - in_before) as usize;
                out.add_used((self.stream.total_out() - out_before) as usize);
                self.input_same = self.in_pos < input.used();
            }
            None => {
                self.flushing = true;

                let out_before = self.stream.total_out();
                let status = self
                    .stream
                    .compress(&[], out.tail_mut(), FlushCompress::Finish)
                    .map_err(|error| Error::format(format!("unable to finish compression: {error}")))?;

                out.add_used((self.stream.total_out() - out_before) as usize);

                if matches!(status, Status::StreamEnd) {
                    self.done = true;
                }
            }
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

/// DEFLATE decompressor.
pub struct GzipDecompress {
    stream: Decompress,
    in_pos: usize,
    input_same: bool,
    done: bool,
}

impl GzipDecompress {
    /// Creates a decompressor for the gzip or `raw` framing.
    #[must_use]
    pub fn new(raw: bool) -> Self {
        let stream = if raw {
            Decompress::new(false)
        } else {
            Decompress::new_gzip(15)
        };

        Self {
            stream,
            in_pos: 0,
            input_same: false,
            done: false,
        }
    }
}

impl StreamFilter for GzipDecompress {
    fn kind(&self) -> StringId {
        DECOMPRESS_FILTER_TYPE
    }

    fn process(&mut self, input: Option<&Buffer>, out: &mut Buffer) -> Result<()> {
        if self.done {
            return Err(Error::assert("decompress filter is done"));
        }

        match input {
            Some(input) => {
                if !self.input_same {
                    self.in_pos = 0;
                }

                let data = &input.bytes()[self.in_pos..];
                let in_before = self.stream.total_in();
                let out_before = self.stream.total_out();

                let status = self
                    .stream
                    .decompress(data, out.tail_mut(), FlushDecompress::None)
                    .map_err(|error| Error::format(format!("unable to decompress: {error}")))?;

                self.in_pos += (self.stream.total_in() - in_before) as usize;
                out.add_used((self.stream.total_out() - out_before) as usize);

                self.done = matches!(status, Status::StreamEnd);
                self.input_same = if self.done {
                    false
                } else {
                    self.in_pos < input.used()
                };
            }
            None => {
                // End of input without a stream end marker: give the stream a
                // chance to emit buffered output, then report truncation
                let out_before = self.stream.total_out();

                let status = self
                    .stream
                    .decompress(&[], out.tail_mut(), FlushDecompress::Finish)
                    .map_err(|error| Error::format(format!("unable to decompress: {error}")))?;

                let produced = (self.stream.total_out() - out_before) as usize;
                out.add_used(produced);

                if matches!(status, Status::StreamEnd) {
                    self.done = true;
                } else if produced == 0 {
                    return Err(Error::format("unexpected eof in compressed data"));
                }
            }
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
