#![deny(unsafe_code)]

//! # Overview
//!
//! DEFLATE stream filters. [`GzipCompress`] and [`GzipDecompress`] wrap
//! zlib's streaming interface behind the pipeline's [`StreamFilter`]
//! contract: input buffers are consumed across calls via the `input_same`
//! protocol, output never exceeds the space offered, and end of stream is an
//! explicit flush that drains the encoder's final blocks.
//!
//! # Wire Format
//!
//! Two framings are produced. The gzip variant carries the usual gzip header
//! and CRC trailer and is what lands in the repository. The `raw` variant is
//! a bare DEFLATE stream with no header or checksum, used where an outer
//! envelope already identifies and frames the payload.
//!
//! A no-progress return from zlib is not an error; it means the stream needs
//! more input or more output space and the pipeline will come back around.
//! Anything else unexpected is a `FormatError`.

mod gzip;

pub use gzip::{GzipCompress, GzipDecompress, COMPRESS_FILTER_TYPE, DECOMPRESS_FILTER_TYPE};

#[cfg(test)]
mod tests {
    use types::Buffer;
    use vault_io::{shared_buffer, BufferWrite, Filter, IoWrite};

    use super::*;

    /// Pushes `input` through `filters` in `chunk`-sized writes with small
    /// staging buffers, returning the transformed stream.
    fn pump(filters: Vec<Filter>, input: &[u8], chunk: usize, buffer_size: usize) -> Vec<u8> {
        let target = shared_buffer();
        let mut io = IoWrite::with_buffer_size(Box::new(BufferWrite::new(target.clone())), buffer_size);

        for filter in filters {
            io.filter_group_mut().push(filter).expect("push");
        }

        io.open().expect("open");

        for part in input.chunks(chunk.max(1)) {
            io.write(&Buffer::from_slice(part)).expect("write");
        }

        io.close().expect("close");

        let result = target.borrow().bytes().to_vec();
        result
    }

    #[test]
    fn gzip_round_trip_in_small_chunks() {
        let input = b"this is a sample file\n";

        let compressed = pump(
            vec![Filter::stream(GzipCompress::new(6, false).expect("compress"))],
            input,
            7,
            16,
        );
        assert_ne!(compressed.as_slice(), input.as_slice());

        let decompressed = pump(
            vec![Filter::stream(GzipDecompress::new(false))],
            &compressed,
            7,
            16,
        );
        assert_eq!(decompressed, input);
    }

    #[test]
    fn compress_then_decompress_in_one_group() {
        let input = b"this is a sample file\n";

        let output = pump(
            vec![
                Filter::stream(GzipCompress::new(6, false).expect("compress")),
                Filter::stream(GzipDecompress::new(false)),
            ],
            input,
            7,
            16,
        );

        assert_eq!(output, input);
    }

    #[test]
    fn all_levels_and_framings_round_trip() {
        let input = b"repeated payload so compression has something to chew on ".repeat(17);

        for level in -1..=9 {
            for raw in [false, true] {
                let compressed = pump(
                    vec![Filter::stream(GzipCompress::new(level, raw).expect("level valid"))],
                    &input,
                    997,
                    4096,
                );

                let decompressed = pump(
                    vec![Filter::stream(GzipDecompress::new(raw))],
                    &compressed,
                    997,
                    4096,
                );

                assert_eq!(decompressed, input, "level {level} raw {raw}");
            }
        }
    }

    #[test]
    fn raw_framing_is_smaller_than_gzip() {
        let input = b"0123456789".repeat(100);

        let gzip = pump(
            vec![Filter::stream(GzipCompress::new(6, false).expect("gzip"))],
            &input,
            64,
            4096,
        );
        let raw = pump(
            vec![Filter::stream(GzipCompress::new(6, true).expect("raw"))],
            &input,
            64,
            4096,
        );

        // gzip adds a 10-byte header plus an 8-byte trailer
        assert!(raw.len() < gzip.len());
    }

    #[test]
    fn empty_input_produces_valid_stream() {
        let compressed = pump(
            vec![Filter::stream(GzipCompress::new(6, false).expect("compress"))],
            b"",
            1,
            16,
        );
        assert!(!compressed.is_empty(), "empty stream still has framing");

        let decompressed = pump(
            vec![Filter::stream(GzipDecompress::new(false))],
            &compressed,
            3,
            16,
        );
        assert!(decompressed.is_empty());
    }

    #[test]
    fn truncated_stream_is_a_format_error() {
        let input = b"a stream that will be cut short".repeat(8);
        let mut compressed = pump(
            vec![Filter::stream(GzipCompress::new(6, false).expect("compress"))],
            &input,
            64,
            4096,
        );
        compressed.truncate(compressed.len() / 2);

        let target = shared_buffer();
        let mut io = IoWrite::with_buffer_size(Box::new(BufferWrite::new(target)), 4096);
        io.filter_group_mut()
            .push(Filter::stream(GzipDecompress::new(false)))
            .expect("push");
        io.open().expect("open");
        io.write(&Buffer::from_slice(&compressed)).expect("write");

        let error = io.close().expect_err("truncated stream");
        assert_eq!(error.kind(), types::ErrorKind::Format);
    }

    #[test]
    fn corrupt_stream_is_a_format_error() {
        let target = shared_buffer();
        let mut io = IoWrite::with_buffer_size(Box::new(BufferWrite::new(target)), 4096);
        io.filter_group_mut()
            .push(Filter::stream(GzipDecompress::new(false)))
            .expect("push");
        io.open().expect("open");

        let error = io
            .write(&Buffer::from_slice(b"this is not a gzip stream at all"))
            .expect_err("corrupt stream");
        assert_eq!(error.kind(), types::ErrorKind::Format);
    }

    #[test]
    fn invalid_level_is_rejected() {
        let error = GzipCompress::new(10, false).expect_err("level out of range");
        assert_eq!(error.kind(), types::ErrorKind::Assert);

        let error = GzipCompress::new(-2, false).expect_err("level out of range");
        assert_eq!(error.kind(), types::ErrorKind::Assert);
    }
}
