//! Running byte count filter.

use types::{Result, StringId, StringIdBits, Variant};

use crate::filter::SinkFilter;

/// Filter type id for [`SizeFilter`].
pub const SIZE_FILTER_TYPE: StringId = StringId::pack(StringIdBits::Bit5, "size");

/// Counts the bytes that pass its position in the chain.
///
/// Placed before a compressor it reports the raw size, after it the stored
/// size; call sites use the two to report transferred byte counts.
#[derive(Default)]
pub struct SizeFilter {
    size: u64,
}

impl SizeFilter {
    /// Creates a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SinkFilter for SizeFilter {
    fn kind(&self) -> StringId {
        SIZE_FILTER_TYPE
    }

    fn process(&mut self, input: &[u8]) -> Result<()> {
        self.size += input.len() as u64;
        Ok(())
    }

    fn result(&self) -> Option<Variant> {
        Some(Variant::UInt(self.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_across_chunks() {
        let mut filter = SizeFilter::new();
        filter.process(b"abc").expect("process");
        filter.process(b"").expect("process");
        filter.process(b"defgh").expect("process");

        assert_eq!(filter.result().expect("result").as_uint().expect("uint"), 8);
        assert_eq!(filter.kind().to_string(), "size");
    }
}
