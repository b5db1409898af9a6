//! Content hash filter.

use checksums::{DigestAlgorithm, DigestContext};
use types::{Result, StringId, StringIdBits, Variant};
use vault_io::SinkFilter;

/// Filter type id for [`HashFilter`].
pub const HASH_FILTER_TYPE: StringId = StringId::pack(StringIdBits::Bit5, "hash");

/// Computes a running digest of the stream at its position in the chain and
/// publishes it as a lowercase hex string.
pub struct HashFilter {
    context: DigestContext,
}

impl HashFilter {
    /// Creates a hash filter for `algorithm`.
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            context: DigestContext::new(algorithm),
        }
    }
}

impl SinkFilter for HashFilter {
    fn kind(&self) -> StringId {
        HASH_FILTER_TYPE
    }

    fn process(&mut self, input: &[u8]) -> Result<()> {
        self.context.update(input);
        Ok(())
    }

    fn result(&self) -> Option<Variant> {
        Some(Variant::String(self.context.clone().finish_hex()))
    }
}
