// merstream: bit-packed k-mer codec and streaming builder.
//
// The codec packs 2-bit nucleotide codes into fixed-width words; the
// builder turns a base-at-a-time feed into forward / reverse-complement /
// canonical k-mers under four construction disciplines.

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod alphabet;
pub mod bitstream;
pub mod builder;
pub mod constants;
pub mod mer;
pub mod mer_file;
pub mod sequence;
pub mod stream;

// Re-export common types at crate root
pub use bitstream::{BitStreamError, PackedBitReader, PackedBitWriter};
pub use builder::{BuilderError, KmerBuilder};
pub use mer::{mer_from_sequence, HugeMer, Mer, MerCodec, TinyMer};
pub use mer_file::{MerFileError, MerFileHeader, MerFileReader, MerFileWriter};
pub use sequence::{FastaSource, SequenceRegistry, SequenceSource, SliceSource};
pub use stream::{MerStream, MerStreamStats};

/// Version information
pub fn version() -> (u8, u8, u8) {
    constants::VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let (major, minor, patch) = version();
        assert_eq!(major, 0);
        assert_eq!(minor, 1);
        assert_eq!(patch, 0);
    }
}
