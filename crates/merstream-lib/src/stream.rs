//! Streaming driver: a sequence source feeding a k-mer builder.

use crate::builder::KmerBuilder;
use crate::mer::MerCodec;
use crate::sequence::SequenceSource;

/// Counters accumulated while streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MerStreamStats {
    /// Bases pulled from the source.
    pub bases_consumed: u64,
    /// Completed mers reported.
    pub mers_produced: u64,
    /// Unknown symbols absorbed by the builder.
    pub invalid_symbols: u64,
}

/// Pulls bases from a [`SequenceSource`] and advances a [`KmerBuilder`]
/// until a mer completes.
///
/// ```
/// use merstream_lib::{KmerBuilder, MerStream, SliceSource, TinyMer};
///
/// let builder = KmerBuilder::<TinyMer>::contiguous(3).unwrap();
/// let mut stream = MerStream::new(builder, SliceSource::from(b"ACGTT".as_slice()));
/// let mut mers = Vec::new();
/// while stream.next_mer() {
///     mers.push(stream.forward_mer().to_string());
/// }
/// assert_eq!(mers, ["ACG", "CGT", "GTT"]);
/// ```
pub struct MerStream<M: MerCodec, S: SequenceSource> {
    builder: KmerBuilder<M>,
    source: S,
    stats: MerStreamStats,
}

impl<M: MerCodec, S: SequenceSource> MerStream<M, S> {
    /// Couple a builder to a source.
    pub fn new(builder: KmerBuilder<M>, source: S) -> Self {
        Self {
            builder,
            source,
            stats: MerStreamStats::default(),
        }
    }

    /// Advance to the next complete mer. Returns false at end of input;
    /// after a true return the mer accessors expose the new window.
    pub fn next_mer(&mut self) -> bool {
        loop {
            let Some(ch) = self.source.next_base() else {
                return false;
            };
            self.stats.bases_consumed += 1;
            if !crate::alphabet::is_valid(ch) {
                self.stats.invalid_symbols += 1;
            }
            if !self.builder.add_base(ch) {
                self.builder.mask();
                self.stats.mers_produced += 1;
                return true;
            }
        }
    }

    /// 0-based index of the last base consumed into the current window.
    /// Meaningful after a true [`next_mer`](Self::next_mer).
    pub fn position(&self) -> u64 {
        self.stats.bases_consumed.saturating_sub(1)
    }

    /// The forward-strand mer of the current window.
    pub fn forward_mer(&self) -> &M {
        self.builder.forward_mer()
    }

    /// The reverse-complement mer of the current window.
    pub fn reverse_mer(&self) -> &M {
        self.builder.reverse_mer()
    }

    /// The canonical mer of the current window.
    pub fn canonical_mer(&self) -> &M {
        self.builder.canonical_mer()
    }

    /// The underlying builder, for span and configuration queries.
    pub fn builder(&self) -> &KmerBuilder<M> {
        &self.builder
    }

    /// Streaming counters so far.
    pub fn stats(&self) -> MerStreamStats {
        self.stats
    }
}
