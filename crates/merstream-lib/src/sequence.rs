//! Sequence sources and the file-type registry.
//!
//! A [`SequenceSource`] delivers one ASCII base at a time; that is the
//! whole contract the streaming layer needs. [`FastaSource`] reads
//! FASTA/FASTQ (gzip transparent) through needletail; records are joined
//! with a single `N` so no k-mer window ever spans two sequences.
//!
//! [`SequenceRegistry`] maps file suffixes to openers. It is an explicitly
//! constructed, explicitly owned value; pass it to whatever opens sequence
//! files instead of reaching for process-wide state.

use anyhow::{Context, Result};
use needletail::parse_fastx_file;
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

/// One ASCII base at a time.
pub trait SequenceSource {
    /// The next base, or `None` at end of input.
    fn next_base(&mut self) -> Option<u8>;
}

impl<S: SequenceSource + ?Sized> SequenceSource for Box<S> {
    fn next_base(&mut self) -> Option<u8> {
        (**self).next_base()
    }
}

/// In-memory source over raw bytes, yielded verbatim.
#[derive(Debug, Clone)]
pub struct SliceSource {
    data: Vec<u8>,
    pos: usize,
}

impl SliceSource {
    /// Wrap a byte buffer.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl From<&[u8]> for SliceSource {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

impl SequenceSource for SliceSource {
    fn next_base(&mut self) -> Option<u8> {
        let b = self.data.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }
}

/// FASTA/FASTQ source; all records of the file, in order, separated by a
/// single `N`.
pub struct FastaSource {
    current: Vec<u8>,
    offset: usize,
    rest: VecDeque<Vec<u8>>,
    separator_pending: bool,
}

impl FastaSource {
    /// Read every record of `path` (gzip handled transparently).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = parse_fastx_file(path)
            .with_context(|| format!("failed to open sequence file: {}", path.display()))?;
        let mut records: VecDeque<Vec<u8>> = VecDeque::new();
        let mut total_bases = 0usize;
        while let Some(record) = reader.next() {
            let record = record
                .with_context(|| format!("failed to parse record in {}", path.display()))?;
            let seq = record.seq().to_vec();
            total_bases += seq.len();
            records.push_back(seq);
        }
        debug!(
            records = records.len(),
            total_bases,
            path = %path.display(),
            "loaded sequence file"
        );
        let current = records.pop_front().unwrap_or_default();
        Ok(Self {
            current,
            offset: 0,
            rest: records,
            separator_pending: false,
        })
    }
}

impl SequenceSource for FastaSource {
    fn next_base(&mut self) -> Option<u8> {
        loop {
            if self.separator_pending {
                self.separator_pending = false;
                return Some(b'N');
            }
            if let Some(&b) = self.current.get(self.offset) {
                self.offset += 1;
                return Some(b);
            }
            self.current = self.rest.pop_front()?;
            self.offset = 0;
            self.separator_pending = true;
        }
    }
}

/// Opener signature for registered file types.
pub type SourceOpener = fn(&Path) -> Result<Box<dyn SequenceSource>>;

/// Maps file-name suffixes to sequence-source openers.
pub struct SequenceRegistry {
    openers: Vec<(String, SourceOpener)>,
}

impl SequenceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            openers: Vec::new(),
        }
    }

    /// A registry with the FASTA/FASTQ suffixes (plain and gzipped) wired
    /// to [`FastaSource`].
    pub fn with_defaults() -> Self {
        fn open_fasta(path: &Path) -> Result<Box<dyn SequenceSource>> {
            Ok(Box::new(FastaSource::open(path)?))
        }
        let mut registry = Self::new();
        for ext in ["fa", "fasta", "fna", "fq", "fastq"] {
            registry.register(ext, open_fasta);
            registry.register(&format!("{ext}.gz"), open_fasta);
        }
        registry
    }

    /// Register `opener` for files ending in `.{suffix}`.
    pub fn register(&mut self, suffix: &str, opener: SourceOpener) {
        self.openers.push((suffix.to_string(), opener));
    }

    /// Open `path` with the longest matching registered suffix.
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Box<dyn SequenceSource>> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut best: Option<&(String, SourceOpener)> = None;
        for entry in &self.openers {
            if name.ends_with(&format!(".{}", entry.0)) {
                match best {
                    Some((suffix, _)) if suffix.len() >= entry.0.len() => {}
                    _ => best = Some(entry),
                }
            }
        }
        let (suffix, opener) = best.with_context(|| {
            format!("no registered sequence format matches {}", path.display())
        })?;
        debug!(suffix = suffix.as_str(), path = %path.display(), "opening sequence file");
        opener(path)
    }
}

impl Default for SequenceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
