//! Packed mer files: a small header followed by 5'-endian mer payload.
//!
//! Mers are written through the packed bit stream back to back, so the
//! payload is `mer_count * 2 * mer_size` bits, zero-padded to a whole
//! byte at the very end. Reading returns the mers in writing order; the
//! bit ordering is part of the persisted format and must not change.

use crate::bitstream::{BitStreamError, PackedBitReader, PackedBitWriter};
use crate::constants::words_for_mer_size;
use crate::mer::MerCodec;
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::debug;

/// Magic bytes identifying a packed mer file.
const MAGIC: &[u8; 8] = b"MERPKF01";

/// File format version: (major, minor). Bump major on breaking changes.
const FORMAT_VERSION: (u32, u32) = (1, 0);

/// Errors reading a packed mer file.
#[derive(Error, Debug)]
pub enum MerFileError {
    /// Underlying I/O failure, including bad magic or version.
    #[error("mer file I/O error")]
    Io(#[from] io::Error),
    /// The payload ended before the declared mer count was read.
    #[error("mer file truncated")]
    Truncated(#[from] BitStreamError),
    /// The file's mer size does not fit the codec it is being read into.
    #[error("mer size {file} in file exceeds codec capacity {capacity}")]
    CapacityExceeded {
        /// Mer size recorded in the header.
        file: u32,
        /// Capacity of the codec type used for reading.
        capacity: u32,
    },
}

/// Fixed-size little-endian header at the start of every packed mer file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerFileHeader {
    /// Format version (major).
    pub version_major: u32,
    /// Format version (minor).
    pub version_minor: u32,
    /// Bases per mer.
    pub mer_size: u32,
    /// Storage words per mer at `mer_size`.
    pub word_count: u32,
    /// Number of mers in the payload.
    pub mer_count: u64,
}

impl MerFileHeader {
    /// Header for `mer_count` mers of `mer_size` bases.
    pub fn new(mer_size: u32, mer_count: u64) -> Self {
        Self {
            version_major: FORMAT_VERSION.0,
            version_minor: FORMAT_VERSION.1,
            mer_size,
            word_count: words_for_mer_size(mer_size),
            mer_count,
        }
    }

    /// Serialize to `writer`.
    pub fn write(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&self.version_major.to_le_bytes())?;
        writer.write_all(&self.version_minor.to_le_bytes())?;
        writer.write_all(&self.mer_size.to_le_bytes())?;
        writer.write_all(&self.word_count.to_le_bytes())?;
        writer.write_all(&self.mer_count.to_le_bytes())?;
        Ok(())
    }

    /// Deserialize from `reader`, validating magic and major version.
    pub fn read(reader: &mut dyn Read) -> io::Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid magic number for packed mer file",
            ));
        }

        let mut u32_buf = [0u8; 4];
        let mut u64_buf = [0u8; 8];

        reader.read_exact(&mut u32_buf)?;
        let version_major = u32::from_le_bytes(u32_buf);
        reader.read_exact(&mut u32_buf)?;
        let version_minor = u32::from_le_bytes(u32_buf);

        if version_major != FORMAT_VERSION.0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "incompatible mer file version: {}.{}, expected {}.{}",
                    version_major, version_minor, FORMAT_VERSION.0, FORMAT_VERSION.1
                ),
            ));
        }

        reader.read_exact(&mut u32_buf)?;
        let mer_size = u32::from_le_bytes(u32_buf);
        reader.read_exact(&mut u32_buf)?;
        let word_count = u32::from_le_bytes(u32_buf);
        reader.read_exact(&mut u64_buf)?;
        let mer_count = u64::from_le_bytes(u64_buf);

        Ok(Self {
            version_major,
            version_minor,
            mer_size,
            word_count,
            mer_count,
        })
    }
}

/// Accumulates mers and writes header plus packed payload on
/// [`finish`](MerFileWriter::finish).
pub struct MerFileWriter {
    mer_size: u32,
    bits: PackedBitWriter,
    mer_count: u64,
}

impl MerFileWriter {
    /// Writer for mers of `mer_size` bases.
    pub fn new(mer_size: u32) -> Self {
        Self {
            mer_size,
            bits: PackedBitWriter::new(),
            mer_count: 0,
        }
    }

    /// Append one mer. The mer's size must match the writer's.
    pub fn append<M: MerCodec>(&mut self, mer: &M) {
        assert_eq!(
            mer.mer_size(),
            self.mer_size,
            "mer size mismatch: writer holds {}-mers",
            self.mer_size
        );
        mer.write(&mut self.bits, None);
        self.mer_count += 1;
    }

    /// Number of mers appended so far.
    pub fn mer_count(&self) -> u64 {
        self.mer_count
    }

    /// Write header and payload to `sink`.
    pub fn finish(self, sink: &mut dyn Write) -> io::Result<()> {
        let header = MerFileHeader::new(self.mer_size, self.mer_count);
        debug!(
            mer_size = header.mer_size,
            mer_count = header.mer_count,
            "writing packed mer file"
        );
        header.write(sink)?;
        sink.write_all(self.bits.as_bytes())?;
        Ok(())
    }
}

/// Reads mers back out of a packed mer file.
pub struct MerFileReader {
    header: MerFileHeader,
    payload: Vec<u8>,
    cursor: u64,
    read_so_far: u64,
}

impl MerFileReader {
    /// Read the header and payload out of `source`.
    pub fn open(source: &mut dyn Read) -> Result<Self, MerFileError> {
        let header = MerFileHeader::read(source)?;
        let mut payload = Vec::new();
        source.read_to_end(&mut payload)?;
        debug!(
            mer_size = header.mer_size,
            mer_count = header.mer_count,
            "opened packed mer file"
        );
        Ok(Self {
            header,
            payload,
            cursor: 0,
            read_so_far: 0,
        })
    }

    /// The file header.
    pub fn header(&self) -> &MerFileHeader {
        &self.header
    }

    /// The next mer, or `None` once the declared count is exhausted.
    pub fn read_next<M: MerCodec>(&mut self) -> Result<Option<M>, MerFileError> {
        if self.read_so_far == self.header.mer_count {
            return Ok(None);
        }
        if self.header.mer_size > M::MAX_MER_SIZE {
            return Err(MerFileError::CapacityExceeded {
                file: self.header.mer_size,
                capacity: M::MAX_MER_SIZE,
            });
        }
        // The reader borrows per call so the payload stays owned here.
        let mut reader = PackedBitReader::new(&self.payload);
        reader.seek(self.cursor);
        let mut mer = M::new(self.header.mer_size);
        mer.read(&mut reader, None)?;
        self.cursor = reader.position();
        self.read_so_far += 1;
        Ok(Some(mer))
    }

    /// Read every remaining mer.
    pub fn read_all<M: MerCodec>(&mut self) -> Result<Vec<M>, MerFileError> {
        let mut out = Vec::with_capacity((self.header.mer_count - self.read_so_far) as usize);
        while let Some(mer) = self.read_next()? {
            out.push(mer);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mer::{mer_from_sequence, HugeMer, TinyMer};
    use std::io::Cursor;

    #[test]
    fn test_header_roundtrip() {
        let header = MerFileHeader::new(21, 1234);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        let back = MerFileHeader::read(&mut buf.as_slice()).unwrap();
        assert_eq!(back, header);
        assert_eq!(back.word_count, 1);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let header = MerFileHeader::new(21, 1);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        buf[0] = b'X';
        let err = MerFileHeader::read(&mut buf.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mers: Vec<TinyMer> = [
            b"ACGTA".as_slice(),
            b"TTTTT".as_slice(),
            b"GATCA".as_slice(),
            b"CCCGG".as_slice(),
        ]
        .iter()
        .map(|s| mer_from_sequence(s))
        .collect();

        let mut writer = MerFileWriter::new(5);
        for m in &mers {
            writer.append(m);
        }
        let mut file = Vec::new();
        writer.finish(&mut file).unwrap();

        let mut reader = MerFileReader::open(&mut Cursor::new(&file)).unwrap();
        assert_eq!(reader.header().mer_size, 5);
        assert_eq!(reader.header().mer_count, 4);
        let back: Vec<TinyMer> = reader.read_all().unwrap();
        assert_eq!(back, mers);
    }

    #[test]
    fn test_roundtrip_cross_word_mers() {
        let seq = b"CACGTACGTACGTACGTAAGTACGTACGTACGT"; // 33 bases
        let mer: HugeMer<4> = mer_from_sequence(seq);
        let mut writer = MerFileWriter::new(33);
        writer.append(&mer);
        writer.append(&mer);
        let mut file = Vec::new();
        writer.finish(&mut file).unwrap();

        let mut reader = MerFileReader::open(&mut Cursor::new(&file)).unwrap();
        assert_eq!(reader.header().word_count, 2);
        let back: Vec<HugeMer<4>> = reader.read_all().unwrap();
        assert_eq!(back, vec![mer, mer]);
    }

    #[test]
    fn test_capacity_mismatch_is_reported() {
        let mer: HugeMer<4> = mer_from_sequence(&[b'A'; 40]);
        let mut writer = MerFileWriter::new(40);
        writer.append(&mer);
        let mut file = Vec::new();
        writer.finish(&mut file).unwrap();

        let mut reader = MerFileReader::open(&mut Cursor::new(&file)).unwrap();
        let result: Result<Option<TinyMer>, _> = reader.read_next();
        assert!(matches!(
            result,
            Err(MerFileError::CapacityExceeded {
                file: 40,
                capacity: 32
            })
        ));
    }

    #[test]
    fn test_truncated_payload_is_reported() {
        let mer: TinyMer = mer_from_sequence(b"ACGTACGTACGT");
        let mut writer = MerFileWriter::new(12);
        writer.append(&mer);
        writer.append(&mer);
        let mut file = Vec::new();
        writer.finish(&mut file).unwrap();
        file.truncate(file.len() - 2);

        let mut reader = MerFileReader::open(&mut Cursor::new(&file)).unwrap();
        let first: Option<TinyMer> = reader.read_next().unwrap();
        assert!(first.is_some());
        let second: Result<Option<TinyMer>, _> = reader.read_next();
        assert!(matches!(second, Err(MerFileError::Truncated(_))));
    }

    #[test]
    #[should_panic(expected = "mer size mismatch")]
    fn test_writer_rejects_wrong_size() {
        let mer: TinyMer = mer_from_sequence(b"ACG");
        let mut writer = MerFileWriter::new(5);
        writer.append(&mer);
    }
}
