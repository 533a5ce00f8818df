//! Property tests for the codec and builder invariants.

use merstream_lib::{
    mer_from_sequence, KmerBuilder, MerCodec, PackedBitReader, PackedBitWriter, TinyMer,
};
use proptest::prelude::*;

/// Reverse-complement a sequence at the text level, the slow obvious way.
fn revcomp_text(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            _ => b'A',
        })
        .collect()
}

fn dna(len: impl Into<prop::collection::SizeRange>) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(b"ACGT".to_vec()), len)
}

proptest! {
    #[test]
    fn prop_reverse_complement_involution(seq in dna(1..=32usize)) {
        let original: TinyMer = mer_from_sequence(&seq);
        let mut mer = original.clone();
        mer.reverse_complement();
        mer.reverse_complement();
        prop_assert_eq!(mer, original);
    }

    #[test]
    fn prop_reverse_complement_matches_text(seq in dna(1..=32usize)) {
        let mut mer: TinyMer = mer_from_sequence(&seq);
        mer.reverse_complement();
        let expect: TinyMer = mer_from_sequence(&revcomp_text(&seq));
        prop_assert_eq!(mer, expect);
    }

    #[test]
    fn prop_mask_is_idempotent(seq in dna(1..=32usize), raw in any::<u64>()) {
        let mut mer: TinyMer = mer_from_sequence(&seq);
        mer.set_word(0, raw);
        mer.mask(true);
        let once = mer.clone();
        mer.mask(true);
        prop_assert_eq!(&mer, &once);
        mer.mask(false);
        prop_assert_eq!(&mer, &once);
    }

    #[test]
    fn prop_write_read_roundtrip(seq in dna(1..=32usize)) {
        let mer: TinyMer = mer_from_sequence(&seq);
        let mut w = PackedBitWriter::new();
        mer.write(&mut w, None);
        let bytes = w.into_bytes();
        let mut r = PackedBitReader::new(&bytes);
        let mut back = TinyMer::new(seq.len() as u32);
        back.read(&mut r, None).unwrap();
        prop_assert_eq!(back, mer);
        prop_assert_eq!(r.position(), 2 * seq.len() as u64);
    }

    #[test]
    fn prop_partial_write_takes_tail(seq in dna(2..=32usize)) {
        let mer: TinyMer = mer_from_sequence(&seq);
        let tail = seq.len() / 2;
        let mut w = PackedBitWriter::new();
        mer.write(&mut w, Some(2 * tail as u32));
        let bytes = w.into_bytes();
        let mut r = PackedBitReader::new(&bytes);
        let mut back = TinyMer::new(tail as u32);
        back.read(&mut r, None).unwrap();
        let expect: TinyMer = mer_from_sequence(&seq[seq.len() - tail..]);
        prop_assert_eq!(back, expect);
    }

    #[test]
    fn prop_canonical_is_text_minimum(seq in dna(1..=32usize)) {
        let mut builder = KmerBuilder::<TinyMer>::contiguous(seq.len() as u32).unwrap();
        for &ch in &seq {
            builder.add_base(ch);
        }
        // 2-bit codes preserve A < C < G < T, so mer order is text order.
        let rc = revcomp_text(&seq);
        let expect = std::cmp::min(seq.clone(), rc);
        prop_assert_eq!(
            builder.canonical_mer().to_string().into_bytes(),
            expect
        );
    }

    #[test]
    fn prop_sliding_window_matches_direct_encoding(
        k in 1usize..=12,
        seq in prop::collection::vec(prop::sample::select(b"ACGTN".to_vec()), 16..96)
    ) {
        let mut builder = KmerBuilder::<TinyMer>::contiguous(k as u32).unwrap();
        for (i, &ch) in seq.iter().enumerate() {
            let complete = !builder.add_base(ch);
            let window_clean =
                i + 1 >= k && seq[i + 1 - k..=i].iter().all(|&b| b != b'N');
            prop_assert_eq!(complete, window_clean, "at base {}", i);
            if complete {
                let expect: TinyMer = mer_from_sequence(&seq[i + 1 - k..=i]);
                prop_assert_eq!(builder.forward_mer(), &expect);
            }
        }
    }

    #[test]
    fn prop_compressed_span_sum_counts_input(
        k in 1usize..=8,
        seq in prop::collection::vec(prop::sample::select(b"ACGT".to_vec()), 16..64)
    ) {
        let mut builder = KmerBuilder::<TinyMer>::compressed(k as u32).unwrap();
        let mut consumed = 0u32;
        let mut first_window_checked = false;
        for &ch in &seq {
            consumed += 1;
            if !builder.add_base(ch) && !first_window_checked {
                // For the first completed mer the spans cover the whole
                // input so far.
                let total: u32 = (0..k as u32).map(|p| builder.base_span(p)).sum();
                prop_assert_eq!(total, consumed);
                first_window_checked = true;
            }
        }
    }

    #[test]
    fn prop_stream_order_survives_packed_file(seq in dna(8..=64usize)) {
        use merstream_lib::{MerFileReader, MerFileWriter, MerStream, SliceSource};
        use std::io::Cursor;

        let k = 7u32;
        let builder = KmerBuilder::<TinyMer>::contiguous(k).unwrap();
        let mut stream = MerStream::new(builder, SliceSource::new(seq.clone()));
        let mut writer = MerFileWriter::new(k);
        let mut expected = Vec::new();
        while stream.next_mer() {
            writer.append(stream.canonical_mer());
            expected.push(stream.canonical_mer().clone());
        }
        let mut bytes = Vec::new();
        writer.finish(&mut bytes).unwrap();
        let mut reader = MerFileReader::open(&mut Cursor::new(&bytes)).unwrap();
        let back: Vec<TinyMer> = reader.read_all().unwrap();
        prop_assert_eq!(back, expected);
    }
}
