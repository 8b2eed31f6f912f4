#![forbid(unsafe_code)]

use hfs_ondisk::{ChainEntry, DirSlot, HfsHeader, Rfe, parse_long_name};
use hfs_types::{ByteOrder, HEADER_SIZE, ParseError, RFE_SIZE};
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

#[derive(Debug, Default)]
struct ErrorCoverage {
    insufficient_data: u32,
    invalid_field: u32,
    integer_conversion: u32,
}

impl ErrorCoverage {
    fn observe(&mut self, err: &ParseError) {
        match err {
            ParseError::InsufficientData { .. } => self.insufficient_data += 1,
            ParseError::InvalidField { .. } => self.invalid_field += 1,
            ParseError::IntegerConversion { .. } => self.integer_conversion += 1,
        }
    }
}

/// Deterministic xorshift so failures reproduce without a fixture corpus.
struct SampleRng(u64);

impl SampleRng {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn bytes(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.next_u64().to_le_bytes()[0]).collect()
    }
}

fn samples() -> Vec<(String, Vec<u8>)> {
    let mut rng = SampleRng(0x9E37_79B9_7F4A_7C15);
    let mut out = vec![
        ("empty".to_owned(), Vec::new()),
        ("one_byte".to_owned(), vec![0x3F]),
        ("short_slot".to_owned(), vec![0_u8; RFE_SIZE - 1]),
        ("short_header".to_owned(), vec![0xAA; HEADER_SIZE - 1]),
        ("all_ff".to_owned(), vec![0xFF; HEADER_SIZE]),
    ];
    for i in 0..64 {
        let len = usize::try_from(rng.next_u64() % 700).expect("fits");
        out.push((format!("random_{i:02}"), rng.bytes(len)));
    }
    out
}

fn run_parser<T, F>(
    sample_name: &str,
    parser_name: &'static str,
    parser_hits: &mut BTreeMap<&'static str, u32>,
    coverage: &mut ErrorCoverage,
    parser: F,
) -> bool
where
    F: FnOnce() -> Result<T, ParseError>,
{
    *parser_hits.entry(parser_name).or_default() += 1;
    match catch_unwind(AssertUnwindSafe(parser)) {
        Ok(Ok(_)) => false,
        Ok(Err(err)) => {
            coverage.observe(&err);
            true
        }
        Err(_) => panic!("parser `{parser_name}` panicked on sample `{sample_name}`"),
    }
}

#[test]
fn random_bytes_never_panic_the_codec() {
    let mut parser_hits = BTreeMap::new();
    let mut coverage = ErrorCoverage::default();

    for (name, bytes) in &samples() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            run_parser(name, "dir_slot", &mut parser_hits, &mut coverage, || {
                DirSlot::parse_from_bytes(bytes, order)
            });
            run_parser(name, "rfe", &mut parser_hits, &mut coverage, || {
                Rfe::parse_from_bytes(bytes, order)
            });
            run_parser(name, "chain_entry", &mut parser_hits, &mut coverage, || {
                ChainEntry::parse_from_bytes(bytes, order)
            });
        }
        run_parser(name, "header", &mut parser_hits, &mut coverage, || {
            HfsHeader::parse_from_bytes(bytes)
        });
        run_parser(name, "long_name", &mut parser_hits, &mut coverage, || {
            parse_long_name(bytes)
        });
    }

    assert!(parser_hits.values().all(|hits| *hits > 0));
    assert!(coverage.insufficient_data > 0, "{coverage:?}");
    assert!(coverage.invalid_field > 0, "{coverage:?}");
}

#[test]
fn every_slot_tag_is_either_decoded_or_rejected_as_presence() {
    for tag in 0..=u8::MAX {
        let mut slot = [0_u8; RFE_SIZE];
        slot[17] = tag;
        match DirSlot::parse_from_bytes(&slot, ByteOrder::Little) {
            Ok(DirSlot::Free) => assert_eq!(tag, 0x00),
            Ok(DirSlot::Chain(_)) => assert_eq!(tag, 0x7F),
            Ok(DirSlot::Entry(rfe)) => assert_eq!(rfe.presence.0, tag),
            Err(ParseError::InvalidField { field, .. }) => assert_eq!(field, "presence"),
            Err(other) => panic!("unexpected error for tag {tag:#04x}: {other:?}"),
        }
    }
}
