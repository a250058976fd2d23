use ember_rt::bitstring::{binary, float, integer, utf16, utf8, BitStringError};
use ember_rt::pattern::{bit_string_match, named, variable};
use ember_rt::{match_or_default, BitString, Term};
use proptest::prelude::*;

fn decode(segments: Vec<ember_rt::Segment>, bits: &BitString) -> Option<Vec<Term>> {
    let pattern = bit_string_match(segments).ok()?;
    match_or_default(&pattern, &Term::from(bits.clone()))
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

#[test]
fn test_packet_header() {
    let header = BitString::new(&[
        integer(1),
        integer(0x0203).size(16),
        utf8("hi"),
        float(1.5).size(32),
    ])
    .unwrap();
    insta::assert_snapshot!(header.to_string(), @"<<1, 2, 3, 104, 105, 63, 192, 0, 0>>");
    assert_eq!(header.byte_size(), 9);
    assert_eq!(header.bit_size(), 72);
    assert_eq!(header[3], b'h');
}

#[test]
fn test_invalid_float_size() {
    assert_eq!(
        BitString::new(&[float(1.0).size(16)]).unwrap_err(),
        BitStringError::InvalidFloatSize(16)
    );
}

#[test]
fn test_unsized_binary_must_be_last() {
    let err = bit_string_match(vec![binary(variable()), integer(variable())]).unwrap_err();
    assert_eq!(err, BitStringError::UnsizedSegment { index: 0 });
}

#[test]
fn test_utf16_surrogate_pair() {
    let bits = BitString::new(&[utf16("\u{1F600}")]).unwrap();
    assert_eq!(bits.as_bytes(), &[0xD8, 0x3D, 0xDE, 0x00]);
    let little = BitString::new(&[utf16("\u{1F600}").little()]).unwrap();
    assert_eq!(little.as_bytes(), &[0x3D, 0xD8, 0x00, 0xDE]);
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

#[test]
fn test_length_prefixed_payload() {
    let frame = BitString::new(&[integer(3).size(16), binary("abc")]).unwrap();
    let bound = decode(vec![integer(named("len")).size(16), binary(named("payload"))], &frame);
    assert_eq!(
        bound,
        Some(vec![
            Term::from(3),
            Term::from(BitString::from_bytes(b"abc".to_vec())),
        ])
    );
}

#[test]
fn test_string_candidate_coerced() {
    let bound = match_or_default(
        &bit_string_match(vec![utf8("id:"), utf8(variable())]).unwrap(),
        &Term::from("id:42"),
    );
    assert_eq!(bound, Some(vec![Term::from("42")]));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_unsigned_round_trip(values in proptest::collection::vec(0i64..=0xFFFF, 1..6)) {
        let segments: Vec<_> = values.iter().map(|v| integer(*v).size(16)).collect();
        let bits = BitString::new(&segments).unwrap();
        prop_assert_eq!(bits.byte_size(), values.len() * 2);

        let pattern = values.iter().map(|_| integer(variable()).size(16)).collect();
        let expected: Vec<Term> = values.iter().map(|v| Term::from(*v)).collect();
        prop_assert_eq!(decode(pattern, &bits), Some(expected));
    }

    #[test]
    fn prop_signed_round_trip(v in i32::MIN as i64..=i32::MAX as i64) {
        let bits = BitString::new(&[integer(v).size(32).signed()]).unwrap();
        let bound = decode(vec![integer(variable()).size(32).signed()], &bits);
        prop_assert_eq!(bound, Some(vec![Term::from(v)]));
    }

    #[test]
    fn prop_little_endian(v in 0u32..=u32::MAX) {
        let bits = BitString::new(&[integer(v as i64).size(32).little()]).unwrap();
        let same = decode(vec![integer(variable()).size(32).little()], &bits);
        prop_assert_eq!(same, Some(vec![Term::from(v as i64)]));

        let swapped = decode(vec![integer(variable()).size(32)], &bits);
        prop_assert_eq!(swapped, Some(vec![Term::from(v.swap_bytes() as i64)]));
    }

    #[test]
    fn prop_integer_truncated_to_width(v in any::<i64>()) {
        let bits = BitString::new(&[integer(v)]).unwrap();
        prop_assert_eq!(bits.as_bytes(), &[(v & 0xFF) as u8][..]);
    }
}
