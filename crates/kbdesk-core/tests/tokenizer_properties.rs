//! Property tests for the citation tokenizer.

use kbdesk_core::citation::{tokenize, Segment};
use proptest::prelude::*;

/// Text biased toward marker-like fragments.
fn answer_text() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        "[a-zA-Zа-я .,]{0,8}",
        (0u32..2000).prop_map(|n| format!("[S{n}]")),
        Just("[S]".to_string()),
        Just("[".to_string()),
        Just("]".to_string()),
        Just("S".to_string()),
        "[0-9]{1,3}",
    ];
    prop::collection::vec(piece, 0..24).prop_map(|parts| parts.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn prop_round_trip_structured(text in answer_text()) {
        let rebuilt: String = tokenize(&text).map(|s| s.as_str()).collect();
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn prop_round_trip_arbitrary(text in any::<String>()) {
        let rebuilt: String = tokenize(&text).map(|s| s.as_str()).collect();
        prop_assert_eq!(rebuilt, text);
    }

    #[test]
    fn prop_no_empty_text_segments(text in answer_text()) {
        for segment in tokenize(&text) {
            if let Segment::Text(t) = segment {
                prop_assert!(!t.is_empty());
            }
        }
    }

    #[test]
    fn prop_citation_raw_matches_number(text in answer_text()) {
        for segment in tokenize(&text) {
            if let Segment::Citation { source_no, raw } = segment {
                prop_assert!(raw.starts_with("[S") && raw.ends_with(']'));
                let digits = &raw[2..raw.len() - 1];
                prop_assert_eq!(digits.parse::<u32>().unwrap(), source_no);
            }
        }
    }

    #[test]
    fn prop_no_adjacent_text_segments(text in answer_text()) {
        let segments: Vec<_> = tokenize(&text).collect();
        for pair in segments.windows(2) {
            let both_text = matches!(pair, [Segment::Text(_), Segment::Text(_)]);
            prop_assert!(!both_text);
        }
    }
}
