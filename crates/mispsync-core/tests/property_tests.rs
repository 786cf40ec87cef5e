//! Property-based tests for the codec and capability rules
//!
//! Uses proptest to check invariants that must hold for every input, not
//! just the handful of peers seen in the scenario tests.

use std::collections::HashMap;

use proptest::prelude::*;
use serde_json::json;

use mispsync_core::sync::codec::{
    compress, conditional_token, decompress, select_compression, CompressionSupport,
    ContentEncoding,
};
use mispsync_core::sync::{ids_newer_than, EventIndexEntry};
use mispsync_core::{Capability, NamedParams, PeerCapabilities};

// ============================================================================
// Strategy Generators
// ============================================================================

/// Opaque validator as a peer would hand out (no quotes, no dashes)
fn validator_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9]{1,40}").expect("valid regex")
}

fn support_strategy() -> impl Strategy<Value = CompressionSupport> {
    (any::<bool>(), any::<bool>()).prop_map(|(brotli, gzip)| CompressionSupport { brotli, gzip })
}

/// Index entries with unique UUIDs
fn index_strategy() -> impl Strategy<Value = Vec<EventIndexEntry>> {
    prop::collection::vec(0i64..1000, 0..30).prop_map(|timestamps| {
        timestamps
            .into_iter()
            .enumerate()
            .map(|(i, timestamp)| {
                serde_json::from_value(json!({
                    "id": i.to_string(),
                    "uuid": format!("uuid-{}", i),
                    "timestamp": timestamp
                }))
                .unwrap()
            })
            .collect()
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// Version gating is exact-major, exact-minor, minimum-patch
    #[test]
    fn version_threshold_rule(major in 0u64..4, minor in 0u64..8, patch in 0u64..400) {
        let info = json!({"version": format!("{}.{}.{}", major, minor, patch)});
        let caps = PeerCapabilities::from_info(info).unwrap();

        prop_assert_eq!(
            caps.supports(Capability::SightingRestSearch),
            major == 2 && minor == 4 && patch >= 165
        );
        prop_assert_eq!(
            caps.supports(Capability::ProtectedEventSigning),
            major == 2 && minor == 4 && patch >= 156
        );
        prop_assert_eq!(
            caps.supports(Capability::ConnectivitySelfTest),
            major == 2 && minor == 4 && patch >= 69
        );
    }

    /// Arbitrary version strings never panic and never grant version gates
    /// unless they parse
    #[test]
    fn arbitrary_versions_fail_closed(raw in "\\PC{0,20}") {
        let caps = PeerCapabilities::from_info(json!({ "version": raw })).unwrap();
        if caps.parsed_version().is_none() {
            prop_assert!(!caps.supports(Capability::ProposalSync));
            prop_assert!(!caps.supports(Capability::OrgScopedRules));
        }
    }

    /// Nothing at or under the threshold is compressed, whatever the peer takes
    #[test]
    fn threshold_is_exact(len in 0usize..4096, support in support_strategy()) {
        let chosen = select_compression(len, support);
        if len <= 1024 {
            prop_assert_eq!(chosen, ContentEncoding::Identity);
        } else if support.brotli {
            prop_assert_eq!(chosen, ContentEncoding::Brotli);
        } else if support.gzip {
            prop_assert_eq!(chosen, ContentEncoding::Gzip);
        } else {
            prop_assert_eq!(chosen, ContentEncoding::Identity);
        }
    }

    /// Compressed bodies decode to exactly the input bytes
    #[test]
    fn compression_is_lossless(body in prop::collection::vec(any::<u8>(), 0..4096)) {
        for encoding in [ContentEncoding::Brotli, ContentEncoding::Gzip] {
            let packed = compress(&body, encoding).unwrap();
            prop_assert_eq!(decompress(&packed, encoding).unwrap(), body.clone());
        }
    }

    /// Encoding suffixes come off, quoting stays as given
    #[test]
    fn token_suffix_stripping(token in validator_strategy()) {
        prop_assert_eq!(conditional_token(&format!("{}-br", token)), token.clone());
        prop_assert_eq!(conditional_token(&format!("{}-gzip", token)), token.clone());
        prop_assert_eq!(
            conditional_token(&format!("\"{}-gzip\"", token)),
            format!("\"{}\"", token)
        );
        // Bare validators pass through untouched
        prop_assert_eq!(conditional_token(&token), token.clone());
        prop_assert_eq!(conditional_token(&format!("\"{}\"", token)), format!("\"{}\"", token));
    }

    /// Selected ids are exactly the unknown or newer entries
    #[test]
    fn newer_than_selection(entries in index_strategy(), local_ts in 0i64..1000) {
        // Every even entry is known locally at `local_ts`
        let local: HashMap<String, i64> = entries
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 2 == 0)
            .map(|(_, e)| (e.uuid.clone(), local_ts))
            .collect();

        let selected = ids_newer_than(&entries, &local);
        for (i, entry) in entries.iter().enumerate() {
            let expected = i % 2 == 1 || entry.timestamp > local_ts;
            prop_assert_eq!(selected.contains(&entry.id), expected);
        }
    }

    /// Every scalar param renders as its own `/key:value` segment
    #[test]
    fn named_params_segments(pairs in prop::collection::vec(("[a-z]{1,8}", 0u32..10_000), 0..6)) {
        let params = pairs
            .iter()
            .fold(NamedParams::new(), |params, (k, v)| params.with(k.as_str(), *v));
        let path = params.to_path();

        prop_assert_eq!(path.is_empty(), pairs.is_empty());
        for (k, v) in &pairs {
            let segment = format!("/{}:{}", k, v);
            prop_assert!(path.contains(&segment));
        }
    }
}
