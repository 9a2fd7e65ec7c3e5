//! Property tests for runner invariants.
//!
//! Uses proptest to verify:
//! 1. Key levels never report changes against themselves
//! 2. Change sets list only levels valid on both sides that differ
//! 3. Symbol validation is idempotent and upper-cases its output
//! 4. State without a timestamp never expires

use chrono::{Duration, NaiveDate};
use gexlab_core::CacheState;
use gexlab_runner::store::is_expired;
use gexlab_runner::{validate_symbol, KeyLevels};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_level() -> impl Strategy<Value = Option<f64>> {
    prop::option::of(1.0f64..1000.0)
}

fn arb_levels() -> impl Strategy<Value = KeyLevels> {
    (
        (arb_level(), arb_level(), arb_level(), arb_level()),
        (arb_level(), arb_level(), arb_level(), arb_level()),
    )
        .prop_map(
            |((spot_price, em1_dollar, vol_trigger, net_gex), (call_wall, put_wall, iv_7d, iv_14d))| {
                KeyLevels {
                    spot_price,
                    em1_dollar,
                    vol_trigger,
                    spot_vs_trigger: None,
                    net_gex,
                    call_wall,
                    put_wall,
                    iv_7d,
                    iv_14d,
                }
            },
        )
}

fn valid_pairs(old: &KeyLevels, new: &KeyLevels) -> usize {
    [
        (old.spot_price, new.spot_price),
        (old.em1_dollar, new.em1_dollar),
        (old.vol_trigger, new.vol_trigger),
        (old.call_wall, new.call_wall),
        (old.put_wall, new.put_wall),
        (old.net_gex, new.net_gex),
        (old.iv_7d, new.iv_7d),
        (old.iv_14d, new.iv_14d),
    ]
    .into_iter()
    .filter(|(a, b)| matches!((a, b), (Some(a), Some(b)) if a != b))
    .count()
}

// ── Properties ───────────────────────────────────────────────────────

proptest! {
    #[test]
    fn no_changes_against_self(levels in arb_levels()) {
        prop_assert!(levels.changes_since(&levels).is_empty());
    }

    #[test]
    fn changes_cover_exactly_differing_valid_levels(old in arb_levels(), new in arb_levels()) {
        let changes = new.changes_since(&old);
        prop_assert_eq!(changes.len(), valid_pairs(&old, &new));
        for change in &changes {
            prop_assert!(change.old != change.new);
            prop_assert!(change.change_pct.is_some());
        }
    }

    #[test]
    fn symbol_validation_is_idempotent(raw in "[a-zA-Z][a-zA-Z0-9.-]{0,9}") {
        if let Ok(symbol) = validate_symbol(&raw) {
            prop_assert_eq!(&symbol, &raw.to_ascii_uppercase());
            prop_assert_eq!(validate_symbol(&symbol), Ok(symbol.clone()));
        }
    }

    #[test]
    fn unstamped_state_never_expires(age in 0i64..1_000_000, ttl in 0i64..86_400) {
        let now = NaiveDate::from_ymd_opt(2025, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            + Duration::seconds(age);
        let state = CacheState::default();
        prop_assert!(!is_expired(&state, now, Duration::seconds(ttl)));
    }
}
