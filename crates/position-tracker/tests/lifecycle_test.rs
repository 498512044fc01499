//! Position lifecycle through the tracker
//!
//! 1. Fills accumulate into a cost-weighted average entry
//! 2. Partial closes add up to the single full close
//! 3. Re-marking at the same price changes nothing
//! 4. Positions survive a JSON round trip unchanged

use meridian_clock::ManualClock;
use meridian_core::{PositionSide, PositionStatus};
use meridian_position_tracker::{OpenRequest, PositionTracker, TrackerSnapshot};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn tracker() -> PositionTracker {
    PositionTracker::new(ManualClock::starting_now())
}

#[test]
fn test_average_entry_over_fill_sequence() {
    let _ = env_logger::builder().is_test(true).try_init();
    let tracker = tracker();

    let fills = [
        (dec!(0.25), dec!(60000)),
        (dec!(0.5), dec!(61000)),
        (dec!(0.25), dec!(62500)),
    ];
    let total: Decimal = fills.iter().map(|(s, _)| *s).sum();
    let pending = tracker
        .create_pending("BTC-USD", PositionSide::Long, total, Some("dca".into()), vec![])
        .unwrap();

    for (size, price) in fills {
        tracker.add_fill(pending.id, size, price, dec!(0)).unwrap();
    }

    let position = tracker.position(pending.id).unwrap();
    let expected: Decimal =
        fills.iter().map(|(s, p)| s * p).sum::<Decimal>() / fills.iter().map(|(s, _)| *s).sum::<Decimal>();

    // Running average carries 28 digits; compare at price precision
    assert_eq!(position.average_entry_price.round_dp(8), expected.round_dp(8));
    assert_eq!(position.average_entry_price.round_dp(8), dec!(61125));
    assert_eq!(position.entry_price, dec!(60000));
    assert_eq!(position.filled_size, total);
    assert_eq!(position.fill_count, 3);

    // Nothing more can be filled
    assert!(tracker.add_fill(pending.id, dec!(0.01), dec!(60000), dec!(0)).is_err());
}

#[test]
fn test_partial_closes_sum_to_full_close() {
    let split = tracker();
    let whole = tracker();

    let a = split
        .create_position(OpenRequest::new("ETH-USD", PositionSide::Long, dec!(3), dec!(2000)))
        .unwrap();
    let b = whole
        .create_position(OpenRequest::new("ETH-USD", PositionSide::Long, dec!(3), dec!(2000)))
        .unwrap();

    let mut split_pnl = Decimal::ZERO;
    for size in [dec!(1), dec!(0.5), dec!(1.5)] {
        split_pnl += split.close_partial(a.id, size, dec!(2200), dec!(0)).unwrap();
    }
    let whole_pnl = whole.close_full(b.id, dec!(2200), dec!(0)).unwrap();

    assert_eq!(split_pnl, whole_pnl);
    assert_eq!(whole_pnl, dec!(600));

    let closed = split.position(a.id).unwrap();
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(closed.realized_pnl, dec!(600));
    assert_eq!(closed.current_size, dec!(0));
}

#[test]
fn test_partial_close_keeps_position_live() {
    let tracker = tracker();
    let pos = tracker
        .create_position(OpenRequest::new("SOL-USD", PositionSide::Short, dec!(10), dec!(150)))
        .unwrap();

    let pnl = tracker.close_partial(pos.id, dec!(4), dec!(140), dec!(1)).unwrap();
    assert_eq!(pnl, dec!(39));

    let live = tracker.position(pos.id).unwrap();
    assert_eq!(live.status, PositionStatus::Partial);
    assert_eq!(live.current_size, dec!(6));
    assert_eq!(tracker.open_count(), 1);
    assert!(tracker.closed_positions().is_empty());
}

#[test]
fn test_update_price_is_idempotent() {
    let tracker = tracker();
    let pos = tracker
        .create_position(OpenRequest::new("BTC-USD", PositionSide::Long, dec!(1), dec!(50000)))
        .unwrap();

    assert_eq!(tracker.update_price("BTC-USD", dec!(51000)).unwrap().len(), 1);
    let first = tracker.position(pos.id).unwrap();

    assert!(tracker.update_price("BTC-USD", dec!(51000)).unwrap().is_empty());
    let second = tracker.position(pos.id).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_snapshot_json_round_trip() {
    let tracker = tracker();
    tracker
        .create_position(
            OpenRequest::new("BTC-USD", PositionSide::Long, dec!(0.1), dec!(65000.12345678))
                .with_tags(vec!["core".into()])
                .with_fees(dec!(0.65)),
        )
        .unwrap();
    tracker.update_price("BTC-USD", dec!(64000.5)).unwrap();

    let snapshot = tracker.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let decoded: TrackerSnapshot = serde_json::from_str(&json).unwrap();

    assert_eq!(decoded, snapshot);
}
