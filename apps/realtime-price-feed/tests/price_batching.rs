//! Price Table Folding Properties
//!
//! Folding price frames into the table must not depend on how records are
//! batched: one frame per record, a single frame with everything, or any
//! split in between all produce the same table. Malformed records are
//! skipped without affecting their neighbours.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;

use realtime_price_feed::PriceTable;
use realtime_price_feed::domain::prices::{PriceFrame, PriceUpdate, parse_frame};

#[derive(Debug, Clone)]
struct Record {
    ticker: String,
    ltp_cents: i64,
    change_cents: i64,
}

fn record() -> impl Strategy<Value = Record> {
    (
        prop::sample::select(vec!["gs", "GS", "aapl", "MSFT", " nvda ", "tsla"]),
        0i64..10_000_000,
        -100_000i64..100_000,
    )
        .prop_map(|(ticker, ltp_cents, change_cents)| Record {
            ticker: ticker.to_string(),
            ltp_cents,
            change_cents,
        })
}

fn frame_text(records: &[Record]) -> String {
    let items: Vec<_> = records
        .iter()
        .map(|r| {
            json!({
                "stock_ticker": r.ticker,
                "ltp": Decimal::new(r.ltp_cents, 2).to_string(),
                "day_change": Decimal::new(r.change_cents, 2),
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

fn updates(text: &str) -> Vec<PriceUpdate> {
    match parse_frame(text).unwrap() {
        PriceFrame::Updates { updates, .. } => updates,
        PriceFrame::Ignored => panic!("array frame ignored"),
    }
}

fn fold(frames: &[String]) -> PriceTable {
    let mut table = PriceTable::new();
    for frame in frames {
        table.apply_batch(&updates(frame));
    }
    table
}

proptest! {
    #[test]
    fn batching_does_not_change_result(
        records in prop::collection::vec(record(), 0..40),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let single = vec![frame_text(&records)];
        let each: Vec<String> = records.iter().map(|r| frame_text(std::slice::from_ref(r))).collect();

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(records.len() + 1)).collect();
        points.push(0);
        points.push(records.len());
        points.sort_unstable();
        points.dedup();
        let split: Vec<String> = points
            .windows(2)
            .map(|w| frame_text(&records[w[0]..w[1]]))
            .collect();

        let expected = fold(&single);
        prop_assert_eq!(&fold(&each), &expected);
        prop_assert_eq!(&fold(&split), &expected);
    }

    #[test]
    fn last_record_for_a_symbol_wins(records in prop::collection::vec(record(), 1..40)) {
        let table = fold(&[frame_text(&records)]);

        for record in &records {
            let last = records
                .iter()
                .rev()
                .find(|r| r.ticker.trim().eq_ignore_ascii_case(record.ticker.trim()))
                .unwrap();
            let quote = table.get(record.ticker.trim()).unwrap();
            prop_assert_eq!(quote.last_price, Decimal::new(last.ltp_cents, 2));
            prop_assert_eq!(quote.day_change, Decimal::new(last.change_cents, 2));
        }
    }

    #[test]
    fn bad_records_are_skipped_without_losing_valid_ones(
        records in prop::collection::vec(record(), 0..10),
        position in any::<prop::sample::Index>(),
    ) {
        let mut value: serde_json::Value = serde_json::from_str(&frame_text(&records)).unwrap();
        let items = value.as_array_mut().unwrap();
        let at = position.index(items.len() + 1);
        items.insert(at, json!({ "stock_ticker": "BAD", "ltp": "n/a", "day_change": 0 }));

        let PriceFrame::Updates { updates, skipped } = parse_frame(&value.to_string()).unwrap() else {
            panic!("array frame ignored");
        };

        prop_assert_eq!(skipped.len(), 1);
        prop_assert_eq!(updates.len(), records.len());
        prop_assert_eq!(&fold(&[value.to_string()]), &fold(&[frame_text(&records)]));
    }
}
