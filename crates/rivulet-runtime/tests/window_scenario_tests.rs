//! End-to-end conformance for partitioned window queries
//!
//! Each test drives a full engine (stream, query, callback) and checks
//! the exact current/expired sums and their order, including the
//! narrow-float rounding behavior of f32-typed input attributes.

use chrono::{Duration, Utc};
use rivulet_core::{
    Attribute, AttributeType, OutputField, ProjectionExpr, QueryPlan, StreamDefinition, Value,
    WindowSpec,
};
use rivulet_runtime::{Engine, ManualClock, StreamEvent};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

fn quotes_stream() -> StreamDefinition {
    StreamDefinition::new(
        "Quotes",
        vec![
            Attribute::new("symbol", AttributeType::Str),
            Attribute::new("price", AttributeType::Float),
        ],
    )
}

fn totals_query(window: WindowSpec) -> QueryPlan {
    QueryPlan {
        name: "totals".into(),
        input_stream: "Quotes".into(),
        partition_by: Some(vec!["symbol".into()]),
        window,
        select: vec![
            OutputField::new("symbol", ProjectionExpr::Attribute("symbol".into())),
            OutputField::new("total", ProjectionExpr::Sum("price".into())),
        ],
        output_stream: "Totals".into(),
    }
}

fn attach_collector(engine: &mut Engine) -> Arc<Mutex<Vec<StreamEvent>>> {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&collected);
    engine.register_callback("Totals", move |events| {
        sink.lock().unwrap().extend(events.to_vec());
    });
    collected
}

async fn send_quote(engine: &Engine, symbol: &str, price: f32) {
    engine
        .send("Quotes", vec![Value::from(symbol), Value::from(price)])
        .await
        .unwrap();
}

fn sums(events: &[StreamEvent], expired: bool) -> Vec<f64> {
    events
        .iter()
        .filter(|e| e.is_expired == expired)
        .map(|e| e.get_f64(1).unwrap())
        .collect()
}

#[tokio::test]
async fn test_sliding_length_partitioned_sums() {
    let mut engine = Engine::new();
    engine.define_stream(quotes_stream()).unwrap();
    engine
        .add_query(totals_query(WindowSpec::SlidingLength(2)))
        .unwrap();
    let collected = attach_collector(&mut engine);

    for (symbol, price) in [
        ("IBM", 70.0),
        ("WSO2", 700.0),
        ("IBM", 100.0),
        ("IBM", 200.0),
        ("ORACLE", 75.6),
        ("WSO2", 1000.0),
        ("WSO2", 500.0),
    ] {
        send_quote(&engine, symbol, price).await;
    }

    let events = collected.lock().unwrap();
    assert_eq!(
        sums(&events, false),
        vec![70.0, 700.0, 170.0, 300.0, 75.6f32 as f64, 1700.0, 1500.0]
    );
    assert_eq!(sums(&events, true), vec![100.0, 1000.0]);

    // expired events follow the current event of the same admission
    assert_eq!(events.len(), 9);
    assert!(events[4].is_expired);
    assert!(events[8].is_expired);
    assert_eq!(events[4].get_str(0), Some("IBM"));
    assert_eq!(events[8].get_str(0), Some("WSO2"));
}

#[tokio::test]
async fn test_float_attribute_keeps_narrow_rounding() {
    let mut engine = Engine::new();
    engine.define_stream(quotes_stream()).unwrap();
    engine
        .add_query(totals_query(WindowSpec::SlidingLength(2)))
        .unwrap();
    let collected = attach_collector(&mut engine);

    send_quote(&engine, "ORACLE", 75.6).await;

    let events = collected.lock().unwrap();
    let total = events[0].get_f64(1).unwrap();
    assert_eq!(total, 75.6f32 as f64);
    assert_ne!(total, 75.6f64);
}

#[tokio::test]
async fn test_length_batch_flushes_running_sums() {
    let mut engine = Engine::new();
    engine.define_stream(quotes_stream()).unwrap();
    engine
        .add_query(totals_query(WindowSpec::LengthBatch(2)))
        .unwrap();
    let collected = attach_collector(&mut engine);

    for (symbol, price) in [
        ("IBM", 70.0),
        ("WSO2", 700.0),
        ("IBM", 100.0),
        ("IBM", 200.0),
        ("WSO2", 1000.0),
    ] {
        send_quote(&engine, symbol, price).await;
    }

    let events = collected.lock().unwrap();
    assert_eq!(sums(&events, false), vec![70.0, 170.0, 700.0, 1700.0]);
    assert!(sums(&events, true).is_empty());
}

#[tokio::test]
async fn test_sliding_time_expiry_recomputes_shrinking_sums() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let mut engine = Engine::with_clock(clock.clone());
    engine.define_stream(quotes_stream()).unwrap();
    engine
        .add_query(totals_query(WindowSpec::SlidingTime(StdDuration::from_secs(1))))
        .unwrap();
    let collected = attach_collector(&mut engine);

    send_quote(&engine, "IBM", 70.0).await;
    clock.advance(Duration::milliseconds(100));
    send_quote(&engine, "IBM", 100.0).await;

    assert_eq!(sums(&collected.lock().unwrap(), false), vec![70.0, 170.0]);

    // first event ages out; its sum reflects the one event still retained
    clock.set(start + Duration::seconds(1));
    engine.sweep();
    assert_eq!(sums(&collected.lock().unwrap(), true), vec![100.0]);

    // last event ages out; the empty window sums to the identity
    clock.advance(Duration::milliseconds(100));
    engine.sweep();
    assert_eq!(sums(&collected.lock().unwrap(), true), vec![100.0, 0.0]);

    // nothing left to evict
    engine.sweep();
    assert_eq!(collected.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_sliding_time_evicts_before_admission() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let mut engine = Engine::with_clock(clock.clone());
    engine.define_stream(quotes_stream()).unwrap();
    engine
        .add_query(totals_query(WindowSpec::SlidingTime(StdDuration::from_secs(1))))
        .unwrap();
    let collected = attach_collector(&mut engine);

    send_quote(&engine, "IBM", 70.0).await;
    clock.advance(Duration::seconds(1));
    send_quote(&engine, "IBM", 200.0).await;

    let events = collected.lock().unwrap();
    // the aged event never contributes to the new admission's sum, and the
    // new admission never contributes to the aged event's sum
    assert_eq!(sums(&events, false), vec![70.0, 200.0]);
    assert_eq!(sums(&events, true), vec![0.0]);
}

#[tokio::test]
async fn test_time_batch_flushes_on_interval() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let mut engine = Engine::with_clock(clock.clone());
    engine.define_stream(quotes_stream()).unwrap();
    engine
        .add_query(totals_query(WindowSpec::TimeBatch(StdDuration::from_secs(1))))
        .unwrap();
    let collected = attach_collector(&mut engine);

    send_quote(&engine, "IBM", 70.0).await;
    clock.advance(Duration::milliseconds(300));
    send_quote(&engine, "IBM", 100.0).await;

    // nothing emitted until the interval since the first event elapses
    assert!(collected.lock().unwrap().is_empty());

    clock.set(start + Duration::seconds(1));
    engine.sweep();
    assert_eq!(sums(&collected.lock().unwrap(), false), vec![70.0, 170.0]);

    // the next admission opens a fresh batch
    send_quote(&engine, "IBM", 200.0).await;
    clock.advance(Duration::seconds(1));
    engine.sweep();

    let events = collected.lock().unwrap();
    assert_eq!(sums(&events, false), vec![70.0, 170.0, 200.0]);
    assert!(sums(&events, true).is_empty());
}

#[tokio::test]
async fn test_unkeyed_query_aggregates_all_symbols() {
    let mut engine = Engine::new();
    engine.define_stream(quotes_stream()).unwrap();
    let mut plan = totals_query(WindowSpec::SlidingLength(3));
    plan.partition_by = None;
    engine.add_query(plan).unwrap();
    let collected = attach_collector(&mut engine);

    send_quote(&engine, "IBM", 70.0).await;
    send_quote(&engine, "WSO2", 700.0).await;

    let events = collected.lock().unwrap();
    assert_eq!(sums(&events, false), vec![70.0, 770.0]);
}
