use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tigris_sentinel::{
    config::WindowRule,
    model::SignalKind,
    window::{WindowKey, WindowTracker},
};

const N: u32 = 64;

fn key() -> WindowKey {
    WindowKey::new(1, 2, SignalKind::Moderation)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_records_on_one_key_fire_exactly_once() {
    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let w: Arc<WindowTracker<u32>> = Arc::new(WindowTracker::new(WindowRule::new(N, 60)));

    let mut tasks = Vec::new();
    for i in 0..N {
        let w = w.clone();
        // kolejność znaczników celowo przemieszana względem kolejności tasków
        let at = t0 + Duration::milliseconds(((i * 37) % N) as i64 * 10);
        tasks.push(tokio::spawn(async move { w.record_and_drain(key(), at, i, N) }));
    }

    let mut fired = Vec::new();
    for t in tasks {
        if let Some(batch) = t.await.unwrap() {
            fired.push(batch);
        }
    }

    assert_eq!(fired.len(), 1, "window must fire exactly once");
    let batch = &fired[0];
    assert_eq!(batch.len(), N as usize);
    assert!(batch.windows(2).all(|p| p[0].0 <= p[1].0), "drained entries are time ordered");

    let mut items: Vec<u32> = batch.iter().map(|(_, i)| *i).collect();
    items.sort_unstable();
    assert_eq!(items, (0..N).collect::<Vec<_>>());

    assert!(w.peek(&key(), t0 + Duration::seconds(1)).is_empty());
    assert_eq!(w.tracked_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_records_below_threshold_lose_nothing() {
    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let w: Arc<WindowTracker> = Arc::new(WindowTracker::new(WindowRule::new(u32::MAX, 60)));

    let tasks: Vec<_> = (0..N)
        .map(|i| {
            let w = w.clone();
            let at = t0 + Duration::milliseconds((N - i) as i64);
            tokio::spawn(async move { w.record(key(), at, ()) })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }

    let kept = w.peek(&key(), t0 + Duration::seconds(1));
    assert_eq!(kept.len(), N as usize);
    assert!(kept.windows(2).all(|p| p[0] <= p[1]));
}

#[test]
fn out_of_order_expired_entry_is_pruned() {
    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let w: WindowTracker = WindowTracker::new(WindowRule::new(10, 5));
    w.record(key(), t0 + Duration::seconds(10), ());
    w.record(key(), t0, ());
    assert_eq!(w.peek(&key(), t0 + Duration::seconds(12)), vec![t0 + Duration::seconds(10)]);
}
