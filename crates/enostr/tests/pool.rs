//! Relay pool behavior against in-memory relays: partial and total
//! connection failure, connect timeouts, cross-relay de-duplication and
//! connection cleanup.

use std::sync::Arc;
use std::time::Duration;

use enostr::relay::memory::{MemoryRelayNetwork, RelayBehavior};
use enostr::{
    Error, Filter, FullKeypair, Note, NoteId, PoolEvent, PoolSubscription, RelayPool, RelayStatus,
    KIND_TEXT_NOTE,
};

const A: &str = "wss://a.example/";
const B: &str = "wss://b.example/";
const C: &str = "wss://c.example/";

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("enostr=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

fn author() -> FullKeypair {
    init_logging();
    FullKeypair::from_secret_bytes([21; 32]).unwrap()
}

fn posts(keys: &FullKeypair, n: u64) -> Vec<Note> {
    (0..n)
        .map(|i| {
            keys.sign_note(KIND_TEXT_NOTE, 1_700_000_000 + i, vec![], &format!("post {i}"))
                .unwrap()
        })
        .collect()
}

fn pool(net: &MemoryRelayNetwork, urls: &[&str]) -> RelayPool {
    let mut pool = RelayPool::new(Arc::new(net.clone()));
    pool.connect_timeout(Duration::from_secs(1));
    pool.add_urls(urls.iter().copied());
    pool
}

fn feed_filter(keys: &FullKeypair) -> Filter {
    Filter::new()
        .kinds([KIND_TEXT_NOTE])
        .authors([keys.pubkey])
        .limit(20)
}

/// Drain events until every connected relay has sent EOSE.
async fn collect_stored(sub: &mut PoolSubscription, relays: usize) -> Vec<NoteId> {
    let mut ids = vec![];
    let mut eose = 0;
    while eose < relays {
        match tokio::time::timeout(Duration::from_secs(2), sub.next()).await {
            Ok(Some(PoolEvent::Event { note, .. })) => ids.push(note.id),
            Ok(Some(PoolEvent::Eose { .. })) => eose += 1,
            Ok(None) | Err(_) => break,
        }
    }
    ids
}

#[tokio::test]
async fn surviving_relay_still_delivers() {
    let keys = author();
    let notes = posts(&keys, 3);

    let net = MemoryRelayNetwork::new();
    net.add_relay(A, RelayBehavior::Refuse, vec![]);
    net.add_relay(B, RelayBehavior::Refuse, vec![]);
    net.add_relay(C, RelayBehavior::Normal, notes.clone());

    let mut sub = pool(&net, &[A, B, C])
        .subscribe(feed_filter(&keys))
        .await
        .expect("one relay is enough");

    let ids = collect_stored(&mut sub, 1).await;
    assert_eq!(ids.len(), 3);

    assert_eq!(sub.status(C), Some(RelayStatus::Connected));
    assert_eq!(net.connect_attempts(A), 1);
    assert_eq!(net.connect_attempts(B), 1);

    sub.close().await;
    assert_eq!(net.open_connections(), 0);
}

#[tokio::test]
async fn no_relays_available_when_all_fail() {
    let keys = author();
    let net = MemoryRelayNetwork::new();
    net.add_relay(A, RelayBehavior::Refuse, posts(&keys, 2));
    net.add_relay(B, RelayBehavior::Refuse, posts(&keys, 2));

    let res = pool(&net, &[A, B]).subscribe(feed_filter(&keys)).await;
    assert!(matches!(res, Err(Error::NoRelaysAvailable)));
    assert_eq!(net.open_connections(), 0);
}

#[tokio::test]
async fn empty_pool_has_no_relays() {
    let net = MemoryRelayNetwork::new();
    let res = pool(&net, &[]).subscribe(Filter::new()).await;
    assert!(matches!(res, Err(Error::NoRelaysAvailable)));
}

#[tokio::test]
async fn duplicates_across_relays_surface_once() {
    let keys = author();
    let notes = posts(&keys, 4);

    let net = MemoryRelayNetwork::new();
    net.add_relay(A, RelayBehavior::Normal, notes.clone());
    net.add_relay(B, RelayBehavior::Normal, notes[1..].to_vec());
    net.add_relay(C, RelayBehavior::Normal, notes[..2].to_vec());

    let mut sub = pool(&net, &[A, B, C])
        .subscribe(feed_filter(&keys))
        .await
        .unwrap();

    let mut ids = collect_stored(&mut sub, 3).await;
    ids.sort();
    let mut expected: Vec<NoteId> = notes.iter().map(|n| n.id).collect();
    expected.sort();
    assert_eq!(ids, expected);

    // a live note published to two relays still shows up once
    let live = keys
        .sign_note(KIND_TEXT_NOTE, 1_800_000_000, vec![], "live")
        .unwrap();
    net.publish(A, live.clone());
    net.publish(B, live.clone());

    let first = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .unwrap();
    assert!(matches!(first, Some(PoolEvent::Event { note, .. }) if note.id == live.id));
    let second = tokio::time::timeout(Duration::from_millis(100), sub.next()).await;
    assert!(second.is_err(), "duplicate live note was delivered");

    drop(sub);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(net.open_connections(), 0);
}

#[tokio::test]
async fn forged_notes_are_dropped() {
    let keys = author();
    let mut forged = posts(&keys, 1).remove(0);
    forged.content = "tampered".to_owned();
    let honest = posts(&keys, 2).remove(1);

    let net = MemoryRelayNetwork::new();
    net.add_relay(A, RelayBehavior::Normal, vec![forged, honest.clone()]);

    let mut sub = pool(&net, &[A]).subscribe(feed_filter(&keys)).await.unwrap();
    let ids = collect_stored(&mut sub, 1).await;
    assert_eq!(ids, vec![honest.id]);
}

#[tokio::test]
async fn silent_relay_does_not_hold_up_the_others() {
    let keys = author();
    let net = MemoryRelayNetwork::new();
    net.add_relay(A, RelayBehavior::Silent, vec![]);
    net.add_relay(B, RelayBehavior::Normal, posts(&keys, 2));

    let mut sub = pool(&net, &[A, B]).subscribe(feed_filter(&keys)).await.unwrap();
    let ids = collect_stored(&mut sub, 1).await;
    assert_eq!(ids.len(), 2);

    sub.close().await;
    assert_eq!(net.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_relay_times_out_while_others_deliver() {
    let keys = author();
    let net = MemoryRelayNetwork::new();
    net.add_relay(A, RelayBehavior::Hang, vec![]);
    net.add_relay(B, RelayBehavior::Normal, posts(&keys, 2));

    let mut sub = pool(&net, &[A, B]).subscribe(feed_filter(&keys)).await.unwrap();
    let ids = collect_stored(&mut sub, 1).await;
    assert_eq!(ids.len(), 2);

    // drains A's status change, then waits on B's live feed
    let idle = tokio::time::timeout(Duration::from_secs(5), sub.next()).await;
    assert!(idle.is_err());
    assert_eq!(sub.status(A), Some(RelayStatus::Failed));
    assert_eq!(sub.status(B), Some(RelayStatus::Connected));
    assert_eq!(net.subscriptions(A), 0);
    assert_eq!(net.subscriptions(B), 1);

    sub.close().await;
    assert_eq!(net.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn every_relay_hanging_gives_up_after_the_connect_timeout() {
    let keys = author();
    let net = MemoryRelayNetwork::new();
    net.add_relay(A, RelayBehavior::Hang, posts(&keys, 1));
    net.add_relay(B, RelayBehavior::Hang, posts(&keys, 1));

    let started = tokio::time::Instant::now();
    let res = pool(&net, &[A, B]).subscribe(feed_filter(&keys)).await;

    assert!(matches!(res, Err(Error::NoRelaysAvailable)));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(net.connect_attempts(A), 1);
    assert_eq!(net.connect_attempts(B), 1);
    assert_eq!(net.open_connections(), 0);
}
