//! Registry behaviour against a scripted GENA client.
//!
//! Most tests run on a paused clock so lease timers can be stepped through
//! without waiting.


use std::sync::{Arc, Mutex};
use std::time::Duration;

use callback_server::NotificationPayload;
use mock_client::MockGenaClient;
use subscriptions::{Registry, RegistryConfig, SubscriptionError, SubscriptionState};
use tokio::sync::mpsc;
use tokio::time::sleep;

const AVT: &str = "http://192.168.1.20:1400/MediaRenderer/AVTransport/Event";
const RCS: &str = "http://192.168.1.20:1400/MediaRenderer/RenderingControl/Event";

fn setup() -> (Arc<MockGenaClient>, Arc<Registry>) {
    let client = MockGenaClient::new();
    let registry = Registry::new(client.clone(), RegistryConfig::new("http://192.168.1.5:3001/notify"));
    (client, registry)
}

/// Let spawned renew loops run without reaching a renewal.
async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn two_listeners_share_one_remote_subscription() {
    let (client, registry) = setup();

    let mut first = registry.subscribe(AVT).unwrap();
    let mut second = registry.subscribe(AVT).unwrap();
    settle().await;

    assert_eq!(client.subscribe_calls(), 1);
    assert_eq!(registry.endpoint_count(), 1);
    assert_eq!(registry.listener_count(AVT), 2);
    assert_eq!(registry.state(AVT), Some(SubscriptionState::Active));

    let sid = registry.current_sid(AVT).unwrap();
    assert!(registry.deliver(&sid, "e1"));
    assert_eq!(&*first.recv().await.unwrap(), "e1");
    assert_eq!(&*second.recv().await.unwrap(), "e1");

    registry.unsubscribe(first.handle).unwrap();
    settle().await;
    assert_eq!(client.unsubscribe_calls(), 0);
    assert_eq!(registry.listener_count(AVT), 1);

    assert!(registry.deliver(&sid, "e2"));
    assert_eq!(&*second.recv().await.unwrap(), "e2");
    assert!(first.events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn last_unsubscribe_sends_exactly_one_unsubscribe() {
    let (client, registry) = setup();

    let sub = registry.subscribe(AVT).unwrap();
    settle().await;
    let sid = registry.current_sid(AVT).unwrap();

    assert!(sub.handle.unsubscribe());
    settle().await;

    assert_eq!(registry.endpoint_count(), 0);
    assert_eq!(registry.state(AVT), None);
    assert_eq!(client.unsubscribed(), vec![sid.clone()]);

    sleep(Duration::from_secs(120)).await;
    assert_eq!(client.unsubscribe_calls(), 1);
    assert_eq!(client.renew_calls(), 0);
    assert!(!registry.deliver(&sid, "late"));
}

#[tokio::test(start_paused = true)]
async fn late_joiner_receives_cached_event_first() {
    let (_client, registry) = setup();

    let _early = registry.subscribe(AVT).unwrap();
    settle().await;
    let sid = registry.current_sid(AVT).unwrap();
    registry.deliver(&sid, "cached");

    let mut late = registry.subscribe(AVT).unwrap();
    assert_eq!(&*late.events.try_recv().unwrap(), "cached");

    registry.deliver(&sid, "fresh");
    assert_eq!(&*late.recv().await.unwrap(), "fresh");
}

#[tokio::test(start_paused = true)]
async fn callback_listener_gets_catch_up_before_returning() {
    let (_client, registry) = setup();

    let _early = registry.subscribe(AVT).unwrap();
    settle().await;
    let sid = registry.current_sid(AVT).unwrap();
    registry.deliver(&sid, "cached");

    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = seen.clone();
    let _handle = registry
        .subscribe_with(AVT, move |event| sink.lock().unwrap().push(event.to_string()))
        .unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["cached".to_string()]);

    registry.deliver(&sid, "next");
    settle().await;
    assert_eq!(*seen.lock().unwrap(), vec!["cached".to_string(), "next".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribes_issue_one_subscribe() {
    let (client, registry) = setup();
    let barrier = Arc::new(tokio::sync::Barrier::new(2));

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                registry.subscribe(AVT).unwrap()
            })
        })
        .collect();

    let mut subs = Vec::new();
    for task in tasks {
        subs.push(task.await.unwrap());
    }
    sleep(Duration::from_millis(100)).await;

    assert_eq!(client.subscribe_calls(), 1);
    assert_eq!(registry.listener_count(AVT), 2);
    assert_ne!(subs[0].handle.id(), subs[1].handle.id());
}

#[tokio::test(start_paused = true)]
async fn renewal_failure_tears_everything_down() {
    let (client, registry) = setup();

    let mut a = registry.subscribe(AVT).unwrap();
    let mut b = registry.subscribe(AVT).unwrap();
    settle().await;
    let sid = registry.current_sid(AVT).unwrap();

    client.fail_renew(true);
    // Lease is 20s, renewal fires 4s early.
    sleep(Duration::from_secs(17)).await;

    assert_eq!(client.renew_calls(), 1);
    assert_eq!(registry.endpoint_count(), 0);
    assert!(a.recv().await.is_none());
    assert!(b.recv().await.is_none());
    assert!(!registry.deliver(&sid, "after teardown"));

    sleep(Duration::from_secs(120)).await;
    assert_eq!(client.renew_calls(), 1, "failed renewals are not retried");
    assert_eq!(client.unsubscribed(), vec![sid]);

    assert!(matches!(
        registry.unsubscribe(a.handle),
        Err(SubscriptionError::UnknownRegistration(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_subscribe_closes_listener_streams() {
    let (client, registry) = setup();
    client.fail_subscribe(true);

    let mut sub = registry.subscribe(AVT).unwrap();
    settle().await;

    assert!(sub.recv().await.is_none());
    assert_eq!(registry.endpoint_count(), 0);
    assert_eq!(client.unsubscribe_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn lease_is_renewed_before_expiry() {
    let (client, registry) = setup();
    let _sub = registry.subscribe(AVT).unwrap();
    settle().await;

    sleep(Duration::from_secs(15)).await;
    assert_eq!(client.renew_calls(), 0);
    sleep(Duration::from_secs(2)).await;
    assert_eq!(client.renew_calls(), 1);
    sleep(Duration::from_secs(16)).await;
    assert_eq!(client.renew_calls(), 2);
    assert_eq!(client.subscribe_calls(), 1);
    assert_eq!(registry.state(AVT), Some(SubscriptionState::Active));
}

#[tokio::test(start_paused = true)]
async fn rotated_identifier_keeps_one_renewal_of_grace() {
    let (client, registry) = setup();
    client.rotate_on_renew(true);

    let mut sub = registry.subscribe(AVT).unwrap();
    settle().await;
    let first = registry.current_sid(AVT).unwrap();

    sleep(Duration::from_secs(17)).await;
    let second = registry.current_sid(AVT).unwrap();
    assert_ne!(first, second);

    assert!(registry.deliver(&first, "in flight during renewal"));
    assert!(registry.deliver(&second, "current"));
    assert_eq!(&*sub.recv().await.unwrap(), "in flight during renewal");
    assert_eq!(&*sub.recv().await.unwrap(), "current");

    sleep(Duration::from_secs(16)).await;
    let third = registry.current_sid(AVT).unwrap();
    assert_ne!(third, second);
    assert!(!registry.deliver(&first, "too old"));
    assert!(registry.deliver(&second, "still in grace"));
}

#[tokio::test(start_paused = true)]
async fn strict_matching_drops_previous_identifier() {
    let client = MockGenaClient::new();
    client.rotate_on_renew(true);
    let config = RegistryConfig {
        retain_previous_sid: false,
        ..RegistryConfig::new("http://192.168.1.5:3001/notify")
    };
    let registry = Registry::new(client.clone(), config);

    let _sub = registry.subscribe(AVT).unwrap();
    settle().await;
    let first = registry.current_sid(AVT).unwrap();
    sleep(Duration::from_secs(17)).await;

    assert!(!registry.deliver(&first, "dropped"));
}

#[tokio::test(start_paused = true)]
async fn unsubscribe_while_subscribe_in_flight_releases_the_lease() {
    let (client, registry) = setup();
    client.delay_subscribe(Duration::from_secs(3));

    let sub = registry.subscribe(AVT).unwrap();
    assert_eq!(registry.state(AVT), Some(SubscriptionState::Subscribing));
    settle().await;
    drop(sub);
    assert_eq!(registry.endpoint_count(), 0);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(client.subscribe_calls(), 1);
    assert_eq!(client.unsubscribe_calls(), 1);
    assert_eq!(registry.endpoint_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn resubscribe_racing_teardown_is_not_lost() {
    let (client, registry) = setup();

    let old = registry.subscribe(AVT).unwrap();
    settle().await;
    let old_sid = registry.current_sid(AVT).unwrap();

    // No await between these: the old loop has not sent UNSUBSCRIBE yet.
    old.handle.unsubscribe();
    let mut new = registry.subscribe(AVT).unwrap();
    settle().await;

    assert_eq!(client.subscribe_calls(), 2);
    assert_eq!(client.unsubscribed(), vec![old_sid.clone()]);
    assert_eq!(registry.listener_count(AVT), 1);

    let new_sid = registry.current_sid(AVT).unwrap();
    assert_ne!(new_sid, old_sid);
    assert!(!registry.deliver(&old_sid, "stale"));
    assert!(registry.deliver(&new_sid, "live"));
    assert_eq!(&*new.recv().await.unwrap(), "live");
}

#[tokio::test(start_paused = true)]
async fn dropped_handle_unsubscribes() {
    let (client, registry) = setup();
    {
        let _sub = registry.subscribe(RCS).unwrap();
        settle().await;
    }
    settle().await;
    assert_eq!(registry.endpoint_count(), 0);
    assert_eq!(client.unsubscribe_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn endpoints_are_independent() {
    let (client, registry) = setup();
    let mut avt = registry.subscribe(AVT).unwrap();
    let rcs = registry.subscribe(RCS).unwrap();
    settle().await;
    assert_eq!(client.subscribe_calls(), 2);

    let avt_sid = registry.current_sid(AVT).unwrap();
    rcs.handle.unsubscribe();
    settle().await;

    assert_eq!(registry.endpoint_count(), 1);
    assert!(registry.deliver(&avt_sid, "still here"));
    assert_eq!(&*avt.recv().await.unwrap(), "still here");
}

#[tokio::test(start_paused = true)]
async fn dispatcher_routes_gateway_notifications_in_order() {
    let (_client, registry) = setup();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(registry.clone().run_dispatcher(rx));

    let mut sub = registry.subscribe(AVT).unwrap();
    settle().await;
    let sid = registry.current_sid(AVT).unwrap();

    for i in 0..20 {
        tx.send(NotificationPayload {
            subscription_id: sid.clone(),
            payload: i.to_string(),
        })
        .unwrap();
    }
    tx.send(NotificationPayload {
        subscription_id: "uuid:unknown".into(),
        payload: "ignored".into(),
    })
    .unwrap();

    for i in 0..20 {
        assert_eq!(&*sub.recv().await.unwrap(), i.to_string());
    }
    settle().await;
    assert_eq!(registry.last_event(AVT).as_deref(), Some("19"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_every_subscription() {
    let (client, registry) = setup();
    let _a = registry.subscribe(AVT).unwrap();
    let _b = registry.subscribe(RCS).unwrap();
    settle().await;

    registry.shutdown().await;

    assert_eq!(client.unsubscribe_calls(), 2);
    assert_eq!(registry.endpoint_count(), 0);
    assert!(matches!(
        registry.subscribe(AVT),
        Err(SubscriptionError::ShuttingDown)
    ));
}
