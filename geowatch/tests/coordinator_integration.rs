//! Integration tests for the request coordinator.
//!
//! These tests drive the complete engine through an in-memory platform:
//! - one-shot deadlines under paused Tokio time
//! - watch replacement, clearing and late deliveries
//! - pause / resume of the host application
//! - watches clearing each other from their callbacks
//! - the IP-geolocation fallback behind a scripted fetcher
//!
//! Run with: `cargo test --test coordinator_integration`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use geowatch::coordinator::{Coordinator, CoordinatorConfig, RequestOptions};
use geowatch::fallback::{
    Endpoint, FetchFuture, HttpFetcher, IpFallback, ResponseFormat, DEFAULT_PRIMARY_URL,
    DEFAULT_SECONDARY_URL,
};
use geowatch::provider::InMemoryPlatform;
use geowatch::reading::{PositionReport, ProviderId, Reading};
use geowatch::watch::{WatchCallback, WatchOptions, WatchPhase};
use geowatch::LocateError;

// ============================================================================
// Helper Functions
// ============================================================================

/// Fetcher answering from a fixed url -> body table.
struct ScriptedFetcher {
    responses: HashMap<String, String>,
}

impl ScriptedFetcher {
    fn new(responses: &[(&str, &str)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(u, b)| (u.to_string(), b.to_string()))
                .collect(),
        }
    }
}

impl HttpFetcher for ScriptedFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        let body = self.responses.get(url).cloned();
        Box::pin(async move { body })
    }
}

const IPAPI_CO_OK: &str = r#"{"ip":"203.0.113.44","city":"Graz","region":"Styria","country_name":"Austria","latitude":47.07,"longitude":15.44}"#;

fn default_fallback(responses: &[(&str, &str)]) -> IpFallback {
    IpFallback::new(
        Arc::new(ScriptedFetcher::new(responses)),
        vec![
            Endpoint::new(DEFAULT_PRIMARY_URL, ResponseFormat::IpApi),
            Endpoint::new(DEFAULT_SECONDARY_URL, ResponseFormat::IpApiCo),
        ],
    )
}

fn coordinator_over(platform: &Arc<InMemoryPlatform>, config: CoordinatorConfig) -> Coordinator {
    Coordinator::new(platform.clone(), platform.clone(), config)
}

fn all_providers() -> RequestOptions {
    RequestOptions::default().with_high_accuracy(false)
}

fn channel_callback() -> (Arc<dyn WatchCallback>, mpsc::UnboundedReceiver<Reading>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: Arc<dyn WatchCallback> = Arc::new(move |r: &Reading| {
        let _ = tx.send(r.clone());
    });
    (callback, rx)
}

fn disable_all_subscriptions(platform: &InMemoryPlatform) {
    for provider in ProviderId::DEVICE {
        platform.fail_subscriptions(provider, true);
    }
}

// ============================================================================
// One-shot Requests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_one_shot_times_out_without_readings() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());

    let started = tokio::time::Instant::now();
    let result = coordinator.get_current_position(all_providers()).await;

    assert_eq!(result, Err(LocateError::Timeout));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(platform.total_live_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reading_one_millisecond_before_deadline_resolves() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = Arc::new(coordinator_over(&platform, CoordinatorConfig::default()));
    let timeout = Duration::from_secs(4);

    let request = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .get_current_position(all_providers().with_timeout(timeout))
                .await
        })
    };

    tokio::time::sleep(timeout - Duration::from_millis(1)).await;
    let late = Reading::new(ProviderId::Passive, 47.0, 15.0, 120.0, 42);
    assert_eq!(platform.emit(late.clone()), 1);

    assert_eq!(request.await.unwrap(), Ok(late));
    assert_eq!(platform.total_live_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_falls_back_to_cache_that_appeared_meanwhile() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = Arc::new(coordinator_over(&platform, CoordinatorConfig::default()));

    let request = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.get_current_position(all_providers()).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    // Another app obtained a fix; the platform caches it but our
    // subscriptions never deliver.
    let cached = Reading::new(ProviderId::Network, 47.0, 15.0, 60.0, 7);
    platform.set_last_known(cached.clone());

    assert_eq!(request.await.unwrap(), Ok(cached));
}

#[tokio::test(start_paused = true)]
async fn test_high_accuracy_one_shot_only_subscribes_gps() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = Arc::new(coordinator_over(&platform, CoordinatorConfig::default()));

    let request = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .get_current_position(RequestOptions::default())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(platform.live_subscriptions(ProviderId::Gps), 1);
    assert_eq!(platform.total_live_subscriptions(), 1);

    // Network readings never reach a GPS-only request
    assert_eq!(
        platform.emit(Reading::new(ProviderId::Network, 1.0, 1.0, 20.0, 1)),
        0
    );
    platform.emit(Reading::new(ProviderId::Gps, 1.0, 1.0, 4.0, 2));

    let reading = request.await.unwrap().unwrap();
    assert_eq!(reading.source(), ProviderId::Gps);
}

#[tokio::test]
async fn test_no_subscribable_provider_without_fallback() {
    let platform = Arc::new(InMemoryPlatform::with_enabled(&[ProviderId::Network]));
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());

    // High accuracy needs GPS, which is off
    let result = coordinator
        .get_current_position(RequestOptions::default())
        .await;

    assert_eq!(result, Err(LocateError::NoProviderAvailable));
}

#[tokio::test]
async fn test_preconditions_fail_fast() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());

    platform.set_permission(false);
    assert_eq!(
        coordinator.get_current_position(all_providers()).await,
        Err(LocateError::PermissionDenied)
    );

    platform.set_permission(true);
    platform.set_service_enabled(false);
    assert_eq!(
        coordinator.get_current_position(all_providers()).await,
        Err(LocateError::ServiceUnavailable)
    );
    assert_eq!(platform.total_live_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_in_flight_one_shot() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = Arc::new(coordinator_over(&platform, CoordinatorConfig::default()));

    let request = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.get_current_position(all_providers()).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(platform.total_live_subscriptions(), 3);
    coordinator.shutdown();

    assert_eq!(
        request.await.unwrap(),
        Err(LocateError::ServiceUnavailable)
    );
    assert_eq!(platform.total_live_subscriptions(), 0);
}

// ============================================================================
// IP Fallback
// ============================================================================

#[tokio::test]
async fn test_ip_fallback_uses_secondary_when_primary_is_malformed() {
    let platform = Arc::new(InMemoryPlatform::new());
    disable_all_subscriptions(&platform);
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default()).with_fallback(
        default_fallback(&[
            (DEFAULT_PRIMARY_URL, "{\"status\":"),
            (DEFAULT_SECONDARY_URL, IPAPI_CO_OK),
        ]),
    );

    let reading = coordinator
        .get_current_position(all_providers())
        .await
        .unwrap();

    assert_eq!(reading.source(), ProviderId::Ip);
    assert_eq!(reading.accuracy_meters(), 10_000.0);
    assert_eq!(reading.latitude(), 47.07);

    let report = PositionReport::from(&reading);
    assert_eq!(report.city.as_deref(), Some("Graz"));
    assert_eq!(report.ip.as_deref(), Some("203.0.113.44"));
}

#[tokio::test]
async fn test_ip_fallback_both_failing_is_no_provider() {
    let platform = Arc::new(InMemoryPlatform::new());
    disable_all_subscriptions(&platform);
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default())
        .with_fallback(default_fallback(&[(DEFAULT_PRIMARY_URL, "<html>")]));

    assert_eq!(
        coordinator.get_current_position(all_providers()).await,
        Err(LocateError::NoProviderAvailable)
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_not_rescued_by_ip_unless_configured() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default())
        .with_fallback(default_fallback(&[(DEFAULT_SECONDARY_URL, IPAPI_CO_OK)]));

    assert_eq!(
        coordinator.get_current_position(all_providers()).await,
        Err(LocateError::Timeout)
    );
}

#[tokio::test(start_paused = true)]
async fn test_fallback_on_timeout_resolves_by_ip() {
    let platform = Arc::new(InMemoryPlatform::new());
    let config = CoordinatorConfig::default().with_fallback_on_timeout(true);
    let coordinator = coordinator_over(&platform, config)
        .with_fallback(default_fallback(&[(DEFAULT_SECONDARY_URL, IPAPI_CO_OK)]));

    let reading = coordinator
        .get_current_position(all_providers())
        .await
        .unwrap();

    assert_eq!(reading.source(), ProviderId::Ip);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_on_timeout_failing_is_still_timeout() {
    let platform = Arc::new(InMemoryPlatform::new());
    let config = CoordinatorConfig::default().with_fallback_on_timeout(true);
    let coordinator =
        coordinator_over(&platform, config).with_fallback(default_fallback(&[]));

    assert_eq!(
        coordinator.get_current_position(all_providers()).await,
        Err(LocateError::Timeout)
    );
}

// ============================================================================
// Watches
// ============================================================================

#[tokio::test]
async fn test_registering_w1_twice_keeps_second_registration() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());
    let (first, _first_rx) = channel_callback();
    let (second, mut second_rx) = channel_callback();

    coordinator
        .watch_position(
            Some("w1"),
            WatchOptions::default().with_high_accuracy(false),
            first,
        )
        .unwrap();
    let id = coordinator
        .watch_position(
            Some("w1"),
            WatchOptions::default()
                .with_high_accuracy(true)
                .with_min_distance(50.0),
            second,
        )
        .unwrap();

    assert_eq!(id, "w1");
    assert_eq!(platform.total_live_subscriptions(), 1);
    let params = platform.subscription_params(ProviderId::Gps);
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].min_distance_meters, 50.0);

    let info = coordinator.watch_info("w1").unwrap();
    assert_eq!(
        info.active_providers.into_iter().collect::<Vec<_>>(),
        vec![ProviderId::Gps]
    );

    platform.emit(Reading::new(ProviderId::Gps, 1.0, 1.0, 3.0, 1));
    let delivered = tokio::time::timeout(Duration::from_secs(1), second_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.source(), ProviderId::Gps);
}

#[tokio::test]
async fn test_clear_watch_then_late_reading_produces_no_callback() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());
    let (callback, mut rx) = channel_callback();

    coordinator
        .watch_position(
            Some("w1"),
            WatchOptions::default().with_high_accuracy(false),
            callback,
        )
        .unwrap();
    let stale = platform.reading_sinks(ProviderId::Network);
    assert_eq!(stale.len(), 1);

    assert!(coordinator.clear_watch("w1"));
    stale[0].deliver(Reading::new(ProviderId::Network, 1.0, 1.0, 30.0, 1));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(platform.total_live_subscriptions(), 0);
}

#[tokio::test]
async fn test_watch_survives_provider_failure_and_disable() {
    let platform = Arc::new(InMemoryPlatform::new());
    platform.fail_subscriptions(ProviderId::Passive, true);
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());
    let (callback, mut rx) = channel_callback();

    let id = coordinator
        .watch_position(None, WatchOptions::default().with_high_accuracy(false), callback)
        .unwrap();
    platform.set_provider_enabled(ProviderId::Gps, false);
    platform.emit(Reading::new(ProviderId::Network, 1.0, 1.0, 30.0, 1));

    let reading = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reading.source(), ProviderId::Network);

    let info = coordinator.watch_info(&id).unwrap();
    assert_eq!(
        info.active_providers.into_iter().collect::<Vec<_>>(),
        vec![ProviderId::Network]
    );
}

#[tokio::test]
async fn test_pause_and_resume_restart_watches() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());
    let (callback, mut rx) = channel_callback();
    let options = WatchOptions::default()
        .with_high_accuracy(false)
        .with_min_interval(Duration::from_secs(2));

    coordinator
        .watch_position(Some("w1"), options, callback)
        .unwrap();

    assert_eq!(coordinator.on_pause(), 1);
    assert_eq!(platform.total_live_subscriptions(), 0);
    assert!(coordinator.watch_info("w1").is_none());

    assert!(coordinator.on_resume().is_empty());
    assert_eq!(platform.total_live_subscriptions(), 3);
    assert_eq!(coordinator.watch_info("w1").unwrap().options, options);

    platform.emit(Reading::new(ProviderId::Gps, 1.0, 1.0, 3.0, 1));
    let reading = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reading.source(), ProviderId::Gps);
}

#[tokio::test]
async fn test_watch_with_no_subscribable_provider_fails() {
    let platform = Arc::new(InMemoryPlatform::new());
    disable_all_subscriptions(&platform);
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());
    let (callback, _rx) = channel_callback();

    assert_eq!(
        coordinator.watch_position(Some("w1"), WatchOptions::default(), callback),
        Err(LocateError::NoProviderAvailable)
    );
    assert!(coordinator.watch_info("w1").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_watch_named_like_a_request_survives_the_request() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = Arc::new(coordinator_over(&platform, CoordinatorConfig::default()));
    let (callback, mut rx) = channel_callback();

    coordinator
        .watch_position(Some("request-1"), WatchOptions::default(), callback)
        .unwrap();

    let request = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .get_current_position(RequestOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(platform.live_subscriptions(ProviderId::Gps), 2);

    platform.emit(Reading::new(ProviderId::Gps, 1.0, 1.0, 4.0, 1));
    assert_eq!(request.await.unwrap().unwrap().source(), ProviderId::Gps);
    assert_eq!(rx.recv().await.unwrap().timestamp_millis(), 1);

    // The one-shot released only its own subscription
    assert_eq!(platform.live_subscriptions(ProviderId::Gps), 1);
    let info = coordinator.watch_info("request-1").unwrap();
    assert_eq!(info.phase, WatchPhase::Active);

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(
        platform.emit(Reading::new(ProviderId::Gps, 2.0, 2.0, 4.0, 20_001)),
        1
    );
    assert_eq!(rx.recv().await.unwrap().timestamp_millis(), 20_001);
}

#[tokio::test]
async fn test_generated_watch_id_skips_caller_chosen_ids() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());
    let (first, _first_rx) = channel_callback();
    let (second, _second_rx) = channel_callback();

    coordinator
        .watch_position(Some("watch-1"), WatchOptions::default(), first)
        .unwrap();
    let generated = coordinator
        .watch_position(None, WatchOptions::default(), second)
        .unwrap();

    assert_eq!(generated, "watch-2");
    assert!(coordinator.watch_info("watch-1").is_some());
    assert!(coordinator.watch_info("watch-2").is_some());
    assert_eq!(platform.live_subscriptions(ProviderId::Gps), 2);
}

#[tokio::test]
async fn test_watch_with_configured_defaults() {
    let platform = Arc::new(InMemoryPlatform::new());
    let config = CoordinatorConfig::default().with_watch(
        WatchOptions::default()
            .with_high_accuracy(false)
            .with_min_distance(25.0),
    );
    let coordinator = coordinator_over(&platform, config);
    let (callback, _rx) = channel_callback();

    let id = coordinator
        .watch_position_with_defaults(None, callback)
        .unwrap();

    assert_eq!(platform.total_live_subscriptions(), 3);
    let params = platform.subscription_params(ProviderId::Gps);
    assert_eq!(params[0].min_distance_meters, 25.0);
    assert_eq!(coordinator.watch_info(&id).unwrap().options, config.watch);
}

// ============================================================================
// Pause / Resume
// ============================================================================

#[tokio::test]
async fn test_resume_with_service_off_keeps_watches_paused() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());
    let (callback, _rx) = channel_callback();

    coordinator
        .watch_position(Some("w1"), WatchOptions::default(), callback)
        .unwrap();
    assert_eq!(coordinator.on_pause(), 1);

    platform.set_service_enabled(false);
    assert_eq!(coordinator.on_resume(), vec!["w1".to_string()]);
    assert_eq!(platform.total_live_subscriptions(), 0);
    assert!(coordinator.watch_info("w1").is_none());

    platform.set_service_enabled(true);
    assert!(coordinator.on_resume().is_empty());
    assert_eq!(platform.live_subscriptions(ProviderId::Gps), 1);
    assert!(coordinator.watch_info("w1").is_some());
}

#[tokio::test]
async fn test_resume_without_permission_subscribes_nothing() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = coordinator_over(&platform, CoordinatorConfig::default());
    let (callback, _rx) = channel_callback();

    coordinator
        .watch_position(
            Some("w1"),
            WatchOptions::default().with_high_accuracy(false),
            callback,
        )
        .unwrap();
    coordinator.on_pause();

    platform.set_permission(false);
    assert_eq!(coordinator.on_resume(), vec!["w1".to_string()]);
    assert_eq!(platform.total_live_subscriptions(), 0);

    platform.set_permission(true);
    assert!(coordinator.on_resume().is_empty());
    assert_eq!(platform.total_live_subscriptions(), 3);
}

// ============================================================================
// Callbacks Clearing Watches
// ============================================================================

/// Callback that waits until `arrived` reaches two, then clears `other`.
fn clearing_callback(
    coordinator: Weak<Coordinator>,
    arrived: Arc<AtomicUsize>,
    other: &'static str,
    done: mpsc::UnboundedSender<&'static str>,
) -> Arc<dyn WatchCallback> {
    Arc::new(move |_: &Reading| {
        arrived.fetch_add(1, Ordering::SeqCst);
        let give_up = Instant::now() + Duration::from_secs(2);
        while arrived.load(Ordering::SeqCst) < 2 && Instant::now() < give_up {
            std::thread::yield_now();
        }
        if let Some(coordinator) = coordinator.upgrade() {
            coordinator.clear_watch(other);
        }
        let _ = done.send(other);
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watches_clearing_each_other_from_callbacks() {
    let platform = Arc::new(InMemoryPlatform::new());
    let coordinator = Arc::new(coordinator_over(&platform, CoordinatorConfig::default()));
    let arrived = Arc::new(AtomicUsize::new(0));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    for (id, other) in [("a", "b"), ("b", "a")] {
        let callback = clearing_callback(
            Arc::downgrade(&coordinator),
            Arc::clone(&arrived),
            other,
            done_tx.clone(),
        );
        coordinator
            .watch_position(Some(id), WatchOptions::default(), callback)
            .unwrap();
    }

    assert_eq!(
        platform.emit(Reading::new(ProviderId::Gps, 1.0, 1.0, 4.0, 1)),
        2
    );

    // Every callback that started returns, even when each clears the
    // other mid-delivery
    let mut returned = 0;
    while returned < arrived.load(Ordering::SeqCst).max(1) {
        let cleared = tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
            .await
            .expect("callbacks deadlocked");
        assert!(cleared.is_some());
        returned += 1;
    }

    assert!(coordinator.watch_info("a").is_none());
    assert!(coordinator.watch_info("b").is_none());
    assert_eq!(platform.total_live_subscriptions(), 0);
}
