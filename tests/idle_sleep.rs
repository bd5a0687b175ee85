//! Integration tests for the idle sleep timer and the stop call

mod common;

use common::{unused_port, wait_until, MockBackend};
use std::time::Duration;
use wakegate::config::HttpMethod;
use wakegate::health::HealthProbe;
use wakegate::timer::{IdleSleepTimer, StopAction};

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap()
}

fn stop_action(backend: &MockBackend, stop_url: &str, method: HttpMethod) -> StopAction {
    let probe = HealthProbe::new(client(), backend.url("/health"));
    StopAction::new(probe, client(), stop_url, method)
}

fn start_timer(window: Duration, action: StopAction) -> IdleSleepTimer {
    IdleSleepTimer::start(window, move || {
        let action = action.clone();
        async move { action.run().await }
    })
}

#[tokio::test]
async fn test_stop_action_posts_json_when_alive() {
    let backend = MockBackend::start().await;
    let action = stop_action(&backend, &backend.url("/stop"), HttpMethod::Post);

    action.run().await;

    let stops = backend.hits("/stop");
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].method, "POST");
    assert!(stops[0].head.contains("content-type: application/json"));
    assert_eq!(backend.hits("/health").len(), 1);
}

#[tokio::test]
async fn test_stop_action_get() {
    let backend = MockBackend::start().await;
    let action = stop_action(&backend, &backend.url("/stop"), HttpMethod::Get);

    action.run().await;

    let stops = backend.hits("/stop");
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].method, "GET");
}

#[tokio::test]
async fn test_stop_action_skips_dead_backend() {
    let port = unused_port().await;
    let power = MockBackend::start().await;
    let probe = HealthProbe::new(client(), format!("http://127.0.0.1:{}/health", port));
    let action = StopAction::new(probe, client(), power.url("/stop"), HttpMethod::Post);

    action.run().await;

    assert_eq!(power.connections(), 0);
}

#[tokio::test]
async fn test_stop_failure_is_swallowed() {
    let backend = MockBackend::start().await;
    let port = unused_port().await;
    let action = stop_action(
        &backend,
        &format!("http://127.0.0.1:{}/stop", port),
        HttpMethod::Get,
    );

    // Must not panic or propagate
    action.run().await;
    assert_eq!(backend.hits("/health").len(), 1);
}

#[tokio::test]
async fn test_resets_hold_off_stop_until_idle() {
    let backend = MockBackend::start().await;
    let timer = start_timer(
        Duration::from_millis(300),
        stop_action(&backend, &backend.url("/stop"), HttpMethod::Post),
    );

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        timer.reset();
    }
    assert!(backend.hits("/stop").is_empty());

    assert!(
        wait_until(Duration::from_secs(3), || backend.hits("/stop").len() == 1).await,
        "stop call expected after idle window"
    );

    // Fires once per window: nothing more without a reset
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(backend.hits("/stop").len(), 1);
    assert_eq!(backend.hits("/health").len(), 1);
}

#[tokio::test]
async fn test_timer_keeps_running_after_failed_stop() {
    let backend = MockBackend::start().await;
    let port = unused_port().await;
    let timer = start_timer(
        Duration::from_millis(100),
        stop_action(
            &backend,
            &format!("http://127.0.0.1:{}/stop", port),
            HttpMethod::Get,
        ),
    );

    assert!(wait_until(Duration::from_secs(3), || backend.hits("/health").len() == 1).await);

    timer.reset();
    assert!(wait_until(Duration::from_secs(3), || backend.hits("/health").len() == 2).await);
}
