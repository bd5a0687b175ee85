//! Idle sleep timer
//!
//! The timer runs on its own task. Every request pushes the fire time out by
//! one idle window; when a window passes without traffic the timer fires
//! once and then stays disarmed until the next reset.

use crate::config::HttpMethod;
use crate::health::HealthProbe;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

struct TimerShared {
    /// Scheduled fire time; `None` once fired
    deadline: Mutex<Option<Instant>>,
    rearmed: Notify,
    window: Duration,
}

/// Resettable one-shot-per-window timer
pub struct IdleSleepTimer {
    shared: Arc<TimerShared>,
    task: JoinHandle<()>,
}

impl IdleSleepTimer {
    /// Arm the timer for `window` and run `on_fire` each time a window
    /// elapses without a reset. Must be called inside a tokio runtime.
    pub fn start<F, Fut>(window: Duration, on_fire: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shared = Arc::new(TimerShared {
            deadline: Mutex::new(Some(Instant::now() + window)),
            rearmed: Notify::new(),
            window,
        });

        info!(window_secs = window.as_secs(), "Starting sleep timer");
        let task = tokio::spawn(run_timer(Arc::clone(&shared), on_fire));

        Self { shared, task }
    }

    /// Push the fire time out to now + window
    pub fn reset(&self) {
        {
            let mut deadline = self.shared.deadline.lock();
            *deadline = Some(Instant::now() + self.shared.window);
        }
        debug!("Resetting sleep timer");
        self.shared.rearmed.notify_one();
    }

    pub fn window(&self) -> Duration {
        self.shared.window
    }

    /// Whether the timer will fire again without a reset
    pub fn is_armed(&self) -> bool {
        self.shared.deadline.lock().is_some()
    }
}

impl Drop for IdleSleepTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_timer<F, Fut>(shared: Arc<TimerShared>, on_fire: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let deadline = *shared.deadline.lock();

        let Some(deadline) = deadline else {
            shared.rearmed.notified().await;
            continue;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = shared.rearmed.notified() => continue,
        }

        // A reset may have landed between the sleep ending and this check
        let fire = {
            let mut guard = shared.deadline.lock();
            match *guard {
                Some(current) if current <= Instant::now() => {
                    *guard = None;
                    true
                }
                _ => false,
            }
        };

        if fire {
            on_fire().await;
        }
    }
}

/// Stop call issued when the idle window elapses
#[derive(Debug, Clone)]
pub struct StopAction {
    probe: HealthProbe,
    client: reqwest::Client,
    stop_url: String,
    method: HttpMethod,
}

impl StopAction {
    pub fn new(
        probe: HealthProbe,
        client: reqwest::Client,
        stop_url: impl Into<String>,
        method: HttpMethod,
    ) -> Self {
        Self {
            probe,
            client,
            stop_url: stop_url.into(),
            method,
        }
    }

    /// Stop the backend if it is still up. Errors are only logged because no
    /// request is waiting on the outcome.
    pub async fn run(&self) {
        if !self.probe.is_alive().await {
            info!("Backend is already stopped");
            return;
        }

        info!(method = %self.method, url = %self.stop_url, "Attempting to stop backend");
        let request = match self.method {
            HttpMethod::Get => self.client.get(&self.stop_url),
            HttpMethod::Post => self
                .client
                .post(&self.stop_url)
                .header(reqwest::header::CONTENT_TYPE, "application/json"),
        };

        match request.send().await {
            Ok(response) => {
                debug!(status = %response.status(), "Stop call answered");
            }
            Err(e) => {
                error!(url = %self.stop_url, error = %e, "Error while stopping backend");
            }
        }
    }
}
