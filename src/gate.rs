//! Request gate
//!
//! Every request passes through [`RequestGate::handle`] before it reaches
//! the backend:
//!
//! 1. the idle sleep timer is pushed back,
//! 2. the backend is probed,
//! 3. a dead backend is woken once and polled until it answers or the
//!    retries run out,
//! 4. the request is handed, untouched, to the next handler, or a
//!    plain-text 500 ends it.
//!
//! The idle timer may stop the backend while a request is being forwarded.
//! That race is accepted; the only state shared with the timer is its fire
//! time.

use crate::config::GateConfig;
use crate::error::{ConfigError, GateBody, GateError};
use crate::health::HealthProbe;
use crate::timer::{IdleSleepTimer, StopAction};
use crate::wake::WakeStrategy;
use hyper::{Request, Response};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// How the backend became reachable for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// First probe succeeded, nothing was woken
    AlreadyAwake,
    /// Woken, then answered on poll number `polls`
    Woken { polls: u32 },
}

/// Per-backend gate owning the HTTP client and the idle timer
pub struct RequestGate {
    probe: HealthProbe,
    wake: WakeStrategy,
    timer: Option<IdleSleepTimer>,
    num_retries: u32,
    poll_interval: Duration,
}

impl RequestGate {
    /// Validate `config` and build the gate. Starts the idle timer when a
    /// stop URL is configured, so this must run inside a tokio runtime.
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        Self::with_idle_window(config, config.stop_timeout())
    }

    /// Like [`RequestGate::new`] with an explicit idle window instead of
    /// the configured minutes
    pub(crate) fn with_idle_window(
        config: &GateConfig,
        idle_window: Duration,
    ) -> Result<Self, ConfigError> {
        let target = config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        let probe = HealthProbe::new(client.clone(), config.health_check.trim());

        let timer = config.stop_url().map(|stop_url| {
            let action = StopAction::new(probe.clone(), client.clone(), stop_url, config.stop_method);
            IdleSleepTimer::start(idle_window, move || {
                let action = action.clone();
                async move { action.run().await }
            })
        });

        Ok(Self {
            probe,
            wake: WakeStrategy::from_target(target, client),
            timer,
            num_retries: config.num_retries,
            poll_interval: config.poll_interval(),
        })
    }

    pub fn has_sleep_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Push the idle timer back by a full window (no-op without a stop URL)
    pub fn reset_idle_timer(&self) {
        if let Some(timer) = &self.timer {
            timer.reset();
        }
    }

    /// Make sure the backend answers, waking it if needed
    pub async fn ensure_awake(&self) -> Result<Readiness, GateError> {
        if self.probe.is_alive().await {
            return Ok(Readiness::AlreadyAwake);
        }

        info!(url = %self.probe.url(), "Backend is down, waking up");
        if let Err(e) = self.wake.wake().await {
            warn!(error = %e, "Wake attempt failed");
            return Err(e.into());
        }

        info!(
            retries = self.num_retries,
            interval_ms = self.poll_interval.as_millis() as u64,
            "Waiting for backend to come up"
        );
        for poll in 1..=self.num_retries {
            tokio::time::sleep(self.poll_interval).await;
            if self.probe.is_alive().await {
                info!(polls = poll, "Backend is up");
                return Ok(Readiness::Woken { polls: poll });
            }
        }

        warn!(polls = self.num_retries, "Backend did not come up");
        Err(GateError::StartTimeout {
            polls: self.num_retries,
        })
    }

    /// Gate one request. `next` is awaited exactly once with the original
    /// request when the backend is reachable and never otherwise.
    pub async fn handle<B, F, Fut>(&self, req: Request<B>, next: F) -> Response<GateBody>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Response<GateBody>>,
    {
        self.reset_idle_timer();

        match self.ensure_awake().await {
            Ok(_) => next(req).await,
            Err(e) => e.into_response(),
        }
    }
}
