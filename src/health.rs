//! Backend liveness probe
//!
//! A backend counts as alive when a GET against the health URL completes
//! without a transport error. The response status is deliberately not
//! inspected, so a backend answering 500 is still awake.

use tracing::debug;

/// Single reachability check against a fixed URL
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HealthProbe {
    /// The client's timeout bounds every probe
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true if the backend answered at all
    pub async fn is_alive(&self) -> bool {
        debug!(url = %self.url, "Checking if backend is up");

        match self.client.get(&self.url).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Backend is up");
                true
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Backend is down");
                false
            }
        }
    }
}
