//! Connection pool for upstream HTTP connections
//!
//! Once the gate has let a request through, it is forwarded to the upstream
//! over pooled connections. Method, headers and body are passed on as-is;
//! only the URI is pointed at the upstream authority.

use crate::error::GateBody;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Error type for connection pool operations
#[derive(Debug)]
pub enum PoolError {
    /// Error from the HTTP client
    Client(hyper_util::client::legacy::Error),
    /// Error building the upstream request
    RequestBuild(String),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Client(e) => write!(f, "Client error: {}", e),
            PoolError::RequestBuild(s) => write!(f, "Request build error: {}", s),
        }
    }
}

impl std::error::Error for PoolError {}

impl From<hyper_util::client::legacy::Error> for PoolError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        PoolError::Client(err)
    }
}

/// Configuration for the connection pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum idle connections per host
    pub max_idle_per_host: usize,
    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Pooled HTTP client for forwarding requests upstream
pub struct ConnectionPool {
    client: Client<HttpConnector, Incoming>,
    forwarded: AtomicU64,
    config: PoolConfig,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .build(connector);

        debug!(
            max_idle = config.max_idle_per_host,
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Connection pool initialized"
        );

        Self {
            client,
            forwarded: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of requests handed to the upstream so far
    pub fn forwarded_requests(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Forward a request to `upstream` (`host:port`)
    pub async fn send_request(
        &self,
        req: Request<Incoming>,
        upstream: &str,
    ) -> Result<Response<GateBody>, PoolError> {
        let backend_req = upstream_request(req, upstream)?;

        self.forwarded.fetch_add(1, Ordering::Relaxed);
        let response = self.client.request(backend_req).await?;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, body.boxed()))
    }
}

/// Re-target a request at the upstream, keeping method, headers and body.
/// The pooled client speaks HTTP/1.1 only, so h2c requests are downgraded.
fn upstream_request<B>(req: Request<B>, upstream: &str) -> Result<Request<B>, PoolError> {
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: hyper::Uri = format!("http://{}{}", upstream, path)
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| PoolError::RequestBuild(e.to_string()))?;

    let (mut parts, body) = req.into_parts();
    parts.uri = uri;
    parts.version = hyper::Version::HTTP_11;
    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_idle_per_host, 10);
        assert_eq!(config.idle_timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_upstream_request_keeps_request_intact() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/items?page=2")
            .header("host", "media.example.com")
            .header("x-custom", "1")
            .body("payload")
            .unwrap();

        let forwarded = upstream_request(req, "192.168.1.20:8096").unwrap();
        assert_eq!(forwarded.method(), "POST");
        assert_eq!(
            forwarded.uri().to_string(),
            "http://192.168.1.20:8096/api/items?page=2"
        );
        assert_eq!(forwarded.headers().get("host").unwrap(), "media.example.com");
        assert_eq!(forwarded.headers().get("x-custom").unwrap(), "1");
        assert_eq!(*forwarded.body(), "payload");
        assert_eq!(forwarded.version(), hyper::Version::HTTP_11);
    }

    #[test]
    fn test_upstream_request_downgrades_http2() {
        let req = Request::builder()
            .version(hyper::Version::HTTP_2)
            .uri("http://gate.lan/movies")
            .body(())
            .unwrap();

        let forwarded = upstream_request(req, "127.0.0.1:8096").unwrap();
        assert_eq!(forwarded.version(), hyper::Version::HTTP_11);
        assert_eq!(forwarded.uri().to_string(), "http://127.0.0.1:8096/movies");
    }

    #[test]
    fn test_upstream_request_rejects_bad_authority() {
        let req = Request::builder().uri("/").body(()).unwrap();
        assert!(matches!(
            upstream_request(req, "bad host"),
            Err(PoolError::RequestBuild(_))
        ));
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = ConnectionPool::new(PoolConfig {
            max_idle_per_host: 5,
            idle_timeout: Duration::from_secs(30),
        });
        assert_eq!(pool.config().max_idle_per_host, 5);
        assert_eq!(pool.config().idle_timeout, Duration::from_secs(30));
        assert_eq!(pool.forwarded_requests(), 0);
    }
}
