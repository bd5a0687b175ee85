use crate::error::{error_response, GateBody, GateErrorCode};
use crate::gate::RequestGate;
use crate::pool::{ConnectionPool, PoolConfig};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Header name for request ID
const X_REQUEST_ID: &str = "x-request-id";

/// Where gated requests end up once the backend is awake
#[derive(Clone)]
struct Upstream {
    authority: Arc<str>,
    pool: Arc<ConnectionPool>,
    timeout: Duration,
}

/// HTTP front end that runs every request through the gate
pub struct GateServer {
    bind_addr: SocketAddr,
    gate: Arc<RequestGate>,
    upstream: Upstream,
    shutdown_rx: watch::Receiver<bool>,
}

impl GateServer {
    pub fn new(
        bind_addr: SocketAddr,
        gate: Arc<RequestGate>,
        upstream: &str,
        forward_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self::with_pool_config(
            bind_addr,
            gate,
            upstream,
            forward_timeout,
            shutdown_rx,
            PoolConfig::default(),
        )
    }

    pub fn with_pool_config(
        bind_addr: SocketAddr,
        gate: Arc<RequestGate>,
        upstream: &str,
        forward_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
        pool_config: PoolConfig,
    ) -> Self {
        Self {
            bind_addr,
            gate,
            upstream: Upstream {
                authority: Arc::from(upstream),
                pool: Arc::new(ConnectionPool::new(pool_config)),
                timeout: forward_timeout,
            },
            shutdown_rx,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.upstream.pool
    }

    /// Bind and serve until the shutdown channel flips to true
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        info!(
            addr = %listener.local_addr()?,
            upstream = %self.upstream.authority,
            "Gate listening (HTTP/1.1 and HTTP/2)"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let gate = Arc::clone(&self.gate);
                            let upstream = self.upstream.clone();

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, gate, upstream).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(
                            forwarded = self.upstream.pool.forwarded_requests(),
                            "Gate server shutting down"
                        );
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection<S>(
    stream: S,
    gate: Arc<RequestGate>,
    upstream: Upstream,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let gate = Arc::clone(&gate);
        let upstream = upstream.clone();
        async move { handle_request(req, gate, upstream).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .http1()
        .preserve_header_case(true)
        .http2()
        .max_concurrent_streams(250)
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_request(
    req: Request<Incoming>,
    gate: Arc<RequestGate>,
    upstream: Upstream,
) -> Result<Response<GateBody>, hyper::Error> {
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let span = tracing::info_span!("request", request_id = %request_id);

    async move {
        debug!(method = %req.method(), uri = %req.uri(), "Incoming request");
        Ok(gate.handle(req, |req| forward(req, upstream)).await)
    }
    .instrument(span)
    .await
}

/// The next handler behind the gate: proxy to the upstream
async fn forward(req: Request<Incoming>, upstream: Upstream) -> Response<GateBody> {
    let result = tokio::time::timeout(
        upstream.timeout,
        upstream.pool.send_request(req, &upstream.authority),
    )
    .await;

    match result {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!(upstream = %upstream.authority, error = %e, "Failed to forward request");
            error_response(
                GateErrorCode::UpstreamUnavailable,
                "Failed to connect to upstream",
            )
        }
        Err(_) => {
            warn!(
                upstream = %upstream.authority,
                timeout_secs = upstream.timeout.as_secs(),
                "Upstream request timed out"
            );
            error_response(
                GateErrorCode::UpstreamTimeout,
                format!(
                    "Request timed out after {} seconds",
                    upstream.timeout.as_secs()
                ),
            )
        }
    }
}
