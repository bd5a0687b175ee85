//! Error types and plain-text error responses for the gate

use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use thiserror::Error;

/// Response body type shared by the gate, the forwarding pool and the server
pub type GateBody = BoxBody<Bytes, hyper::Error>;

/// Failure of a single wake attempt
#[derive(Debug, Error)]
pub enum WakeError {
    /// Hardware address did not parse into exactly 6 octets
    #[error("invalid hardware address '{0}'")]
    InvalidAddress(String),

    /// Broadcast interface is missing or has no usable IPv4 address
    #[error("interface {name} unavailable: {reason}")]
    InterfaceUnavailable { name: String, reason: String },

    /// The socket accepted fewer bytes than the full magic packet
    #[error("magic packet sent was {0} bytes (expected 102 bytes sent)")]
    TransmissionIncomplete(usize),

    /// Start URL call failed at the transport level
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// UDP socket error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rejected gate configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("healthCheck cannot be empty")]
    MissingHealthCheck,

    #[error("if mac or ip is set, the other must be set too")]
    IncompleteBroadcastTarget,

    #[error("either mac and ip or startUrl must be set")]
    MissingWakeTarget,

    #[error("cannot use mac and startUrl at the same time")]
    ConflictingWakeTargets,

    #[error("invalid macAddress: '{0}'")]
    InvalidMacAddress(String),

    #[error("{field} must be at least 1")]
    OutOfRange { field: &'static str },

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Why a gated request could not be forwarded
#[derive(Debug, Error)]
pub enum GateError {
    /// The wake strategy itself failed; the request ends without polling
    #[error("{0}")]
    Wake(#[from] WakeError),

    /// The backend never answered within the configured polls
    #[error("Failed to start server")]
    StartTimeout { polls: u32 },
}

impl GateError {
    pub fn code(&self) -> GateErrorCode {
        match self {
            GateError::Wake(_) => GateErrorCode::WakeFailed,
            GateError::StartTimeout { .. } => GateErrorCode::StartTimeout,
        }
    }

    /// Plain-text response carrying the error text
    pub fn into_response(self) -> Response<GateBody> {
        error_response(self.code(), self.to_string())
    }
}

/// Error codes surfaced in the `X-Gate-Error` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateErrorCode {
    /// Wake strategy returned an error
    WakeFailed,
    /// Backend did not come up after waking
    StartTimeout,
    /// Upstream could not be reached after the gate let the request through
    UpstreamUnavailable,
    /// Upstream did not answer within the forward timeout
    UpstreamTimeout,
}

impl GateErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateErrorCode::WakeFailed => StatusCode::INTERNAL_SERVER_ERROR,
            GateErrorCode::StartTimeout => StatusCode::INTERNAL_SERVER_ERROR,
            GateErrorCode::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            GateErrorCode::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn as_header_value(&self) -> &'static str {
        match self {
            GateErrorCode::WakeFailed => "WAKE_FAILED",
            GateErrorCode::StartTimeout => "START_TIMEOUT",
            GateErrorCode::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            GateErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
        }
    }
}

/// Create a plain-text error response with the X-Gate-Error header
pub fn error_response(code: GateErrorCode, message: impl Into<String>) -> Response<GateBody> {
    let body = message.into();

    Response::builder()
        .status(code.status_code())
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("X-Gate-Error", code.as_header_value())
        .body(Full::new(Bytes::from(body)).map_err(|e| match e {}).boxed())
        .expect("valid response with StatusCode enum and static headers")
}
