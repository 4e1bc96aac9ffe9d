use crate::config::ValidationError;
use crate::directory::DirectoryError;
use hyper::StatusCode;
use shared::http::UNKNOWN_TENANT_ERROR;
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("no route for path {0}")]
    NoRoute(String),

    #[error("failed to read request body: {0}")]
    RequestBody(String),

    #[error("invalid JSON body: {0}")]
    InvalidJsonBody(String),

    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("upstream request to {0} failed: {1}")]
    UpstreamRequestFailed(String, String),

    #[error("upstream timeout for {0}")]
    UpstreamTimeout(String),

    #[error("failed to read upstream response from {0}: {1}")]
    ResponseBody(String, String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Directory(DirectoryError::NotFound(_)) | GatewayError::NoRoute(_) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::Directory(DirectoryError::PathTraversal(_))
            | GatewayError::RequestBody(_)
            | GatewayError::InvalidJsonBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error kind reported to callers in the `x-proxy-error` header.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Directory(DirectoryError::NotFound(_)) => UNKNOWN_TENANT_ERROR,
            GatewayError::NoRoute(_) => "no-route",
            GatewayError::Directory(DirectoryError::PathTraversal(_))
            | GatewayError::RequestBody(_)
            | GatewayError::InvalidJsonBody(_) => "bad-request",
            GatewayError::UpstreamTimeout(_) => "upstream-timeout",
            GatewayError::UpstreamRequestFailed(..) | GatewayError::ResponseBody(..) => {
                "upstream-unavailable"
            }
            _ => "internal",
        }
    }
}
