//! RFC 9457 problem details.

use crate::error::ConfigServerError;
use axum::http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub detail: String,
    pub instance: String,
    pub status: u16,
}

/// Error returned by every handler, rendered as a [`Problem`]
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    instance: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            instance: instance.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>, instance: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail, instance)
    }

    /// Map a domain error onto its status code
    pub fn from_error(err: &ConfigServerError, instance: impl Into<String>) -> Self {
        let status = status_for(err);
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed");
            "an internal error occurred while processing the request".to_string()
        } else {
            err.to_string()
        };
        Self::new(status, detail, instance)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(err: &ConfigServerError) -> StatusCode {
    match err {
        ConfigServerError::RepositoryNotFound(_) | ConfigServerError::FileNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ConfigServerError::RepositoryUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ConfigServerError::InvalidToken | ConfigServerError::CannotDecryptToken => {
            StatusCode::BAD_REQUEST
        }
        err if err.is_authorization_failure() => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!(status = self.status.as_u16(), instance = %self.instance, detail = %self.detail, "request rejected");
        }

        let problem = Problem {
            kind: "about:blank".into(),
            title: self
                .status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .into(),
            detail: self.detail,
            instance: self.instance,
            status: self.status.as_u16(),
        };

        let body = serde_json::to_vec(&problem).unwrap_or_default();
        let mut response = (self.status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        response
    }
}
