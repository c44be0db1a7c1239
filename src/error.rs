use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid datasource options: {0}")]
    InvalidOptions(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Failed to set up client certificate")]
    ClientCertificate,

    #[error("Failed to set up certificate authority")]
    CertificateAuthority,

    #[error("Failed to build http client: {0}")]
    ClientBuild(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Query canceled: {0}")]
    Canceled(String),

    #[error("Query failed - {status} [{message}] [{detail}]")]
    Backend {
        status: u16,
        message: String,
        detail: String,
    },

    #[error("Query failed - {status}: {body}")]
    BackendUnparsed { status: u16, body: String },

    #[error("Failed to unmarshal Timely response - body: {body} status: {status}")]
    MalformedPayload { status: u16, body: String },

    #[error("Error fetching resource url:{url} responseCode:{status}")]
    Resource { url: String, status: u16 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            BridgeError::ClientBuild(err.to_string())
        } else {
            BridgeError::Transport(err.to_string())
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            BridgeError::InvalidOptions(_)
            | BridgeError::InvalidQuery(_)
            | BridgeError::Serialization(_) => StatusCode::BAD_REQUEST,
            BridgeError::NotFound(_) => StatusCode::NOT_FOUND,
            BridgeError::Canceled(_) => StatusCode::GATEWAY_TIMEOUT,
            BridgeError::Transport(_) => StatusCode::BAD_GATEWAY,
            BridgeError::Backend { status, .. }
            | BridgeError::BackendUnparsed { status, .. }
            | BridgeError::Resource { status, .. } => {
                StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY)
            }
            BridgeError::MalformedPayload { .. } => StatusCode::BAD_GATEWAY,
            BridgeError::ClientCertificate
            | BridgeError::CertificateAuthority
            | BridgeError::ClientBuild(_)
            | BridgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
