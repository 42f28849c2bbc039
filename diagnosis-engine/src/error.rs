use reqwest::StatusCode;
use thiserror::Error;

use crate::gateway::Method;

/// Failure of a single classifier invocation. Always carries the method tag
/// so the orchestrator can report which service was unreachable.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{method} classifier request failed: {source}")]
    Request {
        method: Method,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} classifier returned status {status}")]
    Status { method: Method, status: StatusCode },
    #[error("{method} classifier returned a malformed body: {reason}")]
    MalformedBody { method: Method, reason: String },
    #[error("{method} classifier response carries no classification or prediction label")]
    MissingLabel { method: Method },
}

impl GatewayError {
    pub fn method(&self) -> Method {
        match self {
            GatewayError::Request { method, .. }
            | GatewayError::Status { method, .. }
            | GatewayError::MalformedBody { method, .. }
            | GatewayError::MissingLabel { method } => *method,
        }
    }
}

/// Failure of a whole diagnosis session. A single classifier failure is
/// tolerated and never surfaces here; the session fails only when both
/// opinions are missing.
#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("both classifiers failed: deep_learning: {deep_learning}; medgemma: {medgemma}")]
    AllClassifiersFailed {
        deep_learning: GatewayError,
        medgemma: GatewayError,
    },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report generation requires results from both models")]
    MissingModelResult,
    #[error("no generated report is available to send; generate or view the report first")]
    NoArtifact,
    #[error("an email address is required")]
    EmptyEmail,
    #[error("report service request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("report service returned status {0}")]
    Status(StatusCode),
    #[error("report service returned a malformed body: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("record store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("record store returned status {0}")]
    Status(StatusCode),
    #[error("record store returned a malformed body: {0}")]
    MalformedBody(String),
}
