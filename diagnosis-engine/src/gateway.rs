use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GatewayError;
use crate::labels::{self, DiagnosisType};

/// Identifies which classifier produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    DeepLearning,
    Medgemma,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::DeepLearning => "deep_learning",
            Method::Medgemma => "medgemma",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classifier's normalized opinion on a single image. Immutable once
/// constructed; lives only for the diagnosis session that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub diagnosis_type: DiagnosisType,
    /// Percentage on the 0-100 scale.
    pub confidence: f64,
    pub image_url: String,
    pub method: Method,
}

/// Wire shape of a classifier response. The label arrives as either
/// `classification` or `prediction` depending on the service; the first
/// non-empty one wins.
#[derive(Debug, Deserialize)]
pub struct RawClassifierResponse {
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub prediction: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl RawClassifierResponse {
    fn label(&self) -> Option<&str> {
        [self.classification.as_deref(), self.prediction.as_deref()]
            .into_iter()
            .flatten()
            .find(|label| !label.trim().is_empty())
    }
}

/// Scale a classifier confidence onto the 0-100 percentage scale. The two
/// services disagree on convention: values above 1 are taken as already
/// scaled, values in [0, 1] as probabilities.
pub fn scale_confidence(value: f64) -> f64 {
    if value > 1.0 { value } else { value * 100.0 }
}

fn normalize_response(
    raw: RawClassifierResponse,
    method: Method,
    uploaded_filename: &str,
) -> Result<DiagnosisResult, GatewayError> {
    let diagnosis_type = match raw.label() {
        Some(label) => labels::normalize(label),
        None => return Err(GatewayError::MissingLabel { method }),
    };
    let confidence = scale_confidence(raw.confidence);
    let image_url = raw
        .image_url
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| uploaded_filename.to_string());

    Ok(DiagnosisResult {
        diagnosis_type,
        confidence,
        image_url,
        method,
    })
}

/// A remote classification service. The trait seam exists so the
/// orchestrator can be exercised without a network.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn method(&self) -> Method;

    /// Submit one image and return the normalized opinion. All failure modes
    /// surface as recoverable [`GatewayError`] values.
    async fn classify(&self, image: &[u8], filename: &str)
    -> Result<DiagnosisResult, GatewayError>;
}

/// Gateway around one remote classification service, uploading the image as
/// a single-part multipart body to the service's analyze endpoint.
pub struct HttpClassifierGateway {
    method: Method,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpClassifierGateway {
    pub fn new(method: Method, endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            method,
            endpoint: endpoint.into(),
            client,
        }
    }

    async fn call(&self, image: &[u8], filename: &str) -> Result<RawClassifierResponse, GatewayError> {
        let part = Part::bytes(image.to_vec()).file_name(filename.to_string());
        let form = Form::new().part("image", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|source| GatewayError::Request {
                method: self.method,
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                method: self.method,
                status,
            });
        }

        response
            .json::<RawClassifierResponse>()
            .await
            .map_err(|e| GatewayError::MalformedBody {
                method: self.method,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Classifier for HttpClassifierGateway {
    fn method(&self) -> Method {
        self.method
    }

    async fn classify(
        &self,
        image: &[u8],
        filename: &str,
    ) -> Result<DiagnosisResult, GatewayError> {
        debug!("uploading {} to {} classifier", filename, self.method);
        let raw = self.call(image, filename).await?;
        normalize_response(raw, self.method, filename)
    }
}
