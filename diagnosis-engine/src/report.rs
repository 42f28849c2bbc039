use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ReportError;
use crate::gateway::DiagnosisResult;
use crate::orchestrator::DiagnosisPair;

/// Patient metadata included in a generated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub medical_conditions: String,
    pub patient_history: String,
}

/// Payload for the external report-generation service. Top-level keys are
/// camelCase on the wire; the nested results stay snake_case.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub dl_result: DiagnosisResult,
    pub medgemma_result: DiagnosisResult,
    pub patient: Patient,
}

impl ReportRequest {
    /// Bundle the patient with both model results. Report generation is
    /// defined only for the dual-model case.
    pub fn build(patient: Patient, pair: &DiagnosisPair) -> Result<Self, ReportError> {
        match (&pair.deep_learning, &pair.medgemma) {
            (Some(dl_result), Some(medgemma_result)) => Ok(Self {
                dl_result: dl_result.clone(),
                medgemma_result: medgemma_result.clone(),
                patient,
            }),
            _ => Err(ReportError::MissingModelResult),
        }
    }
}

/// Generated report as returned by the report service: a hex-encoded PDF
/// plus its filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub pdf: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    email: &'a str,
    pdf: &'a str,
    filename: &'a str,
}

/// Client for the external report service. Retains the last generated
/// artifact so the generate-then-email sequence never regenerates the PDF.
pub struct ReportCoordinator {
    client: reqwest::Client,
    base_url: String,
    artifact: Mutex<Option<ReportArtifact>>,
}

impl ReportCoordinator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            artifact: Mutex::new(None),
        }
    }

    /// Request PDF generation and retain the returned artifact for a later
    /// email dispatch.
    pub async fn generate(&self, request: &ReportRequest) -> Result<ReportArtifact, ReportError> {
        let url = format!("{}/generate-report", self.base_url);
        info!("requesting report generation from {}", url);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Status(status));
        }

        let artifact: ReportArtifact = response
            .json()
            .await
            .map_err(|e| ReportError::MalformedBody(e.to_string()))?;

        info!("report {} generated", artifact.filename);
        *self.artifact.lock().unwrap() = Some(artifact.clone());
        Ok(artifact)
    }

    /// Email the retained artifact. Requires a prior [`generate`] call and a
    /// non-empty address; deliverability is the mail service's concern.
    ///
    /// [`generate`]: ReportCoordinator::generate
    pub async fn send_by_email(&self, email: &str) -> Result<(), ReportError> {
        if email.trim().is_empty() {
            return Err(ReportError::EmptyEmail);
        }

        let artifact = self
            .artifact
            .lock()
            .unwrap()
            .clone()
            .ok_or(ReportError::NoArtifact)?;

        let url = format!("{}/send-report-email", self.base_url);
        info!("sending report {} to {}", artifact.filename, email);

        let body = SendEmailRequest {
            email,
            pdf: &artifact.pdf,
            filename: &artifact.filename,
        };
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::Status(status));
        }

        Ok(())
    }

    /// The last generated artifact, if any.
    pub fn last_artifact(&self) -> Option<ReportArtifact> {
        self.artifact.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Method;
    use crate::labels::DiagnosisType;

    fn patient() -> Patient {
        Patient {
            name: "John Doe".to_string(),
            age: 58,
            gender: "Male".to_string(),
            medical_conditions: "Hypertension".to_string(),
            patient_history: "Former smoker".to_string(),
        }
    }

    fn opinion(method: Method) -> DiagnosisResult {
        DiagnosisResult {
            diagnosis_type: DiagnosisType::Adenocarcinoma,
            confidence: 91.5,
            image_url: "scan.png".to_string(),
            method,
        }
    }

    fn complete_pair() -> DiagnosisPair {
        DiagnosisPair {
            deep_learning: Some(opinion(Method::DeepLearning)),
            medgemma: Some(opinion(Method::Medgemma)),
        }
    }

    #[test]
    fn building_a_request_requires_both_results() {
        let partial = DiagnosisPair {
            deep_learning: Some(opinion(Method::DeepLearning)),
            medgemma: None,
        };
        assert!(matches!(
            ReportRequest::build(patient(), &partial),
            Err(ReportError::MissingModelResult)
        ));

        assert!(ReportRequest::build(patient(), &complete_pair()).is_ok());
    }

    #[test]
    fn request_serializes_with_camel_case_top_keys() {
        let request = ReportRequest::build(patient(), &complete_pair()).unwrap();
        let value = serde_json::to_value(&request).unwrap();

        assert!(value.get("dlResult").is_some());
        assert!(value.get("medgemmaResult").is_some());
        assert_eq!(
            value["dlResult"]["diagnosis_type"],
            serde_json::json!("adenocarcinoma")
        );
        assert_eq!(value["patient"]["name"], serde_json::json!("John Doe"));
    }

    #[tokio::test]
    async fn email_before_generation_is_a_precondition_error() {
        let coordinator = ReportCoordinator::new("http://127.0.0.1:0/report");
        assert!(matches!(
            coordinator.send_by_email("doctor@example.com").await,
            Err(ReportError::NoArtifact)
        ));
    }

    #[tokio::test]
    async fn empty_email_is_rejected_before_any_dispatch() {
        let coordinator = ReportCoordinator::new("http://127.0.0.1:0/report");
        assert!(matches!(
            coordinator.send_by_email("   ").await,
            Err(ReportError::EmptyEmail)
        ));
    }

    #[test]
    fn no_artifact_is_retained_until_generation() {
        let coordinator = ReportCoordinator::new("http://127.0.0.1:0/report");
        assert!(coordinator.last_artifact().is_none());
    }
}
