use diagnosis_engine::{ConsensusVerdict, DiagnosisResult, Patient};
use serde::{Deserialize, Serialize};

/// Response for one diagnosis session: a slot per model, the consensus when
/// both are present, and the failures that were tolerated.
#[derive(Debug, Serialize)]
pub struct DiagnoseResponse {
    pub dl_result: Option<DiagnosisResult>,
    pub medgemma_result: Option<DiagnosisResult>,
    pub consensus: Option<ConsensusVerdict>,
    pub failures: Vec<String>,
}

/// The UI holds the session results client-side and posts them back when a
/// report is requested; slots may be missing after a partial diagnosis.
#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
    pub dl_result: Option<DiagnosisResult>,
    pub medgemma_result: Option<DiagnosisResult>,
    pub patient: Patient,
}

#[derive(Debug, Deserialize)]
pub struct SendReportRequest {
    pub email: String,
}
