use std::sync::Arc;

use axum::{
    Router,
    extract::{Multipart, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use diagnosis_engine::{
    CachedRecordStore, DiagnosisOrchestrator, DiagnosisPair, DiagnosisRecord, EngineConfig,
    HttpClassifierGateway, Method, RecordStoreClient, ReportArtifact, ReportCoordinator,
    ReportError, ReportRequest, consensus, records,
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::models::{DiagnoseResponse, GenerateReportRequest, SendReportRequest};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn bad_gateway_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DiagnosisOrchestrator>,
    pub reports: Arc<ReportCoordinator>,
    pub records: Arc<CachedRecordStore<RecordStoreClient>>,
}

pub async fn create_app(config: EngineConfig) -> Router {
    let app_state = create_app_state(&config);

    // Keep the cached history fresh after each successful diagnosis.
    records::spawn_invalidation_listener(
        app_state.records.clone(),
        app_state.orchestrator.subscribe(),
    );

    build_router(app_state)
}

fn create_app_state(config: &EngineConfig) -> AppState {
    let deep_learning = HttpClassifierGateway::new(
        Method::DeepLearning,
        config.dl_endpoint.clone(),
        config.classifier_timeout,
    );
    let medgemma = HttpClassifierGateway::new(
        Method::Medgemma,
        config.medgemma_endpoint.clone(),
        config.classifier_timeout,
    );

    AppState {
        orchestrator: Arc::new(DiagnosisOrchestrator::new(
            Arc::new(deep_learning),
            Arc::new(medgemma),
        )),
        reports: Arc::new(ReportCoordinator::new(config.report_base_url.clone())),
        records: Arc::new(CachedRecordStore::new(RecordStoreClient::new(
            config.records_endpoint.clone(),
        ))),
    }
}

fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/diagnose", post(diagnose))
        .route("/diagnoses", get(list_diagnoses))
        .route("/diagnoses/stats", get(diagnosis_stats))
        .route("/report/generate-report", post(generate_report))
        .route("/report/send-report-email", post(send_report_email))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Stamp every request with a correlation id and a tracing span.
async fn correlation_id_middleware(mut request: Request, next: Next) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    request.headers_mut().insert(
        "x-correlation-id",
        HeaderValue::from_str(&correlation_id).unwrap(),
    );

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Lung CT Diagnosis Service",
        "version": "1.0.0",
        "description": "Dual-model lung cancer screening with consensus analysis",
        "endpoints": {
            "POST /diagnose": "Analyze a CT scan with both classifiers",
            "GET /diagnoses": "List persisted diagnosis records",
            "GET /diagnoses/stats": "Per-type counts across scanned images",
            "POST /report/generate-report": "Generate a PDF diagnostic report",
            "POST /report/send-report-email": "Email the last generated report",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn diagnose(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<DiagnoseResponse> {
    let (filename, image) = read_image_field(&mut multipart).await?;
    info!("received CT scan {} ({} bytes)", filename, image.len());

    match state.orchestrator.diagnose(&image, &filename).await {
        Ok(outcome) => {
            let consensus = consensus(&outcome.pair);
            let failures = outcome.failures.iter().map(|e| e.to_string()).collect();
            let DiagnosisPair {
                deep_learning,
                medgemma,
            } = outcome.pair;

            Ok(Json(DiagnoseResponse {
                dl_result: deep_learning,
                medgemma_result: medgemma,
                consensus,
                failures,
            }))
        }
        Err(e) => {
            error!("diagnosis of {} failed entirely: {}", filename, e);
            Err(bad_gateway_error(
                "Both classifier services failed",
                &e.to_string(),
            ))
        }
    }
}

async fn read_image_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.png").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| bad_request_error(&format!("failed to read image upload: {}", e)))?;

        if data.is_empty() {
            return Err(bad_request_error("Uploaded image is empty"));
        }
        return Ok((filename, data.to_vec()));
    }

    Err(bad_request_error("An image file is required"))
}

async fn list_diagnoses(State(state): State<AppState>) -> ApiResult<Vec<DiagnosisRecord>> {
    match state.records.list().await {
        Ok(list) => Ok(Json(list.as_ref().clone())),
        Err(e) => {
            error!("failed to load diagnosis records: {}", e);
            Err(bad_gateway_error(
                "Failed to load diagnosis records",
                &e.to_string(),
            ))
        }
    }
}

async fn diagnosis_stats(State(state): State<AppState>) -> ApiResult<Value> {
    match state.records.list().await {
        Ok(list) => {
            let groups = records::group_by_image(&list);
            let counts = records::count_by_type(&groups);
            Ok(Json(json!({
                "total_scans": groups.len(),
                "counts": counts
            })))
        }
        Err(e) => {
            error!("failed to load diagnosis records: {}", e);
            Err(bad_gateway_error(
                "Failed to load diagnosis records",
                &e.to_string(),
            ))
        }
    }
}

async fn generate_report(
    State(state): State<AppState>,
    Json(request): Json<GenerateReportRequest>,
) -> ApiResult<ReportArtifact> {
    let pair = DiagnosisPair {
        deep_learning: request.dl_result,
        medgemma: request.medgemma_result,
    };
    let report_request = ReportRequest::build(request.patient, &pair)
        .map_err(|e| bad_request_error(&e.to_string()))?;

    match state.reports.generate(&report_request).await {
        Ok(artifact) => Ok(Json(artifact)),
        Err(e) => {
            error!("report generation failed: {}", e);
            Err(bad_gateway_error("Failed to generate report", &e.to_string()))
        }
    }
}

async fn send_report_email(
    State(state): State<AppState>,
    Json(request): Json<SendReportRequest>,
) -> ApiResult<Value> {
    match state.reports.send_by_email(&request.email).await {
        Ok(()) => Ok(Json(json!({ "success": true }))),
        Err(e @ (ReportError::NoArtifact | ReportError::EmptyEmail)) => {
            Err(bad_request_error(&e.to_string()))
        }
        Err(e) => {
            error!("report email dispatch failed: {}", e);
            Err(bad_gateway_error(
                "Failed to send report email",
                &e.to_string(),
            ))
        }
    }
}
