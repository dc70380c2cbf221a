//! HTTP surface: scan submission, report retrieval, health.

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use harborscan_core::{ScanError, ScanReport};

use crate::admission::AdmissionGuard;
use crate::orchestrator::ScanService;
use crate::store::ReportStore;

/// Scan submission payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScanRequest {
    /// Repository URL, package install command, or add-skill shorthand.
    pub input: String,
}

/// Error payload returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable detail, safe to show to callers.
    pub message: String,
}

impl ErrorResponse {
    fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Client identity used by the rate limiter: an explicit header when
/// the caller supplies one, the peer address otherwise.
fn client_id(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Client-Id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn error_response(err: &ScanError) -> HttpResponse {
    let code = err.code();
    let body = ErrorResponse::new(code, err.to_string());
    match code {
        "invalid_input" | "invalid_repo_url" | "invalid_package_input" => {
            HttpResponse::BadRequest().json(body)
        }
        "repo_not_found" | "package_not_found" => HttpResponse::NotFound().json(body),
        "repo_private" | "repo_access_limited" => HttpResponse::Forbidden().json(body),
        "rate_limited" | "too_many_concurrent" => HttpResponse::TooManyRequests().json(body),
        "tarball_too_large" | "extracted_files_exceeded" | "extracted_file_too_large" => {
            HttpResponse::UnprocessableEntity().json(body)
        }
        "scan_timeout" => HttpResponse::GatewayTimeout().json(body),
        _ => HttpResponse::InternalServerError()
            .json(ErrorResponse::new("internal", "scan could not be completed")),
    }
}

/// Submit a scan.
#[utoipa::path(
    post,
    path = "/api/scans",
    request_body = ScanRequest,
    responses(
        (status = 201, description = "Scan completed", body = ScanReport),
        (status = 400, description = "Input could not be classified", body = ErrorResponse),
        (status = 404, description = "Source not found", body = ErrorResponse),
        (status = 429, description = "Rate limit or concurrency cap reached", body = ErrorResponse),
        (status = 504, description = "Scan exceeded its time budget", body = ErrorResponse),
    )
)]
#[post("/api/scans")]
pub async fn submit_scan(
    req: HttpRequest,
    payload: web::Json<ScanRequest>,
    guard: web::Data<AdmissionGuard>,
    service: web::Data<ScanService>,
    store: web::Data<dyn ReportStore>,
) -> HttpResponse {
    let client = client_id(&req);
    let permit = match guard.admit(&client) {
        Ok(permit) => permit,
        Err(err) => return error_response(&err),
    };

    // The permit holds the concurrency slot for the whole scan and
    // frees it on every outcome, including this future being dropped
    // when the client disconnects mid-scan.
    let result = service.scan(&payload.input, guard.scan_timeout()).await;
    drop(permit);

    match result {
        Ok(report) => {
            info!(
                "scan {} completed: score={} grade={} findings={}",
                report.id,
                report.score,
                report.grade.as_str(),
                report.findings.len()
            );
            store.put(report.clone());
            HttpResponse::Created().json(report)
        }
        Err(err) => {
            error!("scan failed: {}", err.code());
            error_response(&err)
        }
    }
}

/// Retrieve a stored report by id.
#[utoipa::path(
    get,
    path = "/api/scans/{id}",
    params(("id" = String, Path, description = "Report identifier")),
    responses(
        (status = 200, description = "Stored report", body = ScanReport),
        (status = 404, description = "No report with that id", body = ErrorResponse),
    )
)]
#[get("/api/scans/{id}")]
pub async fn get_scan(
    path: web::Path<String>,
    store: web::Data<dyn ReportStore>,
) -> HttpResponse {
    match store.get(&path.into_inner()) {
        Some(report) => HttpResponse::Ok().json(report),
        None => HttpResponse::NotFound().json(ErrorResponse::new(
            "report_not_found",
            "no report with that id",
        )),
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/api/healthz",
    responses((status = 200, description = "Service is up"))
)]
#[get("/api/healthz")]
pub async fn healthz() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}
