//! OpenAPI document for the HTTP surface.

use actix_web::{HttpResponse, get};
use utoipa::OpenApi;

use harborscan_core::{
    DetectionMethod, Finding, FindingSource, Grade, Provenance, ScanMetadata, ScanReport,
    ScanStatus, ScannerOutcome, ScannerStatus, Severity, SeveritySummary, SourceKind,
};

use crate::routes::{ErrorResponse, ScanRequest};

/// Generated API description.
#[derive(OpenApi)]
#[openapi(
    paths(crate::routes::submit_scan, crate::routes::get_scan, crate::routes::healthz),
    components(schemas(
        ScanRequest,
        ErrorResponse,
        ScanReport,
        ScanMetadata,
        ScannerOutcome,
        ScannerStatus,
        DetectionMethod,
        Finding,
        FindingSource,
        Severity,
        SeveritySummary,
        Grade,
        ScanStatus,
        SourceKind,
        Provenance,
    )),
    info(
        title = "harborscan",
        description = "Security scanning for repositories and packages"
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI document as JSON.
#[get("/api/openapi.json")]
pub async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.contains(&&"/api/scans".to_string()));
        assert!(paths.contains(&&"/api/scans/{id}".to_string()));
        assert!(paths.contains(&&"/api/healthz".to_string()));
    }
}
