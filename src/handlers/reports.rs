use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::report_record,
    errors::ServiceError,
    handlers::common::parse_id,
    services::reports::{GeneratedReport, ReportCadence},
    ApiResponse, AppState,
};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct GenerateReportRequest {
    /// daily, 3days, weekly, monthly, custom_<N>d, manual or test. Defaults to the configured frequency.
    #[schema(example = "manual")]
    pub report_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReportResponse {
    pub id: Uuid,
    pub report_type: String,
    pub artifact_name: String,
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub item_count: i32,
}

impl From<report_record::Model> for ReportResponse {
    fn from(record: report_record::Model) -> Self {
        Self {
            id: record.id,
            report_type: record.report_type,
            artifact_name: record.artifact_name,
            generated_at: record.generated_at,
            period_start: record.period_start,
            period_end: record.period_end,
            item_count: record.item_count,
        }
    }
}

/// Snapshot the ledger into a CSV report
#[utoipa::path(
    post,
    path = "/api/v1/reports/generate",
    summary = "Generate report",
    request_body(content = GenerateReportRequest, description = "Optional report type"),
    responses(
        (status = 201, description = "Report generated", body = ApiResponse<GeneratedReport>),
        (status = 400, description = "Unknown report type", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "reports"
)]
pub async fn generate_report(
    State(state): State<AppState>,
    auth_user: AuthUser,
    request: Option<Json<GenerateReportRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<GeneratedReport>>), ServiceError> {
    let Json(request) = request.unwrap_or_default();
    let cadence = request
        .report_type
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(str::parse::<ReportCadence>)
        .transpose()?;

    let report = state
        .services
        .reports
        .generate(auth_user.business_id, cadence)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(report))))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    summary = "List reports",
    responses(
        (status = 200, description = "Reports, newest first", body = ApiResponse<Vec<ReportResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "reports"
)]
pub async fn list_reports(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<ReportResponse>>>, ServiceError> {
    let reports = state
        .services
        .reports
        .list_reports(auth_user.business_id)
        .await?;
    Ok(Json(ApiResponse::success(
        reports.into_iter().map(ReportResponse::from).collect(),
    )))
}

/// Download the CSV artifact of a report
#[utoipa::path(
    get,
    path = "/api/v1/reports/{id}/download",
    summary = "Download report",
    params(("id" = String, Path, description = "Report ID")),
    responses(
        (status = 200, description = "CSV artifact", content_type = "text/csv", body = String),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Report or artifact not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "reports"
)]
pub async fn download_report(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let report_id = parse_id(&id, "report")?;
    let (artifact_name, bytes) = state
        .services
        .reports
        .download(auth_user.business_id, report_id)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact_name),
            ),
        ],
        bytes,
    ))
}
