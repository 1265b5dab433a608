use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::ledger_entry,
    errors::ServiceError,
    handlers::common::{parse_id, validate_input},
    services::{
        ingestion::{Detections, IngestionReport, SAMPLE_BATCH},
        reports::ReportCadence,
    },
    ApiResponse, AppState,
};

/// Detector output for one image or scan.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IngestRequest {
    /// Item name to count. Non-positive or non-numeric counts are skipped.
    #[schema(value_type = Object, example = json!({"Tomatoes": 12, "Lettuce": 8}))]
    pub detections: Value,
    /// Optional idempotency key used when duplicate detection is enabled
    #[validate(length(min = 1, max = 128))]
    pub batch_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TestInventoryResponse {
    pub message: String,
    pub updated_items: usize,
    pub report_id: uuid::Uuid,
    pub filename: String,
}

/// Ledger entry as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InventoryItemResponse {
    pub id: uuid::Uuid,
    pub name: String,
    pub total_added: i64,
    pub total_sold: i64,
    pub current_quantity: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ledger_entry::Model> for InventoryItemResponse {
    fn from(entry: ledger_entry::Model) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            total_added: entry.total_added,
            total_sold: entry.total_sold,
            current_quantity: entry.current_quantity,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

/// Merge detector counts into the ledger
#[utoipa::path(
    post,
    path = "/api/v1/inventory/ingest",
    summary = "Ingest detections",
    description = "Credit each detected item. Items are applied independently; per-item failures are reported in the result.",
    request_body = IngestRequest,
    responses(
        (status = 200, description = "Batch processed", body = ApiResponse<IngestionReport>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Malformed detections", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 409, description = "Batch already applied", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn ingest_detections(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<IngestRequest>,
) -> Result<Json<ApiResponse<IngestionReport>>, ServiceError> {
    validate_input(&request)?;

    let raw = request.detections.as_object().ok_or_else(|| {
        ServiceError::ValidationError("detections must be an object of item name to count".into())
    })?;
    let detections = Detections::sanitize(raw);

    let report = state
        .services
        .ingestion
        .ingest(auth_user.business_id, detections, request.batch_id)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Ingest the bundled sample batch and take a test snapshot
#[utoipa::path(
    post,
    path = "/api/v1/test-inventory-data",
    summary = "Load sample inventory",
    responses(
        (status = 200, description = "Sample data ingested and test report generated", body = ApiResponse<TestInventoryResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn load_test_inventory(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<TestInventoryResponse>>, ServiceError> {
    let detections = Detections::from_counts(SAMPLE_BATCH.iter().copied());
    // Each load is a new delivery, even with duplicate detection enabled.
    let batch_id = format!("sample-{}", uuid::Uuid::new_v4());
    let ingestion = state
        .services
        .ingestion
        .ingest(auth_user.business_id, detections, Some(batch_id))
        .await?;

    let report = state
        .services
        .reports
        .generate(auth_user.business_id, Some(ReportCadence::Test))
        .await?;

    Ok(Json(ApiResponse::success(TestInventoryResponse {
        message: "Test inventory data loaded".to_string(),
        updated_items: ingestion.applied,
        report_id: report.report_id,
        filename: report.artifact_name,
    })))
}

/// List the ledger of the calling business
#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    summary = "List inventory",
    responses(
        (status = 200, description = "Ledger entries ordered by name", body = ApiResponse<Vec<InventoryItemResponse>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn list_inventory(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<InventoryItemResponse>>>, ServiceError> {
    let entries = state.services.ledger.list(auth_user.business_id).await?;
    Ok(Json(ApiResponse::success(
        entries.into_iter().map(InventoryItemResponse::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory/{id}",
    summary = "Get inventory item",
    params(("id" = String, Path, description = "Ledger entry ID")),
    responses(
        (status = 200, description = "Ledger entry", body = ApiResponse<InventoryItemResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "inventory"
)]
pub async fn get_inventory_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<InventoryItemResponse>>, ServiceError> {
    let entry_id = parse_id(&id, "inventory item")?;
    let entry = state
        .services
        .ledger
        .find(auth_user.business_id, entry_id)
        .await?;
    Ok(Json(ApiResponse::success(entry.into())))
}
