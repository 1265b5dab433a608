use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::sale_record,
    errors::ServiceError,
    handlers::{common::validate_input, inventory::InventoryItemResponse},
    services::{ledger::EntryKey, sales::parse_quantity},
    ApiResponse, AppState,
};

/// Exactly one of `item`, `item_id` or `item_name` selects the entry.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SaleRequest {
    /// Ledger entry ID or exact item name
    #[validate(length(min = 1, max = 255))]
    #[schema(example = "Tomatoes")]
    pub item: Option<String>,
    /// Ledger entry ID
    pub item_id: Option<Uuid>,
    /// Exact item name, never read as an ID
    #[validate(length(min = 1, max = 255))]
    pub item_name: Option<String>,
    /// Units sold; must be a positive integer
    #[schema(value_type = i64, example = 3)]
    pub quantity: Value,
}

impl SaleRequest {
    fn entry_key(&self) -> Result<EntryKey, ServiceError> {
        match (&self.item, self.item_id, &self.item_name) {
            (Some(reference), None, None) => EntryKey::parse(reference),
            (None, Some(id), None) => Ok(EntryKey::Id(id)),
            (None, None, Some(name)) => EntryKey::name(name),
            _ => Err(ServiceError::ValidationError(
                "exactly one of item, item_id or item_name is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaleResponse {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub item_name: String,
    pub quantity: i64,
    pub sold_at: DateTime<Utc>,
}

impl From<sale_record::Model> for SaleResponse {
    fn from(sale: sale_record::Model) -> Self {
        Self {
            id: sale.id,
            entry_id: sale.entry_id,
            item_name: sale.item_name,
            quantity: sale.quantity,
            sold_at: sale.sold_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecordSaleResponse {
    pub item: InventoryItemResponse,
    pub sale: SaleResponse,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SalesFilter {
    /// Only sales of this ledger entry
    pub entry_id: Option<Uuid>,
}

/// Record a sale against the ledger
#[utoipa::path(
    post,
    path = "/api/v1/sales",
    summary = "Record sale",
    description = "Atomically debit the item and record the sale. Fails without side effects when stock is insufficient.",
    request_body = SaleRequest,
    responses(
        (status = 201, description = "Sale recorded", body = ApiResponse<RecordSaleResponse>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient inventory", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "sales"
)]
pub async fn record_sale(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<SaleRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RecordSaleResponse>>), ServiceError> {
    let quantity = parse_quantity(&request.quantity)?;
    validate_input(&request)?;
    let key = request.entry_key()?;

    let outcome = state
        .services
        .sales
        .record_sale_by_key(auth_user.business_id, key, quantity)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(RecordSaleResponse {
            item: outcome.entry.into(),
            sale: outcome.sale.into(),
        })),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/sales",
    summary = "List sales",
    params(SalesFilter),
    responses(
        (status = 200, description = "Sales, newest first", body = ApiResponse<Vec<SaleResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "sales"
)]
pub async fn list_sales(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(filter): Query<SalesFilter>,
) -> Result<Json<ApiResponse<Vec<SaleResponse>>>, ServiceError> {
    let sales = state
        .services
        .sales
        .list_sales(auth_user.business_id, filter.entry_id)
        .await?;
    Ok(Json(ApiResponse::success(
        sales.into_iter().map(SaleResponse::from).collect(),
    )))
}
