use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::AuthUser, entities::business_settings, errors::ServiceError,
    handlers::common::validate_input, ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateReportingSettingsRequest {
    /// daily, 3days, weekly, monthly or custom
    #[validate(length(min = 1, max = 32))]
    #[schema(example = "custom")]
    pub reporting_frequency: String,
    /// Period length in days when the frequency is custom
    #[validate(range(min = 1, max = 365))]
    #[schema(example = 14)]
    pub custom_reporting_days: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReportingSettingsResponse {
    pub reporting_frequency: String,
    pub custom_reporting_days: i32,
    pub last_report_at: Option<DateTime<Utc>>,
}

impl From<business_settings::Model> for ReportingSettingsResponse {
    fn from(settings: business_settings::Model) -> Self {
        Self {
            reporting_frequency: settings.reporting_frequency,
            custom_reporting_days: settings.custom_reporting_days,
            last_report_at: settings.last_report_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/settings/reporting",
    summary = "Get reporting settings",
    responses(
        (status = 200, description = "Current reporting settings", body = ApiResponse<ReportingSettingsResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "settings"
)]
pub async fn get_reporting_settings(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<ReportingSettingsResponse>>, ServiceError> {
    let settings = state.services.settings.get(auth_user.business_id).await?;
    Ok(Json(ApiResponse::success(settings.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/settings/reporting",
    summary = "Update reporting settings",
    request_body = UpdateReportingSettingsRequest,
    responses(
        (status = 200, description = "Settings updated", body = ApiResponse<ReportingSettingsResponse>),
        (status = 400, description = "Unknown frequency or invalid custom period", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "settings"
)]
pub async fn update_reporting_settings(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<UpdateReportingSettingsRequest>,
) -> Result<Json<ApiResponse<ReportingSettingsResponse>>, ServiceError> {
    validate_input(&request)?;
    let settings = state
        .services
        .settings
        .update(
            auth_user.business_id,
            &request.reporting_frequency,
            request.custom_reporting_days,
        )
        .await?;
    Ok(Json(ApiResponse::success(settings.into())))
}
