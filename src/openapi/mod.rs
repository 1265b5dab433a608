use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Larder API",
        version = "0.1.0",
        description = r#"
# Larder API

Inventory ledger for food businesses.

## Features

- **Ingestion**: merge detector counts into a per-business ledger
- **Sales**: atomic check-and-debit with an immutable sale record
- **Reports**: CSV snapshots on demand or on the configured cadence

## Authentication

Ledger endpoints require an HS256 JWT whose `sub` claim is the business id:

```
Authorization: Bearer <your-jwt-token>
```

Records of other businesses are reported as `404 Not Found`.

## Error Handling

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient inventory: available 3, requested 5",
  "context": {"available": 3, "requested": 5},
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "inventory", description = "Ledger ingestion and queries"),
        (name = "sales", description = "Sale recording"),
        (name = "reports", description = "Inventory snapshots"),
        (name = "settings", description = "Reporting preferences")
    ),
    paths(
        crate::handlers::inventory::ingest_detections,
        crate::handlers::inventory::load_test_inventory,
        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::get_inventory_item,
        crate::handlers::sales::record_sale,
        crate::handlers::sales::list_sales,
        crate::handlers::reports::generate_report,
        crate::handlers::reports::list_reports,
        crate::handlers::reports::download_report,
        crate::handlers::settings::get_reporting_settings,
        crate::handlers::settings::update_reporting_settings,
    ),
    components(
        schemas(
            crate::handlers::inventory::IngestRequest,
            crate::handlers::inventory::InventoryItemResponse,
            crate::handlers::inventory::TestInventoryResponse,
            crate::services::ingestion::IngestionReport,
            crate::services::ingestion::IngestionItemResult,
            crate::services::ingestion::SkippedDetection,
            crate::handlers::sales::SaleRequest,
            crate::handlers::sales::SaleResponse,
            crate::handlers::sales::RecordSaleResponse,
            crate::handlers::reports::GenerateReportRequest,
            crate::handlers::reports::ReportResponse,
            crate::services::reports::GeneratedReport,
            crate::handlers::settings::UpdateReportingSettingsRequest,
            crate::handlers::settings::ReportingSettingsResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
