use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_ledger_entries_table::Migration),
            Box::new(m20240301_000002_create_sale_records_table::Migration),
            Box::new(m20240301_000003_create_report_records_table::Migration),
            Box::new(m20240301_000004_create_business_settings_table::Migration),
        ]
    }
}

mod m20240301_000001_create_ledger_entries_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_ledger_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LedgerEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LedgerEntries::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(LedgerEntries::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(LedgerEntries::Name).string().not_null())
                        .col(
                            ColumnDef::new(LedgerEntries::TotalAdded)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::TotalSold)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::CurrentQuantity)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LedgerEntries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // get_or_create relies on this index to resolve concurrent first sightings.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_ledger_entries_business_name")
                        .table(LedgerEntries::Table)
                        .col(LedgerEntries::BusinessId)
                        .col(LedgerEntries::Name)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum LedgerEntries {
        Table,
        Id,
        BusinessId,
        Name,
        TotalAdded,
        TotalSold,
        CurrentQuantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_sale_records_table {

    use super::m20240301_000001_create_ledger_entries_table::LedgerEntries;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_sale_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SaleRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaleRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaleRecords::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(SaleRecords::EntryId).uuid().not_null())
                        .col(ColumnDef::new(SaleRecords::ItemName).string().not_null())
                        .col(
                            ColumnDef::new(SaleRecords::Quantity)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SaleRecords::SoldAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_sale_records_entry_id")
                                .from(SaleRecords::Table, SaleRecords::EntryId)
                                .to(LedgerEntries::Table, LedgerEntries::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sale_records_business_sold_at")
                        .table(SaleRecords::Table)
                        .col(SaleRecords::BusinessId)
                        .col(SaleRecords::SoldAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SaleRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SaleRecords {
        Table,
        Id,
        BusinessId,
        EntryId,
        ItemName,
        Quantity,
        SoldAt,
    }
}

mod m20240301_000003_create_report_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_report_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReportRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReportRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReportRecords::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(ReportRecords::ReportType).string().not_null())
                        .col(
                            ColumnDef::new(ReportRecords::ArtifactName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReportRecords::ArtifactReference)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReportRecords::GeneratedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReportRecords::PeriodStart)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReportRecords::PeriodEnd)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReportRecords::ItemCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_report_records_business_generated_at")
                        .table(ReportRecords::Table)
                        .col(ReportRecords::BusinessId)
                        .col(ReportRecords::GeneratedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReportRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReportRecords {
        Table,
        Id,
        BusinessId,
        ReportType,
        ArtifactName,
        ArtifactReference,
        GeneratedAt,
        PeriodStart,
        PeriodEnd,
        ItemCount,
    }
}

mod m20240301_000004_create_business_settings_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_business_settings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(BusinessSettings::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(BusinessSettings::BusinessId)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BusinessSettings::ReportingFrequency)
                                .string()
                                .not_null()
                                .default("weekly"),
                        )
                        .col(
                            ColumnDef::new(BusinessSettings::CustomReportingDays)
                                .integer()
                                .not_null()
                                .default(7),
                        )
                        .col(
                            ColumnDef::new(BusinessSettings::LastReportAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BusinessSettings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(BusinessSettings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(BusinessSettings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum BusinessSettings {
        Table,
        BusinessId,
        ReportingFrequency,
        CustomReportingDays,
        LastReportAt,
        CreatedAt,
        UpdatedAt,
    }
}
