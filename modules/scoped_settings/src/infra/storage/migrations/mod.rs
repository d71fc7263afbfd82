//! Database migrations for the database format backend

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20241210_000001_create_settings_entries::Migration)]
    }
}

mod m20241210_000001_create_settings_entries {
    use super::*;

    #[derive(DeriveMigrationName)]
    pub struct Migration;

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SettingsEntries::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(SettingsEntries::Location).string().not_null())
                        .col(ColumnDef::new(SettingsEntries::SettingKey).string().not_null())
                        .col(ColumnDef::new(SettingsEntries::SettingValue).text().not_null())
                        .col(
                            ColumnDef::new(SettingsEntries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null()
                                .default(Expr::current_timestamp()),
                        )
                        .primary_key(
                            Index::create()
                                .col(SettingsEntries::Location)
                                .col(SettingsEntries::SettingKey),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SettingsEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SettingsEntries {
        Table,
        Location,
        SettingKey,
        SettingValue,
        UpdatedAt,
    }
}
