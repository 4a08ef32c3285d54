use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CachedCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CachedCredentials::Slot)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CachedCredentials::Token).text().not_null())
                    .col(ColumnDef::new(CachedCredentials::Role).string().not_null())
                    .col(
                        ColumnDef::new(CachedCredentials::Fingerprint)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CachedCredentials::StoredAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CachedSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CachedSnapshots::Fingerprint)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CachedSnapshots::RoundNumber).big_integer())
                    .col(ColumnDef::new(CachedSnapshots::Payload).text().not_null())
                    .col(
                        ColumnDef::new(CachedSnapshots::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CachedSnapshots::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CachedCredentials::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CachedCredentials {
    Table,
    Slot,
    Token,
    Role,
    Fingerprint,
    StoredAt,
}

#[derive(DeriveIden)]
enum CachedSnapshots {
    Table,
    Fingerprint,
    RoundNumber,
    Payload,
    FetchedAt,
}
