use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(IdempotencyKeys::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(IdempotencyKeys::Key)
              .string()
              .not_null()
              .primary_key(),
          )
          .col(ColumnDef::new(IdempotencyKeys::Endpoint).string().not_null())
          .col(
            ColumnDef::new(IdempotencyKeys::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(ColumnDef::new(IdempotencyKeys::ResponseStatus).integer().null())
          .col(ColumnDef::new(IdempotencyKeys::ResponseBody).json().null())
          .col(
            ColumnDef::new(IdempotencyKeys::CreatedAt).date_time().not_null(),
          )
          .col(ColumnDef::new(IdempotencyKeys::CompletedAt).date_time().null())
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(IdempotencyKeys::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum IdempotencyKeys {
  Table,
  Key,
  Endpoint,
  Status,
  ResponseStatus,
  ResponseBody,
  CreatedAt,
  CompletedAt,
}
