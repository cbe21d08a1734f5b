use sea_orm_migration::prelude::*;

use super::m20260301_000002_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(NutsTransactions::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(NutsTransactions::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(NutsTransactions::UserId).integer().not_null())
          .col(
            ColumnDef::new(NutsTransactions::Amount).big_integer().not_null(),
          )
          .col(
            ColumnDef::new(NutsTransactions::TransactionType)
              .string()
              .not_null(),
          )
          .col(ColumnDef::new(NutsTransactions::Kind).string().not_null())
          .col(
            ColumnDef::new(NutsTransactions::Status)
              .string()
              .not_null()
              .default("completed"),
          )
          .col(ColumnDef::new(NutsTransactions::Reason).string().null())
          .col(ColumnDef::new(NutsTransactions::InvoiceId).integer().null())
          .col(ColumnDef::new(NutsTransactions::Meta).json().null())
          .col(ColumnDef::new(NutsTransactions::RateSnapshot).double().null())
          .col(
            ColumnDef::new(NutsTransactions::CreatedAt).date_time().not_null(),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_nuts_transactions_user")
              .from(NutsTransactions::Table, NutsTransactions::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_nuts_transactions_user")
          .table(NutsTransactions::Table)
          .col(NutsTransactions::UserId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(NutsTransactions::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum NutsTransactions {
  Table,
  Id,
  UserId,
  Amount,
  TransactionType,
  Kind,
  Status,
  Reason,
  InvoiceId,
  Meta,
  RateSnapshot,
  CreatedAt,
}
