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
          .table(Products::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Products::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Products::Name).string().not_null())
          .col(ColumnDef::new(Products::Description).text().null())
          .col(ColumnDef::new(Products::Price).big_integer().not_null())
          .col(
            ColumnDef::new(Products::IsActive)
              .boolean()
              .not_null()
              .default(true),
          )
          .col(ColumnDef::new(Products::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Invoices::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Invoices::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Invoices::UserId).integer().not_null())
          .col(
            ColumnDef::new(Invoices::Amount)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Invoices::NutsAmount)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Invoices::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(ColumnDef::new(Invoices::Meta).json().null())
          .col(ColumnDef::new(Invoices::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Invoices::PaidAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_invoices_user")
              .from(Invoices::Table, Invoices::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Payments::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Payments::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Payments::UserId).integer().not_null())
          .col(
            ColumnDef::new(Payments::ExternalId)
              .string()
              .not_null()
              .unique_key(),
          )
          .col(
            ColumnDef::new(Payments::Amount)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Payments::NutsAmount)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Payments::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(ColumnDef::new(Payments::InvoiceId).integer().null())
          .col(ColumnDef::new(Payments::Meta).json().null())
          .col(ColumnDef::new(Payments::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Payments::CompletedAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_payments_user")
              .from(Payments::Table, Payments::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_payments_invoice")
              .from(Payments::Table, Payments::InvoiceId)
              .to(Invoices::Table, Invoices::Id)
              .on_delete(ForeignKeyAction::SetNull),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Purchases::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Purchases::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Purchases::UserId).integer().not_null())
          .col(ColumnDef::new(Purchases::ProductId).integer().null())
          .col(ColumnDef::new(Purchases::Price).big_integer().not_null())
          .col(
            ColumnDef::new(Purchases::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(ColumnDef::new(Purchases::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_purchases_user")
              .from(Purchases::Table, Purchases::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_purchases_product")
              .from(Purchases::Table, Purchases::ProductId)
              .to(Products::Table, Products::Id)
              .on_delete(ForeignKeyAction::SetNull),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_purchases_user")
          .table(Purchases::Table)
          .col(Purchases::UserId)
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_payments_user")
          .table(Payments::Table)
          .col(Payments::UserId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Purchases::Table).to_owned()).await?;
    manager.drop_table(Table::drop().table(Payments::Table).to_owned()).await?;
    manager.drop_table(Table::drop().table(Invoices::Table).to_owned()).await?;
    manager.drop_table(Table::drop().table(Products::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Products {
  Table,
  Id,
  Name,
  Description,
  Price,
  IsActive,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum Invoices {
  Table,
  Id,
  UserId,
  Amount,
  NutsAmount,
  Status,
  Meta,
  CreatedAt,
  PaidAt,
}

#[derive(DeriveIden)]
pub enum Payments {
  Table,
  Id,
  UserId,
  ExternalId,
  Amount,
  NutsAmount,
  Status,
  InvoiceId,
  Meta,
  CreatedAt,
  CompletedAt,
}

#[derive(DeriveIden)]
pub enum Purchases {
  Table,
  Id,
  UserId,
  ProductId,
  Price,
  Status,
  CreatedAt,
}
