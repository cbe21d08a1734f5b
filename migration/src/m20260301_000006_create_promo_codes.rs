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
          .table(PromoCodes::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(PromoCodes::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(PromoCodes::Code).string().not_null().unique_key(),
          )
          .col(ColumnDef::new(PromoCodes::Reward).big_integer().not_null())
          .col(ColumnDef::new(PromoCodes::MaxUses).integer().null())
          .col(ColumnDef::new(PromoCodes::Uses).integer().not_null().default(0))
          .col(ColumnDef::new(PromoCodes::ExpiresAt).date_time().null())
          .col(
            ColumnDef::new(PromoCodes::IsActive)
              .boolean()
              .not_null()
              .default(true),
          )
          .col(ColumnDef::new(PromoCodes::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(PromoRedemptions::Table)
          .if_not_exists()
          .col(ColumnDef::new(PromoRedemptions::PromoId).integer().not_null())
          .col(ColumnDef::new(PromoRedemptions::UserId).integer().not_null())
          .col(
            ColumnDef::new(PromoRedemptions::RedeemedAt).date_time().not_null(),
          )
          .primary_key(
            Index::create()
              .col(PromoRedemptions::PromoId)
              .col(PromoRedemptions::UserId),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_promo_redemptions_promo")
              .from(PromoRedemptions::Table, PromoRedemptions::PromoId)
              .to(PromoCodes::Table, PromoCodes::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_promo_redemptions_user")
              .from(PromoRedemptions::Table, PromoRedemptions::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(PromoRedemptions::Table).to_owned())
      .await?;
    manager.drop_table(Table::drop().table(PromoCodes::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum PromoCodes {
  Table,
  Id,
  Code,
  Reward,
  MaxUses,
  Uses,
  ExpiresAt,
  IsActive,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum PromoRedemptions {
  Table,
  PromoId,
  UserId,
  RedeemedAt,
}
