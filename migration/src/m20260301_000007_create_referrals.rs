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
          .table(Referrals::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Referrals::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Referrals::ReferrerId).integer().not_null())
          .col(
            ColumnDef::new(Referrals::ReferredId)
              .integer()
              .not_null()
              .unique_key(),
          )
          .col(
            ColumnDef::new(Referrals::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(ColumnDef::new(Referrals::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Referrals::ConfirmedAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_referrals_referrer")
              .from(Referrals::Table, Referrals::ReferrerId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_referrals_referred")
              .from(Referrals::Table, Referrals::ReferredId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_referrals_referrer")
          .table(Referrals::Table)
          .col(Referrals::ReferrerId)
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(ReferralRewards::Table)
          .if_not_exists()
          .col(ColumnDef::new(ReferralRewards::ReferralId).integer().not_null())
          .col(ColumnDef::new(ReferralRewards::SourceKind).string().not_null())
          .col(ColumnDef::new(ReferralRewards::SourceId).integer().not_null())
          .col(ColumnDef::new(ReferralRewards::ReferrerId).integer().not_null())
          .col(ColumnDef::new(ReferralRewards::ReferredId).integer().not_null())
          .col(ColumnDef::new(ReferralRewards::Amount).big_integer().not_null())
          .col(
            ColumnDef::new(ReferralRewards::CreatedAt).date_time().not_null(),
          )
          // at most one bonus per (referral, top-up)
          .primary_key(
            Index::create()
              .col(ReferralRewards::ReferralId)
              .col(ReferralRewards::SourceKind)
              .col(ReferralRewards::SourceId),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_referral_rewards_referral")
              .from(ReferralRewards::Table, ReferralRewards::ReferralId)
              .to(Referrals::Table, Referrals::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(ReferralRewards::Table).to_owned())
      .await?;
    manager.drop_table(Table::drop().table(Referrals::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Referrals {
  Table,
  Id,
  ReferrerId,
  ReferredId,
  Status,
  CreatedAt,
  ConfirmedAt,
}

#[derive(DeriveIden)]
pub enum ReferralRewards {
  Table,
  ReferralId,
  SourceKind,
  SourceId,
  ReferrerId,
  ReferredId,
  Amount,
  CreatedAt,
}
