use sea_orm_migration::prelude::*;

use super::m20260301_000001_create_achievements::Achievements;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Users::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Users::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(Users::TgUserId)
              .big_integer()
              .not_null()
              .unique_key(),
          )
          .col(ColumnDef::new(Users::Username).string().null())
          .col(ColumnDef::new(Users::RobloxId).big_integer().null())
          .col(ColumnDef::new(Users::RobloxUsername).string().null())
          .col(
            ColumnDef::new(Users::Balance).big_integer().not_null().default(0),
          )
          .col(
            ColumnDef::new(Users::NutsBalance)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Users::IsBlocked)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(
            ColumnDef::new(Users::Verified).boolean().not_null().default(false),
          )
          .col(
            ColumnDef::new(Users::ReferralCode)
              .string()
              .not_null()
              .unique_key(),
          )
          .col(ColumnDef::new(Users::SelectedAchievementId).integer().null())
          .col(ColumnDef::new(Users::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Users::UpdatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_users_selected_achievement")
              .from(Users::Table, Users::SelectedAchievementId)
              .to(Achievements::Table, Achievements::Id)
              .on_delete(ForeignKeyAction::SetNull),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_users_roblox_id")
          .table(Users::Table)
          .col(Users::RobloxId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Users::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Users {
  Table,
  Id,
  TgUserId,
  Username,
  RobloxId,
  RobloxUsername,
  Balance,
  NutsBalance,
  IsBlocked,
  Verified,
  ReferralCode,
  SelectedAchievementId,
  CreatedAt,
  UpdatedAt,
}
