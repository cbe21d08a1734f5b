use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(GameProgress::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(GameProgress::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(GameProgress::RobloxId).big_integer().not_null())
          .col(ColumnDef::new(GameProgress::Progress).json().not_null())
          .col(ColumnDef::new(GameProgress::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_game_progress_roblox")
          .table(GameProgress::Table)
          .col(GameProgress::RobloxId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(GameProgress::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum GameProgress {
  Table,
  Id,
  RobloxId,
  Progress,
  CreatedAt,
}
