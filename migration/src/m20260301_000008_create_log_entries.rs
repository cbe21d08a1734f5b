use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(LogEntries::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(LogEntries::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          // no FK: the audit trail outlives whatever it describes
          .col(ColumnDef::new(LogEntries::UserId).integer().null())
          .col(ColumnDef::new(LogEntries::EventType).string().not_null())
          .col(ColumnDef::new(LogEntries::Message).text().null())
          .col(ColumnDef::new(LogEntries::Data).json().null())
          .col(ColumnDef::new(LogEntries::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_log_entries_user_event")
          .table(LogEntries::Table)
          .col(LogEntries::UserId)
          .col(LogEntries::EventType)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(LogEntries::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum LogEntries {
  Table,
  Id,
  UserId,
  EventType,
  Message,
  Data,
  CreatedAt,
}
