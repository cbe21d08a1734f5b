use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Achievements::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Achievements::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(Achievements::Name).string().not_null().unique_key(),
          )
          .col(ColumnDef::new(Achievements::Description).text().null())
          .col(
            ColumnDef::new(Achievements::Reward)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Achievements::ConditionType)
              .string()
              .not_null()
              .default("none"),
          )
          .col(ColumnDef::new(Achievements::ConditionValue).string().null())
          .col(
            ColumnDef::new(Achievements::ConditionThreshold)
              .big_integer()
              .null(),
          )
          .col(
            ColumnDef::new(Achievements::IsVisible)
              .boolean()
              .not_null()
              .default(true),
          )
          .col(
            ColumnDef::new(Achievements::ManualGrantOnly)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(ColumnDef::new(Achievements::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Achievements::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Achievements {
  Table,
  Id,
  Name,
  Description,
  Reward,
  ConditionType,
  ConditionValue,
  ConditionThreshold,
  IsVisible,
  ManualGrantOnly,
  CreatedAt,
}
