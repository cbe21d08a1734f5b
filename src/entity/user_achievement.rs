use json::Value;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{achievement, user};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_achievements")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub user_id: i32,
  #[sea_orm(primary_key, auto_increment = false)]
  pub achievement_id: i32,
  pub earned_at: DateTime,
  /// trigger, observed value and threshold at grant time
  pub meta: Option<Value>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::Id"
  )]
  User,
  #[sea_orm(
    belongs_to = "achievement::Entity",
    from = "Column::AchievementId",
    to = "achievement::Column::Id"
  )]
  Achievement,
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl Related<achievement::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Achievement.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
