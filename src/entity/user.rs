use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{achievement, nuts_transaction, user_achievement};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub tg_user_id: i64,
  pub username: Option<String>,
  pub roblox_id: Option<i64>,
  pub roblox_username: Option<String>,
  /// Real-money balance topped up through the payment webhook
  pub balance: i64,
  pub nuts_balance: i64,
  pub is_blocked: bool,
  pub verified: bool,
  #[sea_orm(unique)]
  pub referral_code: String,
  pub selected_achievement_id: Option<i32>,
  pub created_at: DateTime,
  pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "user_achievement::Entity")]
  UserAchievements,
  #[sea_orm(has_many = "nuts_transaction::Entity")]
  NutsTransactions,
  #[sea_orm(
    belongs_to = "achievement::Entity",
    from = "Column::SelectedAchievementId",
    to = "achievement::Column::Id",
    on_delete = "SetNull"
  )]
  SelectedAchievement,
}

impl Related<user_achievement::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::UserAchievements.def()
  }
}

impl Related<nuts_transaction::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::NutsTransactions.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
