use json::Value;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "game_progress")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub roblox_id: i64,
  /// Opaque blob pushed by the game server
  pub progress: Value,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
