use json::Value;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "log_entries")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: Option<i32>,
  pub event_type: String,
  pub message: Option<String>,
  pub data: Option<Value>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
