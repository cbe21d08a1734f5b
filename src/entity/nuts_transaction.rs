use json::Value;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum TransactionType {
  #[sea_orm(string_value = "credit")]
  #[default]
  Credit,
  #[sea_orm(string_value = "debit")]
  Debit,
}

/// Business reason of a ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum NutsSource {
  #[sea_orm(string_value = "achievement")]
  Achievement,
  #[sea_orm(string_value = "topup")]
  TopUp,
  #[sea_orm(string_value = "referral_bonus")]
  ReferralBonus,
  #[sea_orm(string_value = "purchase")]
  Purchase,
  #[sea_orm(string_value = "promocode")]
  Promocode,
  #[sea_orm(string_value = "game")]
  Game,
  #[sea_orm(string_value = "admin")]
  Admin,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nuts_transactions")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i32,
  /// Always positive, the sign lives in `transaction_type`
  pub amount: i64,
  pub transaction_type: TransactionType,
  pub kind: NutsSource,
  pub status: String,
  pub reason: Option<String>,
  pub invoice_id: Option<i32>,
  pub meta: Option<Value>,
  pub rate_snapshot: Option<f64>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::Id"
  )]
  User,
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
