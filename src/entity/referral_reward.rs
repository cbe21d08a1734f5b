use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::referral;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "referral_rewards")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub referral_id: i32,
  /// `payment` or `invoice`
  #[sea_orm(primary_key, auto_increment = false)]
  pub source_kind: String,
  #[sea_orm(primary_key, auto_increment = false)]
  pub source_id: i32,
  pub referrer_id: i32,
  pub referred_id: i32,
  pub amount: i64,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "referral::Entity",
    from = "Column::ReferralId",
    to = "referral::Column::Id"
  )]
  Referral,
}

impl Related<referral::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Referral.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
