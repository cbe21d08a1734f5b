use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ReferralStatus {
  #[sea_orm(string_value = "pending")]
  #[default]
  Pending,
  /// Referred user passed Roblox verification
  #[sea_orm(string_value = "confirmed")]
  Confirmed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "referrals")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub referrer_id: i32,
  #[sea_orm(unique)]
  pub referred_id: i32,
  pub status: ReferralStatus,
  pub created_at: DateTime,
  pub confirmed_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "super::referral_reward::Entity")]
  Rewards,
}

impl Related<super::referral_reward::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Rewards.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
