use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_codes")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub code: String,
  pub reward: i64,
  /// `None` means unlimited
  pub max_uses: Option<i32>,
  pub uses: i32,
  pub expires_at: Option<DateTime>,
  pub is_active: bool,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "super::promo_redemption::Entity")]
  Redemptions,
}

impl Related<super::promo_redemption::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Redemptions.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
  pub fn is_exhausted(&self) -> bool {
    self.max_uses.is_some_and(|max| self.uses >= max)
  }

  pub fn is_expired(&self, now: DateTime) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}
