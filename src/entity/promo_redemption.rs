use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{promo_code, user};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promo_redemptions")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub promo_id: i32,
  #[sea_orm(primary_key, auto_increment = false)]
  pub user_id: i32,
  pub redeemed_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "promo_code::Entity",
    from = "Column::PromoId",
    to = "promo_code::Column::Id"
  )]
  PromoCode,
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::Id"
  )]
  User,
}

impl Related<promo_code::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::PromoCode.def()
  }
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
