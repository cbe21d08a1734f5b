use std::{fmt, str::FromStr};

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user_achievement;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "achievements")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub name: String,
  pub description: Option<String>,
  pub reward: i64,
  /// Raw tag, see [`ConditionKind`]. Kept as text so a bad catalog row
  /// still loads and is simply never satisfied.
  pub condition_type: String,
  pub condition_value: Option<String>,
  pub condition_threshold: Option<i64>,
  pub is_visible: bool,
  pub manual_grant_only: bool,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "user_achievement::Entity")]
  UserAchievements,
}

impl Related<user_achievement::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::UserAchievements.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
  pub fn condition(&self) -> Option<Condition> {
    Condition::parse(
      &self.condition_type,
      self.condition_value.as_deref(),
      self.condition_threshold,
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
  None,
  BalanceAtLeast,
  NutsAtLeast,
  ProductPurchase,
  PurchaseCountAtLeast,
  PaymentsSumAtLeast,
  ReferralCountAtLeast,
  TimeInGameAtLeast,
  SpentSumAtLeast,
  PromocodeRedemptionCountAtLeast,
  FirstMessageSent,
  ProfilePhraseStreak,
  SecretWord,
}

impl ConditionKind {
  pub const ALL: [ConditionKind; 13] = [
    Self::None,
    Self::BalanceAtLeast,
    Self::NutsAtLeast,
    Self::ProductPurchase,
    Self::PurchaseCountAtLeast,
    Self::PaymentsSumAtLeast,
    Self::ReferralCountAtLeast,
    Self::TimeInGameAtLeast,
    Self::SpentSumAtLeast,
    Self::PromocodeRedemptionCountAtLeast,
    Self::FirstMessageSent,
    Self::ProfilePhraseStreak,
    Self::SecretWord,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::None => "none",
      Self::BalanceAtLeast => "balance_at_least",
      Self::NutsAtLeast => "nuts_at_least",
      Self::ProductPurchase => "product_purchase",
      Self::PurchaseCountAtLeast => "purchase_count_at_least",
      Self::PaymentsSumAtLeast => "payments_sum_at_least",
      Self::ReferralCountAtLeast => "referral_count_at_least",
      Self::TimeInGameAtLeast => "time_in_game_at_least",
      Self::SpentSumAtLeast => "spent_sum_at_least",
      Self::PromocodeRedemptionCountAtLeast => {
        "promocode_redemption_count_at_least"
      }
      Self::FirstMessageSent => "first_message_sent",
      Self::ProfilePhraseStreak => "profile_phrase_streak",
      Self::SecretWord => "secret_word",
    }
  }
}

impl fmt::Display for ConditionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ConditionKind {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    Self::ALL
      .into_iter()
      .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
      .ok_or(())
  }
}

/// Achievement condition with its own payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
  None,
  BalanceAtLeast(i64),
  NutsAtLeast(i64),
  /// Any completed purchase, or of a specific product
  ProductPurchase(Option<i32>),
  PurchaseCountAtLeast(i64),
  PaymentsSumAtLeast(i64),
  ReferralCountAtLeast(i64),
  /// Seconds of playtime reported by the game
  TimeInGameAtLeast(i64),
  SpentSumAtLeast(i64),
  PromocodeRedemptionCountAtLeast(i64),
  FirstMessageSent,
  /// Consecutive days with a confirmed profile phrase
  ProfilePhraseStreak(i64),
  SecretWord(String),
}

impl Condition {
  /// Builds a condition from catalog columns. `None` means the row is
  /// malformed (unknown tag or missing payload).
  pub fn parse(
    kind: &str,
    value: Option<&str>,
    threshold: Option<i64>,
  ) -> Option<Self> {
    let kind: ConditionKind = kind.parse().ok()?;
    let value = value.map(str::trim).filter(|v| !v.is_empty());

    // thresholds may also arrive through `condition_value`
    let at_least =
      || threshold.or_else(|| value.and_then(|v| v.parse::<i64>().ok()));

    let condition = match kind {
      ConditionKind::None => Self::None,
      ConditionKind::BalanceAtLeast => Self::BalanceAtLeast(at_least()?),
      ConditionKind::NutsAtLeast => Self::NutsAtLeast(at_least()?),
      ConditionKind::ProductPurchase => match value {
        Some(v) => Self::ProductPurchase(Some(v.parse().ok()?)),
        None => Self::ProductPurchase(None),
      },
      ConditionKind::PurchaseCountAtLeast => {
        Self::PurchaseCountAtLeast(at_least()?)
      }
      ConditionKind::PaymentsSumAtLeast => {
        Self::PaymentsSumAtLeast(at_least()?)
      }
      ConditionKind::ReferralCountAtLeast => {
        Self::ReferralCountAtLeast(at_least()?)
      }
      ConditionKind::TimeInGameAtLeast => Self::TimeInGameAtLeast(at_least()?),
      ConditionKind::SpentSumAtLeast => Self::SpentSumAtLeast(at_least()?),
      ConditionKind::PromocodeRedemptionCountAtLeast => {
        Self::PromocodeRedemptionCountAtLeast(at_least()?)
      }
      ConditionKind::FirstMessageSent => Self::FirstMessageSent,
      ConditionKind::ProfilePhraseStreak => {
        Self::ProfilePhraseStreak(at_least()?)
      }
      ConditionKind::SecretWord => Self::SecretWord(value?.to_string()),
    };

    Some(condition)
  }

  pub fn kind(&self) -> ConditionKind {
    match self {
      Self::None => ConditionKind::None,
      Self::BalanceAtLeast(_) => ConditionKind::BalanceAtLeast,
      Self::NutsAtLeast(_) => ConditionKind::NutsAtLeast,
      Self::ProductPurchase(_) => ConditionKind::ProductPurchase,
      Self::PurchaseCountAtLeast(_) => ConditionKind::PurchaseCountAtLeast,
      Self::PaymentsSumAtLeast(_) => ConditionKind::PaymentsSumAtLeast,
      Self::ReferralCountAtLeast(_) => ConditionKind::ReferralCountAtLeast,
      Self::TimeInGameAtLeast(_) => ConditionKind::TimeInGameAtLeast,
      Self::SpentSumAtLeast(_) => ConditionKind::SpentSumAtLeast,
      Self::PromocodeRedemptionCountAtLeast(_) => {
        ConditionKind::PromocodeRedemptionCountAtLeast
      }
      Self::FirstMessageSent => ConditionKind::FirstMessageSent,
      Self::ProfilePhraseStreak(_) => ConditionKind::ProfilePhraseStreak,
      Self::SecretWord(_) => ConditionKind::SecretWord,
    }
  }

  pub fn threshold(&self) -> Option<i64> {
    match self {
      Self::BalanceAtLeast(n)
      | Self::NutsAtLeast(n)
      | Self::PurchaseCountAtLeast(n)
      | Self::PaymentsSumAtLeast(n)
      | Self::ReferralCountAtLeast(n)
      | Self::TimeInGameAtLeast(n)
      | Self::SpentSumAtLeast(n)
      | Self::PromocodeRedemptionCountAtLeast(n)
      | Self::ProfilePhraseStreak(n) => Some(*n),
      Self::None
      | Self::ProductPurchase(_)
      | Self::FirstMessageSent
      | Self::SecretWord(_) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_threshold_conditions() {
    assert_eq!(
      Condition::parse("balance_at_least", None, Some(100)),
      Some(Condition::BalanceAtLeast(100))
    );
    assert_eq!(
      Condition::parse("NUTS_AT_LEAST", Some("250"), None),
      Some(Condition::NutsAtLeast(250))
    );
  }

  #[test]
  fn rejects_malformed_rows() {
    assert_eq!(Condition::parse("balance_at_least", None, None), None);
    assert_eq!(Condition::parse("moon_phase", None, Some(1)), None);
    assert_eq!(Condition::parse("secret_word", Some("  "), None), None);
    assert_eq!(Condition::parse("product_purchase", Some("abc"), None), None);
  }

  #[test]
  fn product_purchase_is_optional() {
    assert_eq!(
      Condition::parse("product_purchase", None, None),
      Some(Condition::ProductPurchase(None))
    );
    assert_eq!(
      Condition::parse("product_purchase", Some("7"), None),
      Some(Condition::ProductPurchase(Some(7)))
    );
  }

  #[test]
  fn kind_round_trips_through_tag() {
    for kind in ConditionKind::ALL {
      assert_eq!(kind.as_str().parse::<ConditionKind>(), Ok(kind));
    }
  }
}
