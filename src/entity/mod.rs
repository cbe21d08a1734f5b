pub mod achievement;
pub mod game_progress;
pub mod idempotency;
pub mod invoice;
pub mod log_entry;
pub mod nuts_transaction;
pub mod payment;
pub mod product;
pub mod promo_code;
pub mod promo_redemption;
pub mod purchase;
pub mod referral;
pub mod referral_reward;
pub mod user;
pub mod user_achievement;

pub use achievement::{Condition, ConditionKind};
pub use idempotency::IdempotencyStatus;
pub use invoice::InvoiceStatus;
pub use nuts_transaction::{NutsSource, TransactionType};
pub use payment::PaymentStatus;
pub use purchase::PurchaseStatus;
pub use referral::ReferralStatus;
