//! Domain entities for the donation ledger.
//! Framework-agnostic; persistence adapters map their rows into these types.

pub mod cause;
pub mod donation;
pub mod notification;
pub mod principal;

pub use cause::{slugify, Cause, CauseStatus, NewCause};
pub use donation::{
    generate_transaction_token, Donation, DonationStatus, DonorInfo, PaymentOutcome,
};
pub use notification::{Notification, NotificationType};
pub use principal::Principal;

/// Error returned when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
