//! Donation ledger entry.
//! Append-only: a donation is written once, in its terminal status, and never updated.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

pub const TRANSACTION_TOKEN_PREFIX: &str = "TXN-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Completed,
    Failed,
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Completed => "completed",
            DonationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DonationStatus::Completed | DonationStatus::Failed)
    }

    /// Only completed donations count towards a cause's running total.
    pub fn counts_towards_total(&self) -> bool {
        *self == DonationStatus::Completed
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DonationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DonationStatus::Pending),
            "completed" => Ok(DonationStatus::Completed),
            "failed" => Ok(DonationStatus::Failed),
            other => Err(UnknownVariant {
                kind: "donation status",
                value: other.to_string(),
            }),
        }
    }
}

/// Result of the payment attempt, reported by the external payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    #[default]
    Captured,
    Declined,
}

impl PaymentOutcome {
    pub fn donation_status(&self) -> DonationStatus {
        match self {
            PaymentOutcome::Captured => DonationStatus::Completed,
            PaymentOutcome::Declined => DonationStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
    pub id: Uuid,
    pub cause_id: Uuid,
    pub amount: BigDecimal,
    pub donor: DonorInfo,
    pub is_anonymous: bool,
    pub payment_method: String,
    pub message: Option<String>,
    pub status: DonationStatus,
    pub transaction_token: String,
    pub created_at: DateTime<Utc>,
}

impl Donation {
    pub fn new(
        cause_id: Uuid,
        amount: BigDecimal,
        donor: DonorInfo,
        is_anonymous: bool,
        payment_method: String,
        message: Option<String>,
        status: DonationStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cause_id,
            amount,
            donor,
            is_anonymous,
            payment_method,
            message,
            status,
            transaction_token: generate_transaction_token(),
            created_at: Utc::now(),
        }
    }

    /// Replaces the transaction token after a uniqueness collision.
    pub fn regenerate_token(&mut self) {
        self.transaction_token = generate_transaction_token();
    }
}

/// `TXN-` followed by the 32 hex digits of a random v4 UUID (122 random bits).
pub fn generate_transaction_token() -> String {
    format!(
        "{}{}",
        TRANSACTION_TOKEN_PREFIX,
        Uuid::new_v4().simple().to_string().to_uppercase()
    )
}
