//! Fundraising cause entity.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CauseStatus {
    Pending,
    Approved,
    Rejected,
}

impl CauseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CauseStatus::Pending => "pending",
            CauseStatus::Approved => "approved",
            CauseStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CauseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CauseStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CauseStatus::Pending),
            "approved" => Ok(CauseStatus::Approved),
            "rejected" => Ok(CauseStatus::Rejected),
            other => Err(UnknownVariant {
                kind: "cause status",
                value: other.to_string(),
            }),
        }
    }
}

/// A cause as stored. `current_amount` is only ever changed by a ledger commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cause {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub category: String,
    pub target_amount: BigDecimal,
    pub current_amount: BigDecimal,
    pub status: CauseStatus,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for a new cause.
#[derive(Debug, Clone)]
pub struct NewCause {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub target_amount: BigDecimal,
    pub owner_id: Uuid,
}

impl Cause {
    pub fn new(input: NewCause) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slugify(&input.title),
            title: input.title,
            description: input.description,
            category: input.category,
            target_amount: input.target_amount,
            current_amount: BigDecimal::from(0),
            status: CauseStatus::Pending,
            owner_id: input.owner_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn accepts_donations(&self) -> bool {
        self.status == CauseStatus::Approved
    }
}

/// Derives a URL slug from a title: lowercase ASCII alphanumerics joined by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}
