use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    User,
    Cause,
    Donation,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::User => "user",
            NotificationType::Cause => "cause",
            NotificationType::Donation => "donation",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(NotificationType::User),
            "cause" => Ok(NotificationType::Cause),
            "donation" => Ok(NotificationType::Donation),
            other => Err(UnknownVariant {
                kind: "notification type",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub recipient_id: Option<Uuid>,
    pub message: String,
    pub details: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        notification_type: NotificationType,
        recipient_id: Option<Uuid>,
        message: String,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_type,
            recipient_id,
            message,
            details,
            read: false,
            created_at: Utc::now(),
        }
    }
}
