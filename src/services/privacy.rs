//! Public projection of donation records.
//!
//! This is the only path by which donor identity reaches public views. It
//! exposes at most a first name and a last initial; anonymous donations expose
//! nothing but the anonymity flag. Full donor records are served only by the
//! admin query in `donation_queries`.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use uuid::Uuid;

use crate::domain::Donation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicDonor {
    Anonymous,
    Named {
        first_name: String,
        last_initial: String,
    },
}

impl PublicDonor {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, PublicDonor::Anonymous)
    }

    /// Short label for messages, e.g. "Jane D." or "Anonymous".
    pub fn display_name(&self) -> String {
        match self {
            PublicDonor::Anonymous => "Anonymous".to_string(),
            PublicDonor::Named {
                first_name,
                last_initial,
            } if last_initial.is_empty() => first_name.clone(),
            PublicDonor::Named {
                first_name,
                last_initial,
            } => format!("{} {}", first_name, last_initial),
        }
    }
}

impl Serialize for PublicDonor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PublicDonor::Anonymous => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("is_anonymous", &true)?;
                map.end()
            }
            PublicDonor::Named {
                first_name,
                last_initial,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("is_anonymous", &false)?;
                map.serialize_entry("first_name", first_name)?;
                map.serialize_entry("last_initial", last_initial)?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PublicDonationView {
    pub id: Uuid,
    pub amount: BigDecimal,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub donor: PublicDonor,
}

pub fn project_donor(donation: &Donation) -> PublicDonor {
    if donation.is_anonymous {
        return PublicDonor::Anonymous;
    }

    PublicDonor::Named {
        first_name: donation.donor.first_name.trim().to_string(),
        last_initial: last_initial(&donation.donor.last_name),
    }
}

pub fn project(donation: &Donation) -> PublicDonationView {
    PublicDonationView {
        id: donation.id,
        amount: donation.amount.clone(),
        message: donation.message.clone(),
        created_at: donation.created_at,
        donor: project_donor(donation),
    }
}

fn last_initial(last_name: &str) -> String {
    last_name
        .trim()
        .chars()
        .next()
        .map(|ch| format!("{}.", ch))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DonationStatus, DonorInfo};

    fn donation(first: &str, last: &str, is_anonymous: bool) -> Donation {
        Donation::new(
            Uuid::new_v4(),
            BigDecimal::from(50),
            DonorInfo {
                first_name: first.to_string(),
                last_name: last.to_string(),
                email: "jane.doe@example.com".to_string(),
                phone: Some("+1 555 0100".to_string()),
                address: Some("1 Main St".to_string()),
            },
            is_anonymous,
            "credit_card".to_string(),
            Some("Keep going!".to_string()),
            DonationStatus::Completed,
        )
    }

    #[test]
    fn test_named_donor_projects_first_name_and_initial() {
        let view = project(&donation("Jane", "Doe", false));

        assert_eq!(
            view.donor,
            PublicDonor::Named {
                first_name: "Jane".to_string(),
                last_initial: "D.".to_string(),
            }
        );
        assert_eq!(view.donor.display_name(), "Jane D.");
    }

    #[test]
    fn test_anonymous_donor_exposes_no_identity() {
        let view = project(&donation("Jane", "Doe", true));
        let json = serde_json::to_value(&view).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(json["is_anonymous"], true);
        for field in ["first_name", "last_name", "last_initial", "email", "phone", "address", "donor"] {
            assert!(!object.contains_key(field), "leaked field {}", field);
        }
        assert!(!json.to_string().contains("Jane"));
        assert!(!json.to_string().contains("example.com"));
    }

    #[test]
    fn test_named_view_never_serializes_contact_fields() {
        let json = serde_json::to_value(project(&donation("Jane", "Doe", false))).unwrap();

        assert_eq!(json["first_name"], "Jane");
        assert_eq!(json["last_initial"], "D.");
        assert_eq!(json["is_anonymous"], false);
        assert!(json.get("email").is_none());
        assert!(json.get("phone").is_none());
        assert!(json.get("last_name").is_none());
        assert!(!json.to_string().contains("Doe"));
    }

    #[test]
    fn test_last_initial_keeps_case_and_is_unicode_aware() {
        assert_eq!(last_initial("doe"), "d.");
        assert_eq!(last_initial("  élan"), "é.");
        assert_eq!(last_initial("Doe"), "D.");
        assert_eq!(last_initial(""), "");
    }

    #[test]
    fn test_display_name_without_last_name() {
        let donor = PublicDonor::Named {
            first_name: "Cher".to_string(),
            last_initial: String::new(),
        };
        assert_eq!(donor.display_name(), "Cher");
        assert_eq!(PublicDonor::Anonymous.display_name(), "Anonymous");
    }
}
