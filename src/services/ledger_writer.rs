//! Records donations and keeps each cause's running total in step with the ledger.
//!
//! A donation row and its cause-total increment are committed by the store as
//! one unit. The writer validates before any store access, retries transient
//! failures with backoff, and hands the owner notification to a background
//! task once the commit is acknowledged.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Cause, Donation, DonationStatus, DonorInfo, PaymentOutcome};
use crate::error::AppError;
use crate::ports::{LedgerStore, StoreError};
use crate::services::idempotency::IdempotencyGuard;
use crate::services::notifications::{DonationSummary, NotificationDispatcher};
use crate::validation::{
    sanitize_optional, sanitize_string, validate_email, validate_max_len, validate_money,
    validate_payment_method, validate_required, validate_submission_token, ValidationResult,
    ADDRESS_MAX_LEN, MESSAGE_MAX_LEN, NAME_MAX_LEN, PHONE_MAX_LEN,
};

pub const ANONYMOUS_FIRST_NAME: &str = "Anonymous";
pub const ANONYMOUS_LAST_NAME: &str = "Donor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub commit_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
            commit_timeout: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: base, 2x base, 4x base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Donor identity as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DonorPayload {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A pledge as submitted by the intake flow, after the payment attempt.
#[derive(Debug, Clone)]
pub struct DonationIntent {
    pub cause_id: Uuid,
    pub amount: BigDecimal,
    pub donor: DonorPayload,
    pub payment_method: String,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub payment_outcome: PaymentOutcome,
    pub submission_token: Option<String>,
}

/// Validated and normalized donation fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDonation {
    pub cause_id: Uuid,
    pub amount: BigDecimal,
    pub donor: DonorInfo,
    pub payment_method: String,
    pub is_anonymous: bool,
    pub message: Option<String>,
    pub status: DonationStatus,
    pub submission_token: Option<String>,
}

impl ValidatedDonation {
    fn into_donation(self) -> Donation {
        Donation::new(
            self.cause_id,
            self.amount,
            self.donor,
            self.is_anonymous,
            self.payment_method,
            self.message,
            self.status,
        )
    }
}

pub fn validate_intent(intent: DonationIntent) -> Result<ValidatedDonation, AppError> {
    validate_money("amount", &intent.amount)?;

    let payment_method = sanitize_string(&intent.payment_method).to_ascii_lowercase();
    validate_payment_method(&payment_method)?;

    let message = sanitize_optional(intent.message.as_deref());
    if let Some(message) = &message {
        validate_max_len("message", message, MESSAGE_MAX_LEN)?;
    }

    let submission_token = intent
        .submission_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string);
    if let Some(token) = &submission_token {
        validate_submission_token(token)?;
    }

    let donor = resolve_donor(intent.donor, intent.is_anonymous)?;

    Ok(ValidatedDonation {
        cause_id: intent.cause_id,
        amount: intent.amount,
        donor,
        payment_method,
        is_anonymous: intent.is_anonymous,
        message,
        status: intent.payment_outcome.donation_status(),
        submission_token,
    })
}

/// Anonymous donors may omit their names; everyone must give a valid email.
fn resolve_donor(payload: DonorPayload, is_anonymous: bool) -> Result<DonorInfo, AppError> {
    let first_name = sanitize_optional(payload.first_name.as_deref());
    let last_name = sanitize_optional(payload.last_name.as_deref());

    let (first_name, last_name) = if is_anonymous {
        (
            first_name.unwrap_or_else(|| ANONYMOUS_FIRST_NAME.to_string()),
            last_name.unwrap_or_else(|| ANONYMOUS_LAST_NAME.to_string()),
        )
    } else {
        (first_name.unwrap_or_default(), last_name.unwrap_or_default())
    };
    validate_name("first_name", &first_name)?;
    validate_name("last_name", &last_name)?;

    let email = payload
        .email
        .as_deref()
        .map(|e| e.trim().to_ascii_lowercase())
        .unwrap_or_default();
    validate_email(&email)?;

    let phone = sanitize_optional(payload.phone.as_deref());
    if let Some(phone) = &phone {
        validate_max_len("phone", phone, PHONE_MAX_LEN)?;
    }
    let address = sanitize_optional(payload.address.as_deref());
    if let Some(address) = &address {
        validate_max_len("address", address, ADDRESS_MAX_LEN)?;
    }

    Ok(DonorInfo {
        first_name,
        last_name,
        email,
        phone,
        address,
    })
}

fn validate_name(field: &'static str, value: &str) -> ValidationResult {
    validate_required(field, value)?;
    validate_max_len(field, value, NAME_MAX_LEN)
}

/// A registered submission token, held until the donation outcome is known.
///
/// Dropped while still held (the call was cancelled mid-commit) it releases the
/// token on a background task, since the store has rolled the commit back.
struct SubmissionClaim {
    guard: Arc<dyn IdempotencyGuard>,
    token: Option<String>,
}

impl SubmissionClaim {
    /// The donation exists, or may exist: the token stays registered.
    fn keep(mut self) {
        self.token = None;
    }

    async fn release(mut self) {
        if let Some(token) = self.token.take() {
            if let Err(e) = self.guard.release(&token).await {
                tracing::error!(error = %e, "Failed to release donation submission token");
            }
        }
    }
}

impl Drop for SubmissionClaim {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let guard = self.guard.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = guard.release(&token).await {
                        tracing::error!(error = %e, "Failed to release donation submission token");
                    }
                });
            }
            Err(_) => tracing::error!(
                submission_token = %token,
                "No runtime available to release donation submission token"
            ),
        }
    }
}

enum CommitFailure {
    /// Nothing was recorded.
    Rejected(AppError),
    /// An attempt may have landed but could not be confirmed.
    Unresolved(AppError),
}

impl From<AppError> for CommitFailure {
    fn from(err: AppError) -> Self {
        CommitFailure::Rejected(err)
    }
}

impl From<StoreError> for CommitFailure {
    fn from(err: StoreError) -> Self {
        CommitFailure::Rejected(err.into())
    }
}

#[derive(Clone)]
pub struct LedgerWriter {
    store: Arc<dyn LedgerStore>,
    notifier: NotificationDispatcher,
    retry: RetryPolicy,
    submission_guard: Option<Arc<dyn IdempotencyGuard>>,
}

impl LedgerWriter {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: NotificationDispatcher, retry: RetryPolicy) -> Self {
        Self {
            store,
            notifier,
            retry,
            submission_guard: None,
        }
    }

    /// Rejects repeated donation submissions carrying the same submission token.
    pub fn with_submission_guard(mut self, guard: Arc<dyn IdempotencyGuard>) -> Self {
        self.submission_guard = Some(guard);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn record_donation(&self, mut intent: DonationIntent) -> Result<Donation, AppError> {
        if self.submission_guard.is_none() {
            // Without a guard the key has no meaning here.
            intent.submission_token = None;
        }
        let validated = validate_intent(intent)?;

        let claim = match (&self.submission_guard, &validated.submission_token) {
            (Some(guard), Some(token)) => {
                if !guard.check_and_register(token).await? {
                    tracing::warn!(
                        cause_id = %validated.cause_id,
                        submission_token = %token,
                        "Duplicate donation submission rejected"
                    );
                    return Err(AppError::Conflict(
                        "this donation has already been submitted".to_string(),
                    ));
                }
                Some(SubmissionClaim {
                    guard: guard.clone(),
                    token: Some(token.clone()),
                })
            }
            _ => None,
        };

        match self.commit(validated).await {
            Ok(donation) => {
                if let Some(claim) = claim {
                    claim.keep();
                }
                Ok(donation)
            }
            Err(CommitFailure::Rejected(e)) => {
                if let Some(claim) = claim {
                    claim.release().await;
                }
                Err(e)
            }
            Err(CommitFailure::Unresolved(e)) => {
                if let Some(claim) = claim {
                    claim.keep();
                }
                Err(e)
            }
        }
    }

    async fn commit(&self, validated: ValidatedDonation) -> Result<Donation, CommitFailure> {
        let cause = self
            .store
            .get_cause(validated.cause_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cause {} not found", validated.cause_id)))?;

        if !cause.accepts_donations() {
            return Err(CommitFailure::Rejected(AppError::Validation(format!(
                "cause_id: cause is {} and not accepting donations",
                cause.status
            ))));
        }

        let mut donation = validated.into_donation();
        let mut timed_out = false;
        let mut last_error = AppError::TransientStore("no commit attempted".to_string());

        for attempt in 1..=self.retry.max_attempts {
            let outcome =
                tokio::time::timeout(self.retry.commit_timeout, self.store.commit_donation(&donation)).await;

            match outcome {
                Ok(Ok(committed)) => {
                    self.on_committed(&committed, &cause, attempt);
                    return Ok(committed);
                }
                Ok(Err(StoreError::Conflict(constraint))) => {
                    // A timed-out attempt may have committed without acknowledging.
                    if timed_out {
                        if let Some(existing) = self.find_own_commit(&donation).await? {
                            self.on_committed(&existing, &cause, attempt);
                            return Ok(existing);
                        }
                    }
                    tracing::warn!(attempt, constraint = %constraint, "Transaction token collision, regenerating");
                    donation.regenerate_token();
                    last_error = AppError::Conflict(format!("transaction token collision on {}", constraint));
                }
                Ok(Err(StoreError::Transient(reason))) => {
                    tracing::warn!(
                        attempt,
                        cause_id = %donation.cause_id,
                        reason = %reason,
                        "Donation commit failed transiently"
                    );
                    last_error = AppError::TransientStore(reason);
                }
                Ok(Err(other)) => {
                    tracing::error!(
                        cause_id = %donation.cause_id,
                        error = %other,
                        "Donation commit failed"
                    );
                    return Err(CommitFailure::Rejected(other.into()));
                }
                Err(_elapsed) => {
                    timed_out = true;
                    tracing::warn!(
                        attempt,
                        cause_id = %donation.cause_id,
                        timeout_ms = self.retry.commit_timeout.as_millis() as u64,
                        "Donation commit timed out"
                    );
                    last_error = AppError::TransientStore(format!(
                        "commit timed out after {:?}",
                        self.retry.commit_timeout
                    ));
                }
            }

            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.backoff(attempt)).await;
            }
        }

        if timed_out {
            if let Some(existing) = self.find_own_commit(&donation).await? {
                self.on_committed(&existing, &cause, self.retry.max_attempts);
                return Ok(existing);
            }
        }

        tracing::error!(
            cause_id = %donation.cause_id,
            attempts = self.retry.max_attempts,
            error = %last_error,
            "Giving up on donation commit"
        );
        Err(CommitFailure::Rejected(last_error))
    }

    /// Looks up the donation by its current transaction token, accepting it only if
    /// it is this very donation. A failed lookup leaves the outcome unknown.
    async fn find_own_commit(&self, donation: &Donation) -> Result<Option<Donation>, CommitFailure> {
        match self.store.find_donation_by_token(&donation.transaction_token).await {
            Ok(existing) => Ok(existing.filter(|found| found.id == donation.id)),
            Err(e) => {
                tracing::error!(
                    cause_id = %donation.cause_id,
                    transaction_token = %donation.transaction_token,
                    error = %e,
                    "Could not confirm whether a timed-out donation commit landed"
                );
                Err(CommitFailure::Unresolved(AppError::TransientStore(format!(
                    "donation {} outcome is unknown, check before resubmitting",
                    donation.transaction_token
                ))))
            }
        }
    }

    fn on_committed(&self, donation: &Donation, cause: &Cause, attempt: u32) {
        tracing::info!(
            donation_id = %donation.id,
            cause_id = %donation.cause_id,
            transaction_token = %donation.transaction_token,
            amount = %donation.amount,
            status = %donation.status,
            attempt,
            "Donation recorded"
        );

        if donation.status.counts_towards_total() {
            // Fire and forget: the commit is final regardless of the outcome.
            let _ = self
                .notifier
                .notify_donation(cause.id, DonationSummary::new(donation, cause));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn intent() -> DonationIntent {
        DonationIntent {
            cause_id: Uuid::new_v4(),
            amount: BigDecimal::from_str("25.00").unwrap(),
            donor: DonorPayload {
                first_name: Some(" Jane ".to_string()),
                last_name: Some("Doe".to_string()),
                email: Some("Jane@Example.com ".to_string()),
                phone: None,
                address: None,
            },
            payment_method: "Credit_Card".to_string(),
            is_anonymous: false,
            message: Some("  Good luck!  ".to_string()),
            payment_outcome: PaymentOutcome::Captured,
            submission_token: None,
        }
    }

    #[test]
    fn test_validate_intent_normalizes_fields() {
        let validated = validate_intent(intent()).unwrap();

        assert_eq!(validated.donor.first_name, "Jane");
        assert_eq!(validated.donor.email, "jane@example.com");
        assert_eq!(validated.payment_method, "credit_card");
        assert_eq!(validated.message.as_deref(), Some("Good luck!"));
        assert_eq!(validated.status, DonationStatus::Completed);
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        for amount in ["0", "-5", "0.00"] {
            let err = validate_intent(DonationIntent {
                amount: BigDecimal::from_str(amount).unwrap(),
                ..intent()
            })
            .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "amount {}", amount);
        }
    }

    #[test]
    fn test_missing_names_rejected_unless_anonymous() {
        let nameless = DonorPayload {
            first_name: None,
            last_name: Some("  ".to_string()),
            email: Some("someone@example.com".to_string()),
            phone: None,
            address: None,
        };

        let err = validate_intent(DonationIntent {
            donor: nameless.clone(),
            ..intent()
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let validated = validate_intent(DonationIntent {
            donor: nameless,
            is_anonymous: true,
            ..intent()
        })
        .unwrap();
        assert_eq!(validated.donor.first_name, ANONYMOUS_FIRST_NAME);
        assert_eq!(validated.donor.last_name, ANONYMOUS_LAST_NAME);
    }

    #[test]
    fn test_invalid_email_rejected_even_when_anonymous() {
        let err = validate_intent(DonationIntent {
            donor: DonorPayload {
                email: Some("not-an-email".to_string()),
                ..DonorPayload::default()
            },
            is_anonymous: true,
            ..intent()
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("email")));
    }

    #[test]
    fn test_overlong_message_rejected() {
        let err = validate_intent(DonationIntent {
            message: Some("x".repeat(MESSAGE_MAX_LEN + 1)),
            ..intent()
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("message")));
    }

    #[test]
    fn test_unknown_payment_method_rejected() {
        let err = validate_intent(DonationIntent {
            payment_method: "cash".to_string(),
            ..intent()
        })
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_declined_payment_maps_to_failed_donation() {
        let validated = validate_intent(DonationIntent {
            payment_outcome: PaymentOutcome::Declined,
            ..intent()
        })
        .unwrap();
        assert_eq!(validated.status, DonationStatus::Failed);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
            commit_timeout: Duration::from_secs(1),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
    }
}
