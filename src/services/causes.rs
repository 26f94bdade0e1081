//! Cause intake and moderation.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Cause, CauseStatus, NewCause, Principal};
use crate::error::AppError;
use crate::ports::LedgerStore;
use crate::services::idempotency::IdempotencyGuard;
use crate::services::notifications::NotificationDispatcher;
use crate::validation::{
    sanitize_optional, sanitize_string, validate_max_len, validate_money, validate_required,
    validate_submission_token, ValidationError, CATEGORY_MAX_LEN, DESCRIPTION_MAX_LEN,
    TITLE_MAX_LEN,
};

#[derive(Debug, Clone, Deserialize)]
pub struct CauseSubmission {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub target_amount: BigDecimal,
    pub owner_id: Uuid,
}

pub fn validate_submission(submission: CauseSubmission) -> Result<NewCause, ValidationError> {
    let title = sanitize_string(&submission.title);
    validate_required("title", &title)?;
    validate_max_len("title", &title, TITLE_MAX_LEN)?;

    let category = sanitize_string(&submission.category).to_lowercase();
    validate_required("category", &category)?;
    validate_max_len("category", &category, CATEGORY_MAX_LEN)?;

    let description = sanitize_optional(submission.description.as_deref());
    if let Some(description) = &description {
        validate_max_len("description", description, DESCRIPTION_MAX_LEN)?;
    }

    validate_money("target_amount", &submission.target_amount)?;

    if crate::domain::slugify(&title).is_empty() {
        return Err(ValidationError::new(
            "title",
            "must contain at least one letter or digit",
        ));
    }

    Ok(NewCause {
        title,
        description,
        category,
        target_amount: submission.target_amount,
        owner_id: submission.owner_id,
    })
}

#[derive(Clone)]
pub struct CauseService {
    store: Arc<dyn LedgerStore>,
    guard: Arc<dyn IdempotencyGuard>,
    notifier: NotificationDispatcher,
}

impl CauseService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        guard: Arc<dyn IdempotencyGuard>,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            guard,
            notifier,
        }
    }

    /// Creates a pending cause. A repeated `submission_token` is rejected with
    /// `Conflict` instead of creating a second cause.
    pub async fn create_cause(
        &self,
        submission_token: &str,
        submission: CauseSubmission,
    ) -> Result<Cause, AppError> {
        let submission_token = submission_token.trim();
        validate_submission_token(submission_token)?;
        let new_cause = validate_submission(submission)?;

        if !self.guard.check_and_register(submission_token).await? {
            tracing::warn!(submission_token = %submission_token, "Duplicate cause submission rejected");
            return Err(AppError::Conflict(
                "this cause has already been submitted".to_string(),
            ));
        }

        match self.store.insert_cause(&Cause::new(new_cause)).await {
            Ok(cause) => {
                tracing::info!(cause_id = %cause.id, slug = %cause.slug, "Cause created");
                Ok(cause)
            }
            Err(e) => {
                if let Err(release_err) = self.guard.release(submission_token).await {
                    tracing::error!(error = %release_err, "Failed to release cause submission token");
                }
                Err(e.into())
            }
        }
    }

    pub async fn get_cause(&self, cause_id: Uuid) -> Result<Cause, AppError> {
        self.store
            .get_cause(cause_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cause {} not found", cause_id)))
    }

    /// Applies a moderation decision and tells the owner about it.
    pub async fn moderate(
        &self,
        principal: Principal,
        cause_id: Uuid,
        status: CauseStatus,
    ) -> Result<Cause, AppError> {
        principal.require_admin("moderating a cause")?;

        let current = self.get_cause(cause_id).await?;
        if current.status == status {
            return Ok(current);
        }

        let cause = self.store.update_cause_status(cause_id, status).await?;
        tracing::info!(
            cause_id = %cause_id,
            from = %current.status,
            to = %cause.status,
            "Cause status changed"
        );

        let _ = self.notifier.notify_cause_status(cause.clone());
        Ok(cause)
    }
}
