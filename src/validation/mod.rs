use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::fmt;

pub const NAME_MAX_LEN: usize = 100;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PHONE_MAX_LEN: usize = 32;
pub const ADDRESS_MAX_LEN: usize = 255;
pub const MESSAGE_MAX_LEN: usize = 500;
pub const TITLE_MAX_LEN: usize = 150;
pub const DESCRIPTION_MAX_LEN: usize = 5000;
pub const CATEGORY_MAX_LEN: usize = 50;
pub const SUBMISSION_TOKEN_MAX_LEN: usize = 128;
pub const AMOUNT_MAX_SCALE: i64 = 2;
/// Exclusive upper bound; with two decimal places the largest accepted amount is 999999999999.99.
pub const AMOUNT_LIMIT: i64 = 1_000_000_000_000;
pub const ALLOWED_PAYMENT_METHODS: &[&str] = &["credit_card", "debit_card", "paypal", "bank_transfer"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrictPayload<T> {
    #[serde(flatten)]
    pub data: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Sanitizes an optional free-text field, mapping blank input to `None`.
pub fn sanitize_optional(value: Option<&str>) -> Option<String> {
    value.map(sanitize_string).filter(|v| !v.is_empty())
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }

    Ok(())
}

/// Amounts are stored as NUMERIC(14,2): positive, at most two fractional digits.
pub fn validate_money(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    validate_positive_amount(field, amount)?;

    if &amount.with_scale(AMOUNT_MAX_SCALE) != amount {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    if amount >= &BigDecimal::from(AMOUNT_LIMIT) {
        return Err(ValidationError::new(
            field,
            format!("must be less than {}", AMOUNT_LIMIT),
        ));
    }

    Ok(())
}

/// Syntactic check only: `local@domain.tld`, no whitespace, one `@`.
pub fn validate_email(email: &str) -> ValidationResult {
    validate_required("email", email)?;
    validate_max_len("email", email, EMAIL_MAX_LEN)?;

    let invalid = || ValidationError::new("email", "must be a valid email address");

    if email.chars().any(|ch| ch.is_whitespace()) {
        return Err(invalid());
    }

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }

    if !labels
        .iter()
        .all(|label| label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-'))
    {
        return Err(invalid());
    }

    Ok(())
}

pub fn validate_payment_method(method: &str) -> ValidationResult {
    validate_required("payment_method", method)?;
    validate_enum("payment_method", method, ALLOWED_PAYMENT_METHODS)
}

pub fn validate_submission_token(token: &str) -> ValidationResult {
    validate_required("submission_token", token)?;
    validate_max_len("submission_token", token, SUBMISSION_TOKEN_MAX_LEN)?;

    if !token
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':' | '+' | '/' | '='))
    {
        return Err(ValidationError::new(
            "submission_token",
            "must contain only letters, digits or one of - _ . : + / =",
        ));
    }

    Ok(())
}
