use crate::error::AppError;

/// Who is asking. Resolved by the HTTP layer from the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Public,
    Admin,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        *self == Principal::Admin
    }

    pub fn require_admin(&self, action: &str) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Permission(format!("{} requires administrator access", action)))
        }
    }
}
