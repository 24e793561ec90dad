use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("enrollment name must not be empty")]
    EmptyName,
}

/// Validated enrollment request.
///
/// Holds the trimmed name for exactly one training call; never retained
/// after the call returns. Construction rejects empty or whitespace-only
/// names before any network traffic happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    name: String,
}

impl EnrollmentRequest {
    pub fn new(name: &str) -> Result<Self, EnrollmentError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(EnrollmentError::EmptyName);
        }
        Ok(Self {
            name: trimmed.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
