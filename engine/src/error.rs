use thiserror::Error;

/// An inbound request that is not a well-formed join, leave or auction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed request: {detail}")]
pub struct ShapeViolation {
    detail: String,
}

impl ShapeViolation {
    pub(crate) fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Why `handle_request` rejected a call.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Shape(#[from] ShapeViolation),
    #[error("{operation} transaction did not commit")]
    StorageFailure { operation: &'static str },
}

impl RequestError {
    #[must_use]
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape(_))
    }
}
