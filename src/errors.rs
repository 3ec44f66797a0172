use sea_orm::error::DbErr;
use serde::Serialize;
use thiserror::Error;

/// Errors returned by the inventory and order services.
#[derive(Error, Debug, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status transition: {0}")]
    InvalidStatusTransition(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// True when retrying the same call cannot succeed without an
    /// intervening state change (guard failures, bad input).
    pub fn is_permanent(&self) -> bool {
        !matches!(self, ServiceError::DatabaseError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_is_permanent() {
        let err = ServiceError::InsufficientStock("item 1 at warehouse 2".into());
        assert!(err.is_permanent());
        assert!(err.to_string().contains("Insufficient stock"));
    }

    #[test]
    fn database_error_is_transient() {
        let err = ServiceError::DatabaseError(DbErr::Custom("connection reset".into()));
        assert!(!err.is_permanent());
    }
}
