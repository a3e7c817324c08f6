use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{model} not found: {id}")]
    NotFound { model: &'static str, id: String },
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("unique constraint failed: {0}")]
    UniqueViolation(String),
    #[error("foreign key constraint failed: {0}")]
    ForeignKeyViolation(String),
    #[error("could not get a database connection: {0}")]
    Pool(String),
    #[error(transparent)]
    Database(DieselError),
}

impl StoreError {
    pub fn not_found(model: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            model,
            id: id.into(),
        }
    }
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::UniqueViolation(info.constraint_name().unwrap_or("").to_string())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                StoreError::ForeignKeyViolation(info.constraint_name().unwrap_or("").to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<diesel::r2d2::PoolError> for StoreError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        StoreError::Pool(err.to_string())
    }
}

/// Classifies any error chain, looking through `anyhow` wrapping for either
/// a [`StoreError`] or a raw diesel error.
pub fn classify(err: &anyhow::Error) -> Option<StoreError> {
    for cause in err.chain() {
        if let Some(store) = cause.downcast_ref::<StoreError>() {
            return Some(match store {
                StoreError::NotFound { model, id } => StoreError::not_found(model, id.clone()),
                StoreError::Validation(msg) => StoreError::Validation(msg.clone()),
                StoreError::UniqueViolation(c) => StoreError::UniqueViolation(c.clone()),
                StoreError::ForeignKeyViolation(c) => StoreError::ForeignKeyViolation(c.clone()),
                StoreError::Pool(msg) => StoreError::Pool(msg.clone()),
                StoreError::Database(_) => return None,
            });
        }
        if let Some(diesel_err) = cause.downcast_ref::<DieselError>() {
            return match diesel_err {
                DieselError::NotFound => Some(StoreError::not_found("record", "")),
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => Some(
                    StoreError::UniqueViolation(info.constraint_name().unwrap_or("").to_string()),
                ),
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                    Some(StoreError::ForeignKeyViolation(
                        info.constraint_name().unwrap_or("").to_string(),
                    ))
                }
                _ => None,
            };
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_classify_store_error() {
        let err: anyhow::Error = StoreError::Validation("bad amount".to_string()).into();
        assert!(matches!(classify(&err), Some(StoreError::Validation(m)) if m == "bad amount"));
    }

    #[test]
    fn test_classify_diesel_not_found() {
        let err: anyhow::Error = DieselError::NotFound.into();
        assert!(matches!(classify(&err), Some(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_classify_context_wrapped() {
        let err = anyhow::Error::from(StoreError::not_found("Campaign", "abc"))
            .context("loading campaign detail");
        match classify(&err) {
            Some(StoreError::NotFound { model, id }) => {
                assert_eq!(model, "Campaign");
                assert_eq!(id, "abc");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_classify_other() {
        let err = anyhow::anyhow!("something else");
        assert!(classify(&err).is_none());
    }
}
